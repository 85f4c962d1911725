// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - tracking building blocks.

pub mod api;
pub mod backup;
pub mod buffer;
pub mod classifier;
pub mod geo_math;
pub mod location;
pub mod storage;

pub use api::{HttpTrackingApi, TrackingApi};
pub use backup::BackupStore;
pub use buffer::PointBuffer;
pub use classifier::{ActivityClassifier, ActivityThresholds};
pub use location::{LocationError, LocationProvider, WatchId};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
