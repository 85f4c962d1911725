// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the tracking core.

pub mod backup;
pub mod sample;
pub mod session;
pub mod stats;
pub mod track;

pub use backup::{LocalBackupRecord, RecoverableSessionInfo};
pub use sample::{LocationSample, TrackPoint};
pub use session::{
    ActivityLabel, FinalizedTrack, RecoverResult, SyncStatus, TrackerSnapshot, TrackingOptions,
    TrackingStatus, UnloadDecision,
};
pub use stats::{StatsAccumulator, TrackStats};
pub use track::{
    AddPointsResponse, CreateTrackRequest, PointValidationError, RemoteTrackStatus, Track,
    TrackPointPayload,
};
