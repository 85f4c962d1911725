// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Park Tracker: record walks, runs and rides through park preserves
//!
//! This crate provides the client-side tracking core: it turns a stream of
//! device location fixes into a recorded track, classifies the activity,
//! uploads points to the tracking API in batches and keeps a local backup
//! so an interrupted session can be recovered.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;
pub mod tracker;

pub use error::{Result, TrackingError};
pub use tracker::{FlushResult, FlushSkipReason, Tracker};
