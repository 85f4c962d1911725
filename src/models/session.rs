// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Session-level types exposed to the UI layer.

use crate::models::{PointValidationError, RecoverableSessionInfo, Track, TrackStats};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Lifecycle state of the tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum TrackingStatus {
    #[default]
    Idle,
    Recording,
    Paused,
    Completed,
    Error,
}

/// Coarse activity inferred from smoothed speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ActivityLabel {
    #[default]
    Stationary,
    Walking,
    Running,
    Cycling,
}

/// Options for a new recording.
#[derive(Debug, Clone, Validate)]
pub struct TrackingOptions {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Activity type chosen by the user (e.g. "hike", "walk", "ride")
    #[validate(length(min = 1, max = 50))]
    pub activity_type: String,
    #[validate(length(min = 1, max = 16))]
    pub park_code: Option<String>,
}

/// Upload health, shown as a transient indicator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Failed { message: String },
}

/// Point-in-time view of the tracker for rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TrackerSnapshot {
    pub status: TrackingStatus,
    pub track_id: Option<String>,
    pub stats: TrackStats,
    pub activity: ActivityLabel,
    /// Rolling average from the classifier window (m/s)
    pub current_speed: f64,
    pub pending_points: usize,
    pub confirmed_points: usize,
    pub sync: SyncStatus,
    pub has_recoverable_session: bool,
    pub recoverable_session: Option<RecoverableSessionInfo>,
}

/// What the page should do when it is about to unload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnloadDecision {
    /// Ask the browser to confirm before leaving
    pub confirm_leave: bool,
    /// Points handed to the fire-and-forget beacon
    pub beaconed_points: usize,
}

/// Outcome of a completed `stop_tracking`.
#[derive(Debug, Clone)]
pub struct FinalizedTrack {
    /// Server-authoritative track summary
    pub track: Track,
    /// Locally computed stats at the time of stopping
    pub local_stats: TrackStats,
    /// Points that could not be uploaded before finalizing
    pub unsent_points: usize,
    pub validation_errors: Vec<PointValidationError>,
}

/// Outcome of a successful recovery upload.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverResult {
    pub track_id: String,
    pub uploaded: usize,
    pub validation_errors: Vec<PointValidationError>,
}
