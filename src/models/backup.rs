// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Locally persisted snapshot of an in-progress session.

use crate::models::{ActivityLabel, StatsAccumulator, TrackPoint, TrackStats, TrackingStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Serialized session, stored under a single well-known key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBackupRecord {
    pub track_id: Option<String>,
    /// Points the server has confirmed
    pub points: Vec<TrackPoint>,
    /// Points not yet uploaded
    pub pending_points: Vec<TrackPoint>,
    pub stats: TrackStats,
    /// Running totals behind `stats`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<StatsAccumulator>,
    pub activity: ActivityLabel,
    pub status: TrackingStatus,
    /// Next sequence number to assign
    pub sequence_num: u64,
    pub saved_at: DateTime<Utc>,
}

impl LocalBackupRecord {
    /// A backup is recoverable once the server knows the track and at least
    /// one point has been confirmed.
    pub fn is_recoverable(&self) -> bool {
        self.track_id.is_some() && !self.points.is_empty()
    }

    /// Summary shown to the user when offering recovery.
    pub fn info(&self) -> Option<RecoverableSessionInfo> {
        let track_id = self.track_id.clone()?;
        Some(RecoverableSessionInfo {
            track_id,
            point_count: self.points.len() + self.pending_points.len(),
            pending_count: self.pending_points.len(),
            saved_at: self.saved_at,
            stats: self.stats,
        })
    }
}

/// What the UI needs to ask "resume your unsaved track?".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RecoverableSessionInfo {
    pub track_id: String,
    pub point_count: usize,
    pub pending_count: usize,
    pub saved_at: DateTime<Utc>,
    pub stats: TrackStats,
}
