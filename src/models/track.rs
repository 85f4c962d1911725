// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Wire types for the remote tracking API.

use crate::models::TrackPoint;
use crate::time_utils::format_utc_rfc3339_millis;
use serde::{Deserialize, Serialize};

/// Body of the "create track" call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTrackRequest {
    pub title: String,
    pub activity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub park_code: Option<String>,
}

/// Track status as stored server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteTrackStatus {
    Recording,
    Paused,
    Completed,
    /// Any status this client does not know about
    #[serde(other)]
    Unknown,
}

/// Body of the "update track" call.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateTrackRequest {
    pub status: RemoteTrackStatus,
}

/// Server-side track record.
///
/// The summary fields are only filled in once the track is finalized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Track {
    pub id: String,
    pub status: RemoteTrackStatus,
    #[serde(default)]
    pub distance_meters: Option<f64>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub elevation_gain_m: Option<f64>,
}

/// `{ "track": { ... } }` response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackEnvelope {
    pub track: Track,
}

/// `{ "error": "..." }` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// One point as uploaded to the append endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPointPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub recorded_at: String,
    pub sequence_num: u64,
}

impl From<&TrackPoint> for TrackPointPayload {
    fn from(point: &TrackPoint) -> Self {
        let s = &point.sample;
        Self {
            latitude: s.latitude,
            longitude: s.longitude,
            altitude: s.altitude,
            accuracy: s.accuracy,
            speed: s.speed,
            heading: s.heading,
            recorded_at: format_utc_rfc3339_millis(s.timestamp),
            sequence_num: point.sequence_num,
        }
    }
}

/// Body of the append call.
#[derive(Debug, Clone, Serialize)]
pub struct AddPointsRequest<'a> {
    pub points: &'a [TrackPointPayload],
}

/// Per-point rejection reported by the append endpoint.
///
/// `index` refers to the position within the uploaded batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointValidationError {
    pub index: usize,
    #[serde(default)]
    pub error: String,
}

/// Response of the append endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AddPointsResponse {
    pub inserted: usize,
    #[serde(default, rename = "validationErrors")]
    pub validation_errors: Vec<PointValidationError>,
}
