// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Raw location readings and the sequence-numbered points built from them.

use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};

/// One reading from the device location provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude in meters, if the device reports one
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    /// Ground speed in meters/second
    pub speed: Option<f64>,
    /// Heading in degrees from true north
    pub heading: Option<f64>,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    /// Position as a `geo` point (x = longitude, y = latitude).
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Whether the reading is usable at the given accuracy threshold.
    ///
    /// Non-finite coordinates and negative or non-finite accuracy are
    /// never accepted.
    pub fn is_acceptable(&self, accuracy_threshold_m: f64) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.accuracy.is_finite()
            && self.accuracy >= 0.0
            && self.accuracy <= accuracy_threshold_m
    }

    /// Speed if it is a real, non-negative number.
    pub fn valid_speed(&self) -> Option<f64> {
        self.speed.filter(|s| s.is_finite() && *s >= 0.0)
    }
}

/// A location sample stamped with its position in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    #[serde(flatten)]
    pub sample: LocationSample,
    /// Strictly increasing within a session, assigned at ingestion
    pub sequence_num: u64,
}

impl TrackPoint {
    pub fn new(sample: LocationSample, sequence_num: u64) -> Self {
        Self {
            sample,
            sequence_num,
        }
    }
}
