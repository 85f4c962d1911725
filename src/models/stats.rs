//! Live statistics for an in-progress track.
//!
//! The tracker maintains these incrementally so that evicting old points
//! from memory never changes the totals. `TrackStats::from_points` is the
//! full recompute and must always agree with the accumulator.

use crate::models::TrackPoint;
use crate::services::geo_math::{average_speed, elevation_gain, haversine_distance, path_distance};
use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Distance, duration, climb and speed for a track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TrackStats {
    pub distance_meters: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub duration_seconds: u64,
    pub elevation_gain_meters: f64,
    /// Mean of the positive reported speeds, `None` while fully stopped
    pub average_speed: Option<f64>,
}

impl TrackStats {
    /// Recompute stats over an ordered slice of points.
    pub fn from_points(points: &[TrackPoint]) -> Self {
        let duration_seconds = match (points.first(), points.last()) {
            (Some(first), Some(last)) => {
                duration_between(first.sample.timestamp, last.sample.timestamp)
            }
            _ => 0,
        };

        Self {
            distance_meters: path_distance(points.iter().map(|p| p.sample.point())),
            duration_seconds,
            elevation_gain_meters: elevation_gain(points.iter().map(|p| p.sample.altitude)),
            average_speed: average_speed(points.iter().map(|p| p.sample.speed)),
        }
    }
}

/// Running totals updated one point at a time.
///
/// Persisted alongside the backup so a recovered session continues from
/// the same totals even when early points are no longer retained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsAccumulator {
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
    /// `[longitude, latitude]` of the last point
    last_position: Option<[f64; 2]>,
    last_altitude: Option<f64>,
    distance_meters: f64,
    elevation_gain_meters: f64,
    speed_sum: f64,
    speed_count: u64,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the next point (in sequence order) into the totals.
    pub fn push(&mut self, point: &TrackPoint) {
        let sample = &point.sample;
        let position = sample.point();

        if let Some([lon, lat]) = self.last_position {
            self.distance_meters += haversine_distance(Point::new(lon, lat), position);
        }
        self.last_position = Some([position.x(), position.y()]);

        if let Some(alt) = sample.altitude {
            if let Some(last) = self.last_altitude {
                if alt > last {
                    self.elevation_gain_meters += alt - last;
                }
            }
            self.last_altitude = Some(alt);
        }

        if let Some(speed) = sample.speed.filter(|s| *s > 0.0) {
            self.speed_sum += speed;
            self.speed_count += 1;
        }

        self.first_timestamp.get_or_insert(sample.timestamp);
        self.last_timestamp = Some(sample.timestamp);
    }

    /// Rebuild totals by replaying points in order.
    pub fn from_points(points: &[TrackPoint]) -> Self {
        let mut acc = Self::new();
        for p in points {
            acc.push(p);
        }
        acc
    }

    pub fn stats(&self) -> TrackStats {
        let duration_seconds = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => duration_between(first, last),
            _ => 0,
        };

        TrackStats {
            distance_meters: self.distance_meters,
            duration_seconds,
            elevation_gain_meters: self.elevation_gain_meters,
            average_speed: (self.speed_count > 0)
                .then(|| self.speed_sum / self.speed_count as f64),
        }
    }
}

fn duration_between(first: DateTime<Utc>, last: DateTime<Utc>) -> u64 {
    (last - first).num_seconds().max(0) as u64
}
