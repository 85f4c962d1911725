// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Distance, elevation and speed helpers for recorded tracks.

use geo::Point;

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two points (x = lon, y = lat).
///
/// NaN inputs propagate to the result.
pub fn haversine_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let dlat = (b.y() - a.y()).to_radians();
    let dlon = (b.x() - a.x()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Total length of a path in meters.
pub fn path_distance<I>(points: I) -> f64
where
    I: IntoIterator<Item = Point<f64>>,
{
    let mut total = 0.0;
    let mut prev: Option<Point<f64>> = None;
    for p in points {
        if let Some(last) = prev {
            total += haversine_distance(last, p);
        }
        prev = Some(p);
    }
    total
}

/// Sum of positive altitude deltas in meters.
///
/// Missing altitudes are skipped: each known altitude is compared with the
/// previous known altitude, and descents contribute nothing.
pub fn elevation_gain<I>(altitudes: I) -> f64
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut gain = 0.0;
    let mut prev: Option<f64> = None;
    for alt in altitudes.into_iter().flatten() {
        if let Some(last) = prev {
            if alt > last {
                gain += alt - last;
            }
        }
        prev = Some(alt);
    }
    gain
}

/// Mean of the strictly positive speeds, or `None` if there are none.
pub fn average_speed<I>(speeds: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = speeds
        .into_iter()
        .flatten()
        .filter(|s| *s > 0.0)
        .fold((0.0, 0usize), |(sum, count), s| (sum + s, count + 1));

    (count > 0).then(|| sum / count as f64)
}
