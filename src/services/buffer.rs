// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pending point buffer and batch upload.
//!
//! Points accumulate locally and are uploaded in bounded batches. A batch
//! is resolved as a unit: accepted points move on to the confirmed list,
//! points the server rejected are dropped (retrying cannot fix them), and
//! a failed request leaves every point pending for the next attempt.

use crate::error::Result;
use crate::models::{AddPointsResponse, PointValidationError, TrackPoint, TrackPointPayload};
use crate::services::api::TrackingApi;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Whether a flush is due: enough points are waiting, or the interval
/// since the last flush attempt has elapsed.
///
/// After a failed attempt only the interval counts, so a full buffer does
/// not retry on every new point.
pub fn should_flush(
    pending: usize,
    since_last_flush: Duration,
    last_attempt_failed: bool,
    max_points_per_batch: usize,
    flush_interval: Duration,
) -> bool {
    if pending == 0 {
        return false;
    }
    if since_last_flush >= flush_interval {
        return true;
    }
    !last_attempt_failed && pending >= max_points_per_batch
}

/// Outcome of resolving one uploaded batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResolution {
    /// Points the server stored, in sequence order
    pub accepted: Vec<TrackPoint>,
    /// Rejections reported by the server (indices into the batch)
    pub rejected: Vec<PointValidationError>,
}

/// Points waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct PointBuffer {
    pending: Vec<TrackPoint>,
    max_points_per_batch: usize,
    flush_interval: Duration,
    last_flush: Instant,
    last_attempt_failed: bool,
}

impl PointBuffer {
    pub fn new(max_points_per_batch: usize, flush_interval: Duration) -> Self {
        Self {
            pending: Vec::new(),
            max_points_per_batch: max_points_per_batch.max(1),
            flush_interval,
            last_flush: Instant::now(),
            last_attempt_failed: false,
        }
    }

    /// Rebuild a buffer around previously pending points.
    pub fn with_pending(
        pending: Vec<TrackPoint>,
        max_points_per_batch: usize,
        flush_interval: Duration,
    ) -> Self {
        let mut buffer = Self::new(max_points_per_batch, flush_interval);
        buffer.pending = pending;
        buffer
    }

    pub fn add_point(&mut self, point: TrackPoint) {
        self.pending.push(point);
    }

    pub fn pending(&self) -> &[TrackPoint] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn should_flush(&self, now: Instant) -> bool {
        should_flush(
            self.pending.len(),
            now.saturating_duration_since(self.last_flush),
            self.last_attempt_failed,
            self.max_points_per_batch,
            self.flush_interval,
        )
    }

    /// The oldest pending points, at most one batch worth.
    pub fn next_batch(&self) -> Vec<TrackPoint> {
        let end = self.pending.len().min(self.max_points_per_batch);
        self.pending[..end].to_vec()
    }

    /// Record a flush attempt, successful or not.
    pub fn mark_attempt(&mut self, now: Instant) {
        self.last_flush = now;
    }

    /// When the last flush attempt started.
    pub fn last_attempt(&self) -> Instant {
        self.last_flush
    }

    /// Record that the last attempt failed; the next retry waits a full
    /// interval.
    pub fn mark_failure(&mut self) {
        self.last_attempt_failed = true;
    }

    /// Remove an uploaded batch from pending and split it into accepted and
    /// rejected points.
    ///
    /// Points are matched by sequence number, so anything ingested while the
    /// upload was in flight stays pending.
    pub fn resolve_batch(
        &mut self,
        batch: &[TrackPoint],
        response: &AddPointsResponse,
    ) -> BatchResolution {
        let rejected_indices: HashSet<usize> = response
            .validation_errors
            .iter()
            .map(|e| e.index)
            .filter(|i| *i < batch.len())
            .collect();

        let accepted: Vec<TrackPoint> = batch
            .iter()
            .enumerate()
            .filter(|(i, _)| !rejected_indices.contains(i))
            .map(|(_, p)| p.clone())
            .collect();

        let uploaded: HashSet<u64> = batch.iter().map(|p| p.sequence_num).collect();
        self.pending.retain(|p| !uploaded.contains(&p.sequence_num));
        self.last_attempt_failed = false;

        if accepted.len() != response.inserted {
            tracing::debug!(
                accepted = accepted.len(),
                inserted = response.inserted,
                "Server insert count differs from accepted points (duplicates skipped?)"
            );
        }

        BatchResolution {
            accepted,
            rejected: response.validation_errors.clone(),
        }
    }
}

/// Upload one batch to the append endpoint.
pub async fn upload_batch<A: TrackingApi>(
    api: &A,
    access_token: &str,
    track_id: &str,
    batch: &[TrackPoint],
) -> Result<AddPointsResponse> {
    let payload: Vec<TrackPointPayload> = batch.iter().map(TrackPointPayload::from).collect();
    let response = api.add_track_points(access_token, track_id, &payload).await?;

    tracing::debug!(
        track_id,
        sent = payload.len(),
        inserted = response.inserted,
        rejected = response.validation_errors.len(),
        "Uploaded point batch"
    );

    for err in &response.validation_errors {
        tracing::warn!(
            track_id,
            index = err.index,
            error = %err.error,
            "Point rejected by server"
        );
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationSample;
    use chrono::Utc;

    fn make_point(seq: u64) -> TrackPoint {
        TrackPoint::new(
            LocationSample {
                latitude: 37.4,
                longitude: -122.1,
                altitude: None,
                accuracy: 4.0,
                speed: Some(1.0),
                heading: None,
                timestamp: Utc::now(),
            },
            seq,
        )
    }

    fn buffer_with(n: u64, max: usize) -> PointBuffer {
        let mut buffer = PointBuffer::new(max, Duration::from_secs(15));
        for seq in 0..n {
            buffer.add_point(make_point(seq));
        }
        buffer
    }

    #[test]
    fn test_should_flush_conditions() {
        let interval = Duration::from_secs(15);
        assert!(!should_flush(0, Duration::from_secs(60), false, 30, interval));
        assert!(!should_flush(5, Duration::from_secs(3), false, 30, interval));
        assert!(should_flush(30, Duration::ZERO, false, 30, interval));
        assert!(should_flush(1, Duration::from_secs(15), false, 30, interval));
    }

    #[test]
    fn test_failed_attempt_waits_for_interval() {
        let interval = Duration::from_secs(15);
        assert!(!should_flush(40, Duration::from_secs(5), true, 30, interval));
        assert!(should_flush(40, Duration::from_secs(15), true, 30, interval));

        let mut buffer = buffer_with(30, 30);
        let start = Instant::now();
        buffer.mark_attempt(start);
        buffer.mark_failure();
        buffer.add_point(make_point(30));
        assert!(!buffer.should_flush(start + Duration::from_secs(5)));
        assert!(buffer.should_flush(start + Duration::from_secs(15)));

        let batch = buffer.next_batch();
        buffer.resolve_batch(
            &batch,
            &AddPointsResponse {
                inserted: 30,
                validation_errors: vec![],
            },
        );
        for seq in 31..60 {
            buffer.add_point(make_point(seq));
        }
        assert!(buffer.should_flush(start + Duration::from_secs(1)));
    }

    #[test]
    fn test_next_batch_is_bounded() {
        let buffer = buffer_with(45, 30);
        let batch = buffer.next_batch();
        assert_eq!(batch.len(), 30);
        assert_eq!(batch[0].sequence_num, 0);
        assert_eq!(batch[29].sequence_num, 29);
    }

    #[test]
    fn test_full_success_clears_batch() {
        let mut buffer = buffer_with(3, 30);
        let batch = buffer.next_batch();
        let resolution = buffer.resolve_batch(
            &batch,
            &AddPointsResponse {
                inserted: 3,
                validation_errors: vec![],
            },
        );
        assert!(buffer.is_empty());
        assert_eq!(resolution.accepted.len(), 3);
        assert!(resolution.rejected.is_empty());
    }

    #[test]
    fn test_partial_success_drops_rejected_points() {
        let mut buffer = buffer_with(10, 30);
        let batch = buffer.next_batch();
        let resolution = buffer.resolve_batch(
            &batch,
            &AddPointsResponse {
                inserted: 8,
                validation_errors: vec![
                    PointValidationError {
                        index: 2,
                        error: "invalid latitude".to_string(),
                    },
                    PointValidationError {
                        index: 5,
                        error: "invalid longitude".to_string(),
                    },
                ],
            },
        );

        assert_eq!(buffer.len(), 0);
        assert_eq!(resolution.accepted.len(), 8);
        assert_eq!(resolution.rejected.len(), 2);
        let seqs: Vec<u64> = resolution.accepted.iter().map(|p| p.sequence_num).collect();
        assert_eq!(seqs, vec![0, 1, 3, 4, 6, 7, 8, 9]);
    }

    #[test]
    fn test_points_added_during_upload_stay_pending() {
        let mut buffer = buffer_with(3, 30);
        let batch = buffer.next_batch();
        buffer.add_point(make_point(3));
        buffer.add_point(make_point(4));

        buffer.resolve_batch(
            &batch,
            &AddPointsResponse {
                inserted: 3,
                validation_errors: vec![],
            },
        );

        let remaining: Vec<u64> = buffer.pending().iter().map(|p| p.sequence_num).collect();
        assert_eq!(remaining, vec![3, 4]);
    }

    #[test]
    fn test_out_of_range_validation_index_ignored() {
        let mut buffer = buffer_with(2, 30);
        let batch = buffer.next_batch();
        let resolution = buffer.resolve_batch(
            &batch,
            &AddPointsResponse {
                inserted: 2,
                validation_errors: vec![PointValidationError {
                    index: 7,
                    error: "?".to_string(),
                }],
            },
        );
        assert_eq!(resolution.accepted.len(), 2);
    }

    #[test]
    fn test_interval_flush_due_after_attempt() {
        let mut buffer = buffer_with(1, 30);
        let start = Instant::now();
        buffer.mark_attempt(start);
        assert!(!buffer.should_flush(start + Duration::from_secs(14)));
        assert!(buffer.should_flush(start + Duration::from_secs(15)));
    }
}
