// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use park_tracker::models::TrackingStatus;
use park_tracker::{FlushResult, FlushSkipReason};

mod common;
use common::{walk, Harness};

#[tokio::test]
async fn test_unload_while_idle_allows_leaving() {
    let h = Harness::new();
    let decision = h.tracker.on_before_unload();
    assert!(!decision.confirm_leave);
    assert_eq!(decision.beaconed_points, 0);
    assert!(h.api.beacons().is_empty());
}

#[tokio::test]
async fn test_unload_while_recording_beacons_pending_points() {
    let h = Harness::new();
    h.start().await;
    h.location.emit_all(walk(4));

    let decision = h.tracker.on_before_unload();
    assert!(decision.confirm_leave);
    assert_eq!(decision.beaconed_points, 4);

    let beacons = h.api.beacons();
    assert_eq!(beacons.len(), 1);
    assert_eq!(beacons[0].0, "track-1");
    let seqs: Vec<u64> = beacons[0].1.iter().map(|p| p.sequence_num).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);

    // Beacon delivery is unconfirmed, so the points stay pending and backed up
    assert_eq!(h.tracker.pending_points().len(), 4);
    assert_eq!(h.backup().unwrap().pending_points.len(), 4);
}

#[tokio::test]
async fn test_unload_while_paused_confirms_without_beacon() {
    let h = Harness::new();
    h.start().await;
    h.location.emit_all(walk(2));
    h.tracker.pause_tracking().await.unwrap();

    let decision = h.tracker.on_before_unload();
    assert!(decision.confirm_leave);
    assert_eq!(decision.beaconed_points, 0);
    assert!(h.api.beacons().is_empty());
}

#[tokio::test]
async fn test_visibility_hidden_flushes() {
    let h = Harness::new();
    h.start().await;
    h.location.emit_all(walk(3));

    let result = h.tracker.on_visibility_hidden().await;
    assert!(matches!(result, FlushResult::Flushed { inserted: 3, .. }));
    assert!(h.tracker.pending_points().is_empty());

    let backup = h.backup().unwrap();
    assert_eq!(backup.points.len(), 3);
    assert!(backup.pending_points.is_empty());
    assert_eq!(h.tracker.status(), TrackingStatus::Recording);
}

#[tokio::test]
async fn test_visibility_hidden_when_not_recording() {
    let h = Harness::new();
    assert!(matches!(
        h.tracker.on_visibility_hidden().await,
        FlushResult::Skipped(FlushSkipReason::NotRecording)
    ));
}
