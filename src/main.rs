// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Park Tracker replay tool
//!
//! Replays a recorded list of location samples through the tracker against
//! a live tracking API. Useful for exercising batching, recovery and
//! finalization without walking around a park.
//!
//! Usage: `park-tracker-replay <samples.json> [title] [activity_type]`

use anyhow::{bail, Context};
use park_tracker::{
    config::{ApiConfig, TrackingConfig},
    models::{LocationSample, TrackingOptions},
    services::{
        location::{ErrorCallback, UpdateCallback},
        FileStore, HttpTrackingApi, LocationProvider, WatchId,
    },
    Tracker, TrackingError,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let Some(samples_path) = args.next() else {
        bail!("usage: park-tracker-replay <samples.json> [title] [activity_type]");
    };
    let title = args.next().unwrap_or_else(|| "Replayed track".to_string());
    let activity_type = args.next().unwrap_or_else(|| "hike".to_string());

    let config = TrackingConfig::from_env();
    let api_config = ApiConfig::from_env()?;
    let access_token =
        std::env::var("TRACKER_ACCESS_TOKEN").context("TRACKER_ACCESS_TOKEN is not set")?;
    let data_dir =
        std::env::var("TRACKER_DATA_DIR").unwrap_or_else(|_| ".park-tracker".to_string());
    let delay_ms: u64 = std::env::var("TRACKER_REPLAY_DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);

    let raw = std::fs::read_to_string(&samples_path)
        .with_context(|| format!("Failed to read {}", samples_path))?;
    let samples: Vec<LocationSample> =
        serde_json::from_str(&raw).context("Failed to parse location samples")?;
    tracing::info!(path = %samples_path, count = samples.len(), "Loaded samples");

    let provider = Arc::new(ReplayLocationProvider::new(
        samples,
        Duration::from_millis(delay_ms),
    ));
    let store = FileStore::open(&data_dir).context("Failed to open backup directory")?;
    let api = HttpTrackingApi::new(&api_config);
    let tracker = Tracker::new(config, api, provider.clone(), store);

    if let Some(info) = tracker.recoverable_session_info() {
        tracing::info!(
            track_id = %info.track_id,
            pending = info.pending_count,
            "Recovering interrupted session before replay"
        );
        let result = tracker.recover_session(Some(access_token.as_str())).await?;
        tracing::info!(uploaded = result.uploaded, "Recovered session");
        let finalized = tracker.stop_tracking().await?;
        tracing::info!(track_id = %finalized.track.id, "Recovered session finalized");
    }

    tracker
        .start_tracking(
            &access_token,
            TrackingOptions {
                title,
                activity_type,
                park_code: std::env::var("TRACKER_PARK_CODE").ok(),
            },
        )
        .await?;

    provider.finished().await;

    let finalized = tracker.stop_tracking().await?;
    if !finalized.validation_errors.is_empty() {
        let err = TrackingError::Validation(finalized.validation_errors.clone());
        tracing::warn!(error = %err, track_id = %finalized.track.id, "Points rejected");
    }
    tracing::info!(
        track_id = %finalized.track.id,
        distance_meters = finalized.local_stats.distance_meters,
        duration_seconds = finalized.local_stats.duration_seconds,
        elevation_gain_meters = finalized.local_stats.elevation_gain_meters,
        server_distance_meters = ?finalized.track.distance_meters,
        unsent_points = finalized.unsent_points,
        rejected_points = finalized.validation_errors.len(),
        "Replay complete"
    );

    Ok(())
}

/// Location provider that plays back a fixed list of samples.
struct ReplayLocationProvider {
    samples: Arc<Vec<LocationSample>>,
    delay: Duration,
    next_id: AtomicU64,
    cancelled: Arc<AtomicBool>,
    done: Arc<Notify>,
}

impl ReplayLocationProvider {
    fn new(samples: Vec<LocationSample>, delay: Duration) -> Self {
        Self {
            samples: Arc::new(samples),
            delay,
            next_id: AtomicU64::new(1),
            cancelled: Arc::new(AtomicBool::new(false)),
            done: Arc::new(Notify::new()),
        }
    }

    /// Wait until every sample has been delivered.
    async fn finished(&self) {
        self.done.notified().await;
    }
}

impl LocationProvider for ReplayLocationProvider {
    fn watch(
        &self,
        on_update: UpdateCallback,
        _on_error: ErrorCallback,
    ) -> park_tracker::Result<WatchId> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| TrackingError::Internal(e.into()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let samples = Arc::clone(&self.samples);
        let delay = self.delay;
        let cancelled = Arc::clone(&self.cancelled);
        let done = Arc::clone(&self.done);
        cancelled.store(false, Ordering::SeqCst);

        handle.spawn(async move {
            for sample in samples.iter() {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                on_update(sample.clone());
                tokio::time::sleep(delay).await;
            }
            done.notify_one();
        });

        Ok(id)
    }

    fn clear_watch(&self, _id: WatchId) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("park_tracker=debug".parse().expect("valid directive"))
                .add_directive("info".parse().expect("valid directive")),
        )
        .with(format)
        .init();
}
