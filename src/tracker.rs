// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracking session state machine.
//!
//! Owns the session lifecycle:
//! `Idle -> Recording <-> Paused -> (Completed) -> Idle`, with `Error`
//! reachable mid-session. Location updates are ingested synchronously in
//! arrival order; uploads run as background tasks behind a single-flight
//! gate so the timer, the batch threshold and page-hide never upload the
//! same points twice.

use crate::config::TrackingConfig;
use crate::error::{Result, TrackingError};
use crate::models::{
    ActivityLabel, CreateTrackRequest, FinalizedTrack, LocalBackupRecord, LocationSample,
    PointValidationError, RecoverResult, RecoverableSessionInfo, RemoteTrackStatus,
    StatsAccumulator, SyncStatus, TrackPoint, TrackPointPayload, TrackStats, TrackerSnapshot,
    TrackingOptions, TrackingStatus, UnloadDecision,
};
use crate::services::api::TrackingApi;
use crate::services::backup::BackupStore;
use crate::services::buffer::{upload_batch, PointBuffer};
use crate::services::classifier::ActivityClassifier;
use crate::services::location::{LocationError, LocationProvider, WatchId};
use crate::services::storage::KeyValueStore;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use validator::Validate;

/// Why a flush did not upload anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushSkipReason {
    /// Another flush is already running
    InFlight,
    NothingPending,
    NoActiveTrack,
    NotRecording,
}

/// Outcome of one flush attempt.
#[derive(Debug)]
pub enum FlushResult {
    /// The batch was resolved; rejected points were dropped
    Flushed {
        inserted: usize,
        validation_errors: Vec<PointValidationError>,
    },
    /// The upload failed; every point is still pending
    Failed(TrackingError),
    Skipped(FlushSkipReason),
}

impl FlushResult {
    pub fn is_flushed(&self) -> bool {
        matches!(self, FlushResult::Flushed { .. })
    }
}

/// Mutable session state, guarded by one lock.
struct SessionState {
    status: TrackingStatus,
    track_id: Option<String>,
    access_token: Option<String>,
    confirmed: VecDeque<TrackPoint>,
    /// Set once confirmed points have been dropped from memory
    confirmed_truncated: bool,
    buffer: PointBuffer,
    stats: StatsAccumulator,
    classifier: ActivityClassifier,
    next_sequence_num: u64,
    watch_id: Option<WatchId>,
    /// Bumped on every (un)subscribe so stale callbacks are ignored
    generation: u64,
    flush_timer: Option<JoinHandle<()>>,
    runtime: Option<Handle>,
    sync: SyncStatus,
    warnings: Vec<PointValidationError>,
    recoverable: Option<RecoverableSessionInfo>,
    transition_in_progress: bool,
}

impl SessionState {
    fn new(config: &TrackingConfig) -> Self {
        Self {
            status: TrackingStatus::Idle,
            track_id: None,
            access_token: None,
            confirmed: VecDeque::new(),
            confirmed_truncated: false,
            buffer: PointBuffer::new(config.max_points_per_batch, config.flush_interval),
            stats: StatsAccumulator::new(),
            classifier: ActivityClassifier::new(config.classifier_window, config.thresholds),
            next_sequence_num: 0,
            watch_id: None,
            generation: 0,
            flush_timer: None,
            runtime: None,
            sync: SyncStatus::Idle,
            warnings: Vec::new(),
            recoverable: None,
            transition_in_progress: false,
        }
    }

    /// Return to a fresh Idle session, keeping bookkeeping that must
    /// outlive it.
    fn reset(&mut self, config: &TrackingConfig) {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
        let generation = self.generation + 1;
        let transition_in_progress = self.transition_in_progress;
        *self = Self::new(config);
        self.generation = generation;
        self.transition_in_progress = transition_in_progress;
    }

    /// Stop listening: forget the watch, cancel the timer and invalidate
    /// any callback still in flight. Returns the watch to clear.
    fn detach(&mut self) -> Option<WatchId> {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
        self.generation += 1;
        self.watch_id.take()
    }

    fn retain_confirmed(&mut self, points: Vec<TrackPoint>, max_retained: usize) {
        self.confirmed.extend(points);
        let max_retained = max_retained.max(1);
        while self.confirmed.len() > max_retained {
            self.confirmed.pop_front();
            self.confirmed_truncated = true;
        }
    }

    /// Drop points the server rejected from the running stats.
    ///
    /// Only possible while every point of the session is still in memory;
    /// after truncation the totals keep counting rejected points.
    fn recompute_stats(&mut self) {
        if self.confirmed_truncated {
            return;
        }
        let points: Vec<TrackPoint> = self
            .confirmed
            .iter()
            .chain(self.buffer.pending())
            .cloned()
            .collect();
        self.stats = StatsAccumulator::from_points(&points);
    }

    fn backup_record(&self) -> LocalBackupRecord {
        LocalBackupRecord {
            track_id: self.track_id.clone(),
            points: self.confirmed.iter().cloned().collect(),
            pending_points: self.buffer.pending().to_vec(),
            stats: self.stats.stats(),
            totals: Some(self.stats.clone()),
            activity: self.classifier.current_activity(),
            status: self.status,
            sequence_num: self.next_sequence_num,
            saved_at: Utc::now(),
        }
    }
}

struct Shared<A, L, S> {
    config: TrackingConfig,
    api: A,
    location: L,
    backup: BackupStore<S>,
    state: Mutex<SessionState>,
    /// Held for the duration of an upload
    flush_gate: tokio::sync::Mutex<()>,
}

impl<A, L, S> Shared<A, L, S> {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-progress flag when a lifecycle operation ends, including
/// when its future is dropped early.
struct TransitionGuard<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transition_in_progress = false;
    }
}

/// Activity tracker handle. Cheap to clone; all clones share one session.
pub struct Tracker<A, L, S> {
    shared: Arc<Shared<A, L, S>>,
}

impl<A, L, S> Clone for Tracker<A, L, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A, L, S> Tracker<A, L, S>
where
    A: TrackingApi,
    L: LocationProvider,
    S: KeyValueStore,
{
    /// Create a tracker and check storage for a session left behind by a
    /// previous run.
    pub fn new(config: TrackingConfig, api: A, location: L, store: S) -> Self {
        let backup = BackupStore::new(store, config.backup_key.clone());
        let mut state = SessionState::new(&config);
        state.recoverable = backup.recoverable_session_info();

        Self {
            shared: Arc::new(Shared {
                config,
                api,
                location,
                backup,
                state: Mutex::new(state),
                flush_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.shared.lock_state()
    }

    fn save_backup(&self, state: &SessionState) {
        self.shared.backup.save_backup(&state.backup_record());
    }

    fn begin_transition(
        &self,
        allowed: &[TrackingStatus],
        operation: &str,
    ) -> Result<TransitionGuard<'_>> {
        let mut state = self.lock_state();
        if state.transition_in_progress {
            return Err(TrackingError::InvalidState(format!(
                "Cannot {} while another operation is in progress",
                operation
            )));
        }
        if !allowed.contains(&state.status) {
            return Err(TrackingError::InvalidState(format!(
                "Cannot {} while {:?}",
                operation, state.status
            )));
        }
        state.transition_in_progress = true;
        Ok(TransitionGuard {
            state: &self.shared.state,
        })
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &TrackingConfig {
        &self.shared.config
    }

    pub fn status(&self) -> TrackingStatus {
        self.lock_state().status
    }

    pub fn track_id(&self) -> Option<String> {
        self.lock_state().track_id.clone()
    }

    pub fn stats(&self) -> TrackStats {
        self.lock_state().stats.stats()
    }

    pub fn activity(&self) -> ActivityLabel {
        self.lock_state().classifier.current_activity()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.lock_state().sync.clone()
    }

    pub fn pending_points(&self) -> Vec<TrackPoint> {
        self.lock_state().buffer.pending().to_vec()
    }

    pub fn confirmed_points(&self) -> Vec<TrackPoint> {
        self.lock_state().confirmed.iter().cloned().collect()
    }

    /// Drain validation warnings collected since the last call.
    pub fn take_warnings(&self) -> Vec<PointValidationError> {
        std::mem::take(&mut self.lock_state().warnings)
    }

    pub fn has_recoverable_session(&self) -> bool {
        self.lock_state().recoverable.is_some()
    }

    pub fn recoverable_session_info(&self) -> Option<RecoverableSessionInfo> {
        self.lock_state().recoverable.clone()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.lock_state();
        TrackerSnapshot {
            status: state.status,
            track_id: state.track_id.clone(),
            stats: state.stats.stats(),
            activity: state.classifier.current_activity(),
            current_speed: state.classifier.average_speed(),
            pending_points: state.buffer.len(),
            confirmed_points: state.confirmed.len(),
            sync: state.sync.clone(),
            has_recoverable_session: state.recoverable.is_some(),
            recoverable_session: state.recoverable.clone(),
        }
    }

    /// Re-read storage for a recoverable session (app load).
    ///
    /// Only meaningful while no session is active.
    pub fn check_recoverable_session(&self) -> Option<RecoverableSessionInfo> {
        let mut state = self.lock_state();
        if matches!(state.status, TrackingStatus::Idle | TrackingStatus::Error) {
            state.recoverable = self.shared.backup.recoverable_session_info();
        }
        state.recoverable.clone()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Create the remote track and start recording.
    ///
    /// Any failure leaves the tracker Idle.
    pub async fn start_tracking(&self, access_token: &str, options: TrackingOptions) -> Result<()> {
        let _transition = self.begin_transition(&[TrackingStatus::Idle], "start tracking")?;

        if access_token.is_empty() {
            return Err(TrackingError::MissingAccessToken);
        }
        options.validate()?;

        let runtime = Handle::try_current()
            .map_err(|e| TrackingError::Internal(anyhow::anyhow!("No async runtime: {}", e)))?;

        let request = CreateTrackRequest {
            title: options.title,
            activity_type: options.activity_type,
            park_code: options.park_code,
        };
        let track = self.shared.api.create_track(access_token, &request).await?;

        let generation = {
            let mut state = self.lock_state();
            if state.recoverable.is_some() {
                tracing::warn!("Starting a new session over an unrecovered backup");
            }
            state.reset(&self.shared.config);
            state.status = TrackingStatus::Recording;
            state.track_id = Some(track.id.clone());
            state.access_token = Some(access_token.to_string());
            state.runtime = Some(runtime.clone());
            state.generation
        };

        match self.subscribe(generation) {
            Ok(watch_id) => {
                let mut state = self.lock_state();
                state.watch_id = Some(watch_id);
                state.flush_timer = Some(self.spawn_flush_timer(&runtime));
                self.save_backup(&state);
                tracing::info!(track_id = %track.id, "Tracking started");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, track_id = %track.id, "Location subscription failed");
                self.lock_state().reset(&self.shared.config);
                Err(e)
            }
        }
    }

    /// Stop listening, upload what is pending and mark the track paused.
    pub async fn pause_tracking(&self) -> Result<()> {
        let _transition = self.begin_transition(&[TrackingStatus::Recording], "pause")?;

        let (watch_id, track_id, access_token) = {
            let mut state = self.lock_state();
            let watch_id = state.detach();
            state.status = TrackingStatus::Paused;
            (watch_id, state.track_id.clone(), state.access_token.clone())
        };
        if let Some(id) = watch_id {
            self.shared.location.clear_watch(id);
        }

        {
            let _gate = self.shared.flush_gate.lock().await;
            if let FlushResult::Failed(e) = self.flush_once().await {
                tracing::warn!(error = %e, "Flush on pause failed, points kept pending");
            }
        }

        if let (Some(track_id), Some(token)) = (track_id.as_deref(), access_token.as_deref()) {
            if let Err(e) = self
                .shared
                .api
                .update_track_status(token, track_id, RemoteTrackStatus::Paused)
                .await
            {
                tracing::warn!(error = %e, track_id, "Failed to mark remote track paused");
            }
        }

        let state = self.lock_state();
        self.save_backup(&state);
        tracing::info!(track_id = ?state.track_id, "Tracking paused");
        Ok(())
    }

    /// Resume a paused session.
    ///
    /// A permission failure aborts the resume and leaves the session Paused.
    pub async fn resume_tracking(&self) -> Result<()> {
        let _transition = self.begin_transition(&[TrackingStatus::Paused], "resume")?;

        let runtime = Handle::try_current()
            .map_err(|e| TrackingError::Internal(anyhow::anyhow!("No async runtime: {}", e)))?;

        let (track_id, access_token) = {
            let state = self.lock_state();
            match (state.track_id.clone(), state.access_token.clone()) {
                (Some(track_id), Some(token)) => (track_id, token),
                _ => {
                    return Err(TrackingError::InvalidState(
                        "Paused session has no remote track".to_string(),
                    ))
                }
            }
        };

        match self
            .shared
            .api
            .update_track_status(&access_token, &track_id, RemoteTrackStatus::Recording)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_permission_error() || matches!(e, TrackingError::TrackNotFound) => {
                return Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, %track_id, "Failed to mark remote track recording");
            }
        }

        let generation = {
            let mut state = self.lock_state();
            state.generation += 1;
            state.status = TrackingStatus::Recording;
            state.runtime = Some(runtime.clone());
            state.buffer.mark_attempt(Instant::now());
            state.generation
        };

        match self.subscribe(generation) {
            Ok(watch_id) => {
                let mut state = self.lock_state();
                state.watch_id = Some(watch_id);
                state.flush_timer = Some(self.spawn_flush_timer(&runtime));
                self.save_backup(&state);
                tracing::info!(%track_id, "Tracking resumed");
                Ok(())
            }
            Err(e) => {
                let mut state = self.lock_state();
                state.detach();
                state.status = TrackingStatus::Paused;
                tracing::warn!(error = %e, %track_id, "Location subscription failed on resume");
                Err(e)
            }
        }
    }

    /// Upload everything left, finalize the remote track and reset.
    ///
    /// Upload failures are reported in the result but do not block
    /// finalization. If finalization itself fails the session moves to
    /// `Error` and the backup is kept for recovery.
    pub async fn stop_tracking(&self) -> Result<FinalizedTrack> {
        let _transition = self.begin_transition(
            &[TrackingStatus::Recording, TrackingStatus::Paused],
            "stop",
        )?;

        let (watch_id, track_id, access_token) = {
            let mut state = self.lock_state();
            let watch_id = state.detach();
            (watch_id, state.track_id.clone(), state.access_token.clone())
        };
        if let Some(id) = watch_id {
            self.shared.location.clear_watch(id);
        }

        let (Some(track_id), Some(access_token)) = (track_id, access_token) else {
            return Err(TrackingError::InvalidState(
                "Active session has no remote track".to_string(),
            ));
        };

        let mut validation_errors = Vec::new();
        {
            let _gate = self.shared.flush_gate.lock().await;
            loop {
                match self.flush_once().await {
                    FlushResult::Flushed {
                        validation_errors: errors,
                        ..
                    } => validation_errors.extend(errors),
                    FlushResult::Failed(e) => {
                        tracing::warn!(error = %e, %track_id, "Final flush failed");
                        break;
                    }
                    FlushResult::Skipped(_) => break,
                }
            }
        }

        let track = match self
            .shared
            .api
            .finalize_track(&access_token, &track_id)
            .await
        {
            Ok(track) => track,
            Err(e) => {
                let mut state = self.lock_state();
                state.status = TrackingStatus::Error;
                state.sync = SyncStatus::Failed {
                    message: e.to_string(),
                };
                self.save_backup(&state);
                state.recoverable = self.shared.backup.recoverable_session_info();
                tracing::error!(error = %e, %track_id, "Failed to finalize track");
                return Err(e);
            }
        };

        let (local_stats, unsent_points) = {
            let mut state = self.lock_state();
            state.classifier.reset();
            state.status = TrackingStatus::Completed;
            let local_stats = state.stats.stats();
            let unsent_points = state.buffer.len();
            tracing::info!(
                %track_id,
                distance_meters = local_stats.distance_meters,
                unsent_points,
                "Tracking completed"
            );
            state.reset(&self.shared.config);
            self.shared.backup.clear_backup();
            (local_stats, unsent_points)
        };

        Ok(FinalizedTrack {
            track,
            local_stats,
            unsent_points,
            validation_errors,
        })
    }

    // ─── Recovery ────────────────────────────────────────────────────────────

    /// Upload the pending points of a backed-up session and restore it as a
    /// paused session.
    ///
    /// On failure the backup is kept (minus any batches that did upload) so
    /// the user can try again.
    pub async fn recover_session(&self, access_token: Option<&str>) -> Result<RecoverResult> {
        let _transition = self.begin_transition(
            &[TrackingStatus::Idle, TrackingStatus::Error],
            "recover session",
        )?;

        // An upload still running must land in the backup before it is read
        let _gate = self.shared.flush_gate.lock().await;

        let mut record = self
            .shared
            .backup
            .load_backup()
            .filter(|r| r.is_recoverable())
            .ok_or(TrackingError::NoBackupFound)?;
        let access_token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(TrackingError::MissingAccessToken)?;
        let track_id = record.track_id.clone().ok_or(TrackingError::NoBackupFound)?;

        let config = &self.shared.config;
        let mut buffer = PointBuffer::with_pending(
            std::mem::take(&mut record.pending_points),
            config.max_points_per_batch,
            config.flush_interval,
        );
        let mut uploaded = 0;
        let mut validation_errors = Vec::new();

        while !buffer.is_empty() {
            let batch = buffer.next_batch();
            let response =
                match upload_batch(&self.shared.api, access_token, &track_id, &batch).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(error = %e, %track_id, "Recovery upload failed");
                        return Err(e);
                    }
                };

            let resolution = buffer.resolve_batch(&batch, &response);
            uploaded += resolution.accepted.len();
            record.points.extend(resolution.accepted);
            record.pending_points = buffer.pending().to_vec();
            record.saved_at = Utc::now();
            validation_errors.extend(resolution.rejected);
            self.shared.backup.save_backup(&record);
        }

        self.shared.backup.clear_backup();

        {
            let mut state = self.lock_state();
            state.reset(config);
            state.status = TrackingStatus::Paused;
            state.track_id = Some(track_id.clone());
            state.access_token = Some(access_token.to_string());
            state.stats = record
                .totals
                .take()
                .unwrap_or_else(|| StatsAccumulator::from_points(&record.points));
            state.classifier.restore(record.activity);
            let last_seq = record.points.last().map_or(0, |p| p.sequence_num + 1);
            state.next_sequence_num = record.sequence_num.max(last_seq);
            let points = std::mem::take(&mut record.points);
            state.retain_confirmed(points, config.max_retained_points);
            // Saved totals may cover points no longer in the backup
            state.confirmed_truncated = true;
            state.warnings = validation_errors.clone();
        }

        tracing::info!(
            %track_id,
            uploaded,
            rejected = validation_errors.len(),
            "Recovered tracking session"
        );

        Ok(RecoverResult {
            track_id,
            uploaded,
            validation_errors,
        })
    }

    /// Discard the backed-up session without uploading it.
    pub fn dismiss_recoverable_session(&self) -> Result<()> {
        let _transition = self.begin_transition(
            &[TrackingStatus::Idle, TrackingStatus::Error],
            "dismiss session",
        )?;

        self.shared.backup.remove_backup()?;
        self.lock_state().reset(&self.shared.config);
        tracing::info!("Recoverable session dismissed");
        Ok(())
    }

    // ─── Page lifecycle ──────────────────────────────────────────────────────

    /// Page became hidden: save and push pending points now.
    pub async fn on_visibility_hidden(&self) -> FlushResult {
        {
            let state = self.lock_state();
            if state.status != TrackingStatus::Recording {
                return FlushResult::Skipped(FlushSkipReason::NotRecording);
            }
            self.save_backup(&state);
        }
        self.flush().await
    }

    /// Page is unloading: save, hand pending points to the beacon and tell
    /// the page whether to ask for confirmation.
    pub fn on_before_unload(&self) -> UnloadDecision {
        let (status, beacon) = {
            let state = self.lock_state();
            if state.status == TrackingStatus::Idle {
                return UnloadDecision {
                    confirm_leave: false,
                    beaconed_points: 0,
                };
            }

            self.save_backup(&state);

            let beacon = match (&state.track_id, &state.access_token) {
                (Some(track_id), Some(token)) if !state.buffer.is_empty() => Some((
                    token.clone(),
                    track_id.clone(),
                    state
                        .buffer
                        .pending()
                        .iter()
                        .map(TrackPointPayload::from)
                        .collect::<Vec<_>>(),
                )),
                _ => None,
            };
            (state.status, beacon)
        };

        let beaconed_points = match beacon {
            Some((token, track_id, points)) => {
                let count = points.len();
                self.shared.api.send_points_beacon(&token, &track_id, points);
                count
            }
            None => 0,
        };

        UnloadDecision {
            confirm_leave: matches!(status, TrackingStatus::Recording | TrackingStatus::Paused),
            beaconed_points,
        }
    }

    // ─── Ingestion ───────────────────────────────────────────────────────────

    fn subscribe(&self, generation: u64) -> Result<WatchId> {
        let on_update = Arc::downgrade(&self.shared);
        let on_error = on_update.clone();

        self.shared.location.watch(
            Box::new(move |sample: LocationSample| {
                if let Some(shared) = on_update.upgrade() {
                    Tracker { shared }.handle_location(generation, sample);
                }
            }),
            Box::new(move |err: LocationError| {
                if let Some(shared) = on_error.upgrade() {
                    Tracker { shared }.handle_location_error(generation, err);
                }
            }),
        )
    }

    fn handle_location(&self, generation: u64, sample: LocationSample) {
        let runtime = {
            let mut state = self.lock_state();
            if state.generation != generation || state.status != TrackingStatus::Recording {
                return;
            }

            if !sample.is_acceptable(self.shared.config.accuracy_threshold_m) {
                tracing::debug!(accuracy = sample.accuracy, "Discarding inaccurate sample");
                return;
            }

            if let Some(speed) = sample.valid_speed() {
                state.classifier.add_speed(speed);
            }

            let sequence_num = state.next_sequence_num;
            state.next_sequence_num += 1;
            let point = TrackPoint::new(sample, sequence_num);
            state.stats.push(&point);
            state.buffer.add_point(point);
            self.save_backup(&state);

            if !state.buffer.should_flush(Instant::now()) {
                return;
            }
            state.runtime.clone()
        };

        if let Some(runtime) = runtime {
            let tracker = self.clone();
            runtime.spawn(async move {
                tracker.flush().await;
            });
        }
    }

    fn handle_location_error(&self, generation: u64, err: LocationError) {
        if err != LocationError::PermissionDenied {
            tracing::warn!(error = %err, "Location update failed");
            return;
        }

        let watch_id = {
            let mut state = self.lock_state();
            if state.generation != generation || state.status != TrackingStatus::Recording {
                return;
            }
            let watch_id = state.detach();
            state.status = TrackingStatus::Error;
            state.sync = SyncStatus::Failed {
                message: TrackingError::PermissionDenied.to_string(),
            };
            self.save_backup(&state);
            state.recoverable = self.shared.backup.recoverable_session_info();
            tracing::error!(track_id = ?state.track_id, "Location permission revoked mid-session");
            watch_id
        };

        if let Some(id) = watch_id {
            self.shared.location.clear_watch(id);
        }
    }

    // ─── Upload ──────────────────────────────────────────────────────────────

    /// Upload one batch unless a flush is already running.
    pub async fn flush(&self) -> FlushResult {
        let Ok(_gate) = self.shared.flush_gate.try_lock() else {
            tracing::debug!("Flush already in flight, skipping");
            return FlushResult::Skipped(FlushSkipReason::InFlight);
        };
        self.flush_once().await
    }

    /// Upload one batch. Caller must hold the flush gate.
    async fn flush_once(&self) -> FlushResult {
        let (track_id, access_token, batch) = {
            let mut state = self.lock_state();
            let (Some(track_id), Some(token)) = (state.track_id.clone(), state.access_token.clone())
            else {
                return FlushResult::Skipped(FlushSkipReason::NoActiveTrack);
            };
            // An errored session's points belong to recovery
            if !matches!(state.status, TrackingStatus::Recording | TrackingStatus::Paused) {
                return FlushResult::Skipped(FlushSkipReason::NotRecording);
            }
            let batch = state.buffer.next_batch();
            if batch.is_empty() {
                return FlushResult::Skipped(FlushSkipReason::NothingPending);
            }
            state.buffer.mark_attempt(Instant::now());
            state.sync = SyncStatus::Syncing;
            (track_id, token, batch)
        };

        let result = upload_batch(&self.shared.api, &access_token, &track_id, &batch).await;

        let mut state = self.lock_state();
        if state.track_id.as_deref() != Some(track_id.as_str()) {
            return FlushResult::Skipped(FlushSkipReason::NoActiveTrack);
        }

        match result {
            Ok(response) => {
                let resolution = state.buffer.resolve_batch(&batch, &response);
                state.retain_confirmed(resolution.accepted, self.shared.config.max_retained_points);
                if !resolution.rejected.is_empty() {
                    state.recompute_stats();
                }
                state.warnings.extend(resolution.rejected.iter().cloned());
                state.sync = SyncStatus::Idle;
                self.save_backup(&state);
                FlushResult::Flushed {
                    inserted: response.inserted,
                    validation_errors: resolution.rejected,
                }
            }
            Err(e) => {
                state.buffer.mark_failure();
                tracing::warn!(
                    error = %e,
                    %track_id,
                    pending = state.buffer.len(),
                    "Point upload failed, will retry"
                );
                state.sync = SyncStatus::Failed {
                    message: e.to_string(),
                };
                self.save_backup(&state);
                FlushResult::Failed(e)
            }
        }
    }

    /// Whether the timer should flush now, and when the last attempt started.
    fn flush_schedule(&self, now: Instant) -> (bool, Instant) {
        let state = self.lock_state();
        let due = state.status == TrackingStatus::Recording && state.buffer.should_flush(now);
        (due, state.buffer.last_attempt())
    }

    /// Flush one interval after the last attempt, whatever triggered it.
    fn spawn_flush_timer(&self, runtime: &Handle) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        let period = self.shared.config.flush_interval;

        runtime.spawn(async move {
            let mut deadline = Instant::now() + period;
            loop {
                tokio::time::sleep_until(deadline).await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let tracker = Tracker { shared };
                let now = Instant::now();
                let (due, last_attempt) = tracker.flush_schedule(now);
                deadline = if due {
                    // Detached so that cancelling the timer never cancels an upload
                    tokio::spawn(async move {
                        tracker.flush().await;
                    });
                    now + period
                } else if last_attempt + period > now {
                    last_attempt + period
                } else {
                    now + period
                };
            }
        })
    }
}
