// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use park_tracker::config::TrackingConfig;
use park_tracker::error::{Result, TrackingError};
use park_tracker::models::{
    AddPointsResponse, CreateTrackRequest, LocalBackupRecord, LocationSample,
    PointValidationError, RemoteTrackStatus, Track, TrackPointPayload, TrackingOptions,
};
use park_tracker::services::location::{ErrorCallback, UpdateCallback};
use park_tracker::services::{
    BackupStore, LocationError, LocationProvider, MemoryStore, TrackingApi, WatchId,
};
use park_tracker::Tracker;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const TOKEN: &str = "test-access-token";

pub type TestTracker = Tracker<Arc<FakeApi>, Arc<ManualLocationProvider>, Arc<MemoryStore>>;

/// Scripted outcome for one `add_track_points` call.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum AddPointsOutcome {
    /// Accept everything
    Accept,
    /// Reject the points at these batch indices
    Reject(Vec<usize>),
    /// Fail the request as if the network dropped
    NetworkError,
    /// Fail the request with 404
    NotFound,
}

/// Record of one API call.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Create(String),
    UpdateStatus(String, RemoteTrackStatus),
    AddPoints(String, Vec<u64>),
    Finalize(String),
}

#[derive(Default)]
struct FakeApiState {
    next_track: u32,
    calls: Vec<ApiCall>,
    script: VecDeque<AddPointsOutcome>,
    stored: HashMap<String, Vec<TrackPointPayload>>,
    beacons: Vec<(String, Vec<TrackPointPayload>)>,
    deny_create: bool,
    fail_status_update: bool,
    fail_finalize: bool,
    block_uploads: bool,
}

/// In-memory stand-in for the tracking API.
pub struct FakeApi {
    state: Mutex<FakeApiState>,
    upload_permits: Semaphore,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeApiState::default()),
            upload_permits: Semaphore::new(0),
        }
    }
}

#[allow(dead_code)]
impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeApiState> {
        self.state.lock().unwrap()
    }

    /// Queue outcomes for the next `add_track_points` calls; once the
    /// queue is empty every call succeeds.
    pub fn script(&self, outcomes: impl IntoIterator<Item = AddPointsOutcome>) {
        self.state().script.extend(outcomes);
    }

    pub fn deny_create(&self) {
        self.state().deny_create = true;
    }

    pub fn fail_status_updates(&self) {
        self.state().fail_status_update = true;
    }

    pub fn fail_finalize(&self, fail: bool) {
        self.state().fail_finalize = fail;
    }

    /// Make uploads wait until `release_uploads` is called.
    pub fn block_uploads(&self) {
        self.state().block_uploads = true;
    }

    pub fn release_uploads(&self, count: usize) {
        self.upload_permits.add_permits(count);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    pub fn add_points_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, ApiCall::AddPoints(..)))
            .count()
    }

    /// Sequence numbers the server stored for a track, in insert order.
    pub fn stored_sequence_nums(&self, track_id: &str) -> Vec<u64> {
        self.state()
            .stored
            .get(track_id)
            .map(|points| points.iter().map(|p| p.sequence_num).collect())
            .unwrap_or_default()
    }

    pub fn beacons(&self) -> Vec<(String, Vec<TrackPointPayload>)> {
        self.state().beacons.clone()
    }

    fn track(&self, id: &str, status: RemoteTrackStatus) -> Track {
        Track {
            id: id.to_string(),
            status,
            distance_meters: None,
            duration_seconds: None,
            elevation_gain_m: None,
        }
    }
}

impl TrackingApi for FakeApi {
    async fn create_track(
        &self,
        access_token: &str,
        request: &CreateTrackRequest,
    ) -> Result<Track> {
        assert_eq!(access_token, TOKEN);
        let mut state = self.state();
        state.calls.push(ApiCall::Create(request.title.clone()));
        if state.deny_create {
            return Err(TrackingError::PermissionRequired);
        }
        state.next_track += 1;
        let id = format!("track-{}", state.next_track);
        drop(state);
        Ok(self.track(&id, RemoteTrackStatus::Recording))
    }

    async fn update_track_status(
        &self,
        _access_token: &str,
        track_id: &str,
        status: RemoteTrackStatus,
    ) -> Result<Track> {
        {
            let mut state = self.state();
            state
                .calls
                .push(ApiCall::UpdateStatus(track_id.to_string(), status));
            if state.fail_status_update {
                return Err(TrackingError::Network("connection reset".to_string()));
            }
        }
        Ok(self.track(track_id, status))
    }

    async fn add_track_points(
        &self,
        _access_token: &str,
        track_id: &str,
        points: &[TrackPointPayload],
    ) -> Result<AddPointsResponse> {
        let blocked = {
            let mut state = self.state();
            state.calls.push(ApiCall::AddPoints(
                track_id.to_string(),
                points.iter().map(|p| p.sequence_num).collect(),
            ));
            state.block_uploads
        };
        if blocked {
            self.upload_permits.acquire().await.unwrap().forget();
        }

        let mut state = self.state();
        let outcome = state.script.pop_front().unwrap_or(AddPointsOutcome::Accept);
        let rejected = match outcome {
            AddPointsOutcome::Accept => vec![],
            AddPointsOutcome::Reject(indices) => indices,
            AddPointsOutcome::NetworkError => {
                return Err(TrackingError::Network("connection refused".to_string()))
            }
            AddPointsOutcome::NotFound => return Err(TrackingError::TrackNotFound),
        };

        let stored = state.stored.entry(track_id.to_string()).or_default();
        let mut inserted = 0;
        for (i, point) in points.iter().enumerate() {
            if !rejected.contains(&i) {
                stored.push(point.clone());
                inserted += 1;
            }
        }

        Ok(AddPointsResponse {
            inserted,
            validation_errors: rejected
                .into_iter()
                .map(|index| PointValidationError {
                    index,
                    error: "coordinates out of range".to_string(),
                })
                .collect(),
        })
    }

    async fn finalize_track(&self, _access_token: &str, track_id: &str) -> Result<Track> {
        let mut state = self.state();
        state.calls.push(ApiCall::Finalize(track_id.to_string()));
        if state.fail_finalize {
            return Err(TrackingError::Network("connection reset".to_string()));
        }
        let count = state.stored.get(track_id).map_or(0, Vec::len);
        drop(state);
        let mut track = self.track(track_id, RemoteTrackStatus::Completed);
        track.distance_meters = Some(count as f64);
        Ok(track)
    }

    fn send_points_beacon(
        &self,
        _access_token: &str,
        track_id: &str,
        points: Vec<TrackPointPayload>,
    ) {
        self.state().beacons.push((track_id.to_string(), points));
    }
}

struct Watch {
    on_update: Arc<UpdateCallback>,
    on_error: Arc<ErrorCallback>,
}

#[derive(Default)]
struct ProviderState {
    next_id: WatchId,
    watches: HashMap<WatchId, Watch>,
    deny_permission: bool,
}

/// Location provider driven by the test.
#[derive(Default)]
pub struct ManualLocationProvider {
    state: Mutex<ProviderState>,
}

#[allow(dead_code)]
impl ManualLocationProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deny_permission(&self, deny: bool) {
        self.state.lock().unwrap().deny_permission = deny;
    }

    pub fn active_watches(&self) -> usize {
        self.state.lock().unwrap().watches.len()
    }

    /// Deliver a reading to every active watch.
    pub fn emit(&self, sample: LocationSample) {
        let callbacks: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .watches
            .values()
            .map(|w| Arc::clone(&w.on_update))
            .collect();
        for callback in callbacks {
            (*callback)(sample.clone());
        }
    }

    pub fn emit_all(&self, samples: impl IntoIterator<Item = LocationSample>) {
        for sample in samples {
            self.emit(sample);
        }
    }

    pub fn emit_error(&self, err: LocationError) {
        let callbacks: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .watches
            .values()
            .map(|w| Arc::clone(&w.on_error))
            .collect();
        for callback in callbacks {
            (*callback)(err.clone());
        }
    }
}

impl LocationProvider for ManualLocationProvider {
    fn watch(&self, on_update: UpdateCallback, on_error: ErrorCallback) -> Result<WatchId> {
        let mut state = self.state.lock().unwrap();
        if state.deny_permission {
            return Err(TrackingError::PermissionDenied);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.watches.insert(
            id,
            Watch {
                on_update: Arc::new(on_update),
                on_error: Arc::new(on_error),
            },
        );
        Ok(id)
    }

    fn clear_watch(&self, id: WatchId) {
        self.state.lock().unwrap().watches.remove(&id);
    }
}

/// Tracker wired to fakes, with handles for inspecting them.
#[allow(dead_code)]
pub struct Harness {
    pub tracker: TestTracker,
    pub api: Arc<FakeApi>,
    pub location: Arc<ManualLocationProvider>,
    pub store: Arc<MemoryStore>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: TrackingConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Build a tracker over an existing store, as after a page reload.
    pub fn with_store(config: TrackingConfig, store: Arc<MemoryStore>) -> Self {
        let api = FakeApi::new();
        let location = ManualLocationProvider::new();
        let tracker = Tracker::new(config, api.clone(), location.clone(), store.clone());
        Self {
            tracker,
            api,
            location,
            store,
        }
    }

    pub fn backup(&self) -> Option<LocalBackupRecord> {
        backup_store(&self.store).load_backup()
    }

    pub async fn start(&self) {
        self.tracker
            .start_tracking(TOKEN, options())
            .await
            .expect("start_tracking failed");
    }
}

#[allow(dead_code)]
pub fn backup_store(store: &Arc<MemoryStore>) -> BackupStore<Arc<MemoryStore>> {
    BackupStore::new(store.clone(), test_config().backup_key)
}

/// Config with automatic flushing effectively disabled, so tests decide
/// when uploads happen.
#[allow(dead_code)]
pub fn test_config() -> TrackingConfig {
    TrackingConfig {
        max_points_per_batch: 10,
        flush_interval: Duration::from_secs(3600),
        ..TrackingConfig::default()
    }
}

#[allow(dead_code)]
pub fn options() -> TrackingOptions {
    TrackingOptions {
        title: "Morning loop".to_string(),
        activity_type: "hike".to_string(),
        park_code: Some("ranc".to_string()),
    }
}

#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

/// One reading `seconds` into the walk, about 1.4 m north per second.
#[allow(dead_code)]
pub fn sample_at(seconds: i64) -> LocationSample {
    LocationSample {
        latitude: 37.3300 + seconds as f64 * 0.0000126,
        longitude: -122.1500,
        altitude: Some(100.0 + seconds as f64 * 0.5),
        accuracy: 5.0,
        speed: Some(1.4),
        heading: Some(0.0),
        timestamp: start_time() + ChronoDuration::seconds(seconds),
    }
}

#[allow(dead_code)]
pub fn walk(count: i64) -> Vec<LocationSample> {
    (0..count).map(sample_at).collect()
}

/// Let spawned background tasks run to completion.
#[allow(dead_code)]
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
