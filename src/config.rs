// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracking configuration loaded from environment variables.
//!
//! Every tunable has a default so the tracker works without any
//! environment at all; `from_env()` only overrides what is set.

use crate::services::classifier::ActivityThresholds;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default storage key for the in-progress session backup.
pub const DEFAULT_BACKUP_KEY: &str = "park_tracker.active_session";

/// Tracking tunables.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Samples with a worse horizontal accuracy (meters) are discarded
    pub accuracy_threshold_m: f64,
    /// Flush as soon as this many points are pending
    pub max_points_per_batch: usize,
    /// Periodic flush interval
    pub flush_interval: Duration,
    /// Number of speed samples the classifier smooths over
    pub classifier_window: usize,
    /// Speed bands for activity classification
    pub thresholds: ActivityThresholds,
    /// Confirmed points kept in memory before the oldest are evicted
    pub max_retained_points: usize,
    /// Storage key for the session backup
    pub backup_key: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_m: 50.0,
            max_points_per_batch: 30,
            flush_interval: Duration::from_secs(15),
            classifier_window: 5,
            thresholds: ActivityThresholds::default(),
            max_retained_points: 10_000,
            backup_key: DEFAULT_BACKUP_KEY.to_string(),
        }
    }
}

impl TrackingConfig {
    /// Load tunables from the environment, falling back to defaults.
    ///
    /// Malformed values are ignored rather than rejected.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();
        Self {
            accuracy_threshold_m: env_or(
                "TRACKER_ACCURACY_THRESHOLD_M",
                defaults.accuracy_threshold_m,
            ),
            max_points_per_batch: env_or(
                "TRACKER_MAX_POINTS_PER_BATCH",
                defaults.max_points_per_batch,
            )
            .max(1),
            flush_interval: Duration::from_secs(
                env_or(
                    "TRACKER_FLUSH_INTERVAL_SECS",
                    defaults.flush_interval.as_secs(),
                )
                .max(1),
            ),
            classifier_window: env_or("TRACKER_CLASSIFIER_WINDOW", defaults.classifier_window)
                .max(1),
            thresholds: defaults.thresholds,
            max_retained_points: env_or(
                "TRACKER_MAX_RETAINED_POINTS",
                defaults.max_retained_points,
            ),
            backup_key: env::var("TRACKER_BACKUP_KEY").unwrap_or(defaults.backup_key),
        }
    }
}

/// Remote tracking API settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the tracking API (e.g. `https://parks.example.com/api`)
    pub base_url: String,
}

impl ApiConfig {
    /// Load API settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let base_url = env::var("TRACKER_API_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .map_err(|_| ConfigError::Missing("TRACKER_API_BASE_URL"))?;

        if base_url.is_empty() {
            return Err(ConfigError::Invalid("TRACKER_API_BASE_URL"));
        }

        Ok(Self { base_url })
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
