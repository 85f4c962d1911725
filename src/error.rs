// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracking error taxonomy.

use crate::models::PointValidationError;
use crate::services::storage::StorageError;

/// Errors surfaced by the tracking core.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Tracking requires an active subscription")]
    PermissionRequired,

    #[error("Network error: {0}")]
    Network(String),

    /// Rejected points never fail an operation; uploads report them in
    /// their results, and this variant wraps them for callers that want an
    /// error value.
    #[error("{} point(s) rejected by the server", .0.len())]
    Validation(Vec<PointValidationError>),

    #[error("Track not found")]
    TrackNotFound,

    #[error("No recoverable session found")]
    NoBackupFound,

    #[error("Access token required")]
    MissingAccessToken,

    /// Only surfaced by operations that cannot complete without storage;
    /// backup writes are best-effort and never return it.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid tracking options: {0}")]
    InvalidOptions(String),

    #[error("Tracking API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TrackingError {
    /// Whether a retry of the same request may succeed later.
    ///
    /// Network failures, rate limiting and 5xx responses are transient;
    /// everything else needs caller action.
    pub fn is_transient(&self) -> bool {
        match self {
            TrackingError::Network(_) => true,
            TrackingError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether this error comes from the location or entitlement gate.
    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            TrackingError::PermissionDenied | TrackingError::PermissionRequired
        )
    }
}

impl From<StorageError> for TrackingError {
    fn from(err: StorageError) -> Self {
        TrackingError::Storage(err.to_string())
    }
}

impl From<validator::ValidationErrors> for TrackingError {
    fn from(err: validator::ValidationErrors) -> Self {
        TrackingError::InvalidOptions(err.to_string())
    }
}

/// Result type alias for tracking operations
pub type Result<T> = std::result::Result<T, TrackingError>;
