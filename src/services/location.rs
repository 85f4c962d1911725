// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device location source.
//!
//! Mirrors the browser `watchPosition`/`clearWatch` pair so that the
//! tracker can be driven by a browser shim, a native GPS service or a
//! test double.

use crate::error::Result;
use crate::models::LocationSample;

/// Handle for an active subscription.
pub type WatchId = u64;

/// Called for every new reading, in arrival order.
pub type UpdateCallback = Box<dyn Fn(LocationSample) + Send + Sync>;

/// Called when the provider reports a problem.
pub type ErrorCallback = Box<dyn Fn(LocationError) + Send + Sync>;

/// Errors reported through the error callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Timed out waiting for a position")]
    Timeout,
}

/// Source of location updates.
pub trait LocationProvider: Send + Sync + 'static {
    /// Start delivering updates. Fails with `PermissionDenied` if the
    /// user has refused location access.
    ///
    /// Implementations must not hold internal locks while invoking the
    /// callbacks.
    fn watch(&self, on_update: UpdateCallback, on_error: ErrorCallback) -> Result<WatchId>;

    /// Stop delivering updates for `id`. No callback for `id` may run
    /// after this returns.
    fn clear_watch(&self, id: WatchId);
}

impl<T: LocationProvider> LocationProvider for std::sync::Arc<T> {
    fn watch(&self, on_update: UpdateCallback, on_error: ErrorCallback) -> Result<WatchId> {
        (**self).watch(on_update, on_error)
    }

    fn clear_watch(&self, id: WatchId) {
        (**self).clear_watch(id)
    }
}
