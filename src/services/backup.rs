// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Best-effort local backup of the in-progress session.
//!
//! The backup is never authoritative: write failures are logged and
//! swallowed, and anything unreadable is treated as "no backup".

use crate::error::Result;
use crate::models::{LocalBackupRecord, RecoverableSessionInfo};
use crate::services::storage::KeyValueStore;
use crate::time_utils::format_utc_rfc3339;

/// Reads and writes the session backup under one storage key.
pub struct BackupStore<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> BackupStore<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist a snapshot. Never fails.
    pub fn save_backup(&self, record: &LocalBackupRecord) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize session backup");
                return;
            }
        };

        if let Err(e) = self.store.set_item(&self.key, &json) {
            tracing::warn!(
                error = %e,
                pending = record.pending_points.len(),
                "Failed to write session backup"
            );
        }
    }

    /// Read the backup, or `None` if missing or unreadable.
    pub fn load_backup(&self) -> Option<LocalBackupRecord> {
        let raw = match self.store.get_item(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session backup");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed session backup");
                None
            }
        }
    }

    /// Best-effort removal, used once the session has been finalized.
    pub fn clear_backup(&self) {
        if let Err(e) = self.remove_backup() {
            tracing::warn!(error = %e, "Failed to clear session backup");
        }
    }

    /// Remove the backup, reporting storage failures to the caller.
    pub fn remove_backup(&self) -> Result<()> {
        self.store.remove_item(&self.key)?;
        Ok(())
    }

    pub fn has_recoverable_session(&self) -> bool {
        self.load_backup().is_some_and(|r| r.is_recoverable())
    }

    /// Summary of the recoverable session, if there is one.
    pub fn recoverable_session_info(&self) -> Option<RecoverableSessionInfo> {
        let record = self.load_backup().filter(|r| r.is_recoverable())?;
        let info = record.info()?;
        tracing::info!(
            track_id = %info.track_id,
            points = info.point_count,
            saved_at = %format_utc_rfc3339(info.saved_at),
            "Found recoverable tracking session"
        );
        Some(info)
    }
}
