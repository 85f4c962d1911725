// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote tracking API.
//!
//! Handles:
//! - Track creation, status updates and finalization
//! - Batched point uploads with per-point validation results
//! - Fire-and-forget point delivery on page unload
//! - Mapping HTTP failures onto the tracking error taxonomy

use crate::config::ApiConfig;
use crate::error::{Result, TrackingError};
use crate::models::track::{AddPointsRequest, ApiErrorBody, TrackEnvelope, UpdateTrackRequest};
use crate::models::{
    AddPointsResponse, CreateTrackRequest, RemoteTrackStatus, Track, TrackPointPayload,
};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;

/// Operations the tracker needs from the server.
///
/// The access token is opaque: it is passed through, never inspected.
pub trait TrackingApi: Send + Sync + 'static {
    fn create_track(
        &self,
        access_token: &str,
        request: &CreateTrackRequest,
    ) -> impl Future<Output = Result<Track>> + Send;

    fn update_track_status(
        &self,
        access_token: &str,
        track_id: &str,
        status: RemoteTrackStatus,
    ) -> impl Future<Output = Result<Track>> + Send;

    fn add_track_points(
        &self,
        access_token: &str,
        track_id: &str,
        points: &[TrackPointPayload],
    ) -> impl Future<Output = Result<AddPointsResponse>> + Send;

    /// Ask the server to compute the final summary from stored points.
    fn finalize_track(
        &self,
        access_token: &str,
        track_id: &str,
    ) -> impl Future<Output = Result<Track>> + Send;

    /// Deliver points without waiting for (or reporting) the outcome.
    fn send_points_beacon(
        &self,
        access_token: &str,
        track_id: &str,
        points: Vec<TrackPointPayload>,
    );
}

impl<T: TrackingApi> TrackingApi for Arc<T> {
    fn create_track(
        &self,
        access_token: &str,
        request: &CreateTrackRequest,
    ) -> impl Future<Output = Result<Track>> + Send {
        (**self).create_track(access_token, request)
    }

    fn update_track_status(
        &self,
        access_token: &str,
        track_id: &str,
        status: RemoteTrackStatus,
    ) -> impl Future<Output = Result<Track>> + Send {
        (**self).update_track_status(access_token, track_id, status)
    }

    fn add_track_points(
        &self,
        access_token: &str,
        track_id: &str,
        points: &[TrackPointPayload],
    ) -> impl Future<Output = Result<AddPointsResponse>> + Send {
        (**self).add_track_points(access_token, track_id, points)
    }

    fn finalize_track(
        &self,
        access_token: &str,
        track_id: &str,
    ) -> impl Future<Output = Result<Track>> + Send {
        (**self).finalize_track(access_token, track_id)
    }

    fn send_points_beacon(
        &self,
        access_token: &str,
        track_id: &str,
        points: Vec<TrackPointPayload>,
    ) {
        (**self).send_points_beacon(access_token, track_id, points)
    }
}

/// reqwest-backed client for the tracking endpoints.
#[derive(Clone)]
pub struct HttpTrackingApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTrackingApi {
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_client(reqwest::Client::new(), &config.base_url)
    }

    /// Use a preconfigured client (proxy, timeouts, ...).
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn tracks_url(&self) -> String {
        format!("{}/tracks", self.base_url)
    }

    fn track_url(&self, track_id: &str) -> String {
        format!("{}/tracks/{}", self.base_url, urlencoding::encode(track_id))
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status.as_u16(), &body));
        }

        response.json().await.map_err(|e| TrackingError::Api {
            status: status.as_u16(),
            message: format!("JSON parse error: {}", e),
        })
    }
}

impl TrackingApi for HttpTrackingApi {
    async fn create_track(
        &self,
        access_token: &str,
        request: &CreateTrackRequest,
    ) -> Result<Track> {
        let response = self
            .http
            .post(self.tracks_url())
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await
            .map_err(network_error)?;

        let envelope: TrackEnvelope = self.check_response_json(response).await?;
        tracing::info!(track_id = %envelope.track.id, "Remote track created");
        Ok(envelope.track)
    }

    async fn update_track_status(
        &self,
        access_token: &str,
        track_id: &str,
        status: RemoteTrackStatus,
    ) -> Result<Track> {
        let response = self
            .http
            .patch(self.track_url(track_id))
            .bearer_auth(access_token)
            .json(&UpdateTrackRequest { status })
            .send()
            .await
            .map_err(network_error)?;

        let envelope: TrackEnvelope = self.check_response_json(response).await?;
        Ok(envelope.track)
    }

    async fn add_track_points(
        &self,
        access_token: &str,
        track_id: &str,
        points: &[TrackPointPayload],
    ) -> Result<AddPointsResponse> {
        let response = self
            .http
            .post(format!("{}/points", self.track_url(track_id)))
            .bearer_auth(access_token)
            .json(&AddPointsRequest { points })
            .send()
            .await
            .map_err(network_error)?;

        self.check_response_json(response).await
    }

    async fn finalize_track(&self, access_token: &str, track_id: &str) -> Result<Track> {
        let response = self
            .http
            .post(format!("{}/finalize", self.track_url(track_id)))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(network_error)?;

        let envelope: TrackEnvelope = self.check_response_json(response).await?;
        tracing::info!(
            track_id = %envelope.track.id,
            distance_meters = ?envelope.track.distance_meters,
            "Remote track finalized"
        );
        Ok(envelope.track)
    }

    fn send_points_beacon(
        &self,
        access_token: &str,
        track_id: &str,
        points: Vec<TrackPointPayload>,
    ) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                points = points.len(),
                "No async runtime available, dropping beacon"
            );
            return;
        };

        let count = points.len();
        let request = self
            .http
            .post(format!("{}/points", self.track_url(track_id)))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "points": points }));

        handle.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::debug!(error = %e, points = count, "Beacon delivery failed");
            }
        });
    }
}

fn network_error(err: reqwest::Error) -> TrackingError {
    TrackingError::Network(err.to_string())
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn error_for_status(status: u16, body: &str) -> TrackingError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string());

    match status {
        403 => TrackingError::PermissionRequired,
        404 => TrackingError::TrackNotFound,
        429 => {
            tracing::warn!("Tracking API rate limit hit (429)");
            TrackingError::Network(format!("HTTP {}: {}", status, message))
        }
        500..=599 => TrackingError::Network(format!("HTTP {}: {}", status, message)),
        _ => TrackingError::Api { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_for_status_mapping() {
        assert!(matches!(
            error_for_status(403, r#"{"error": "Subscription required", "status": 403}"#),
            TrackingError::PermissionRequired
        ));
        assert!(matches!(
            error_for_status(404, ""),
            TrackingError::TrackNotFound
        ));
        assert!(error_for_status(502, "bad gateway").is_transient());
        assert!(error_for_status(429, "").is_transient());
    }

    #[test]
    fn test_error_for_status_uses_error_body() {
        match error_for_status(400, r#"{"error": "title is required"}"#) {
            TrackingError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "title is required");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        match error_for_status(401, "plain text") {
            TrackingError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "plain text");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_track_urls_encode_ids() {
        let api = HttpTrackingApi::with_client(reqwest::Client::new(), "https://parks.test/api/");
        assert_eq!(api.tracks_url(), "https://parks.test/api/tracks");
        assert_eq!(
            api.track_url("a b/c"),
            "https://parks.test/api/tracks/a%20b%2Fc"
        );
    }
}
