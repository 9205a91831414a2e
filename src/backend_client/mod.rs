//! BackendClient - Surveillance Backend Adapter
//!
//! ## Responsibilities
//!
//! - Session lifecycle commands (active query, start, stop)
//! - Processing mode on/off commands
//! - Alert history and session listing queries
//! - Drone dispatch
//!
//! The synchronizer depends on the `ControlPlane` trait rather than this
//! concrete client so command semantics can be tested without a backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertPayload, DataEnvelope, ProcessingKind, Session, StatusEnvelope,
};

/// Command surface the synchronizer drives
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Query the backend for the currently active session, if any
    async fn active_session(&self) -> Result<Option<Session>>;

    /// Start a new session; the backend enforces single-active
    async fn start_session(&self, name: &str) -> Result<Session>;

    /// Stop the active session
    async fn stop_session(&self) -> Result<()>;

    /// Turn one processing task on or off
    async fn set_processing(&self, kind: ProcessingKind, enable: bool) -> Result<()>;
}

/// Drone dispatch request issued from the configuration panel
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRequest {
    pub drone_id: String,
    pub area_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub usb_address: String,
}

impl DispatchRequest {
    /// The dispatch form requires every field before sending
    pub fn validate(&self) -> Result<()> {
        if self.drone_id.trim().is_empty() {
            return Err(Error::Validation("drone_id must not be empty".to_string()));
        }
        if self.area_id.trim().is_empty() {
            return Err(Error::Validation("area_id must not be empty".to_string()));
        }
        if self.usb_address.trim().is_empty() {
            return Err(Error::Validation("usb_address must not be empty".to_string()));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::Validation(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::Validation(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        if !self.altitude.is_finite() || self.altitude <= 0.0 {
            return Err(Error::Validation(format!(
                "altitude {} must be positive",
                self.altitude
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DispatchResponse {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Serialize)]
struct ProcessCommand<'a> {
    action: &'a str,
    drone_id: &'a str,
}

/// HTTP client for the surveillance backend REST API
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    drone_id: String,
}

impl BackendClient {
    /// Create a new client against the given `/api` base URL
    pub fn new(base_url: String, drone_id: String) -> Self {
        Self::with_timeout(base_url, drone_id, Duration::from_secs(10))
    }

    /// Create a new client with a custom request timeout
    pub fn with_timeout(base_url: String, drone_id: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            drone_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Drone targeted by processing commands
    pub fn drone_id(&self) -> &str {
        &self.drone_id
    }

    // ========================================
    // History and listing queries
    // ========================================

    /// All recorded alerts, newest ordering decided by the backend
    pub async fn list_alerts(&self) -> Result<Vec<Alert>> {
        let url = self.url("alert");
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Api(format!("alert history failed: {}", resp.status())));
        }

        let envelope: DataEnvelope<Vec<AlertPayload>> = resp.json().await?;
        let now = chrono::Utc::now();
        Ok(envelope
            .data
            .into_iter()
            .map(|payload| Alert::from_payload(payload, None, now))
            .collect())
    }

    /// Alerts recorded during one session
    pub async fn session_alerts(&self, session_id: i64) -> Result<Vec<Alert>> {
        let url = self.url(&format!("alert/session/{session_id}"));
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Api(format!(
                "session alert history failed: {}",
                resp.status()
            )));
        }

        let envelope: DataEnvelope<Vec<AlertPayload>> = resp.json().await?;
        let now = chrono::Utc::now();
        Ok(envelope
            .data
            .into_iter()
            .map(|payload| Alert::from_payload(payload, None, now))
            .collect())
    }

    /// One alert by id
    pub async fn get_alert(&self, id: &str) -> Result<Alert> {
        let url = self.url(&format!("alert/{id}"));
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Api(format!("alert fetch failed: {}", resp.status())));
        }

        let envelope: DataEnvelope<AlertPayload> = resp.json().await?;
        Ok(Alert::from_payload(envelope.data, None, chrono::Utc::now()))
    }

    /// All sessions, past and present
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let url = self.url("sessions/");
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Api(format!("session listing failed: {}", resp.status())));
        }

        let envelope: DataEnvelope<Vec<Session>> = resp.json().await?;
        Ok(envelope.data)
    }

    // ========================================
    // Drone dispatch
    // ========================================

    /// Send the drone to a location; returns the backend's status message
    pub async fn dispatch_drone(&self, request: &DispatchRequest) -> Result<String> {
        request.validate()?;

        let url = self.url("drones/send");
        tracing::info!(
            drone_id = %request.drone_id,
            area_id = %request.area_id,
            latitude = request.latitude,
            longitude = request.longitude,
            altitude = request.altitude,
            "Dispatching drone"
        );

        let resp = self.http.post(&url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api(format!("dispatch failed: {status} - {body}")));
        }

        let parsed: DispatchResponse = resp.json().await?;
        Ok(parsed.message)
    }
}

#[async_trait]
impl ControlPlane for BackendClient {
    async fn active_session(&self) -> Result<Option<Session>> {
        let url = self.url("sessions/active");
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Api(format!("active session query failed: {status}")));
        }

        // Absence of status/data means no active session, not an error
        let envelope: StatusEnvelope<Session> = resp.json().await?;
        if envelope.status {
            Ok(envelope.data)
        } else {
            Ok(None)
        }
    }

    async fn start_session(&self, name: &str) -> Result<Session> {
        let url = self.url("sessions/start");
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api(format!("session start failed: {status} - {body}")));
        }

        let envelope: StatusEnvelope<Session> = resp.json().await?;
        let session = envelope.into_data("session start")?;
        tracing::info!(session_id = session.id, name = ?session.name, "Session started");
        Ok(session)
    }

    async fn stop_session(&self) -> Result<()> {
        let url = self.url("sessions/stop");
        let resp = self.http.post(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api(format!("session stop failed: {status} - {body}")));
        }

        let envelope: StatusEnvelope<serde_json::Value> = resp.json().await?;
        if !envelope.status {
            return Err(Error::Api("session stop: backend reported failure".to_string()));
        }

        tracing::info!("Session stopped");
        Ok(())
    }

    async fn set_processing(&self, kind: ProcessingKind, enable: bool) -> Result<()> {
        let url = self.url(kind.endpoint_path());
        let command = ProcessCommand {
            action: if enable { "on" } else { "off" },
            drone_id: &self.drone_id,
        };

        let resp = self.http.post(&url).json(&command).send().await?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(
                endpoint = kind.endpoint_path(),
                action = command.action,
                status = %status,
                "Processing command rejected"
            );
            return Err(Error::Api(format!(
                "processing command failed: {status}"
            )));
        }

        tracing::info!(
            endpoint = kind.endpoint_path(),
            action = command.action,
            drone_id = %self.drone_id,
            "Processing command accepted"
        );
        Ok(())
    }
}
