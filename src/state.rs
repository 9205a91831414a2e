//! Application state
//!
//! Configuration and the shared component wiring for the console core.

use crate::backend_client::BackendClient;
use crate::synchronizer::Synchronizer;
use crate::view_hub::ViewHub;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend REST base URL (including the /api prefix)
    pub api_base_url: String,
    /// Backend event socket URL
    pub socket_url: String,
    /// Drone targeted by processing-mode commands
    pub drone_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5000/api".to_string()),
            socket_url: std::env::var("SOCKET_URL")
                .unwrap_or_else(|_| "ws://localhost:5000".to_string()),
            drone_id: std::env::var("DRONE_ID").unwrap_or_else(|_| "drone-1".to_string()),
        }
    }
}

/// Timing knobs for the synchronizer
///
/// Fixed in production; injectable so tests can run against a paused clock
/// without waiting out wall time.
#[derive(Debug, Clone, Copy)]
pub struct SyncTimings {
    /// How long a displayed alert stays up before auto-clearing
    pub alert_dwell: Duration,
    /// Idle window after which the pending alert batch is folded into the
    /// running counter
    pub batch_flush: Duration,
    /// Fixed delay between socket reconnect attempts
    pub reconnect_delay: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            alert_dwell: Duration::from_secs(10),
            batch_flush: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

/// Application state shared across consumers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Backend REST client
    pub backend: Arc<BackendClient>,
    /// Realtime session & alert synchronizer
    pub synchronizer: Arc<Synchronizer>,
    /// ViewHub (console view fan-out)
    pub views: Arc<ViewHub>,
}
