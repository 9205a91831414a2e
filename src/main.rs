//! DroneDeck Console Core - headless runner
//!
//! Wires the synchronizer against a live backend and logs every state
//! change until interrupted. The browser console embeds the same crate;
//! this binary exists for operations and soak testing against a backend.

use dronedeck::backend_client::BackendClient;
use dronedeck::event_socket::{SocketListener, WsDriver};
use dronedeck::state::{AppConfig, AppState, SyncTimings};
use dronedeck::synchronizer::Synchronizer;
use dronedeck::view_hub::{ViewEvent, ViewHub};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dronedeck=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DroneDeck console core v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        api_base_url = %config.api_base_url,
        socket_url = %config.socket_url,
        drone_id = %config.drone_id,
        "Configuration loaded"
    );

    // Initialize components
    let views = Arc::new(ViewHub::new());
    let backend = Arc::new(BackendClient::new(
        config.api_base_url.clone(),
        config.drone_id.clone(),
    ));
    tracing::info!("BackendClient initialized");

    let timings = SyncTimings::default();
    let synchronizer = Arc::new(Synchronizer::new(
        backend.clone(),
        views.clone(),
        timings,
        config.drone_id.clone(),
    ));
    synchronizer.clone().start().await;
    tracing::info!("Synchronizer initialized, intake consumer running");

    // Discover a session that was already running before we came up
    synchronizer.check_active_session().await;

    // Start the reconnecting socket listener
    let listener = SocketListener::new(
        WsDriver::new(config.socket_url.clone()),
        synchronizer.intake_sender(),
        timings.reconnect_delay,
    );
    tokio::spawn(listener.run());
    tracing::info!("Event socket listener started");

    let state = AppState {
        config,
        backend,
        synchronizer: synchronizer.clone(),
        views: views.clone(),
    };

    // Console log view: render every state change as a structured log line
    let (subscription_id, mut events) = state.views.register("console-log").await;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ViewEvent::Connection(status) => {
                    tracing::info!(status = ?status, "view: connection");
                }
                ViewEvent::Session(Some(session)) => {
                    tracing::info!(session_id = session.id, name = ?session.name, "view: session active");
                }
                ViewEvent::Session(None) => {
                    tracing::info!("view: no session");
                }
                ViewEvent::AlertShown(alert) => {
                    tracing::info!(
                        alert_id = %alert.id,
                        detection = ?alert.detection,
                        source = ?alert.source,
                        confidence = ?dronedeck::models::format_confidence(alert.confidence),
                        "view: alert displayed"
                    );
                }
                ViewEvent::AlertCleared => {
                    tracing::info!("view: alert cleared");
                }
                ViewEvent::Location(location) => {
                    tracing::info!(lat = location.lat, long = location.long, "view: drone location");
                }
                ViewEvent::Mode(mode) => {
                    tracing::info!(mode = ?mode, "view: processing mode");
                }
                ViewEvent::AlertCount(total) => {
                    tracing::info!(total = total, "view: alert count");
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    state.views.unregister(&subscription_id).await;

    Ok(())
}
