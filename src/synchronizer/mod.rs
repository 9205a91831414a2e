//! Synchronizer - Realtime Session & Alert State
//!
//! ## Responsibilities
//!
//! - Session lifecycle mirroring (none / active) against the backend
//! - Event socket health tracking (connecting / connected / disconnected)
//! - The one alert currently presented to the operator, with fixed dwell
//! - Alert count batching decoupled from display suppression
//! - Processing mode command dispatch with busy-flag de-duplication
//! - Routing of inbound socket frames, filtered by operator-selected source
//!
//! One spawned consumer drains the socket intake channel in arrival order
//! and is the only writer driven by the stream; commands come in through
//! async methods on the shared service. Session-mutating commands carry a
//! monotonic token so a slow response cannot clobber state set by a newer
//! command.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend_client::ControlPlane;
use crate::error::{Error, Result};
use crate::event_socket::SocketEvent;
use crate::models::{
    Alert, AlertPayload, AlertSource, ConnectionStatus, DetectionType, DroneLocation,
    ProcessingKind, ProcessingMode, Session, SocketFrame, SourceFilter, PLACEHOLDER_IMAGE,
};
use crate::state::SyncTimings;
use crate::view_hub::{ViewEvent, ViewHub};

/// Mutable synchronizer state, owned behind one lock
#[derive(Debug)]
struct SyncState {
    connection: ConnectionStatus,
    session: Option<Session>,
    session_loading: bool,
    current_alert: Option<Alert>,
    location: Option<DroneLocation>,
    alert_count: u64,
    last_alert_at: Option<DateTime<Utc>>,
    source_filter: SourceFilter,
    paused: bool,
    mode: ProcessingMode,
    pending_batch: Vec<Alert>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            connection: ConnectionStatus::Disconnected,
            session: None,
            // Loading until the startup active-session check resolves
            session_loading: true,
            current_alert: None,
            location: None,
            alert_count: 0,
            last_alert_at: None,
            source_filter: SourceFilter::All,
            paused: false,
            mode: ProcessingMode::Detection,
            pending_batch: Vec::new(),
        }
    }
}

/// Read-only snapshot of the synchronizer state for views
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncSnapshot {
    pub connection: ConnectionStatus,
    pub session: Option<Session>,
    pub session_loading: bool,
    pub current_alert: Option<Alert>,
    pub location: Option<DroneLocation>,
    pub alert_count: u64,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub source_filter: SourceFilter,
    pub paused: bool,
    pub mode: ProcessingMode,
    pub switching_mode: bool,
    pub drone_id: String,
}

/// Clears the mode-busy flag however the command ends
struct ModeGuard<'a> {
    switching: &'a AtomicBool,
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        self.switching.store(false, Ordering::SeqCst);
    }
}

/// Realtime session & alert synchronizer
pub struct Synchronizer {
    control: Arc<dyn ControlPlane>,
    views: Arc<ViewHub>,
    timings: SyncTimings,
    drone_id: String,
    state: RwLock<SyncState>,
    switching: AtomicBool,
    session_seq: AtomicU64,
    intake_tx: mpsc::UnboundedSender<SocketEvent>,
    intake_rx: Mutex<Option<mpsc::UnboundedReceiver<SocketEvent>>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl Synchronizer {
    /// Create a new synchronizer (not yet consuming socket events)
    pub fn new(
        control: Arc<dyn ControlPlane>,
        views: Arc<ViewHub>,
        timings: SyncTimings,
        drone_id: String,
    ) -> Self {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();

        Self {
            control,
            views,
            timings,
            drone_id,
            state: RwLock::new(SyncState::default()),
            switching: AtomicBool::new(false),
            session_seq: AtomicU64::new(0),
            intake_tx,
            intake_rx: Mutex::new(Some(intake_rx)),
            flush_task: Mutex::new(None),
        }
    }

    /// Sender half of the socket intake channel, for the socket listener
    pub fn intake_sender(&self) -> mpsc::UnboundedSender<SocketEvent> {
        self.intake_tx.clone()
    }

    /// Spawn the intake consumer (idempotent; second call is a no-op)
    pub async fn start(self: Arc<Self>) {
        let mut rx = {
            let mut guard = self.intake_rx.lock().await;
            match guard.take() {
                Some(rx) => rx,
                None => {
                    warn!("Synchronizer already started");
                    return;
                }
            }
        };

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.clone().handle_socket_event(event).await;
            }
            debug!("Intake channel closed; synchronizer consumer exiting");
        });
    }

    /// Current state, cloned out for view rendering
    pub async fn snapshot(&self) -> SyncSnapshot {
        let st = self.state.read().await;
        SyncSnapshot {
            connection: st.connection,
            session: st.session.clone(),
            session_loading: st.session_loading,
            current_alert: st.current_alert.clone(),
            location: st.location,
            alert_count: st.alert_count,
            last_alert_at: st.last_alert_at,
            source_filter: st.source_filter,
            paused: st.paused,
            mode: st.mode,
            switching_mode: self.switching.load(Ordering::SeqCst),
            drone_id: self.drone_id.clone(),
        }
    }

    // ========================================
    // Session lifecycle
    // ========================================

    /// One-shot startup probe for an already-active session.
    ///
    /// Side effect only: every failure mode is absorbed into the safe
    /// "no session" default and logged, never returned.
    pub async fn check_active_session(&self) {
        {
            self.state.write().await.session_loading = true;
        }

        let token = self.issue_session_token();
        let result = self.control.active_session().await;

        let outcome = {
            let mut st = self.state.write().await;
            st.session_loading = false;

            if !self.token_is_current(token) {
                info!("Discarding stale active-session response");
                None
            } else {
                match result {
                    Ok(Some(session)) => {
                        info!(session_id = session.id, "Active session discovered");
                        st.session = Some(session.clone());
                        st.connection = ConnectionStatus::Connected;
                        st.mode = ProcessingMode::Detection;
                        Some((
                            Some(session),
                            ConnectionStatus::Connected,
                            ProcessingMode::Detection,
                        ))
                    }
                    Ok(None) => {
                        info!("No active session");
                        st.session = None;
                        st.connection = ConnectionStatus::Disconnected;
                        st.mode = ProcessingMode::Off;
                        Some((None, ConnectionStatus::Disconnected, ProcessingMode::Off))
                    }
                    Err(e) => {
                        warn!(error = %e, "Active session check failed");
                        st.session = None;
                        st.connection = ConnectionStatus::Disconnected;
                        st.mode = ProcessingMode::Off;
                        Some((None, ConnectionStatus::Disconnected, ProcessingMode::Off))
                    }
                }
            }
        };

        if let Some((session, connection, mode)) = outcome {
            self.views.broadcast(ViewEvent::Session(session)).await;
            self.views.broadcast(ViewEvent::Connection(connection)).await;
            self.views.broadcast(ViewEvent::Mode(mode)).await;
        }
    }

    /// Start a new session and adopt it as active
    pub async fn start_session(&self, name: &str) -> Result<Session> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation(
                "session name must not be empty".to_string(),
            ));
        }

        let token = self.issue_session_token();
        let session = self.control.start_session(name).await.map_err(|e| {
            warn!(error = %e, "Session start failed; state unchanged");
            e
        })?;

        {
            let mut st = self.state.write().await;
            if !self.token_is_current(token) {
                info!(
                    session_id = session.id,
                    "Discarding stale session start response"
                );
                return Err(Error::Superseded(
                    "a newer session command was issued".to_string(),
                ));
            }
            st.session = Some(session.clone());
            st.connection = ConnectionStatus::Connected;
            st.mode = ProcessingMode::Detection;
        }

        info!(session_id = session.id, "Session adopted");
        self.views
            .broadcast(ViewEvent::Session(Some(session.clone())))
            .await;
        self.views
            .broadcast(ViewEvent::Connection(ConnectionStatus::Connected))
            .await;
        self.views
            .broadcast(ViewEvent::Mode(ProcessingMode::Detection))
            .await;
        Ok(session)
    }

    /// Stop the active session and clear mirrored state
    pub async fn stop_session(&self) -> Result<()> {
        let token = self.issue_session_token();
        self.control.stop_session().await.map_err(|e| {
            warn!(error = %e, "Session stop failed; state unchanged");
            e
        })?;

        let had_alert = {
            let mut st = self.state.write().await;
            if !self.token_is_current(token) {
                info!("Discarding stale session stop response");
                return Err(Error::Superseded(
                    "a newer session command was issued".to_string(),
                ));
            }
            st.session = None;
            st.connection = ConnectionStatus::Disconnected;
            st.mode = ProcessingMode::Off;
            st.current_alert.take().is_some()
        };

        info!("Session stopped and cleared");
        self.views.broadcast(ViewEvent::Session(None)).await;
        self.views
            .broadcast(ViewEvent::Connection(ConnectionStatus::Disconnected))
            .await;
        self.views
            .broadcast(ViewEvent::Mode(ProcessingMode::Off))
            .await;
        if had_alert {
            self.views.broadcast(ViewEvent::AlertCleared).await;
        }
        Ok(())
    }

    fn issue_session_token(&self) -> u64 {
        self.session_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn token_is_current(&self, token: u64) -> bool {
        self.session_seq.load(Ordering::SeqCst) == token
    }

    // ========================================
    // Processing modes
    // ========================================

    fn acquire_mode_guard(&self) -> Result<ModeGuard<'_>> {
        if self
            .switching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Busy(
                "a mode command is already in flight".to_string(),
            ));
        }
        Ok(ModeGuard {
            switching: &self.switching,
        })
    }

    /// Enable one processing task on the drone
    pub async fn switch_mode(&self, kind: ProcessingKind) -> Result<()> {
        let _guard = self.acquire_mode_guard()?;

        self.control.set_processing(kind, true).await.map_err(|e| {
            warn!(requested = ?kind, error = %e, "Mode switch failed; mode unchanged");
            e
        })?;

        let mode = kind.as_mode();
        {
            self.state.write().await.mode = mode;
        }
        info!(mode = ?mode, "Processing mode switched");
        self.views.broadcast(ViewEvent::Mode(mode)).await;
        Ok(())
    }

    /// Turn both processing tasks off; succeeds only if both commands do
    pub async fn turn_off_all(&self) -> Result<()> {
        let _guard = self.acquire_mode_guard()?;

        let (detection, face) = tokio::join!(
            self.control.set_processing(ProcessingKind::Detection, false),
            self.control
                .set_processing(ProcessingKind::FaceRecognition, false),
        );
        if let Err(e) = &detection {
            warn!(error = %e, "Detection off command failed");
        }
        if let Err(e) = &face {
            warn!(error = %e, "Face recognition off command failed");
        }
        detection?;
        face?;

        {
            self.state.write().await.mode = ProcessingMode::Off;
        }
        info!("All processing modes off");
        self.views
            .broadcast(ViewEvent::Mode(ProcessingMode::Off))
            .await;
        Ok(())
    }

    // ========================================
    // Display knobs
    // ========================================

    /// Pause or resume live alert display (counting continues either way)
    pub async fn set_paused(&self, paused: bool) {
        self.state.write().await.paused = paused;
        info!(paused = paused, "Live alert display pause toggled");
    }

    /// Change the source filter; a displayed alert that no longer matches
    /// is cleared immediately, independent of its dwell timer
    pub async fn set_source_filter(&self, filter: SourceFilter) {
        let cleared = {
            let mut st = self.state.write().await;
            st.source_filter = filter;
            match &st.current_alert {
                Some(alert) if !filter.matches(alert.source) => {
                    st.current_alert = None;
                    true
                }
                _ => false,
            }
        };

        info!(filter = ?filter, "Source filter changed");
        if cleared {
            debug!("Displayed alert no longer matches filter");
            self.views.broadcast(ViewEvent::AlertCleared).await;
        }
    }

    // ========================================
    // Socket event intake
    // ========================================

    async fn handle_socket_event(self: Arc<Self>, event: SocketEvent) {
        match event {
            SocketEvent::Connecting => self.set_connection(ConnectionStatus::Connecting).await,
            SocketEvent::Connected => self.set_connection(ConnectionStatus::Connected).await,
            SocketEvent::Disconnected => {
                self.set_connection(ConnectionStatus::Disconnected).await
            }
            SocketEvent::Frame(text) => self.handle_frame(text).await,
        }
    }

    async fn handle_frame(self: Arc<Self>, text: String) {
        match SocketFrame::parse(&text) {
            Err(e) => warn!(error = %e, "Discarding malformed socket frame"),
            Ok(None) => debug!("Ignoring unhandled socket frame"),
            Ok(Some(SocketFrame::Alert { source, payload })) => {
                self.ingest_alert(payload, source).await;
            }
            Ok(Some(SocketFrame::Location(location))) => self.set_location(location).await,
        }
    }

    async fn ingest_alert(
        self: Arc<Self>,
        payload: AlertPayload,
        frame_source: Option<AlertSource>,
    ) {
        let alert = Alert::from_payload(payload, frame_source, Utc::now());

        let displayed = {
            let mut st = self.state.write().await;
            st.pending_batch.push(alert.clone());
            let show = !st.paused && st.source_filter.matches(alert.source);
            if show {
                st.current_alert = Some(alert.clone());
                st.last_alert_at = Some(Utc::now());
            }
            show
        };

        if displayed {
            debug!(alert_id = %alert.id, source = ?alert.source, "Alert displayed");
            self.views
                .broadcast(ViewEvent::AlertShown(alert.clone()))
                .await;
            self.clone().arm_dwell_timer(alert.id.clone());
        } else {
            debug!(alert_id = %alert.id, "Alert suppressed by pause/filter");
        }

        self.restart_flush_timer().await;
    }

    /// Auto-clear the displayed alert after the dwell, unless a newer alert
    /// took its place (identity check by id makes the stale timer a no-op)
    fn arm_dwell_timer(self: Arc<Self>, alert_id: String) {
        tokio::spawn(async move {
            tokio::time::sleep(self.timings.alert_dwell).await;

            let cleared = {
                let mut st = self.state.write().await;
                if st
                    .current_alert
                    .as_ref()
                    .is_some_and(|alert| alert.id == alert_id)
                {
                    st.current_alert = None;
                    true
                } else {
                    false
                }
            };

            if cleared {
                debug!(alert_id = %alert_id, "Displayed alert dwell elapsed");
                self.views.broadcast(ViewEvent::AlertCleared).await;
            }
        });
    }

    /// Every arrival restarts the idle window; the batch is folded into the
    /// counter only once arrivals go quiet
    async fn restart_flush_timer(self: Arc<Self>) {
        let mut guard = self.flush_task.lock().await;
        if let Some(previous) = guard.take() {
            previous.abort();
        }

        let sync = self.clone();
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(sync.timings.batch_flush).await;
            sync.flush_batch().await;
        }));
    }

    async fn flush_batch(&self) {
        let total = {
            let mut st = self.state.write().await;
            let arrived = st.pending_batch.len() as u64;
            if arrived == 0 {
                return;
            }
            st.pending_batch.clear();
            st.alert_count += arrived;
            st.alert_count
        };

        debug!(total = total, "Alert batch folded into counter");
        self.views.broadcast(ViewEvent::AlertCount(total)).await;
    }

    async fn set_connection(&self, status: ConnectionStatus) {
        let changed = {
            let mut st = self.state.write().await;
            if st.connection == status {
                false
            } else {
                st.connection = status;
                true
            }
        };

        if changed {
            info!(status = ?status, "Connection status changed");
            self.views.broadcast(ViewEvent::Connection(status)).await;
        }
    }

    async fn set_location(&self, location: DroneLocation) {
        {
            self.state.write().await.location = Some(location);
        }
        debug!(lat = location.lat, long = location.long, "Drone location updated");
        self.views.broadcast(ViewEvent::Location(location)).await;
    }

    // ========================================
    // Simulation
    // ========================================

    /// Inject a synthetic alert through the live intake path, for demos and
    /// testing without a backend. Falls back to direct display mutation if
    /// the intake consumer is gone.
    pub async fn simulate_alert(self: Arc<Self>) {
        let (frame, alert) = {
            let mut rng = rand::thread_rng();
            let source = if rng.gen_bool(0.5) {
                AlertSource::Onboard
            } else {
                AlertSource::Offboard
            };
            let detection = if rng.gen_bool(0.5) {
                DetectionType::Person
            } else {
                DetectionType::Animal
            };
            let message = match detection {
                DetectionType::Person => "Person detected in restricted area",
                DetectionType::Animal => "Animal spotted near perimeter",
            };
            let now = Utc::now();
            let alert = Alert {
                id: now.timestamp_millis().to_string(),
                detection,
                message: message.to_string(),
                image: PLACEHOLDER_IMAGE.to_string(),
                timestamp: now,
                confidence: Some(rng.gen_range(0.7..1.0)),
                drone_id: Some(self.drone_id.clone()),
                source: Some(source),
            };
            let frame = serde_json::json!({
                "type": "alert",
                "source": source,
                "data": alert,
            })
            .to_string();
            (frame, alert)
        };

        info!(alert_id = %alert.id, "Injecting simulated alert");
        let consumer_running = self.intake_rx.lock().await.is_none();
        if consumer_running && self.intake_tx.send(SocketEvent::Frame(frame)).is_ok() {
            return;
        }

        warn!("Socket intake not consuming; applying simulated alert directly");
        let displayed = {
            let mut st = self.state.write().await;
            st.alert_count += 1;
            let show = !st.paused && st.source_filter.matches(alert.source);
            if show {
                st.current_alert = Some(alert.clone());
                st.last_alert_at = Some(Utc::now());
            }
            show
        };

        let total = self.state.read().await.alert_count;
        self.views.broadcast(ViewEvent::AlertCount(total)).await;
        if displayed {
            self.views
                .broadcast(ViewEvent::AlertShown(alert.clone()))
                .await;
            self.arm_dwell_timer(alert.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicI64;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MockControlPlane {
        active_response: StdMutex<Option<Session>>,
        active_fails: AtomicBool,
        start_delay: StdMutex<Option<Duration>>,
        start_fails: AtomicBool,
        stop_fails: AtomicBool,
        fail_detection_off: AtomicBool,
        fail_face_off: AtomicBool,
        fail_face_on: AtomicBool,
        processing_delay: StdMutex<Option<Duration>>,
        start_names: StdMutex<Vec<String>>,
        processing_calls: StdMutex<Vec<(ProcessingKind, bool)>>,
        next_session_id: AtomicI64,
    }

    #[async_trait]
    impl ControlPlane for MockControlPlane {
        async fn active_session(&self) -> Result<Option<Session>> {
            if self.active_fails.load(Ordering::SeqCst) {
                return Err(Error::Api("active session query failed".to_string()));
            }
            Ok(self.active_response.lock().unwrap().clone())
        }

        async fn start_session(&self, name: &str) -> Result<Session> {
            self.start_names.lock().unwrap().push(name.to_string());
            let delay = *self.start_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.start_fails.load(Ordering::SeqCst) {
                return Err(Error::Api("start refused".to_string()));
            }
            let id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Session {
                id,
                name: Some(name.to_string()),
                started_at: Utc::now(),
                ended_at: None,
            })
        }

        async fn stop_session(&self) -> Result<()> {
            if self.stop_fails.load(Ordering::SeqCst) {
                return Err(Error::Api("stop refused".to_string()));
            }
            Ok(())
        }

        async fn set_processing(&self, kind: ProcessingKind, enable: bool) -> Result<()> {
            self.processing_calls.lock().unwrap().push((kind, enable));
            let delay = *self.processing_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let fail = match (kind, enable) {
                (ProcessingKind::Detection, false) => {
                    self.fail_detection_off.load(Ordering::SeqCst)
                }
                (ProcessingKind::FaceRecognition, false) => {
                    self.fail_face_off.load(Ordering::SeqCst)
                }
                (ProcessingKind::FaceRecognition, true) => {
                    self.fail_face_on.load(Ordering::SeqCst)
                }
                _ => false,
            };
            if fail {
                return Err(Error::Api("processing command failed".to_string()));
            }
            Ok(())
        }
    }

    fn new_sync(control: Arc<MockControlPlane>) -> Arc<Synchronizer> {
        Arc::new(Synchronizer::new(
            control,
            Arc::new(ViewHub::new()),
            SyncTimings::default(),
            "drone-1".to_string(),
        ))
    }

    fn alert_frame(id: &str, source: &str) -> String {
        format!(
            r#"{{"type":"alert","source":"{source}","data":{{"id":"{id}","type":"person","message":"Person detected","timestamp":"2024-01-01T00:00:00Z","confidence":0.92}}}}"#
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_counts_every_arrival_after_flush() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));
        sync.set_paused(true).await;
        sync.set_source_filter(SourceFilter::Onboard).await;

        sync.clone().handle_frame(alert_frame("a1", "onboard")).await;
        sync.clone().handle_frame(alert_frame("a2", "offboard")).await;
        sync.clone().handle_frame(alert_frame("a3", "onboard")).await;

        assert_eq!(sync.snapshot().await.alert_count, 0);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        let snap = sync.snapshot().await;
        assert_eq!(snap.alert_count, 3);
        assert!(snap.current_alert.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_arrival_restarts_the_flush_window() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));

        sync.clone().handle_frame(alert_frame("a1", "onboard")).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        sync.clone().handle_frame(alert_frame("a2", "onboard")).await;

        // The first timer was restarted, so nothing has flushed yet
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(sync.snapshot().await.alert_count, 0);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(sync.snapshot().await.alert_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_suppresses_display_but_still_counts() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));
        sync.set_paused(true).await;

        sync.clone().handle_frame(alert_frame("a1", "onboard")).await;
        assert!(sync.snapshot().await.current_alert.is_none());
        assert!(sync.snapshot().await.last_alert_at.is_none());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(sync.snapshot().await.alert_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_suppression_is_not_retroactive() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));
        sync.set_source_filter(SourceFilter::Onboard).await;

        sync.clone()
            .handle_frame(alert_frame("a1", "offboard"))
            .await;
        assert!(sync.snapshot().await.current_alert.is_none());

        // Widening the filter does not resurrect the suppressed alert
        sync.set_source_filter(SourceFilter::All).await;
        assert!(sync.snapshot().await.current_alert.is_none());

        // Future alerts display normally
        sync.clone()
            .handle_frame(alert_frame("a2", "offboard"))
            .await;
        let snap = sync.snapshot().await;
        assert_eq!(snap.current_alert.unwrap().id, "a2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_change_clears_mismatched_display_immediately() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));

        sync.clone()
            .handle_frame(alert_frame("a1", "offboard"))
            .await;
        assert_eq!(sync.snapshot().await.current_alert.unwrap().id, "a1");

        sync.set_source_filter(SourceFilter::Onboard).await;
        assert!(sync.snapshot().await.current_alert.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dwell_clears_display_unless_superseded() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));

        sync.clone().handle_frame(alert_frame("a1", "onboard")).await;
        assert_eq!(sync.snapshot().await.current_alert.unwrap().id, "a1");

        tokio::time::sleep(Duration::from_secs(5)).await;
        sync.clone().handle_frame(alert_frame("a2", "onboard")).await;
        assert_eq!(sync.snapshot().await.current_alert.unwrap().id, "a2");

        // a1's timer fires at t=10s and must not clobber a2
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sync.snapshot().await.current_alert.unwrap().id, "a2");

        // a2's own dwell elapses at t=15s
        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert!(sync.snapshot().await.current_alert.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_alert_scenario_display_then_auto_clear() {
        let control = Arc::new(MockControlPlane::default());
        let views = Arc::new(ViewHub::new());
        let sync = Arc::new(Synchronizer::new(
            control,
            views.clone(),
            SyncTimings::default(),
            "drone-1".to_string(),
        ));
        let (_id, mut rx) = views.register("test").await;

        let frame = r#"{"type":"alert","source":"onboard","data":{"id":"a1","type":"person","message":"Person detected","timestamp":"2024-01-01T00:00:00Z","confidence":0.92}}"#;
        sync.clone().handle_frame(frame.to_string()).await;

        let snap = sync.snapshot().await;
        let alert = snap.current_alert.unwrap();
        assert_eq!(alert.id, "a1");
        assert_eq!(alert.confidence, Some(0.92));
        assert!(snap.last_alert_at.is_some());

        let ViewEvent::AlertShown(shown) = rx.recv().await.unwrap() else {
            panic!("expected AlertShown first");
        };
        assert_eq!(shown.id, "a1");

        tokio::time::sleep(Duration::from_millis(10100)).await;
        assert!(sync.snapshot().await.current_alert.is_none());

        assert_eq!(rx.recv().await, Some(ViewEvent::AlertCount(1)));
        assert_eq!(rx.recv().await, Some(ViewEvent::AlertCleared));
    }

    #[tokio::test]
    async fn test_location_frame_updates_position() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));
        sync.clone()
            .handle_frame(r#"{"type":"location","data":{"lat":59.33,"long":18.07}}"#.to_string())
            .await;

        let snap = sync.snapshot().await;
        assert_eq!(snap.location, Some(DroneLocation { lat: 59.33, long: 18.07 }));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames_leave_state_untouched() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));
        sync.clone().handle_frame("not json".to_string()).await;
        sync.clone()
            .handle_frame(r#"{"type":"telemetry","data":{}}"#.to_string())
            .await;

        let snap = sync.snapshot().await;
        assert!(snap.current_alert.is_none());
        assert_eq!(snap.alert_count, 0);
        assert!(snap.location.is_none());
    }

    #[tokio::test]
    async fn test_empty_session_name_never_issues_request() {
        let control = Arc::new(MockControlPlane::default());
        let sync = new_sync(control.clone());

        let err = sync.start_session("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(control.start_names.lock().unwrap().is_empty());
        assert!(sync.snapshot().await.session.is_none());
    }

    #[tokio::test]
    async fn test_start_session_adopts_session_and_resets_mode() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));

        let session = sync.start_session("Night watch").await.unwrap();
        assert!(session.is_active());

        let snap = sync.snapshot().await;
        assert_eq!(snap.session.unwrap().id, session.id);
        assert_eq!(snap.connection, ConnectionStatus::Connected);
        assert_eq!(snap.mode, ProcessingMode::Detection);
    }

    #[tokio::test]
    async fn test_start_session_failure_leaves_state_unchanged() {
        let control = Arc::new(MockControlPlane::default());
        control.start_fails.store(true, Ordering::SeqCst);
        let sync = new_sync(control);

        assert!(sync.start_session("alpha").await.is_err());
        let snap = sync.snapshot().await;
        assert!(snap.session.is_none());
        assert_eq!(snap.connection, ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_session_clears_session_mode_and_display() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));
        sync.start_session("alpha").await.unwrap();
        sync.clone().handle_frame(alert_frame("a1", "onboard")).await;

        sync.stop_session().await.unwrap();

        let snap = sync.snapshot().await;
        assert!(snap.session.is_none());
        assert_eq!(snap.connection, ConnectionStatus::Disconnected);
        assert_eq!(snap.mode, ProcessingMode::Off);
        assert!(snap.current_alert.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_start_response_is_discarded() {
        let control = Arc::new(MockControlPlane::default());
        *control.start_delay.lock().unwrap() = Some(Duration::from_secs(3));
        let sync = new_sync(control);

        let slow_start = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.start_session("alpha").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        // A newer session command lands while the start is still in flight
        sync.stop_session().await.unwrap();

        let result = slow_start.await.unwrap();
        assert!(matches!(result, Err(Error::Superseded(_))));

        let snap = sync.snapshot().await;
        assert!(snap.session.is_none());
        assert_eq!(snap.mode, ProcessingMode::Off);
    }

    #[tokio::test]
    async fn test_check_active_session_adopts_discovered_session() {
        let control = Arc::new(MockControlPlane::default());
        *control.active_response.lock().unwrap() = Some(Session {
            id: 42,
            name: Some("Overnight".to_string()),
            started_at: Utc::now(),
            ended_at: None,
        });
        let sync = new_sync(control);

        sync.check_active_session().await;

        let snap = sync.snapshot().await;
        assert_eq!(snap.session.unwrap().id, 42);
        assert_eq!(snap.connection, ConnectionStatus::Connected);
        assert_eq!(snap.mode, ProcessingMode::Detection);
        assert!(!snap.session_loading);
    }

    #[tokio::test]
    async fn test_check_active_session_failure_resets_to_safe_default() {
        let control = Arc::new(MockControlPlane::default());
        control.active_fails.store(true, Ordering::SeqCst);
        let sync = new_sync(control);

        sync.check_active_session().await;

        let snap = sync.snapshot().await;
        assert!(snap.session.is_none());
        assert_eq!(snap.connection, ConnectionStatus::Disconnected);
        assert_eq!(snap.mode, ProcessingMode::Off);
        assert!(!snap.session_loading);
    }

    #[tokio::test]
    async fn test_switch_mode_failure_leaves_stale_mode() {
        let control = Arc::new(MockControlPlane::default());
        control.fail_face_on.store(true, Ordering::SeqCst);
        let sync = new_sync(control);

        sync.switch_mode(ProcessingKind::Detection).await.unwrap();
        assert_eq!(sync.snapshot().await.mode, ProcessingMode::Detection);

        assert!(sync.switch_mode(ProcessingKind::FaceRecognition).await.is_err());
        let snap = sync.snapshot().await;
        assert_eq!(snap.mode, ProcessingMode::Detection);
        assert!(!snap.switching_mode);
    }

    #[tokio::test]
    async fn test_turn_off_all_requires_both_commands_to_succeed() {
        let control = Arc::new(MockControlPlane::default());
        control.fail_detection_off.store(true, Ordering::SeqCst);
        let sync = new_sync(control.clone());

        sync.switch_mode(ProcessingKind::Detection).await.unwrap();
        assert!(sync.turn_off_all().await.is_err());

        let snap = sync.snapshot().await;
        assert_eq!(snap.mode, ProcessingMode::Detection);
        assert!(!snap.switching_mode);

        // Both off commands were issued regardless of the failure
        let calls = control.processing_calls.lock().unwrap();
        assert!(calls.contains(&(ProcessingKind::Detection, false)));
        assert!(calls.contains(&(ProcessingKind::FaceRecognition, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_commands_deduplicate_via_busy_flag() {
        let control = Arc::new(MockControlPlane::default());
        *control.processing_delay.lock().unwrap() = Some(Duration::from_secs(1));
        let sync = new_sync(control);

        let in_flight = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.switch_mode(ProcessingKind::Detection).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sync.snapshot().await.switching_mode);

        let err = sync.turn_off_all().await.unwrap_err();
        assert!(matches!(err, Error::Busy(_)));

        in_flight.await.unwrap().unwrap();
        let snap = sync.snapshot().await;
        assert_eq!(snap.mode, ProcessingMode::Detection);
        assert!(!snap.switching_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_alert_flows_through_live_intake() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));
        sync.clone().start().await;

        sync.clone().simulate_alert().await;
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let snap = sync.snapshot().await;
        assert_eq!(snap.alert_count, 1);
        let alert = snap.current_alert.expect("simulated alert should display");
        assert!(alert.confidence.unwrap() >= 0.7);
        assert!(alert.confidence.unwrap() < 1.0);
        assert_eq!(alert.drone_id.as_deref(), Some("drone-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_alert_falls_back_without_consumer() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));

        // No consumer started: the alert is applied directly and counts
        // immediately instead of through the batch window
        sync.clone().simulate_alert().await;

        let snap = sync.snapshot().await;
        assert_eq!(snap.alert_count, 1);
        assert!(snap.current_alert.is_some());
    }

    #[tokio::test]
    async fn test_socket_status_events_drive_connection_state() {
        let sync = new_sync(Arc::new(MockControlPlane::default()));

        sync.clone()
            .handle_socket_event(SocketEvent::Connecting)
            .await;
        assert_eq!(sync.snapshot().await.connection, ConnectionStatus::Connecting);

        sync.clone()
            .handle_socket_event(SocketEvent::Connected)
            .await;
        assert_eq!(sync.snapshot().await.connection, ConnectionStatus::Connected);

        sync.clone()
            .handle_socket_event(SocketEvent::Disconnected)
            .await;
        assert_eq!(
            sync.snapshot().await.connection,
            ConnectionStatus::Disconnected
        );
    }
}
