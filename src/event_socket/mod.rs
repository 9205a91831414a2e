//! Event socket - backend realtime stream client
//!
//! ## Responsibilities
//!
//! - Long-lived WebSocket connection to the backend event stream
//! - Unconditional fixed-delay reconnect (no backoff, no retry ceiling)
//! - Duplicate-connection suppression
//! - Forwarding of transport status and raw frames into the synchronizer
//!
//! The transport sits behind `SocketDriver` so the reconnect loop can be
//! exercised against a scripted driver. Inbound only: nothing on this side
//! ever writes to the socket.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Transport-level failures
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("socket not connected")]
    NotConnected,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Event forwarded to the synchronizer intake channel
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// A connection attempt is starting
    Connecting,
    /// The socket is open
    Connected,
    /// The socket closed or errored; a reconnect is pending
    Disconnected,
    /// One inbound text frame, unparsed
    Frame(String),
}

/// Minimal transport seam under the listener loop
#[async_trait]
pub trait SocketDriver: Send {
    /// Open the connection. Must be a no-op when already connected.
    async fn connect(&mut self) -> Result<(), SocketError>;

    /// Next text frame. `Ok(None)` means the peer closed the connection
    /// in an orderly way; an error means the transport broke. Both leave
    /// the driver disconnected.
    async fn next_frame(&mut self) -> Result<Option<String>, SocketError>;

    /// Drop the connection, if any
    async fn close(&mut self);

    fn is_connected(&self) -> bool;
}

/// Production WebSocket driver
pub struct WsDriver {
    url: String,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsDriver {
    pub fn new(url: String) -> Self {
        Self { url, stream: None }
    }
}

#[async_trait]
impl SocketDriver for WsDriver {
    async fn connect(&mut self) -> Result<(), SocketError> {
        if self.stream.is_some() {
            debug!("Socket already open, skipping connection attempt");
            return Ok(());
        }

        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SocketError::Connect(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<String>, SocketError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(SocketError::NotConnected);
        };

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => {
                    self.stream = None;
                    return Ok(None);
                }
                // Control and binary frames carry nothing for this side
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(SocketError::Transport(e.to_string()));
                }
            }
        }
    }

    async fn close(&mut self) {
        self.stream = None;
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Reconnecting listener that pumps one driver into the intake channel
pub struct SocketListener<D: SocketDriver> {
    driver: D,
    intake: mpsc::UnboundedSender<SocketEvent>,
    reconnect_delay: Duration,
}

impl<D: SocketDriver + 'static> SocketListener<D> {
    pub fn new(
        driver: D,
        intake: mpsc::UnboundedSender<SocketEvent>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            driver,
            intake,
            reconnect_delay,
        }
    }

    /// Run until the intake channel is dropped.
    ///
    /// A single task owns the driver, so at most one connection can exist;
    /// a close while a reconnect is already pending just rides the same
    /// delay instead of spawning a second socket.
    pub async fn run(mut self) {
        loop {
            if !self.driver.is_connected() {
                if self.forward(SocketEvent::Connecting).is_err() {
                    break;
                }

                match self.driver.connect().await {
                    Ok(()) => {
                        info!("Event socket connected");
                        if self.forward(SocketEvent::Connected).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Event socket connect failed");
                        if self.forward(SocketEvent::Disconnected).is_err() {
                            break;
                        }
                        tokio::time::sleep(self.reconnect_delay).await;
                        continue;
                    }
                }
            }

            match self.driver.next_frame().await {
                Ok(Some(frame)) => {
                    if self.forward(SocketEvent::Frame(frame)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Event socket closed by peer");
                    if self.forward(SocketEvent::Disconnected).is_err() {
                        break;
                    }
                    tokio::time::sleep(self.reconnect_delay).await;
                }
                Err(e) => {
                    warn!(error = %e, "Event socket transport error");
                    if self.forward(SocketEvent::Disconnected).is_err() {
                        break;
                    }
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }

        self.driver.close().await;
        debug!("Intake channel gone; socket listener exiting");
    }

    fn forward(&self, event: SocketEvent) -> Result<(), ()> {
        self.intake.send(event).map_err(|_| ())
    }
}
