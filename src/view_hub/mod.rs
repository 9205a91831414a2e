//! ViewHub - Console View Distribution
//!
//! ## Responsibilities
//!
//! - View subscription management
//! - Fan-out of synchronizer state changes to every registered view
//!
//! Views are in-process consumers (map, live alert banner, status badge),
//! so events are delivered as typed values rather than serialized frames.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Alert, ConnectionStatus, DroneLocation, ProcessingMode, Session};

/// State-change event pushed to console views
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ViewEvent {
    Connection(ConnectionStatus),
    Session(Option<Session>),
    AlertShown(Alert),
    AlertCleared,
    Location(DroneLocation),
    Mode(ProcessingMode),
    AlertCount(u64),
}

/// View subscription
struct ViewSubscription {
    id: Uuid,
    label: String,
    tx: mpsc::UnboundedSender<ViewEvent>,
}

/// ViewHub instance
pub struct ViewHub {
    subscriptions: RwLock<HashMap<Uuid, ViewSubscription>>,
    subscriber_count: AtomicU64,
}

impl ViewHub {
    /// Create new ViewHub
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            subscriber_count: AtomicU64::new(0),
        }
    }

    /// Register a new view
    pub async fn register(&self, label: &str) -> (Uuid, mpsc::UnboundedReceiver<ViewEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let subscription = ViewSubscription {
            id,
            label: label.to_string(),
            tx,
        };

        {
            let mut subscriptions = self.subscriptions.write().await;
            subscriptions.insert(id, subscription);
        }

        self.subscriber_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(subscription_id = %id, label = %label, "View registered");

        (id, rx)
    }

    /// Unregister a view
    pub async fn unregister(&self, id: &Uuid) {
        let mut subscriptions = self.subscriptions.write().await;
        if subscriptions.remove(id).is_some() {
            self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(subscription_id = %id, "View unregistered");
        }
    }

    /// Broadcast an event to all views, pruning any that went away
    pub async fn broadcast(&self, event: ViewEvent) {
        let mut dead = Vec::new();

        {
            let subscriptions = self.subscriptions.read().await;
            for subscription in subscriptions.values() {
                if subscription.tx.send(event.clone()).is_err() {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        label = %subscription.label,
                        "View receiver gone, pruning"
                    );
                    dead.push(subscription.id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscriptions = self.subscriptions.write().await;
            for id in dead {
                if subscriptions.remove(&id).is_some() {
                    self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Get subscriber count
    pub fn subscriber_count(&self) -> u64 {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

impl Default for ViewHub {
    fn default() -> Self {
        Self::new()
    }
}
