//! DroneDeck Console Core
//!
//! Client-side state core for a drone surveillance operations console.
//! All business logic (drone control, session persistence, AI inference,
//! alert storage) lives in the backend; this crate mirrors its state over
//! HTTP and a realtime event socket and issues operator commands.
//!
//! ## Architecture (6 Components)
//!
//! 1. Synchronizer - session/alert/connection state authority
//! 2. BackendClient - REST adapter (sessions, modes, history, dispatch)
//! 3. EventSocket - reconnecting WebSocket listener
//! 4. ViewHub - state-change fan-out to console views
//! 5. GridRef - lat/lon ↔ MGRS conversion for the dispatch panel
//! 6. Models - shared wire/domain types
//!
//! ## Design Principles
//!
//! - One state owner: the synchronizer is the only writer of mirrored state
//! - Message passing: socket frames are consumed by a single intake task
//! - Invalid states unrepresentable: processing mode is one tagged value

pub mod backend_client;
pub mod error;
pub mod event_socket;
pub mod grid_ref;
pub mod models;
pub mod state;
pub mod synchronizer;
pub mod view_hub;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState, SyncTimings};
pub use synchronizer::{Synchronizer, SyncSnapshot};
