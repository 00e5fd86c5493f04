//! # OCPP Station
//!
//! Charging station side of OCPP 2.0.1.
//!
//! - `state`: session lifecycle and local EVSE/connector/transaction state
//! - `handlers`: CSMS-initiated calls (Reset, ChangeAvailability, ...)
//! - `station`: outbound operations, heartbeat and maintenance tasks
//! - `client`: WebSocket connection loop with backoff

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;
pub mod station;

pub use client::StationClient;
pub use config::StationConfig;
pub use error::StationError;
pub use handlers::{FollowUp, IDENTITY_MISMATCH};
pub use state::{SessionEvent, SessionState, StationState};
pub use station::ChargingStation;
