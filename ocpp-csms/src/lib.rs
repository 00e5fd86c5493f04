//! # OCPP CSMS
//!
//! Central side of OCPP 2.0.1: keeps one routable connection per station,
//! answers station-initiated calls and sends CSMS-initiated commands.
//!
//! - `registry`: station id to connection map with bounded lock waits
//! - `handlers`: BootNotification, Heartbeat, TransactionEvent, ...
//! - `state`: last-known station state for the admin query surface
//! - `csms`: facade tying dispatcher, registry and state together
//! - `server`: WebSocket carrier

pub mod config;
pub mod csms;
pub mod handlers;
pub mod registry;
pub mod server;
pub mod state;

pub use config::CsmsConfig;
pub use csms::Csms;
pub use registry::{ConnectionRecord, RegistryError, RegistryEvent, StationRegistry};
pub use server::{CsmsServer, ServerError};
pub use state::{StationSnapshot, TransactionSnapshot};
