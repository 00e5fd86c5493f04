//! # OCPP Core
//!
//! OCPP 2.0.1 protocol engine shared by the CSMS and the charging station.
//!
//! ## Architecture
//!
//! ```text
//!   typed request ──► Endpoint::call ──► FrameSink ──► carrier (WebSocket / pipe)
//!                        ▲   waiter map                      │
//!                        │                                   ▼
//!   typed response ◄─────┴──── Endpoint::handle_frame ◄── received frame
//!                                    │
//!                                    ▼  CALL
//!                              Router ──► handler task ──► CALLRESULT / CALLERROR
//! ```
//!
//! - `messages`: JSON-RPC framing (CALL, CALLRESULT, CALLERROR)
//! - `enums`: closed vocabularies with an `Unknown` fallback
//! - `types`: shared complex payload types
//! - `catalog`: one request/response pair per action
//! - `dispatch`: correlation engine and inbound routing
//! - `observer`: listener lists for dispatch hooks
//! - `transport`: frame sink and in-memory pipe
//! - `schedule`: periodic tasks that skip overlapping cycles

pub mod catalog;
pub mod dispatch;
pub mod enums;
pub mod error;
pub mod messages;
pub mod observer;
pub mod schedule;
pub mod transport;
pub mod types;

pub use catalog::{Action, OcppRequest};
pub use dispatch::{
    CallContext, CallOptions, DispatchConfig, Dispatcher, Endpoint, Hooks, RequestEnvelope,
    ResponseEnvelope, Role, Router,
};
pub use error::{
    result_code, CallFailure, CallOutcome, FailureKind, OcppError, ResultCode, ValidationError,
    UNREACHABLE_STATION,
};
pub use messages::{ErrorCode, OcppMessage};
pub use observer::{ListenerId, Observers};
pub use schedule::PeriodicTask;
pub use transport::{pipe, FrameSink, PipeEnd};
pub use types::StationId;
