//! Station error types

use ocpp_core::CallFailure;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum StationError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Invalid CSMS URL: {0}")]
    InvalidUrl(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Call failed: {0}")]
    Call(#[from] CallFailure),
}
