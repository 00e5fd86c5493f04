//! Error taxonomy
//!
//! - [`OcppError`]: framing and transport problems (`thiserror`), used while
//!   decoding frames and writing to a connection.
//! - [`ValidationError`]: a request that must not leave the process.
//! - [`CallFailure`]: the failure half of every call outcome. Callers of an
//!   outbound operation always get `Result<T, CallFailure>`, never a panic or
//!   an indefinitely pending future.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::messages::ErrorCode;

/// Reason text for calls against a station that has no live connection
pub const UNREACHABLE_STATION: &str = "Unknown or unreachable charge box!";

/// Errors in OCPP framing and transport
#[derive(Debug, Error)]
pub enum OcppError {
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid message format")]
    InvalidFormat,

    #[error("Unknown message type: {0}")]
    UnknownMessageType(i64),

    #[error("Connection closed")]
    ConnectionClosed,
}

/// A request field failed its schema constraints
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid field `{field}`: {reason}")]
pub struct ValidationError {
    /// OCPP (camelCase) path of the offending field
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Payload that does not even decode. The field is the path serde
    /// stopped at; a missing field is appended to the path of its parent.
    pub fn decode(err: &serde_path_to_error::Error<serde_json::Error>) -> Self {
        let reason = err.inner().to_string();
        let path = err.path().to_string();
        let field = match missing_field(&reason) {
            Some(missing) if path == "." => missing.to_string(),
            Some(missing) => format!("{}.{}", path, missing),
            None => path,
        };
        Self::new(field, reason)
    }

    /// Decode a JSON payload, naming the offending field on failure
    pub fn from_payload<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T, Self> {
        serde_path_to_error::deserialize(payload).map_err(|e| Self::decode(&e))
    }
}

/// Name from serde's "missing field `name`" message
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

/// Closed set of failure kinds for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Request rejected locally before any network interaction
    Validation,
    /// No live connection for the target station
    Routing,
    /// No matching response within the request timeout
    Timeout,
    /// Undecodable frame or payload, unknown action, CALLERROR from the peer
    Protocol,
    /// Application logic failed while processing a call
    HandlerFault,
    /// Caller canceled the request before a response arrived
    Canceled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Transport/processing outcome of a call, independent of the payload status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Accepted,
    GenericError,
    /// Failure synthesized on this side (unreachable peer, timeout, cancel)
    Server,
}

/// Failure half of a call outcome
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct CallFailure {
    pub kind: FailureKind,
    pub message: String,
    /// CALLERROR code, when the failure came from (or goes to) the wire
    pub error_code: Option<ErrorCode>,
    pub details: Value,
}

/// Outcome of any call: typed payload or typed failure
pub type CallOutcome<T> = Result<T, CallFailure>;

impl CallFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            error_code: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self::new(FailureKind::Routing, UNREACHABLE_STATION)
    }

    pub fn timeout(action: &str, request_id: &str) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("{} ({}) timed out waiting for a response", action, request_id),
        )
    }

    pub fn canceled(action: &str, request_id: &str) -> Self {
        Self::new(
            FailureKind::Canceled,
            format!("{} ({}) was canceled", action, request_id),
        )
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Protocol, message)
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(FailureKind::HandlerFault, message)
    }

    /// Failure reported by the peer through a CALLERROR frame
    pub fn remote(code: ErrorCode, description: impl Into<String>, details: Value) -> Self {
        let kind = match code {
            ErrorCode::InternalError | ErrorCode::GenericError => FailureKind::HandlerFault,
            _ => FailureKind::Protocol,
        };
        Self {
            kind,
            message: description.into(),
            error_code: Some(code),
            details,
        }
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn result_code(&self) -> ResultCode {
        match self.kind {
            FailureKind::Routing | FailureKind::Timeout | FailureKind::Canceled => ResultCode::Server,
            FailureKind::Validation | FailureKind::Protocol | FailureKind::HandlerFault => {
                ResultCode::GenericError
            }
        }
    }

    /// CALLERROR code to answer a peer with when this failure happened while
    /// processing its call
    pub fn wire_code(&self) -> ErrorCode {
        if let Some(code) = self.error_code {
            return code;
        }
        match self.kind {
            FailureKind::Validation => ErrorCode::FormatViolation,
            FailureKind::Protocol => ErrorCode::ProtocolError,
            FailureKind::HandlerFault => ErrorCode::InternalError,
            FailureKind::Routing | FailureKind::Timeout | FailureKind::Canceled => {
                ErrorCode::GenericError
            }
        }
    }
}

impl From<ValidationError> for CallFailure {
    fn from(err: ValidationError) -> Self {
        let mut failure = CallFailure::new(FailureKind::Validation, err.to_string());
        failure.details = serde_json::json!({ "field": err.field });
        failure
    }
}

/// Result code of a call outcome, `Accepted` for success
pub fn result_code<T>(outcome: &CallOutcome<T>) -> ResultCode {
    match outcome {
        Ok(_) => ResultCode::Accepted,
        Err(failure) => failure.result_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataTransferRequest, SetChargingProfileRequest};
    use serde_json::json;

    #[test]
    fn test_decode_names_missing_field() {
        let err = ValidationError::from_payload::<DataTransferRequest>(json!({ "data": "x" }))
            .unwrap_err();
        assert_eq!(err.field, "vendorId");
        assert!(err.reason.contains("missing field"));
    }

    #[test]
    fn test_decode_names_nested_and_mistyped_fields() {
        let err = ValidationError::from_payload::<SetChargingProfileRequest>(json!({
            "evseId": 1,
            "chargingProfile": {
                "stackLevel": 0,
                "chargingProfilePurpose": "TxDefaultProfile",
                "chargingProfileKind": "Absolute",
                "chargingSchedule": []
            }
        }))
        .unwrap_err();
        assert_eq!(err.field, "chargingProfile.id");

        let err = ValidationError::from_payload::<SetChargingProfileRequest>(json!({
            "evseId": "one"
        }))
        .unwrap_err();
        assert_eq!(err.field, "evseId");
        assert!(err.reason.contains("invalid type"));
    }

    #[test]
    fn test_unreachable_is_server_result() {
        let failure = CallFailure::unreachable();
        assert_eq!(failure.kind, FailureKind::Routing);
        assert_eq!(failure.result_code(), ResultCode::Server);
        assert_eq!(failure.message, "Unknown or unreachable charge box!");
    }

    #[test]
    fn test_remote_error_classification() {
        let internal = CallFailure::remote(ErrorCode::InternalError, "boom", Value::Null);
        assert_eq!(internal.kind, FailureKind::HandlerFault);

        let missing = CallFailure::remote(ErrorCode::NotImplemented, "nope", Value::Null);
        assert_eq!(missing.kind, FailureKind::Protocol);
        assert_eq!(missing.wire_code(), ErrorCode::NotImplemented);
    }

    #[test]
    fn test_validation_failure_names_field() {
        let failure: CallFailure = ValidationError::new("vendorId", "must not be empty").into();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(failure.details["field"], "vendorId");
        assert_eq!(failure.wire_code(), ErrorCode::FormatViolation);
        assert!(failure.message.contains("vendorId"));
    }

    #[test]
    fn test_result_code_of_outcome() {
        let ok: CallOutcome<()> = Ok(());
        assert_eq!(result_code(&ok), ResultCode::Accepted);
        let err: CallOutcome<()> = Err(CallFailure::protocol("bad frame"));
        assert_eq!(result_code(&err), ResultCode::GenericError);
    }
}
