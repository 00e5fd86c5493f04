//! OCPP 2.0.1 JSON-RPC message framing
//!
//! OCPP uses a JSON array envelope over WebSocket:
//! - CALL: [2, messageId, action, payload]
//! - CALLRESULT: [3, messageId, payload]
//! - CALLERROR: [4, messageId, errorCode, errorDescription, errorDetails]

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::OcppError;

/// OCPP message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

/// OCPP error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FormatViolation,
    GenericError,
    InternalError,
    MessageTypeNotSupported,
    NotImplemented,
    NotSupported,
    OccurrenceConstraintViolation,
    PropertyConstraintViolation,
    ProtocolError,
    RpcFrameworkError,
    SecurityError,
    TypeConstraintViolation,
}

impl ErrorCode {
    /// Decode a wire error code; unrecognised codes become `GenericError`
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "FormatViolation" => ErrorCode::FormatViolation,
            "GenericError" => ErrorCode::GenericError,
            "InternalError" => ErrorCode::InternalError,
            "MessageTypeNotSupported" => ErrorCode::MessageTypeNotSupported,
            "NotImplemented" => ErrorCode::NotImplemented,
            "NotSupported" => ErrorCode::NotSupported,
            "OccurrenceConstraintViolation" => ErrorCode::OccurrenceConstraintViolation,
            "PropertyConstraintViolation" => ErrorCode::PropertyConstraintViolation,
            "ProtocolError" => ErrorCode::ProtocolError,
            "RpcFrameworkError" => ErrorCode::RpcFrameworkError,
            "SecurityError" => ErrorCode::SecurityError,
            "TypeConstraintViolation" => ErrorCode::TypeConstraintViolation,
            _ => ErrorCode::GenericError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(ErrorCode::parse(&text))
    }
}

/// OCPP CALL message (request)
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub message_id: String,
    pub action: String,
    pub payload: Value,
}

impl Call {
    pub fn new(
        message_id: impl Into<String>,
        action: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<Self, OcppError> {
        Ok(Self {
            message_id: message_id.into(),
            action: action.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize to OCPP wire format: [2, messageId, action, payload]
    pub fn to_bytes(&self) -> Result<Vec<u8>, OcppError> {
        let array = serde_json::json!([
            MessageType::Call as i32,
            &self.message_id,
            &self.action,
            &self.payload
        ]);
        Ok(serde_json::to_vec(&array)?)
    }
}

/// OCPP CALLRESULT message (success response)
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub message_id: String,
    pub payload: Value,
}

impl CallResult {
    pub fn new(message_id: impl Into<String>, payload: impl Serialize) -> Result<Self, OcppError> {
        Ok(Self {
            message_id: message_id.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize to OCPP wire format: [3, messageId, payload]
    pub fn to_bytes(&self) -> Result<Vec<u8>, OcppError> {
        let array = serde_json::json!([
            MessageType::CallResult as i32,
            &self.message_id,
            &self.payload
        ]);
        Ok(serde_json::to_vec(&array)?)
    }

    /// Parse the payload as a specific response type
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, OcppError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// OCPP CALLERROR message (error response)
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub message_id: String,
    pub error_code: ErrorCode,
    pub error_description: String,
    pub error_details: Value,
}

impl CallError {
    pub fn new(
        message_id: impl Into<String>,
        error_code: ErrorCode,
        error_description: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            error_code,
            error_description: error_description.into(),
            error_details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        if details.is_object() {
            self.error_details = details;
        }
        self
    }

    /// Serialize to OCPP wire format: [4, messageId, errorCode, errorDescription, errorDetails]
    pub fn to_bytes(&self) -> Result<Vec<u8>, OcppError> {
        let array = serde_json::json!([
            MessageType::CallError as i32,
            &self.message_id,
            self.error_code.to_string(),
            &self.error_description,
            &self.error_details
        ]);
        Ok(serde_json::to_vec(&array)?)
    }
}

/// Parsed OCPP message (any type)
#[derive(Debug, Clone, PartialEq)]
pub enum OcppMessage {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

impl OcppMessage {
    /// Parse an OCPP message from JSON bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, OcppError> {
        let array: Vec<Value> = serde_json::from_slice(bytes)?;

        if array.is_empty() {
            return Err(OcppError::InvalidFormat);
        }

        let msg_type = array[0].as_i64().ok_or(OcppError::InvalidFormat)?;

        match msg_type {
            2 => {
                // CALL: [2, messageId, action, payload]
                if array.len() != 4 {
                    return Err(OcppError::InvalidFormat);
                }

                let message_id = message_id_of(&array)?;
                let action = array[2].as_str().ok_or(OcppError::InvalidFormat)?.to_string();
                let payload = array[3].clone();
                if !payload.is_object() {
                    return Err(OcppError::InvalidFormat);
                }

                Ok(OcppMessage::Call(Call {
                    message_id,
                    action,
                    payload,
                }))
            }
            3 => {
                // CALLRESULT: [3, messageId, payload]
                if array.len() != 3 {
                    return Err(OcppError::InvalidFormat);
                }

                let message_id = message_id_of(&array)?;
                let payload = array[2].clone();

                Ok(OcppMessage::CallResult(CallResult {
                    message_id,
                    payload,
                }))
            }
            4 => {
                // CALLERROR: [4, messageId, errorCode, errorDescription, errorDetails]
                if array.len() != 5 {
                    return Err(OcppError::InvalidFormat);
                }

                let message_id = message_id_of(&array)?;
                let error_code = ErrorCode::parse(array[2].as_str().ok_or(OcppError::InvalidFormat)?);
                let error_description = array[3].as_str().unwrap_or("").to_string();
                let error_details = array[4].clone();

                Ok(OcppMessage::CallError(CallError {
                    message_id,
                    error_code,
                    error_description,
                    error_details,
                }))
            }
            _ => Err(OcppError::UnknownMessageType(msg_type)),
        }
    }

    /// Message id of a frame that claims to be a CALL, even when the rest of
    /// the frame is malformed. Used to answer bad calls with a CALLERROR.
    pub fn salvage_call_id(bytes: &[u8]) -> Option<String> {
        let array: Vec<Value> = serde_json::from_slice(bytes).ok()?;
        if array.first()?.as_i64()? != MessageType::Call as i64 {
            return None;
        }
        array.get(1)?.as_str().map(str::to_string)
    }

    /// Get the message ID
    pub fn message_id(&self) -> &str {
        match self {
            OcppMessage::Call(c) => &c.message_id,
            OcppMessage::CallResult(r) => &r.message_id,
            OcppMessage::CallError(e) => &e.message_id,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, OcppError> {
        match self {
            OcppMessage::Call(c) => c.to_bytes(),
            OcppMessage::CallResult(r) => r.to_bytes(),
            OcppMessage::CallError(e) => e.to_bytes(),
        }
    }

    /// Serialize to a text frame
    pub fn to_text(&self) -> Result<String, OcppError> {
        let bytes = self.to_bytes()?;
        String::from_utf8(bytes).map_err(|_| OcppError::InvalidFormat)
    }
}

fn message_id_of(array: &[Value]) -> Result<String, OcppError> {
    let id = array[1].as_str().ok_or(OcppError::InvalidFormat)?;
    if id.is_empty() || id.len() > 36 {
        return Err(OcppError::InvalidFormat);
    }
    Ok(id.to_string())
}
