//! DataTransfer (either direction)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Action, OcppRequest};
use crate::enums::*;
use crate::error::ValidationError;
use crate::types::{check, StatusInfo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub vendor_id: String,
}

impl DataTransferRequest {
    pub fn new(vendor_id: impl Into<String>) -> Self {
        Self {
            message_id: None,
            data: None,
            vendor_id: vendor_id.into(),
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Echo transformation: strings and arrays reversed, anything else as is
    pub fn reversed_data(&self) -> Option<Value> {
        self.data.as_ref().map(|data| match data {
            Value::String(text) => Value::String(text.chars().rev().collect()),
            Value::Array(items) => Value::Array(items.iter().rev().cloned().collect()),
            other => other.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferResponse {
    pub status: DataTransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl DataTransferResponse {
    pub fn status(status: DataTransferStatus) -> Self {
        Self {
            status,
            data: None,
            status_info: None,
        }
    }
}

impl OcppRequest for DataTransferRequest {
    const ACTION: Action = Action::DataTransfer;
    type Response = DataTransferResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::text("vendorId", &self.vendor_id, 255)?;
        if let Some(ref message_id) = self.message_id {
            check::max_len("messageId", message_id, 50)?;
        }
        Ok(())
    }
}
