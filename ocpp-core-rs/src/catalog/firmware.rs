//! UpdateFirmware, FirmwareStatusNotification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, OcppRequest};
use crate::enums::*;
use crate::error::ValidationError;
use crate::types::{check, StatusInfo};

/// Firmware image to download and install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firmware {
    pub location: String,
    pub retrieve_date_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFirmwareRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<i32>,
    pub request_id: i32,
    pub firmware: Firmware,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFirmwareResponse {
    pub status: UpdateFirmwareStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for UpdateFirmwareRequest {
    const ACTION: Action = Action::UpdateFirmware;
    type Response = UpdateFirmwareResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(retries) = self.retries {
            check::non_negative("retries", retries as i64)?;
        }
        if let Some(interval) = self.retry_interval {
            check::non_negative("retryInterval", interval as i64)?;
        }
        check::non_negative("requestId", self.request_id as i64)?;
        check::text("firmware.location", &self.firmware.location, 512)?;
        if let Some(ref cert) = self.firmware.signing_certificate {
            check::max_len("firmware.signingCertificate", cert, 5500)?;
        }
        if let Some(ref signature) = self.firmware.signature {
            check::max_len("firmware.signature", signature, 800)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareStatusNotificationRequest {
    pub status: FirmwareStatus,
    /// Id of the UpdateFirmware request this status belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareStatusNotificationResponse {}

impl OcppRequest for FirmwareStatusNotificationRequest {
    const ACTION: Action = Action::FirmwareStatusNotification;
    type Response = FirmwareStatusNotificationResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::known("status", self.status.is_unknown())?;
        // Idle carries no request id; every other status belongs to one
        if self.status != FirmwareStatus::Idle && self.request_id.is_none() {
            return Err(ValidationError::new("requestId", "required unless status is Idle"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update() -> UpdateFirmwareRequest {
        UpdateFirmwareRequest {
            retries: Some(3),
            retry_interval: None,
            request_id: 41,
            firmware: Firmware {
                location: "https://firmware.example.com/ek3-0.2.0.bin".to_string(),
                retrieve_date_time: "2026-01-20T12:00:00Z".parse().unwrap(),
                install_date_time: None,
                signing_certificate: None,
                signature: None,
            },
        }
    }

    #[test]
    fn test_update_firmware_validation() {
        assert!(update().validate().is_ok());

        let mut empty = update();
        empty.firmware.location = String::new();
        assert_eq!(empty.validate().unwrap_err().field, "firmware.location");

        let mut retries = update();
        retries.retries = Some(-1);
        assert_eq!(retries.validate().unwrap_err().field, "retries");
    }

    #[test]
    fn test_firmware_status_request_id_rule() {
        let idle = FirmwareStatusNotificationRequest {
            status: FirmwareStatus::Idle,
            request_id: None,
        };
        assert!(idle.validate().is_ok());

        let downloading = FirmwareStatusNotificationRequest {
            status: FirmwareStatus::Downloading,
            request_id: None,
        };
        assert_eq!(downloading.validate().unwrap_err().field, "requestId");
    }
}
