//! BootNotification, Heartbeat, Reset, TriggerMessage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, OcppRequest};
use crate::enums::*;
use crate::error::ValidationError;
use crate::types::{check, ChargingStationInfo, Evse, StatusInfo};

/// BootNotification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charging_station: ChargingStationInfo,
    pub reason: BootReason,
}

/// BootNotification response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub current_time: DateTime<Utc>,
    /// Heartbeat interval in seconds
    pub interval: i32,
    pub status: RegistrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for BootNotificationRequest {
    const ACTION: Action = Action::BootNotification;
    type Response = BootNotificationResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        self.charging_station.validate()
    }
}

/// Heartbeat request (empty payload)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

/// Heartbeat response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

impl OcppRequest for HeartbeatRequest {
    const ACTION: Action = Action::Heartbeat;
    type Response = HeartbeatResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    #[serde(rename = "type")]
    pub reset_type: ResetType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub status: ResetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for ResetRequest {
    const ACTION: Action = Action::Reset;
    type Response = ResetResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::known("type", self.reset_type.is_unknown())?;
        if let Some(evse_id) = self.evse_id {
            check::non_negative("evseId", evse_id as i64)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMessageRequest {
    pub requested_message: MessageTrigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse: Option<Evse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMessageResponse {
    pub status: TriggerMessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for TriggerMessageRequest {
    const ACTION: Action = Action::TriggerMessage;
    type Response = TriggerMessageResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::known("requestedMessage", self.requested_message.is_unknown())?;
        if let Some(ref evse) = self.evse {
            evse.validate("evse.id")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station_info() -> ChargingStationInfo {
        ChargingStationInfo {
            model: "EK3-OCPP".to_string(),
            vendor_name: "Elektrokombinacija".to_string(),
            serial_number: None,
            firmware_version: Some("0.1.0".to_string()),
        }
    }

    #[test]
    fn test_boot_notification_wire_shape() {
        let request = BootNotificationRequest {
            charging_station: station_info(),
            reason: BootReason::PowerUp,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["chargingStation"]["vendorName"], "Elektrokombinacija");
        assert_eq!(json["reason"], "PowerUp");
        assert!(json["chargingStation"].get("serialNumber").is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_boot_notification_model_too_long() {
        let mut info = station_info();
        info.model = "M".repeat(21);
        let request = BootNotificationRequest {
            charging_station: info,
            reason: BootReason::PowerUp,
        };
        assert_eq!(request.validate().unwrap_err().field, "chargingStation.model");
    }

    #[test]
    fn test_heartbeat_payload_is_empty_object() {
        assert_eq!(serde_json::to_string(&HeartbeatRequest {}).unwrap(), "{}");
        let response: HeartbeatResponse =
            serde_json::from_str(r#"{"currentTime":"2026-01-20T12:00:00Z"}"#).unwrap();
        assert_eq!(response.current_time.to_rfc3339(), "2026-01-20T12:00:00+00:00");
    }

    #[test]
    fn test_reset_validation() {
        let ok = ResetRequest {
            reset_type: ResetType::Immediate,
            evse_id: None,
        };
        assert!(ok.validate().is_ok());
        assert_eq!(serde_json::to_string(&ok).unwrap(), r#"{"type":"Immediate"}"#);

        let bad: ResetRequest = serde_json::from_str(r#"{"type":"Sometime"}"#).unwrap();
        assert_eq!(bad.validate().unwrap_err().field, "type");

        let negative = ResetRequest {
            reset_type: ResetType::OnIdle,
            evse_id: Some(-1),
        };
        assert_eq!(negative.validate().unwrap_err().field, "evseId");
    }

    #[test]
    fn test_missing_mandatory_field_fails_decode() {
        let err = serde_json::from_str::<ResetRequest>("{}").unwrap_err();
        assert!(err.to_string().contains("type"));
    }
}
