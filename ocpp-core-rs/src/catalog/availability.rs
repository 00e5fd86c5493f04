//! StatusNotification, ChangeAvailability, UnlockConnector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, OcppRequest};
use crate::enums::*;
use crate::error::ValidationError;
use crate::types::{check, Evse, StatusInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotificationRequest {
    pub timestamp: DateTime<Utc>,
    pub connector_status: ConnectorStatus,
    pub evse_id: i32,
    pub connector_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotificationResponse {}

impl OcppRequest for StatusNotificationRequest {
    const ACTION: Action = Action::StatusNotification;
    type Response = StatusNotificationResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::known("connectorStatus", self.connector_status.is_unknown())?;
        check::non_negative("evseId", self.evse_id as i64)?;
        check::non_negative("connectorId", self.connector_id as i64)
    }
}

/// ChangeAvailability request. Without `evse` the whole station is targeted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAvailabilityRequest {
    pub operational_status: OperationalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse: Option<Evse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAvailabilityResponse {
    pub status: ChangeAvailabilityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for ChangeAvailabilityRequest {
    const ACTION: Action = Action::ChangeAvailability;
    type Response = ChangeAvailabilityResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::known("operationalStatus", self.operational_status.is_unknown())?;
        if let Some(ref evse) = self.evse {
            evse.validate("evse.id")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConnectorRequest {
    pub evse_id: i32,
    pub connector_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConnectorResponse {
    pub status: UnlockStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for UnlockConnectorRequest {
    const ACTION: Action = Action::UnlockConnector;
    type Response = UnlockConnectorResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::non_negative("evseId", self.evse_id as i64)?;
        check::non_negative("connectorId", self.connector_id as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_notification_wire_shape() {
        let json = r#"{
            "timestamp": "2026-01-20T12:00:00Z",
            "connectorStatus": "Available",
            "evseId": 1,
            "connectorId": 1
        }"#;
        let request: StatusNotificationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.connector_status, ConnectorStatus::Available);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_change_availability_whole_station() {
        let request = ChangeAvailabilityRequest {
            operational_status: OperationalStatus::Inoperative,
            evse: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"operationalStatus":"Inoperative"}"#
        );
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_unknown_operational_status_rejected() {
        let request: ChangeAvailabilityRequest =
            serde_json::from_str(r#"{"operationalStatus":"operative"}"#).unwrap();
        assert_eq!(request.operational_status, OperationalStatus::Unknown);
        assert_eq!(request.validate().unwrap_err().field, "operationalStatus");
    }

    #[test]
    fn test_unlock_connector_negative_id() {
        let request = UnlockConnectorRequest {
            evse_id: 1,
            connector_id: -3,
        };
        assert_eq!(request.validate().unwrap_err().field, "connectorId");
    }
}
