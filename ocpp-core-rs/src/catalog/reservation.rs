//! ReserveNow, CancelReservation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, OcppRequest};
use crate::enums::*;
use crate::error::ValidationError;
use crate::types::{check, IdToken, StatusInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveNowRequest {
    pub id: i32,
    pub expiry_date_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_type: Option<String>,
    pub id_token: IdToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id_token: Option<IdToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveNowResponse {
    pub status: ReserveNowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for ReserveNowRequest {
    const ACTION: Action = Action::ReserveNow;
    type Response = ReserveNowResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::non_negative("id", self.id as i64)?;
        if let Some(ref connector_type) = self.connector_type {
            check::text("connectorType", connector_type, 20)?;
        }
        self.id_token.validate()?;
        if let Some(evse_id) = self.evse_id {
            check::non_negative("evseId", evse_id as i64)?;
        }
        if let Some(ref group) = self.group_id_token {
            group.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReservationRequest {
    pub reservation_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReservationResponse {
    pub status: CancelReservationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for CancelReservationRequest {
    const ACTION: Action = Action::CancelReservation;
    type Response = CancelReservationResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::non_negative("reservationId", self.reservation_id as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_now_shape_and_validation() {
        let request = ReserveNowRequest {
            id: 12,
            expiry_date_time: "2026-01-20T13:00:00Z".parse().unwrap(),
            connector_type: None,
            id_token: IdToken::central("TOKEN-1"),
            evse_id: Some(1),
            group_id_token: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["expiryDateTime"], "2026-01-20T13:00:00Z");
        assert_eq!(json["evseId"], 1);
        assert!(request.validate().is_ok());

        let mut negative = request.clone();
        negative.id = -5;
        assert_eq!(negative.validate().unwrap_err().field, "id");
    }

    #[test]
    fn test_cancel_reservation_unknown_status_decodes() {
        let response: CancelReservationResponse =
            serde_json::from_str(r#"{"status":"Maybe"}"#).unwrap();
        assert_eq!(response.status, CancelReservationStatus::Unknown);
    }
}
