//! TransactionEvent, MeterValues and remote start/stop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, OcppRequest};
use crate::enums::*;
use crate::error::ValidationError;
use crate::types::{
    check, ChargingProfile, Evse, IdToken, IdTokenInfo, MeterValue, StatusInfo, TransactionInfo,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEventRequest {
    pub event_type: TransactionEventType,
    pub timestamp: DateTime<Utc>,
    pub trigger_reason: TriggerReason,
    /// Per-transaction sequence number, incremented for every event
    pub seq_no: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_phases_used: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cable_max_current: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i32>,
    pub transaction_info: TransactionInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<IdToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse: Option<Evse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meter_value: Vec<MeterValue>,
}

impl TransactionEventRequest {
    pub fn new(
        event_type: TransactionEventType,
        trigger_reason: TriggerReason,
        seq_no: i32,
        transaction_info: TransactionInfo,
    ) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            trigger_reason,
            seq_no,
            offline: None,
            number_of_phases_used: None,
            cable_max_current: None,
            reservation_id: None,
            transaction_info,
            id_token: None,
            evse: None,
            meter_value: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEventResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_info: Option<IdTokenInfo>,
}

impl OcppRequest for TransactionEventRequest {
    const ACTION: Action = Action::TransactionEvent;
    type Response = TransactionEventResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::known("eventType", self.event_type.is_unknown())?;
        check::known("triggerReason", self.trigger_reason.is_unknown())?;
        check::non_negative("seqNo", self.seq_no as i64)?;
        check::text(
            "transactionInfo.transactionId",
            &self.transaction_info.transaction_id,
            36,
        )?;
        if let Some(phases) = self.number_of_phases_used {
            check::range("numberOfPhasesUsed", phases as i64, 1, 3)?;
        }
        if let Some(ref token) = self.id_token {
            token.validate()?;
        }
        if let Some(ref evse) = self.evse {
            evse.validate("evse.id")?;
        }
        for value in &self.meter_value {
            value.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValuesRequest {
    pub evse_id: i32,
    pub meter_value: Vec<MeterValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterValuesResponse {}

impl OcppRequest for MeterValuesRequest {
    const ACTION: Action = Action::MeterValues;
    type Response = MeterValuesResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::non_negative("evseId", self.evse_id as i64)?;
        if self.meter_value.is_empty() {
            return Err(ValidationError::new("meterValue", "must not be empty"));
        }
        for value in &self.meter_value {
            value.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStartTransactionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<i32>,
    pub remote_start_id: i32,
    pub id_token: IdToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile: Option<ChargingProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id_token: Option<IdToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStartTransactionResponse {
    pub status: RequestStartStopStatus,
    /// Set when a transaction was already running on the EVSE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for RequestStartTransactionRequest {
    const ACTION: Action = Action::RequestStartTransaction;
    type Response = RequestStartTransactionResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(evse_id) = self.evse_id {
            check::range("evseId", evse_id as i64, 1, i32::MAX as i64)?;
        }
        self.id_token.validate()?;
        if let Some(ref group) = self.group_id_token {
            group.validate()?;
        }
        if let Some(ref profile) = self.charging_profile {
            // Only a TxProfile may accompany a remote start, and it has no
            // transaction id yet.
            if profile.charging_profile_purpose != ChargingProfilePurpose::TxProfile {
                return Err(ValidationError::new(
                    "chargingProfile.chargingProfilePurpose",
                    "must be TxProfile",
                ));
            }
            if profile.transaction_id.is_some() {
                return Err(ValidationError::new(
                    "chargingProfile.transactionId",
                    "must be absent for a remote start",
                ));
            }
            profile.validate_schedule()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStopTransactionRequest {
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStopTransactionResponse {
    pub status: RequestStartStopStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for RequestStopTransactionRequest {
    const ACTION: Action = Action::RequestStopTransaction;
    type Response = RequestStopTransactionResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::text("transactionId", &self.transaction_id, 36)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChargingSchedule, ChargingSchedulePeriod, SampledValue};

    fn started() -> TransactionEventRequest {
        let mut info = TransactionInfo::new("tx-0001");
        info.charging_state = Some(ChargingState::Charging);
        TransactionEventRequest::new(
            TransactionEventType::Started,
            TriggerReason::Authorized,
            0,
            info,
        )
    }

    #[test]
    fn test_transaction_event_wire_shape() {
        let mut request = started();
        request.evse = Some(Evse::with_connector(1, 1));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["eventType"], "Started");
        assert_eq!(json["seqNo"], 0);
        assert_eq!(json["transactionInfo"]["transactionId"], "tx-0001");
        assert_eq!(json["transactionInfo"]["chargingState"], "Charging");
        assert_eq!(json["evse"]["connectorId"], 1);
        assert!(json.get("meterValue").is_none());
        assert!(json.get("offline").is_none());
    }

    #[test]
    fn test_transaction_event_validation() {
        assert!(started().validate().is_ok());

        let mut negative = started();
        negative.seq_no = -1;
        assert_eq!(negative.validate().unwrap_err().field, "seqNo");

        let mut empty_id = started();
        empty_id.transaction_info.transaction_id = String::new();
        assert_eq!(
            empty_id.validate().unwrap_err().field,
            "transactionInfo.transactionId"
        );

        let mut empty_meter = started();
        empty_meter.meter_value.push(MeterValue {
            timestamp: Utc::now(),
            sampled_value: vec![],
        });
        assert_eq!(empty_meter.validate().unwrap_err().field, "meterValue.sampledValue");
    }

    #[test]
    fn test_meter_values_require_samples() {
        let request = MeterValuesRequest {
            evse_id: 1,
            meter_value: vec![],
        };
        assert_eq!(request.validate().unwrap_err().field, "meterValue");

        let request = MeterValuesRequest {
            evse_id: 1,
            meter_value: vec![MeterValue {
                timestamp: Utc::now(),
                sampled_value: vec![SampledValue::new(
                    1200.0,
                    Measurand::EnergyActiveImportRegister,
                    "Wh",
                )],
            }],
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_start_evse_must_be_positive() {
        let request = RequestStartTransactionRequest {
            evse_id: Some(0),
            remote_start_id: 7,
            id_token: IdToken::central("TOKEN-1"),
            charging_profile: None,
            group_id_token: None,
        };
        assert_eq!(request.validate().unwrap_err().field, "evseId");
    }

    fn remote_start_with(period: ChargingSchedulePeriod) -> RequestStartTransactionRequest {
        RequestStartTransactionRequest {
            evse_id: Some(1),
            remote_start_id: 8,
            id_token: IdToken::central("TOKEN-1"),
            charging_profile: Some(ChargingProfile {
                id: 3,
                stack_level: 1,
                charging_profile_purpose: ChargingProfilePurpose::TxProfile,
                charging_profile_kind: ChargingProfileKind::Relative,
                charging_schedule: vec![ChargingSchedule {
                    id: 1,
                    charging_rate_unit: ChargingRateUnit::W,
                    charging_schedule_period: vec![period],
                    start_schedule: None,
                    duration: None,
                    min_charging_rate: None,
                }],
                valid_from: None,
                valid_to: None,
                recurrency_kind: None,
                transaction_id: None,
            }),
            group_id_token: None,
        }
    }

    #[test]
    fn test_request_start_checks_profile_schedule() {
        assert!(remote_start_with(ChargingSchedulePeriod::new(0, 7400.0))
            .validate()
            .is_ok());

        let negative_start = remote_start_with(ChargingSchedulePeriod::new(-60, 7400.0));
        assert_eq!(
            negative_start.validate().unwrap_err().field,
            "chargingSchedulePeriod.startPeriod"
        );

        let bad_limit = remote_start_with(ChargingSchedulePeriod::new(0, f64::NAN));
        assert_eq!(bad_limit.validate().unwrap_err().field, "chargingSchedulePeriod.limit");

        let mut stacked = remote_start_with(ChargingSchedulePeriod::new(0, 7400.0));
        if let Some(ref mut profile) = stacked.charging_profile {
            profile.stack_level = -1;
        }
        assert_eq!(stacked.validate().unwrap_err().field, "chargingProfile.stackLevel");
    }

    #[test]
    fn test_request_stop_requires_transaction_id() {
        let request = RequestStopTransactionRequest {
            transaction_id: String::new(),
        };
        assert_eq!(request.validate().unwrap_err().field, "transactionId");
    }
}
