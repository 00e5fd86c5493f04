//! SetChargingProfile, ClearChargingProfile, GetCompositeSchedule

use serde::{Deserialize, Serialize};

use super::{Action, OcppRequest};
use crate::enums::*;
use crate::error::ValidationError;
use crate::types::{check, ChargingProfile, ClearChargingProfileCriteria, CompositeSchedule, StatusInfo};

/// SetChargingProfile request. `evse_id` 0 addresses the whole station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetChargingProfileRequest {
    pub evse_id: i32,
    pub charging_profile: ChargingProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetChargingProfileResponse {
    pub status: ChargingProfileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for SetChargingProfileRequest {
    const ACTION: Action = Action::SetChargingProfile;
    type Response = SetChargingProfileResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::non_negative("evseId", self.evse_id as i64)?;
        self.charging_profile.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearChargingProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile_criteria: Option<ClearChargingProfileCriteria>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearChargingProfileResponse {
    pub status: ClearChargingProfileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for ClearChargingProfileRequest {
    const ACTION: Action = Action::ClearChargingProfile;
    type Response = ClearChargingProfileResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = self.charging_profile_id {
            check::non_negative("chargingProfileId", id as i64)?;
        }
        if let Some(ref criteria) = self.charging_profile_criteria {
            if let Some(evse_id) = criteria.evse_id {
                check::non_negative("chargingProfileCriteria.evseId", evse_id as i64)?;
            }
            if let Some(level) = criteria.stack_level {
                check::non_negative("chargingProfileCriteria.stackLevel", level as i64)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCompositeScheduleRequest {
    /// Length of the requested schedule in seconds
    pub duration: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_rate_unit: Option<ChargingRateUnit>,
    pub evse_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCompositeScheduleResponse {
    pub status: GenericStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<CompositeSchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for GetCompositeScheduleRequest {
    const ACTION: Action = Action::GetCompositeSchedule;
    type Response = GetCompositeScheduleResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::range("duration", self.duration as i64, 1, i32::MAX as i64)?;
        check::non_negative("evseId", self.evse_id as i64)?;
        if let Some(unit) = self.charging_rate_unit {
            check::known("chargingRateUnit", unit.is_unknown())?;
        }
        Ok(())
    }
}
