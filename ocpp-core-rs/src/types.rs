//! OCPP 2.0.1 complex data types
//!
//! Structures shared by several request/response payloads. Field names follow
//! the OCPP JSON schemas (camelCase); optional fields are omitted on the wire
//! when absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::*;
use crate::error::ValidationError;

/// Opaque charging station identifier (primary routing key)
pub type StationId = String;

// ============================================================================
// Identification
// ============================================================================

/// EVSE reference, optionally narrowed to one connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evse {
    pub id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<i32>,
}

impl Evse {
    pub fn new(id: i32) -> Self {
        Self { id, connector_id: None }
    }

    pub fn with_connector(id: i32, connector_id: i32) -> Self {
        Self {
            id,
            connector_id: Some(connector_id),
        }
    }

    pub(crate) fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        check::non_negative(field, self.id as i64)?;
        if let Some(connector_id) = self.connector_id {
            check::non_negative(field, connector_id as i64)?;
        }
        Ok(())
    }
}

/// Token used for authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdToken {
    pub id_token: String,
    #[serde(rename = "type")]
    pub token_type: IdTokenType,
}

impl IdToken {
    pub fn new(id_token: impl Into<String>, token_type: IdTokenType) -> Self {
        Self {
            id_token: id_token.into(),
            token_type,
        }
    }

    /// Central token, the usual kind for remote starts
    pub fn central(id_token: impl Into<String>) -> Self {
        Self::new(id_token, IdTokenType::Central)
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.token_type != IdTokenType::NoAuthorization {
            check::text("idToken.idToken", &self.id_token, 36)?;
        } else {
            check::max_len("idToken.idToken", &self.id_token, 36)?;
        }
        if self.token_type.is_unknown() {
            return Err(ValidationError::new("idToken.type", "unrecognised token type"));
        }
        Ok(())
    }
}

/// Authorization result for an id token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTokenInfo {
    pub status: AuthorizationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_expiry_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id_token: Option<IdToken>,
}

impl IdTokenInfo {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self {
            status,
            cache_expiry_date_time: None,
            charging_priority: None,
            group_id_token: None,
        }
    }
}

/// Free-form detail attached to a response status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub reason_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

impl StatusInfo {
    pub fn new(reason_code: impl Into<String>) -> Self {
        Self {
            reason_code: reason_code.into(),
            additional_info: None,
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }
}

/// Charging station description sent with BootNotification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStationInfo {
    pub model: String,
    pub vendor_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

impl ChargingStationInfo {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        check::text("chargingStation.model", &self.model, 20)?;
        check::text("chargingStation.vendorName", &self.vendor_name, 50)?;
        if let Some(ref serial) = self.serial_number {
            check::max_len("chargingStation.serialNumber", serial, 25)?;
        }
        if let Some(ref fw) = self.firmware_version {
            check::max_len("chargingStation.firmwareVersion", fw, 50)?;
        }
        Ok(())
    }
}

// ============================================================================
// Smart charging
// ============================================================================

/// Charging schedule period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSchedulePeriod {
    pub start_period: i32,
    pub limit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_phases: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_to_use: Option<i32>,
}

impl ChargingSchedulePeriod {
    pub fn new(start_period: i32, limit: f64) -> Self {
        Self {
            start_period,
            limit,
            number_phases: None,
            phase_to_use: None,
        }
    }
}

/// Charging schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSchedule {
    pub id: i32,
    pub charging_rate_unit: ChargingRateUnit,
    pub charging_schedule_period: Vec<ChargingSchedulePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_schedule: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_charging_rate: Option<f64>,
}

impl ChargingSchedule {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.charging_rate_unit.is_unknown() {
            return Err(ValidationError::new(
                "chargingSchedule.chargingRateUnit",
                "unrecognised rate unit",
            ));
        }
        if self.charging_schedule_period.is_empty() || self.charging_schedule_period.len() > 1024 {
            return Err(ValidationError::new(
                "chargingSchedule.chargingSchedulePeriod",
                "must contain between 1 and 1024 periods",
            ));
        }
        for period in &self.charging_schedule_period {
            check::non_negative("chargingSchedulePeriod.startPeriod", period.start_period as i64)?;
            if !period.limit.is_finite() || period.limit < 0.0 {
                return Err(ValidationError::new(
                    "chargingSchedulePeriod.limit",
                    "must be a non-negative number",
                ));
            }
            if let Some(phases) = period.number_phases {
                check::range("chargingSchedulePeriod.numberPhases", phases as i64, 1, 3)?;
            }
        }
        if let Some(duration) = self.duration {
            check::non_negative("chargingSchedule.duration", duration as i64)?;
        }
        Ok(())
    }

    /// Limit in effect at `offset_secs` seconds into the schedule
    pub fn limit_at(&self, offset_secs: i64) -> Option<f64> {
        self.charging_schedule_period
            .iter()
            .filter(|p| (p.start_period as i64) <= offset_secs)
            .max_by_key(|p| p.start_period)
            .map(|p| p.limit)
    }
}

/// Charging profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingProfile {
    pub id: i32,
    pub stack_level: i32,
    pub charging_profile_purpose: ChargingProfilePurpose,
    pub charging_profile_kind: ChargingProfileKind,
    pub charging_schedule: Vec<ChargingSchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrency_kind: Option<RecurrencyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl ChargingProfile {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        self.validate_schedule()?;
        if self.charging_profile_purpose == ChargingProfilePurpose::TxProfile
            && self.transaction_id.is_none()
        {
            return Err(ValidationError::new(
                "chargingProfile.transactionId",
                "required for TxProfile",
            ));
        }
        Ok(())
    }

    /// Everything but the TxProfile transaction id requirement
    pub(crate) fn validate_schedule(&self) -> Result<(), ValidationError> {
        check::non_negative("chargingProfile.id", self.id as i64)?;
        check::non_negative("chargingProfile.stackLevel", self.stack_level as i64)?;
        if self.charging_profile_purpose.is_unknown() {
            return Err(ValidationError::new(
                "chargingProfile.chargingProfilePurpose",
                "unrecognised purpose",
            ));
        }
        if self.charging_profile_kind.is_unknown() {
            return Err(ValidationError::new(
                "chargingProfile.chargingProfileKind",
                "unrecognised kind",
            ));
        }
        if self.charging_schedule.is_empty() || self.charging_schedule.len() > 3 {
            return Err(ValidationError::new(
                "chargingProfile.chargingSchedule",
                "must contain between 1 and 3 schedules",
            ));
        }
        for schedule in &self.charging_schedule {
            schedule.validate()?;
        }
        if let Some(ref tx) = self.transaction_id {
            check::text("chargingProfile.transactionId", tx, 36)?;
        }
        Ok(())
    }
}

/// Selector for ClearChargingProfile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearChargingProfileCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile_purpose: Option<ChargingProfilePurpose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_level: Option<i32>,
}

/// Composite schedule returned by GetCompositeSchedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSchedule {
    pub evse_id: i32,
    pub duration: i32,
    pub schedule_start: DateTime<Utc>,
    pub charging_rate_unit: ChargingRateUnit,
    pub charging_schedule_period: Vec<ChargingSchedulePeriod>,
}

// ============================================================================
// Metering & transactions
// ============================================================================

/// Unit of a sampled value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitOfMeasure {
    pub unit: String,
    #[serde(default)]
    pub multiplier: i32,
}

impl UnitOfMeasure {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            multiplier: 0,
        }
    }
}

/// Sampled value for meter readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ReadingContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurand: Option<Measurand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measure: Option<UnitOfMeasure>,
}

impl SampledValue {
    pub fn new(value: f64, measurand: Measurand, unit: &str) -> Self {
        Self {
            value,
            context: None,
            measurand: Some(measurand),
            phase: None,
            unit_of_measure: Some(UnitOfMeasure::new(unit)),
        }
    }

    pub fn with_context(mut self, context: ReadingContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Meter value with timestamp and samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub sampled_value: Vec<SampledValue>,
}

impl MeterValue {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.sampled_value.is_empty() {
            return Err(ValidationError::new("meterValue.sampledValue", "must not be empty"));
        }
        Ok(())
    }
}

/// Transaction section of a TransactionEvent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_state: Option<ChargingState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent_charging: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_start_id: Option<i32>,
}

impl TransactionInfo {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            charging_state: None,
            time_spent_charging: None,
            stopped_reason: None,
            remote_start_id: None,
        }
    }
}

// ============================================================================
// Local authorization list
// ============================================================================

/// One entry of a local authorization list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationData {
    pub id_token: IdToken,
    /// Absent in a differential update means "remove this token"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_info: Option<IdTokenInfo>,
}

// ============================================================================
// Certificates
// ============================================================================

/// Certificate identity by issuer hashes and serial number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateHashData {
    pub hash_algorithm: HashAlgorithm,
    pub issuer_name_hash: String,
    pub issuer_key_hash: String,
    pub serial_number: String,
}

impl CertificateHashData {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.hash_algorithm.is_unknown() {
            return Err(ValidationError::new(
                "certificateHashData.hashAlgorithm",
                "unrecognised hash algorithm",
            ));
        }
        check::text("certificateHashData.issuerNameHash", &self.issuer_name_hash, 128)?;
        check::text("certificateHashData.issuerKeyHash", &self.issuer_key_hash, 128)?;
        check::text("certificateHashData.serialNumber", &self.serial_number, 40)
    }
}

/// Installed certificate with its usage and child chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateHashDataChain {
    pub certificate_type: GetCertificateIdUse,
    pub certificate_hash_data: CertificateHashData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_certificate_hash_data: Vec<CertificateHashData>,
}

/// OCSP request data for GetCertificateStatus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcspRequestData {
    pub hash_algorithm: HashAlgorithm,
    pub issuer_name_hash: String,
    pub issuer_key_hash: String,
    pub serial_number: String,
    #[serde(rename = "responderURL")]
    pub responder_url: String,
}

/// Field-level validation helpers shared by the catalog
pub(crate) mod check {
    use crate::error::ValidationError;

    /// Mandatory text: non-empty after trimming and at most `max` characters
    pub fn text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new(field, "must not be empty"));
        }
        max_len(field, value, max)
    }

    pub fn max_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
        if value.chars().count() > max {
            return Err(ValidationError::new(
                field,
                format!("exceeds maximum length of {}", max),
            ));
        }
        Ok(())
    }

    pub fn non_negative(field: &'static str, value: i64) -> Result<(), ValidationError> {
        if value < 0 {
            return Err(ValidationError::new(field, "must not be negative"));
        }
        Ok(())
    }

    pub fn range(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), ValidationError> {
        if value < min || value > max {
            return Err(ValidationError::new(
                field,
                format!("must be between {} and {}", min, max),
            ));
        }
        Ok(())
    }

    /// Enumeration field that decoded to its fallback
    pub fn known(field: &'static str, is_unknown: bool) -> Result<(), ValidationError> {
        if is_unknown {
            return Err(ValidationError::new(field, "unrecognised value"));
        }
        Ok(())
    }
}
