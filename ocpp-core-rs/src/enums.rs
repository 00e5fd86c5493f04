//! OCPP 2.0.1 closed vocabularies
//!
//! Every payload field drawn from an enumeration decodes through
//! [`wire_enum!`]-generated types. Decoding never fails: surrounding whitespace
//! is trimmed, the remainder must match a wire literal exactly (case
//! sensitive), and anything else becomes the type's `Unknown` variant.
//! `Unknown` always serializes as the literal `"Unknown"`.
//!
//! A few OCPP enumerations (`AuthorizationStatus`, `BootReason`,
//! `ClearChargingProfileStatus`) define `Unknown` as a regular value; for
//! those the fallback and the protocol value are the same variant.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Literal written for the fallback variant of every enumeration.
pub const UNKNOWN_LITERAL: &str = "Unknown";

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Fallback for unrecognised wire values
            #[default]
            Unknown,
        }

        impl $name {
            /// All recognised values (the fallback excluded)
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Decode a wire string, degrading to `Unknown`
            pub fn parse(text: &str) -> Self {
                match text.trim() {
                    $( $text => $name::$variant, )+
                    _ => $name::Unknown,
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                    $name::Unknown => UNKNOWN_LITERAL,
                }
            }

            pub fn is_unknown(&self) -> bool {
                matches!(self, $name::Unknown)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self::parse(s))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_str(WireVisitor(Self::parse))
            }
        }
    };
}

/// Shared string visitor; every wire enum feeds its own `parse` in.
struct WireVisitor<T>(fn(&str) -> T);

impl<'de, T> Visitor<'de> for WireVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an OCPP enumeration string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
        Ok((self.0)(v))
    }
}

// ============================================================================
// Provisioning
// ============================================================================

wire_enum! {
    /// BootNotification registration outcome
    RegistrationStatus {
        Accepted => "Accepted",
        Pending => "Pending",
        Rejected => "Rejected",
    }
}

wire_enum! {
    /// Why the station (re)booted. `Unknown` is also a protocol value.
    BootReason {
        ApplicationReset => "ApplicationReset",
        FirmwareUpdate => "FirmwareUpdate",
        LocalReset => "LocalReset",
        PowerUp => "PowerUp",
        RemoteReset => "RemoteReset",
        ScheduledReset => "ScheduledReset",
        Triggered => "Triggered",
        Watchdog => "Watchdog",
    }
}

wire_enum! {
    ResetType {
        Immediate => "Immediate",
        OnIdle => "OnIdle",
    }
}

wire_enum! {
    ResetStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        Scheduled => "Scheduled",
    }
}

wire_enum! {
    /// Generic accept/reject used by several responses
    GenericStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
    }
}

wire_enum! {
    DataTransferStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        UnknownMessageId => "UnknownMessageId",
        UnknownVendorId => "UnknownVendorId",
    }
}

// ============================================================================
// Availability
// ============================================================================

wire_enum! {
    /// Connector status as reported by StatusNotification
    ConnectorStatus {
        Available => "Available",
        Occupied => "Occupied",
        Reserved => "Reserved",
        Unavailable => "Unavailable",
        Faulted => "Faulted",
    }
}

wire_enum! {
    OperationalStatus {
        Inoperative => "Inoperative",
        Operative => "Operative",
    }
}

wire_enum! {
    ChangeAvailabilityStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        Scheduled => "Scheduled",
    }
}

// ============================================================================
// Remote control
// ============================================================================

wire_enum! {
    MessageTrigger {
        BootNotification => "BootNotification",
        LogStatusNotification => "LogStatusNotification",
        FirmwareStatusNotification => "FirmwareStatusNotification",
        Heartbeat => "Heartbeat",
        MeterValues => "MeterValues",
        SignChargingStationCertificate => "SignChargingStationCertificate",
        SignV2GCertificate => "SignV2GCertificate",
        StatusNotification => "StatusNotification",
        TransactionEvent => "TransactionEvent",
        SignCombinedCertificate => "SignCombinedCertificate",
        PublishFirmwareStatusNotification => "PublishFirmwareStatusNotification",
    }
}

wire_enum! {
    TriggerMessageStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        NotImplemented => "NotImplemented",
    }
}

wire_enum! {
    UnlockStatus {
        Unlocked => "Unlocked",
        UnlockFailed => "UnlockFailed",
        OngoingAuthorizedTransaction => "OngoingAuthorizedTransaction",
        UnknownConnector => "UnknownConnector",
    }
}

wire_enum! {
    /// RequestStartTransaction / RequestStopTransaction outcome
    RequestStartStopStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
    }
}

// ============================================================================
// Firmware
// ============================================================================

wire_enum! {
    UpdateFirmwareStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        AcceptedCanceled => "AcceptedCanceled",
        InvalidCertificate => "InvalidCertificate",
        RevokedCertificate => "RevokedCertificate",
    }
}

wire_enum! {
    FirmwareStatus {
        Downloaded => "Downloaded",
        DownloadFailed => "DownloadFailed",
        Downloading => "Downloading",
        DownloadScheduled => "DownloadScheduled",
        DownloadPaused => "DownloadPaused",
        Idle => "Idle",
        InstallationFailed => "InstallationFailed",
        Installing => "Installing",
        Installed => "Installed",
        InstallRebooting => "InstallRebooting",
        InstallScheduled => "InstallScheduled",
        InstallVerificationFailed => "InstallVerificationFailed",
        InvalidSignature => "InvalidSignature",
        SignatureVerified => "SignatureVerified",
    }
}

// ============================================================================
// Reservation
// ============================================================================

wire_enum! {
    ReserveNowStatus {
        Accepted => "Accepted",
        Faulted => "Faulted",
        Occupied => "Occupied",
        Rejected => "Rejected",
        Unavailable => "Unavailable",
    }
}

wire_enum! {
    CancelReservationStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
    }
}

// ============================================================================
// Smart charging
// ============================================================================

wire_enum! {
    ChargingProfileStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
    }
}

wire_enum! {
    /// `Unknown` is also the protocol value for "no matching profile".
    ClearChargingProfileStatus {
        Accepted => "Accepted",
    }
}

wire_enum! {
    ChargingProfilePurpose {
        ChargingStationExternalConstraints => "ChargingStationExternalConstraints",
        ChargingStationMaxProfile => "ChargingStationMaxProfile",
        TxDefaultProfile => "TxDefaultProfile",
        TxProfile => "TxProfile",
    }
}

wire_enum! {
    ChargingProfileKind {
        Absolute => "Absolute",
        Recurring => "Recurring",
        Relative => "Relative",
    }
}

wire_enum! {
    ChargingRateUnit {
        W => "W",
        A => "A",
    }
}

wire_enum! {
    RecurrencyKind {
        Daily => "Daily",
        Weekly => "Weekly",
    }
}

// ============================================================================
// Authorization & local list
// ============================================================================

wire_enum! {
    /// `Unknown` is also the protocol value for an unknown token.
    AuthorizationStatus {
        Accepted => "Accepted",
        Blocked => "Blocked",
        ConcurrentTx => "ConcurrentTx",
        Expired => "Expired",
        Invalid => "Invalid",
        NoCredit => "NoCredit",
        NotAllowedTypeEvse => "NotAllowedTypeEVSE",
        NotAtThisLocation => "NotAtThisLocation",
        NotAtThisTime => "NotAtThisTime",
    }
}

wire_enum! {
    IdTokenType {
        Central => "Central",
        EMaid => "eMAID",
        Iso14443 => "ISO14443",
        Iso15693 => "ISO15693",
        KeyCode => "KeyCode",
        Local => "Local",
        MacAddress => "MacAddress",
        NoAuthorization => "NoAuthorization",
    }
}

wire_enum! {
    UpdateType {
        Differential => "Differential",
        Full => "Full",
    }
}

wire_enum! {
    SendLocalListStatus {
        Accepted => "Accepted",
        Failed => "Failed",
        VersionMismatch => "VersionMismatch",
    }
}

wire_enum! {
    ClearCacheStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
    }
}

wire_enum! {
    AuthorizeCertificateStatus {
        Accepted => "Accepted",
        SignatureError => "SignatureError",
        CertificateExpired => "CertificateExpired",
        CertificateRevoked => "CertificateRevoked",
        NoCertificateAvailable => "NoCertificateAvailable",
        CertChainError => "CertChainError",
        ContractCancelled => "ContractCancelled",
    }
}

// ============================================================================
// Transactions & metering
// ============================================================================

wire_enum! {
    TransactionEventType {
        Ended => "Ended",
        Started => "Started",
        Updated => "Updated",
    }
}

wire_enum! {
    TriggerReason {
        Authorized => "Authorized",
        CablePluggedIn => "CablePluggedIn",
        ChargingRateChanged => "ChargingRateChanged",
        ChargingStateChanged => "ChargingStateChanged",
        Deauthorized => "Deauthorized",
        EnergyLimitReached => "EnergyLimitReached",
        EvCommunicationLost => "EVCommunicationLost",
        EvConnectTimeout => "EVConnectTimeout",
        MeterValueClock => "MeterValueClock",
        MeterValuePeriodic => "MeterValuePeriodic",
        TimeLimitReached => "TimeLimitReached",
        Trigger => "Trigger",
        UnlockCommand => "UnlockCommand",
        StopAuthorized => "StopAuthorized",
        EvDeparted => "EVDeparted",
        EvDetected => "EVDetected",
        RemoteStop => "RemoteStop",
        RemoteStart => "RemoteStart",
        AbnormalCondition => "AbnormalCondition",
        SignedDataReceived => "SignedDataReceived",
        ResetCommand => "ResetCommand",
    }
}

wire_enum! {
    ChargingState {
        Charging => "Charging",
        EvConnected => "EVConnected",
        SuspendedEv => "SuspendedEV",
        SuspendedEvse => "SuspendedEVSE",
        Idle => "Idle",
    }
}

wire_enum! {
    /// Why a transaction ended
    StopReason {
        DeAuthorized => "DeAuthorized",
        EmergencyStop => "EmergencyStop",
        EnergyLimitReached => "EnergyLimitReached",
        EvDisconnected => "EVDisconnected",
        GroundFault => "GroundFault",
        ImmediateReset => "ImmediateReset",
        Local => "Local",
        LocalOutOfCredit => "LocalOutOfCredit",
        MasterPass => "MasterPass",
        Other => "Other",
        OvercurrentFault => "OvercurrentFault",
        PowerLoss => "PowerLoss",
        PowerQuality => "PowerQuality",
        Reboot => "Reboot",
        Remote => "Remote",
        SocLimitReached => "SOCLimitReached",
        StoppedByEv => "StoppedByEV",
        TimeLimitReached => "TimeLimitReached",
        Timeout => "Timeout",
    }
}

wire_enum! {
    Measurand {
        CurrentImport => "Current.Import",
        CurrentExport => "Current.Export",
        CurrentOffered => "Current.Offered",
        EnergyActiveImportRegister => "Energy.Active.Import.Register",
        EnergyActiveExportRegister => "Energy.Active.Export.Register",
        PowerActiveImport => "Power.Active.Import",
        PowerActiveExport => "Power.Active.Export",
        PowerOffered => "Power.Offered",
        Frequency => "Frequency",
        Temperature => "Temperature",
        Voltage => "Voltage",
        SoC => "SoC",
    }
}

wire_enum! {
    ReadingContext {
        InterruptionBegin => "Interruption.Begin",
        InterruptionEnd => "Interruption.End",
        Other => "Other",
        SampleClock => "Sample.Clock",
        SamplePeriodic => "Sample.Periodic",
        TransactionBegin => "Transaction.Begin",
        TransactionEnd => "Transaction.End",
        Trigger => "Trigger",
    }
}

// ============================================================================
// Security / certificates
// ============================================================================

wire_enum! {
    CertificateSigningUse {
        ChargingStationCertificate => "ChargingStationCertificate",
        V2gCertificate => "V2GCertificate",
    }
}

wire_enum! {
    CertificateSignedStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
    }
}

wire_enum! {
    InstallCertificateUse {
        V2gRootCertificate => "V2GRootCertificate",
        MoRootCertificate => "MORootCertificate",
        CsmsRootCertificate => "CSMSRootCertificate",
        ManufacturerRootCertificate => "ManufacturerRootCertificate",
    }
}

wire_enum! {
    InstallCertificateStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        Failed => "Failed",
    }
}

wire_enum! {
    DeleteCertificateStatus {
        Accepted => "Accepted",
        Failed => "Failed",
        NotFound => "NotFound",
    }
}

wire_enum! {
    GetCertificateIdUse {
        V2gRootCertificate => "V2GRootCertificate",
        MoRootCertificate => "MORootCertificate",
        CsmsRootCertificate => "CSMSRootCertificate",
        V2gCertificateChain => "V2GCertificateChain",
        ManufacturerRootCertificate => "ManufacturerRootCertificate",
    }
}

wire_enum! {
    GetInstalledCertificateStatus {
        Accepted => "Accepted",
        NotFound => "NotFound",
    }
}

wire_enum! {
    GetCertificateStatus {
        Accepted => "Accepted",
        Failed => "Failed",
    }
}

wire_enum! {
    Iso15118EvCertificateStatus {
        Accepted => "Accepted",
        Failed => "Failed",
    }
}

wire_enum! {
    CertificateAction {
        Install => "Install",
        Update => "Update",
    }
}

wire_enum! {
    HashAlgorithm {
        Sha256 => "SHA256",
        Sha384 => "SHA384",
        Sha512 => "SHA512",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::DeserializeOwned;

    fn assert_round_trip<T>(all: &[T])
    where
        T: Copy
            + PartialEq
            + fmt::Debug
            + fmt::Display
            + FromStr<Err = Infallible>
            + Serialize
            + DeserializeOwned,
    {
        assert!(!all.is_empty());
        for value in all {
            let text = value.to_string();
            let parsed: T = text.parse().unwrap();
            assert_eq!(parsed, *value, "round trip failed for {}", text);

            let json = serde_json::to_value(value).unwrap();
            assert_eq!(json, serde_json::Value::String(text.clone()));
            let decoded: T = serde_json::from_value(json).unwrap();
            assert_eq!(decoded, *value, "serde round trip failed for {}", text);
        }
    }

    /// Round trip every value, then check the fallback for unrecognised text
    macro_rules! check_vocabularies {
        ($($name:ident),+ $(,)?) => {
            $(
                assert_round_trip($name::ALL);
                let fallback: $name = serde_json::from_str("\"NotAnOcppValue\"").unwrap();
                assert!(fallback.is_unknown(), "{} did not fall back", stringify!($name));
                assert_eq!(fallback.as_str(), UNKNOWN_LITERAL);
                assert!(!$name::ALL.contains(&$name::Unknown), "{} lists its fallback", stringify!($name));
            )+
        };
    }

    #[test]
    fn test_round_trip_all_vocabularies() {
        check_vocabularies!(
            RegistrationStatus, BootReason, ResetType,
            ResetStatus, GenericStatus, DataTransferStatus,
            ConnectorStatus, OperationalStatus, ChangeAvailabilityStatus,
            MessageTrigger, TriggerMessageStatus, UnlockStatus,
            RequestStartStopStatus, UpdateFirmwareStatus, FirmwareStatus,
            ReserveNowStatus, CancelReservationStatus, ChargingProfileStatus,
            ClearChargingProfileStatus, ChargingProfilePurpose, ChargingProfileKind,
            ChargingRateUnit, RecurrencyKind, AuthorizationStatus,
            IdTokenType, UpdateType, SendLocalListStatus,
            ClearCacheStatus, AuthorizeCertificateStatus, TransactionEventType,
            TriggerReason, ChargingState, StopReason,
            Measurand, ReadingContext, CertificateSigningUse,
            CertificateSignedStatus, InstallCertificateUse, InstallCertificateStatus,
            DeleteCertificateStatus, GetCertificateIdUse, GetInstalledCertificateStatus,
            GetCertificateStatus, Iso15118EvCertificateStatus, CertificateAction,
            HashAlgorithm,
        );
    }

    #[test]
    fn test_unrecognised_values_fall_back() {
        for text in ["", "accepted", "ACCEPTED", "Accept", "Accepted!", "Rejected Accepted"] {
            assert_eq!(ResetStatus::parse(text), ResetStatus::Unknown, "input {:?}", text);
        }
        assert_eq!(Measurand::parse("Energy.Active"), Measurand::Unknown);
        assert_eq!(IdTokenType::parse("emaid"), IdTokenType::Unknown);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(ResetType::parse("  OnIdle\n"), ResetType::OnIdle);
        assert_eq!(IdTokenType::parse("\teMAID "), IdTokenType::EMaid);
    }

    #[test]
    fn test_fallback_serializes_as_unknown_literal() {
        assert_eq!(ChargingState::Unknown.as_str(), "Unknown");
        let json = serde_json::to_string(&UnlockStatus::Unknown).unwrap();
        assert_eq!(json, "\"Unknown\"");
    }

    #[test]
    fn test_serde_decoding_never_fails_on_strings() {
        let status: RegistrationStatus = serde_json::from_str("\"Sleeping\"").unwrap();
        assert_eq!(status, RegistrationStatus::Unknown);

        let reason: TriggerReason = serde_json::from_str("\"EVDeparted\"").unwrap();
        assert_eq!(reason, TriggerReason::EvDeparted);
    }

    #[test]
    fn test_protocol_unknown_values_share_fallback() {
        assert_eq!(AuthorizationStatus::parse("Unknown"), AuthorizationStatus::Unknown);
        assert_eq!(BootReason::parse("Unknown").as_str(), "Unknown");
        assert_eq!(
            ClearChargingProfileStatus::parse("Unknown"),
            ClearChargingProfileStatus::default()
        );
    }
}
