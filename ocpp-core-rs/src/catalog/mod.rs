//! OCPP 2.0.1 request/response catalog
//!
//! One typed request and one typed response per action. The response type is
//! fixed by the request type through [`OcppRequest::Response`], so a call can
//! never be answered with the wrong payload shape.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ValidationError;

mod authorization;
mod availability;
mod data_transfer;
mod firmware;
mod provisioning;
mod reservation;
mod security;
mod smart_charging;
mod transactions;

pub use authorization::*;
pub use availability::*;
pub use data_transfer::*;
pub use firmware::*;
pub use provisioning::*;
pub use reservation::*;
pub use security::*;
pub use smart_charging::*;
pub use transactions::*;

macro_rules! actions {
    ($( $variant:ident => $name:literal ),+ $(,)?) => {
        /// OCPP 2.0.1 actions
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Action {
            $( $variant, )+
        }

        impl Action {
            pub const ALL: &'static [Action] = &[$(Action::$variant),+];

            /// Wire name of the action
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Action::$variant => $name, )+
                }
            }

            /// Look up an action by its exact wire name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $name => Some(Action::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

actions! {
    // Charging station -> CSMS
    BootNotification => "BootNotification",
    Heartbeat => "Heartbeat",
    Authorize => "Authorize",
    TransactionEvent => "TransactionEvent",
    StatusNotification => "StatusNotification",
    MeterValues => "MeterValues",
    FirmwareStatusNotification => "FirmwareStatusNotification",
    SignCertificate => "SignCertificate",
    GetCertificateStatus => "GetCertificateStatus",
    Get15118EvCertificate => "Get15118EVCertificate",

    // CSMS -> Charging station
    Reset => "Reset",
    ChangeAvailability => "ChangeAvailability",
    TriggerMessage => "TriggerMessage",
    UpdateFirmware => "UpdateFirmware",
    ReserveNow => "ReserveNow",
    CancelReservation => "CancelReservation",
    SetChargingProfile => "SetChargingProfile",
    ClearChargingProfile => "ClearChargingProfile",
    GetCompositeSchedule => "GetCompositeSchedule",
    UnlockConnector => "UnlockConnector",
    GetLocalListVersion => "GetLocalListVersion",
    SendLocalList => "SendLocalList",
    ClearCache => "ClearCache",
    RequestStartTransaction => "RequestStartTransaction",
    RequestStopTransaction => "RequestStopTransaction",
    CertificateSigned => "CertificateSigned",
    InstallCertificate => "InstallCertificate",
    DeleteCertificate => "DeleteCertificate",
    GetInstalledCertificateIds => "GetInstalledCertificateIds",

    // Both directions
    DataTransfer => "DataTransfer",
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed OCPP request payload
pub trait OcppRequest: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Action carried in the CALL frame
    const ACTION: Action;

    /// Payload of the matching CALLRESULT
    type Response: Serialize + DeserializeOwned + Send + 'static;

    /// Schema constraints beyond what deserialization enforces
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_name(action.as_str()), Some(*action));
        }
    }

    #[test]
    fn test_action_lookup_is_exact() {
        assert_eq!(Action::from_name("Get15118EVCertificate"), Some(Action::Get15118EvCertificate));
        assert_eq!(Action::from_name("heartbeat"), None);
        assert_eq!(Action::from_name(" Heartbeat"), None);
    }
}
