//! Certificate management

use serde::{Deserialize, Serialize};

use super::{Action, OcppRequest};
use crate::enums::*;
use crate::error::ValidationError;
use crate::types::{check, CertificateHashData, CertificateHashDataChain, OcspRequestData, StatusInfo};

// ============================================================================
// Charging station -> CSMS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignCertificateRequest {
    /// PEM encoded certificate signing request
    pub csr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_type: Option<CertificateSigningUse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignCertificateResponse {
    pub status: GenericStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for SignCertificateRequest {
    const ACTION: Action = Action::SignCertificate;
    type Response = SignCertificateResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::text("csr", &self.csr, 5500)?;
        if let Some(use_) = self.certificate_type {
            check::known("certificateType", use_.is_unknown())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCertificateStatusRequest {
    pub ocsp_request_data: OcspRequestData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCertificateStatusResponse {
    pub status: GetCertificateStatus,
    /// Base64 DER encoded OCSP response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocsp_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for GetCertificateStatusRequest {
    const ACTION: Action = Action::GetCertificateStatus;
    type Response = GetCertificateStatusResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        let data = &self.ocsp_request_data;
        check::known("ocspRequestData.hashAlgorithm", data.hash_algorithm.is_unknown())?;
        check::text("ocspRequestData.issuerNameHash", &data.issuer_name_hash, 128)?;
        check::text("ocspRequestData.issuerKeyHash", &data.issuer_key_hash, 128)?;
        check::text("ocspRequestData.serialNumber", &data.serial_number, 40)?;
        check::text("ocspRequestData.responderURL", &data.responder_url, 512)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Get15118EvCertificateRequest {
    pub iso15118_schema_version: String,
    pub action: CertificateAction,
    /// Raw CertificateInstallationReq, base64 encoded EXI
    pub exi_request: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Get15118EvCertificateResponse {
    pub status: Iso15118EvCertificateStatus,
    pub exi_response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for Get15118EvCertificateRequest {
    const ACTION: Action = Action::Get15118EvCertificate;
    type Response = Get15118EvCertificateResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::text("iso15118SchemaVersion", &self.iso15118_schema_version, 50)?;
        check::known("action", self.action.is_unknown())?;
        check::text("exiRequest", &self.exi_request, 5600)
    }
}

// ============================================================================
// CSMS -> Charging station
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSignedRequest {
    /// PEM encoded certificate chain
    pub certificate_chain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_type: Option<CertificateSigningUse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSignedResponse {
    pub status: CertificateSignedStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for CertificateSignedRequest {
    const ACTION: Action = Action::CertificateSigned;
    type Response = CertificateSignedResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::text("certificateChain", &self.certificate_chain, 10000)?;
        if let Some(use_) = self.certificate_type {
            check::known("certificateType", use_.is_unknown())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallCertificateRequest {
    pub certificate_type: InstallCertificateUse,
    pub certificate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallCertificateResponse {
    pub status: InstallCertificateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for InstallCertificateRequest {
    const ACTION: Action = Action::InstallCertificate;
    type Response = InstallCertificateResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::known("certificateType", self.certificate_type.is_unknown())?;
        check::text("certificate", &self.certificate, 5500)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCertificateRequest {
    pub certificate_hash_data: CertificateHashData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCertificateResponse {
    pub status: DeleteCertificateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for DeleteCertificateRequest {
    const ACTION: Action = Action::DeleteCertificate;
    type Response = DeleteCertificateResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        self.certificate_hash_data.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInstalledCertificateIdsRequest {
    /// Filter; empty means all types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_type: Vec<GetCertificateIdUse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInstalledCertificateIdsResponse {
    pub status: GetInstalledCertificateStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_hash_data_chain: Vec<CertificateHashDataChain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for GetInstalledCertificateIdsRequest {
    const ACTION: Action = Action::GetInstalledCertificateIds;
    type Response = GetInstalledCertificateIdsResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        for use_ in &self.certificate_type {
            check::known("certificateType", use_.is_unknown())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_data() -> CertificateHashData {
        CertificateHashData {
            hash_algorithm: HashAlgorithm::Sha256,
            issuer_name_hash: "a1b2".to_string(),
            issuer_key_hash: "c3d4".to_string(),
            serial_number: "0042".to_string(),
        }
    }

    #[test]
    fn test_install_certificate_wire_values() {
        let request = InstallCertificateRequest {
            certificate_type: InstallCertificateUse::CsmsRootCertificate,
            certificate: "-----BEGIN CERTIFICATE-----".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["certificateType"], "CSMSRootCertificate");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_delete_certificate_hash_validation() {
        let mut data = hash_data();
        assert!(DeleteCertificateRequest {
            certificate_hash_data: data.clone()
        }
        .validate()
        .is_ok());

        data.serial_number = String::new();
        let err = DeleteCertificateRequest {
            certificate_hash_data: data,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.field, "certificateHashData.serialNumber");
    }

    #[test]
    fn test_ocsp_responder_url_field_name() {
        let request = GetCertificateStatusRequest {
            ocsp_request_data: OcspRequestData {
                hash_algorithm: HashAlgorithm::Sha256,
                issuer_name_hash: "a1b2".to_string(),
                issuer_key_hash: "c3d4".to_string(),
                serial_number: "0042".to_string(),
                responder_url: "http://ocsp.example.com".to_string(),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["ocspRequestData"]["responderURL"], "http://ocsp.example.com");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_get_installed_ids_empty_filter_omitted() {
        let request = GetInstalledCertificateIdsRequest::default();
        assert_eq!(serde_json::to_string(&request).unwrap(), "{}");
    }

    #[test]
    fn test_sign_certificate_requires_csr() {
        let request = SignCertificateRequest {
            csr: String::new(),
            certificate_type: None,
        };
        assert_eq!(request.validate().unwrap_err().field, "csr");
    }
}
