//! Authorize and local authorization list management

use serde::{Deserialize, Serialize};

use super::{Action, OcppRequest};
use crate::enums::*;
use crate::error::ValidationError;
use crate::types::{check, AuthorizationData, IdToken, IdTokenInfo, OcspRequestData, StatusInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub id_token: IdToken,
    /// PEM encoded contract certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso15118_certificate_hash_data: Option<Vec<OcspRequestData>>,
}

impl AuthorizeRequest {
    pub fn new(id_token: IdToken) -> Self {
        Self {
            id_token,
            certificate: None,
            iso15118_certificate_hash_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub id_token_info: IdTokenInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_status: Option<AuthorizeCertificateStatus>,
}

impl OcppRequest for AuthorizeRequest {
    const ACTION: Action = Action::Authorize;
    type Response = AuthorizeResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        self.id_token.validate()?;
        if let Some(ref certificate) = self.certificate {
            check::max_len("certificate", certificate, 5500)?;
        }
        if let Some(ref hashes) = self.iso15118_certificate_hash_data {
            if hashes.is_empty() || hashes.len() > 4 {
                return Err(ValidationError::new(
                    "iso15118CertificateHashData",
                    "must contain between 1 and 4 entries",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLocalListVersionRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLocalListVersionResponse {
    pub version_number: i32,
}

impl OcppRequest for GetLocalListVersionRequest {
    const ACTION: Action = Action::GetLocalListVersion;
    type Response = GetLocalListVersionResponse;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendLocalListRequest {
    pub version_number: i32,
    pub update_type: UpdateType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_authorization_list: Vec<AuthorizationData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendLocalListResponse {
    pub status: SendLocalListStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for SendLocalListRequest {
    const ACTION: Action = Action::SendLocalList;
    type Response = SendLocalListResponse;

    fn validate(&self) -> Result<(), ValidationError> {
        check::range("versionNumber", self.version_number as i64, 1, i32::MAX as i64)?;
        check::known("updateType", self.update_type.is_unknown())?;
        for entry in &self.local_authorization_list {
            entry.id_token.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearCacheResponse {
    pub status: ClearCacheStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl OcppRequest for ClearCacheRequest {
    const ACTION: Action = Action::ClearCache;
    type Response = ClearCacheResponse;
}
