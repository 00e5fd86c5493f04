//! Handlers for station-initiated calls
//!
//! Each handler receives the already decoded and validated request plus the
//! authenticated station identity, records what it learned in [`CsmsState`]
//! and answers with a typed response.

use std::sync::Arc;

use chrono::Utc;
use ocpp_core::catalog::*;
use ocpp_core::enums::*;
use ocpp_core::types::{IdTokenInfo, StatusInfo};
use ocpp_core::{CallContext, CallOutcome, Router};
use tracing::{debug, info, warn};

use crate::config::CsmsConfig;
use crate::state::{CsmsState, SequenceCheck};

/// State shared by all CSMS handlers
#[derive(Debug)]
pub struct CsmsContext {
    pub config: CsmsConfig,
    pub state: Arc<CsmsState>,
}

/// Router with a handler for every station-initiated action
pub fn router(context: &Arc<CsmsContext>) -> Router {
    Router::new()
        .on_state(context, boot_notification)
        .on_state(context, heartbeat)
        .on_state(context, authorize)
        .on_state(context, status_notification)
        .on_state(context, meter_values)
        .on_state(context, transaction_event)
        .on_state(context, firmware_status_notification)
        .on_state(context, data_transfer)
        .on_state(context, sign_certificate)
        .on_state(context, get_certificate_status)
        .on_state(context, get_15118_ev_certificate)
}

fn boot_notification(
    context: &CsmsContext,
    call: &CallContext,
    request: BootNotificationRequest,
) -> CallOutcome<BootNotificationResponse> {
    let status = if context.config.is_station_allowed(&call.identity) {
        RegistrationStatus::Accepted
    } else {
        warn!("[{}] BootNotification from station not on the allow list", call.identity);
        RegistrationStatus::Rejected
    };

    info!(
        "[{}] BootNotification: {} {} ({}) -> {}",
        call.identity,
        request.charging_station.vendor_name,
        request.charging_station.model,
        request.reason,
        status
    );
    context.state.record_boot(&call.identity, &request, status);

    Ok(BootNotificationResponse {
        current_time: Utc::now(),
        interval: context.config.heartbeat_interval.as_secs() as i32,
        status,
        status_info: None,
    })
}

fn heartbeat(
    context: &CsmsContext,
    call: &CallContext,
    _request: HeartbeatRequest,
) -> CallOutcome<HeartbeatResponse> {
    let now = Utc::now();
    context.state.record_heartbeat(&call.identity, now);
    Ok(HeartbeatResponse { current_time: now })
}

fn authorize(
    context: &CsmsContext,
    call: &CallContext,
    request: AuthorizeRequest,
) -> CallOutcome<AuthorizeResponse> {
    let status = context.config.authorize(&request.id_token.id_token);
    debug!("[{}] Authorize {} -> {}", call.identity, request.id_token.id_token, status);

    Ok(AuthorizeResponse {
        id_token_info: IdTokenInfo::new(status),
        certificate_status: None,
    })
}

fn status_notification(
    context: &CsmsContext,
    call: &CallContext,
    request: StatusNotificationRequest,
) -> CallOutcome<StatusNotificationResponse> {
    debug!(
        "[{}] EVSE {} connector {} is {}",
        call.identity, request.evse_id, request.connector_id, request.connector_status
    );
    context.state.record_status(
        &call.identity,
        request.evse_id,
        request.connector_id,
        request.connector_status,
        request.timestamp,
    );
    Ok(StatusNotificationResponse {})
}

fn meter_values(
    context: &CsmsContext,
    call: &CallContext,
    request: MeterValuesRequest,
) -> CallOutcome<MeterValuesResponse> {
    context
        .state
        .record_meter_values(&call.identity, request.evse_id, &request.meter_value);
    Ok(MeterValuesResponse {})
}

fn transaction_event(
    context: &CsmsContext,
    call: &CallContext,
    request: TransactionEventRequest,
) -> CallOutcome<TransactionEventResponse> {
    if let SequenceCheck::Stale { .. } = context.state.apply_transaction_event(&call.identity, &request) {
        // Already answered once; acknowledge without re-applying
        return Ok(TransactionEventResponse::default());
    }

    let id_token_info = request
        .id_token
        .as_ref()
        .map(|token| IdTokenInfo::new(context.config.authorize(&token.id_token)));

    Ok(TransactionEventResponse {
        id_token_info,
        ..Default::default()
    })
}

fn firmware_status_notification(
    context: &CsmsContext,
    call: &CallContext,
    request: FirmwareStatusNotificationRequest,
) -> CallOutcome<FirmwareStatusNotificationResponse> {
    info!(
        "[{}] Firmware status {} (request {:?})",
        call.identity, request.status, request.request_id
    );
    context.state.record_firmware_status(&call.identity, request.status);
    Ok(FirmwareStatusNotificationResponse {})
}

fn data_transfer(
    context: &CsmsContext,
    call: &CallContext,
    request: DataTransferRequest,
) -> CallOutcome<DataTransferResponse> {
    if request.vendor_id != context.config.accepted_vendor {
        debug!("[{}] DataTransfer for unknown vendor {}", call.identity, request.vendor_id);
        return Ok(DataTransferResponse::status(DataTransferStatus::UnknownVendorId));
    }

    Ok(DataTransferResponse {
        status: DataTransferStatus::Accepted,
        data: request.reversed_data(),
        status_info: None,
    })
}

fn sign_certificate(
    _context: &CsmsContext,
    call: &CallContext,
    request: SignCertificateRequest,
) -> CallOutcome<SignCertificateResponse> {
    let looks_like_csr = request
        .csr
        .trim_start()
        .starts_with("-----BEGIN CERTIFICATE REQUEST-----");

    let status = if looks_like_csr {
        info!("[{}] CSR received for {:?}", call.identity, request.certificate_type);
        GenericStatus::Accepted
    } else {
        warn!("[{}] SignCertificate without a PEM CSR", call.identity);
        GenericStatus::Rejected
    };

    Ok(SignCertificateResponse {
        status,
        status_info: None,
    })
}

fn get_certificate_status(
    _context: &CsmsContext,
    call: &CallContext,
    request: GetCertificateStatusRequest,
) -> CallOutcome<GetCertificateStatusResponse> {
    debug!(
        "[{}] OCSP status requested from {}",
        call.identity, request.ocsp_request_data.responder_url
    );
    Ok(GetCertificateStatusResponse {
        status: GetCertificateStatus::Failed,
        ocsp_result: None,
        status_info: Some(StatusInfo::new("NoOcspResponder")),
    })
}

fn get_15118_ev_certificate(
    _context: &CsmsContext,
    call: &CallContext,
    request: Get15118EvCertificateRequest,
) -> CallOutcome<Get15118EvCertificateResponse> {
    debug!(
        "[{}] ISO 15118 certificate {} ({})",
        call.identity, request.action, request.iso15118_schema_version
    );
    Ok(Get15118EvCertificateResponse {
        status: Iso15118EvCertificateStatus::Failed,
        exi_response: String::new(),
        status_info: Some(StatusInfo::new("NoContractProvider")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::types::{ChargingStationInfo, IdToken, TransactionInfo};
    use ocpp_core::Action;
    use uuid::Uuid;

    fn context(config: CsmsConfig) -> CsmsContext {
        CsmsContext {
            config,
            state: Arc::new(CsmsState::new()),
        }
    }

    fn call(action: Action) -> CallContext {
        CallContext {
            identity: "CS001".to_string(),
            connection_id: Uuid::new_v4(),
            request_id: "1".to_string(),
            action,
            event_tracking_id: Uuid::new_v4().to_string(),
            received_at: Utc::now(),
        }
    }

    fn boot_request() -> BootNotificationRequest {
        BootNotificationRequest {
            charging_station: ChargingStationInfo {
                model: "EK3-OCPP".to_string(),
                vendor_name: "Elektrokombinacija".to_string(),
                serial_number: None,
                firmware_version: None,
            },
            reason: BootReason::PowerUp,
        }
    }

    #[test]
    fn test_boot_accepts_and_records() {
        let ctx = context(CsmsConfig::default());
        let response = boot_notification(&ctx, &call(Action::BootNotification), boot_request()).unwrap();
        assert_eq!(response.status, RegistrationStatus::Accepted);
        assert_eq!(response.interval, 300);

        let snapshot = ctx.state.snapshot("CS001").unwrap();
        assert_eq!(
            snapshot.boot.unwrap().registration,
            RegistrationStatus::Accepted
        );
    }

    #[test]
    fn test_boot_rejects_unlisted_station() {
        let ctx = context(CsmsConfig::default().with_allowed_stations(["CS777"]));
        let response = boot_notification(&ctx, &call(Action::BootNotification), boot_request()).unwrap();
        assert_eq!(response.status, RegistrationStatus::Rejected);
    }

    #[test]
    fn test_heartbeat_records_time() {
        let ctx = context(CsmsConfig::default());
        let response = heartbeat(&ctx, &call(Action::Heartbeat), HeartbeatRequest {}).unwrap();
        assert_eq!(
            ctx.state.snapshot("CS001").unwrap().last_heartbeat,
            Some(response.current_time)
        );
    }

    #[test]
    fn test_data_transfer_vendor_check() {
        let ctx = context(CsmsConfig::default());

        let rejected = data_transfer(
            &ctx,
            &call(Action::DataTransfer),
            DataTransferRequest::new("V").with_data("abc"),
        )
        .unwrap();
        assert_eq!(rejected.status, DataTransferStatus::UnknownVendorId);

        let accepted = data_transfer(
            &ctx,
            &call(Action::DataTransfer),
            DataTransferRequest::new("GraphDefined OEM").with_data("abc"),
        )
        .unwrap();
        assert_eq!(accepted.status, DataTransferStatus::Accepted);
        assert_eq!(accepted.data, Some(serde_json::json!("cba")));
    }

    #[test]
    fn test_transaction_event_authorizes_token() {
        let ctx = context(CsmsConfig::default().with_id_token("BAD", AuthorizationStatus::Blocked));
        let mut request = TransactionEventRequest::new(
            TransactionEventType::Started,
            TriggerReason::Authorized,
            0,
            TransactionInfo::new("tx-9"),
        );
        request.id_token = Some(IdToken::central("BAD"));

        let response = transaction_event(&ctx, &call(Action::TransactionEvent), request.clone()).unwrap();
        assert_eq!(
            response.id_token_info.unwrap().status,
            AuthorizationStatus::Blocked
        );

        // Replayed event is acknowledged but not re-applied
        let replay = transaction_event(&ctx, &call(Action::TransactionEvent), request).unwrap();
        assert!(replay.id_token_info.is_none());
    }

    #[test]
    fn test_sign_certificate_requires_pem_csr() {
        let ctx = context(CsmsConfig::default());
        let ok = sign_certificate(
            &ctx,
            &call(Action::SignCertificate),
            SignCertificateRequest {
                csr: "-----BEGIN CERTIFICATE REQUEST-----\nMIIB".to_string(),
                certificate_type: Some(CertificateSigningUse::ChargingStationCertificate),
            },
        )
        .unwrap();
        assert_eq!(ok.status, GenericStatus::Accepted);

        let bad = sign_certificate(
            &ctx,
            &call(Action::SignCertificate),
            SignCertificateRequest {
                csr: "garbage".to_string(),
                certificate_type: None,
            },
        )
        .unwrap();
        assert_eq!(bad.status, GenericStatus::Rejected);
    }

    #[test]
    fn test_router_covers_station_initiated_actions() {
        let ctx = Arc::new(context(CsmsConfig::default()));
        let router = router(&ctx);
        for action in [
            Action::BootNotification,
            Action::Heartbeat,
            Action::Authorize,
            Action::TransactionEvent,
            Action::StatusNotification,
            Action::MeterValues,
            Action::FirmwareStatusNotification,
            Action::SignCertificate,
            Action::GetCertificateStatus,
            Action::Get15118EvCertificate,
            Action::DataTransfer,
        ] {
            assert!(router.handles(action), "{} not routed", action);
        }
        assert!(!router.handles(Action::Reset));
    }
}
