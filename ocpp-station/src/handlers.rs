//! Handlers for CSMS-initiated calls
//!
//! Every handler first checks that the call arrived for this station's
//! identity, then decides on [`StationState`] and answers with the typed
//! response. Rejections are payload statuses; nothing here returns a
//! failure except the one action whose response has no status field.
//!
//! Work that has to talk back to the CSMS (StatusNotification after an
//! availability change, TransactionEvent after a remote start, firmware
//! progress) is queued as a [`FollowUp`] and sent after the response.

use std::sync::Arc;

use ocpp_core::catalog::*;
use ocpp_core::enums::*;
use ocpp_core::types::{Evse, StatusInfo};
use ocpp_core::{CallContext, CallFailure, CallOutcome, ErrorCode, Router};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::StationConfig;
use crate::state::{SessionState, StationState};

/// Reason code answered when a call names another station
pub const IDENTITY_MISMATCH: &str = "IdentityMismatch";

/// Outbound work queued by a handler
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp {
    /// Connectors whose status changed, as (evse, connector)
    StatusChanged(Vec<(i32, i32)>),
    TransactionEvent(Box<TransactionEventRequest>),
    Trigger {
        message: MessageTrigger,
        evse: Option<Evse>,
    },
    /// Walk an accepted firmware update through its states
    Firmware { request_id: i32 },
    Reset(ResetType),
}

/// State shared by all station handlers
#[derive(Debug)]
pub struct StationContext {
    pub config: StationConfig,
    pub state: Arc<StationState>,
    pub follow_ups: mpsc::UnboundedSender<FollowUp>,
}

impl StationContext {
    /// `Some` with the status to reject with when the call is not for us
    fn identity_mismatch(&self, call: &CallContext) -> Option<StatusInfo> {
        if call.identity == self.config.station_id {
            return None;
        }
        warn!(
            "[{}] {} addressed to {}, rejecting",
            self.config.station_id, call.action, call.identity
        );
        Some(StatusInfo::new(IDENTITY_MISMATCH).with_info(call.identity.clone()))
    }

    fn follow_up(&self, work: FollowUp) {
        if self.follow_ups.send(work).is_err() {
            debug!("[{}] Follow-up worker gone, dropping", self.config.station_id);
        }
    }

    fn status_changed(&self, changed: Vec<(i32, i32)>) {
        if !changed.is_empty() {
            self.follow_up(FollowUp::StatusChanged(changed));
        }
    }
}

/// Router with a handler for every CSMS-initiated action
pub fn router(context: &Arc<StationContext>) -> Router {
    Router::new()
        .on_state(context, reset)
        .on_state(context, change_availability)
        .on_state(context, trigger_message)
        .on_state(context, unlock_connector)
        .on_state(context, update_firmware)
        .on_state(context, reserve_now)
        .on_state(context, cancel_reservation)
        .on_state(context, set_charging_profile)
        .on_state(context, clear_charging_profile)
        .on_state(context, get_composite_schedule)
        .on_state(context, get_local_list_version)
        .on_state(context, send_local_list)
        .on_state(context, clear_cache)
        .on_state(context, request_start_transaction)
        .on_state(context, request_stop_transaction)
        .on_state(context, certificate_signed)
        .on_state(context, install_certificate)
        .on_state(context, delete_certificate)
        .on_state(context, get_installed_certificate_ids)
        .on_state(context, data_transfer)
}

// ============================================================================
// Provisioning
// ============================================================================

fn reset(
    context: &StationContext,
    call: &CallContext,
    request: ResetRequest,
) -> CallOutcome<ResetResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(ResetResponse {
            status: ResetStatus::Rejected,
            status_info: Some(info),
        });
    }

    let status = context.state.reset(request.reset_type, request.evse_id);
    info!("[{}] Reset {} -> {}", call.identity, request.reset_type, status);
    if status == ResetStatus::Accepted {
        context.follow_up(FollowUp::Reset(request.reset_type));
    }

    Ok(ResetResponse {
        status,
        status_info: None,
    })
}

fn trigger_message(
    context: &StationContext,
    call: &CallContext,
    request: TriggerMessageRequest,
) -> CallOutcome<TriggerMessageResponse> {
    let rejected = |reason: &str| {
        Ok(TriggerMessageResponse {
            status: TriggerMessageStatus::Rejected,
            status_info: Some(StatusInfo::new(reason)),
        })
    };

    if let Some(info) = context.identity_mismatch(call) {
        return Ok(TriggerMessageResponse {
            status: TriggerMessageStatus::Rejected,
            status_info: Some(info),
        });
    }

    let supported = matches!(
        request.requested_message,
        MessageTrigger::BootNotification
            | MessageTrigger::Heartbeat
            | MessageTrigger::StatusNotification
            | MessageTrigger::MeterValues
            | MessageTrigger::TransactionEvent
            | MessageTrigger::FirmwareStatusNotification
    );
    if !supported {
        debug!("[{}] TriggerMessage {} not implemented", call.identity, request.requested_message);
        return Ok(TriggerMessageResponse {
            status: TriggerMessageStatus::NotImplemented,
            status_info: None,
        });
    }

    if let Some(ref evse) = request.evse {
        let Some(state) = context.state.evse(evse.id) else {
            return rejected("UnknownEvse");
        };
        if let Some(connector_id) = evse.connector_id {
            if !state.connectors.contains_key(&connector_id) {
                return rejected("UnknownConnector");
            }
        }
    }

    if request.requested_message == MessageTrigger::BootNotification
        && context.state.session() == SessionState::Registered
    {
        return rejected("AlreadyRegistered");
    }

    context.follow_up(FollowUp::Trigger {
        message: request.requested_message,
        evse: request.evse,
    });
    Ok(TriggerMessageResponse {
        status: TriggerMessageStatus::Accepted,
        status_info: None,
    })
}

// ============================================================================
// Availability
// ============================================================================

fn change_availability(
    context: &StationContext,
    call: &CallContext,
    request: ChangeAvailabilityRequest,
) -> CallOutcome<ChangeAvailabilityResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(ChangeAvailabilityResponse {
            status: ChangeAvailabilityStatus::Rejected,
            status_info: Some(info),
        });
    }

    let (status, changed) = context
        .state
        .change_availability(request.evse.as_ref(), request.operational_status);
    context.status_changed(changed);

    Ok(ChangeAvailabilityResponse {
        status,
        status_info: None,
    })
}

fn unlock_connector(
    context: &StationContext,
    call: &CallContext,
    request: UnlockConnectorRequest,
) -> CallOutcome<UnlockConnectorResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(UnlockConnectorResponse {
            status: UnlockStatus::UnlockFailed,
            status_info: Some(info),
        });
    }

    Ok(UnlockConnectorResponse {
        status: context
            .state
            .unlock_connector(request.evse_id, request.connector_id),
        status_info: None,
    })
}

// ============================================================================
// Firmware
// ============================================================================

fn update_firmware(
    context: &StationContext,
    call: &CallContext,
    request: UpdateFirmwareRequest,
) -> CallOutcome<UpdateFirmwareResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(UpdateFirmwareResponse {
            status: UpdateFirmwareStatus::Rejected,
            status_info: Some(info),
        });
    }

    let status = context.state.update_firmware(&request);
    info!(
        "[{}] UpdateFirmware {} from {} -> {}",
        call.identity, request.request_id, request.firmware.location, status
    );
    if matches!(
        status,
        UpdateFirmwareStatus::Accepted | UpdateFirmwareStatus::AcceptedCanceled
    ) {
        context.follow_up(FollowUp::Firmware {
            request_id: request.request_id,
        });
    }

    Ok(UpdateFirmwareResponse {
        status,
        status_info: None,
    })
}

// ============================================================================
// Reservation
// ============================================================================

fn reserve_now(
    context: &StationContext,
    call: &CallContext,
    request: ReserveNowRequest,
) -> CallOutcome<ReserveNowResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(ReserveNowResponse {
            status: ReserveNowStatus::Rejected,
            status_info: Some(info),
        });
    }

    let (status, changed) = context.state.reserve(&request);
    context.status_changed(changed);

    Ok(ReserveNowResponse {
        status,
        status_info: None,
    })
}

fn cancel_reservation(
    context: &StationContext,
    call: &CallContext,
    request: CancelReservationRequest,
) -> CallOutcome<CancelReservationResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(CancelReservationResponse {
            status: CancelReservationStatus::Rejected,
            status_info: Some(info),
        });
    }

    let (status, changed) = context.state.cancel_reservation(request.reservation_id);
    context.status_changed(changed);

    Ok(CancelReservationResponse {
        status,
        status_info: None,
    })
}

// ============================================================================
// Smart charging
// ============================================================================

fn set_charging_profile(
    context: &StationContext,
    call: &CallContext,
    request: SetChargingProfileRequest,
) -> CallOutcome<SetChargingProfileResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(SetChargingProfileResponse {
            status: ChargingProfileStatus::Rejected,
            status_info: Some(info),
        });
    }

    Ok(SetChargingProfileResponse {
        status: context
            .state
            .set_charging_profile(request.evse_id, request.charging_profile),
        status_info: None,
    })
}

fn clear_charging_profile(
    context: &StationContext,
    call: &CallContext,
    request: ClearChargingProfileRequest,
) -> CallOutcome<ClearChargingProfileResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(ClearChargingProfileResponse {
            status: ClearChargingProfileStatus::Unknown,
            status_info: Some(info),
        });
    }

    Ok(ClearChargingProfileResponse {
        status: context.state.clear_charging_profile(
            request.charging_profile_id,
            request.charging_profile_criteria.as_ref(),
        ),
        status_info: None,
    })
}

fn get_composite_schedule(
    context: &StationContext,
    call: &CallContext,
    request: GetCompositeScheduleRequest,
) -> CallOutcome<GetCompositeScheduleResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(GetCompositeScheduleResponse {
            status: GenericStatus::Rejected,
            schedule: None,
            status_info: Some(info),
        });
    }

    let schedule = context.state.composite_schedule(
        request.evse_id,
        request.duration,
        request.charging_rate_unit,
    );
    Ok(match schedule {
        Some(schedule) => GetCompositeScheduleResponse {
            status: GenericStatus::Accepted,
            schedule: Some(schedule),
            status_info: None,
        },
        None => GetCompositeScheduleResponse {
            status: GenericStatus::Rejected,
            schedule: None,
            status_info: Some(StatusInfo::new("UnknownEvse")),
        },
    })
}

// ============================================================================
// Local authorization list
// ============================================================================

fn get_local_list_version(
    context: &StationContext,
    call: &CallContext,
    _request: GetLocalListVersionRequest,
) -> CallOutcome<GetLocalListVersionResponse> {
    // The response carries no status, so a mismatch can only be an error
    if context.identity_mismatch(call).is_some() {
        return Err(CallFailure::protocol(format!(
            "{} is not {}",
            call.identity, context.config.station_id
        ))
        .with_code(ErrorCode::SecurityError));
    }

    Ok(GetLocalListVersionResponse {
        version_number: context.state.local_list_version(),
    })
}

fn send_local_list(
    context: &StationContext,
    call: &CallContext,
    request: SendLocalListRequest,
) -> CallOutcome<SendLocalListResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(SendLocalListResponse {
            status: SendLocalListStatus::Failed,
            status_info: Some(info),
        });
    }

    Ok(SendLocalListResponse {
        status: context.state.send_local_list(
            request.version_number,
            request.update_type,
            &request.local_authorization_list,
        ),
        status_info: None,
    })
}

fn clear_cache(
    context: &StationContext,
    call: &CallContext,
    _request: ClearCacheRequest,
) -> CallOutcome<ClearCacheResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(ClearCacheResponse {
            status: ClearCacheStatus::Rejected,
            status_info: Some(info),
        });
    }

    Ok(ClearCacheResponse {
        status: context.state.clear_cache(),
        status_info: None,
    })
}

// ============================================================================
// Transactions
// ============================================================================

fn request_start_transaction(
    context: &StationContext,
    call: &CallContext,
    request: RequestStartTransactionRequest,
) -> CallOutcome<RequestStartTransactionResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(RequestStartTransactionResponse {
            status: RequestStartStopStatus::Rejected,
            transaction_id: None,
            status_info: Some(info),
        });
    }

    let started = context.state.start_transaction(
        request.evse_id,
        request.id_token,
        Some(request.remote_start_id),
        request.charging_profile,
    );

    match started {
        Some((event, changed)) => {
            let transaction_id = event.transaction_info.transaction_id.clone();
            context.status_changed(changed);
            context.follow_up(FollowUp::TransactionEvent(Box::new(event)));
            Ok(RequestStartTransactionResponse {
                status: RequestStartStopStatus::Accepted,
                transaction_id: Some(transaction_id),
                status_info: None,
            })
        }
        None => Ok(RequestStartTransactionResponse {
            status: RequestStartStopStatus::Rejected,
            transaction_id: None,
            status_info: Some(StatusInfo::new("NoEvseAvailable")),
        }),
    }
}

fn request_stop_transaction(
    context: &StationContext,
    call: &CallContext,
    request: RequestStopTransactionRequest,
) -> CallOutcome<RequestStopTransactionResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(RequestStopTransactionResponse {
            status: RequestStartStopStatus::Rejected,
            status_info: Some(info),
        });
    }

    let stopped = context.state.stop_transaction(
        &request.transaction_id,
        StopReason::Remote,
        TriggerReason::RemoteStop,
    );

    match stopped {
        Some((event, changed)) => {
            context.follow_up(FollowUp::TransactionEvent(Box::new(event)));
            context.status_changed(changed);
            Ok(RequestStopTransactionResponse {
                status: RequestStartStopStatus::Accepted,
                status_info: None,
            })
        }
        None => Ok(RequestStopTransactionResponse {
            status: RequestStartStopStatus::Rejected,
            status_info: Some(StatusInfo::new("UnknownTransaction")),
        }),
    }
}

// ============================================================================
// Security
// ============================================================================

fn certificate_signed(
    context: &StationContext,
    call: &CallContext,
    request: CertificateSignedRequest,
) -> CallOutcome<CertificateSignedResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(CertificateSignedResponse {
            status: CertificateSignedStatus::Rejected,
            status_info: Some(info),
        });
    }

    Ok(CertificateSignedResponse {
        status: context.state.certificate_signed(&request.certificate_chain),
        status_info: None,
    })
}

fn install_certificate(
    context: &StationContext,
    call: &CallContext,
    request: InstallCertificateRequest,
) -> CallOutcome<InstallCertificateResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(InstallCertificateResponse {
            status: InstallCertificateStatus::Rejected,
            status_info: Some(info),
        });
    }

    Ok(InstallCertificateResponse {
        status: context
            .state
            .install_certificate(request.certificate_type, &request.certificate),
        status_info: None,
    })
}

fn delete_certificate(
    context: &StationContext,
    call: &CallContext,
    request: DeleteCertificateRequest,
) -> CallOutcome<DeleteCertificateResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(DeleteCertificateResponse {
            status: DeleteCertificateStatus::Failed,
            status_info: Some(info),
        });
    }

    Ok(DeleteCertificateResponse {
        status: context
            .state
            .delete_certificate(&request.certificate_hash_data),
        status_info: None,
    })
}

fn get_installed_certificate_ids(
    context: &StationContext,
    call: &CallContext,
    request: GetInstalledCertificateIdsRequest,
) -> CallOutcome<GetInstalledCertificateIdsResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        return Ok(GetInstalledCertificateIdsResponse {
            status: GetInstalledCertificateStatus::NotFound,
            certificate_hash_data_chain: Vec::new(),
            status_info: Some(info),
        });
    }

    let chain = context.state.installed_certificates(&request.certificate_type);
    let status = if chain.is_empty() {
        GetInstalledCertificateStatus::NotFound
    } else {
        GetInstalledCertificateStatus::Accepted
    };

    Ok(GetInstalledCertificateIdsResponse {
        status,
        certificate_hash_data_chain: chain,
        status_info: None,
    })
}

// ============================================================================
// Data transfer
// ============================================================================

fn data_transfer(
    context: &StationContext,
    call: &CallContext,
    request: DataTransferRequest,
) -> CallOutcome<DataTransferResponse> {
    if let Some(info) = context.identity_mismatch(call) {
        let mut response = DataTransferResponse::status(DataTransferStatus::Rejected);
        response.status_info = Some(info);
        return Ok(response);
    }

    if request.vendor_id != context.config.accepted_vendor {
        debug!("[{}] DataTransfer for vendor {:?} rejected", call.identity, request.vendor_id);
        return Ok(DataTransferResponse::status(DataTransferStatus::Rejected));
    }

    Ok(DataTransferResponse {
        status: DataTransferStatus::Accepted,
        data: request.reversed_data(),
        status_info: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ocpp_core::types::IdToken;
    use ocpp_core::{Action, FailureKind};
    use uuid::Uuid;

    fn context() -> (Arc<StationContext>, mpsc::UnboundedReceiver<FollowUp>) {
        let config = StationConfig::new("ws://localhost", "CS001").with_evses(2, 1);
        let (follow_ups, rx) = mpsc::unbounded_channel();
        let context = StationContext {
            state: Arc::new(StationState::new(&config)),
            config,
            follow_ups,
        };
        (Arc::new(context), rx)
    }

    fn call(identity: &str, action: Action) -> CallContext {
        CallContext {
            identity: identity.to_string(),
            connection_id: Uuid::new_v4(),
            request_id: "1".to_string(),
            action,
            event_tracking_id: Uuid::new_v4().to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_router_covers_csms_initiated_actions() {
        let (context, _rx) = context();
        let router = router(&context);
        for action in [
            Action::Reset,
            Action::ChangeAvailability,
            Action::TriggerMessage,
            Action::UnlockConnector,
            Action::UpdateFirmware,
            Action::ReserveNow,
            Action::CancelReservation,
            Action::SetChargingProfile,
            Action::ClearChargingProfile,
            Action::GetCompositeSchedule,
            Action::GetLocalListVersion,
            Action::SendLocalList,
            Action::ClearCache,
            Action::RequestStartTransaction,
            Action::RequestStopTransaction,
            Action::CertificateSigned,
            Action::InstallCertificate,
            Action::DeleteCertificate,
            Action::GetInstalledCertificateIds,
            Action::DataTransfer,
        ] {
            assert!(router.handles(action), "{} not routed", action);
        }
        assert!(!router.handles(Action::BootNotification));
    }

    #[test]
    fn test_identity_mismatch_rejects_without_touching_state() {
        let (context, mut rx) = context();
        let request = ChangeAvailabilityRequest {
            operational_status: OperationalStatus::Inoperative,
            evse: None,
        };

        let response =
            change_availability(&context, &call("CS999", Action::ChangeAvailability), request)
                .unwrap();
        assert_eq!(response.status, ChangeAvailabilityStatus::Rejected);
        assert_eq!(
            response.status_info.map(|i| i.reason_code),
            Some(IDENTITY_MISMATCH.to_string())
        );
        assert_eq!(context.state.connector_status(1, 1), Some(ConnectorStatus::Available));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_get_local_list_version_mismatch_is_security_error() {
        let (context, _rx) = context();
        let failure = get_local_list_version(
            &context,
            &call("CS999", Action::GetLocalListVersion),
            GetLocalListVersionRequest {},
        )
        .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Protocol);
        assert_eq!(failure.wire_code(), ErrorCode::SecurityError);
    }

    #[test]
    fn test_change_availability_unknown_connector() {
        let (context, _rx) = context();
        let request = ChangeAvailabilityRequest {
            operational_status: OperationalStatus::Inoperative,
            evse: Some(Evse::with_connector(1, 7)),
        };
        let response =
            change_availability(&context, &call("CS001", Action::ChangeAvailability), request)
                .unwrap();
        assert_eq!(response.status, ChangeAvailabilityStatus::Rejected);
    }

    #[test]
    fn test_change_availability_queues_status_notifications() {
        let (context, mut rx) = context();
        let request = ChangeAvailabilityRequest {
            operational_status: OperationalStatus::Inoperative,
            evse: Some(Evse::new(1)),
        };
        let response =
            change_availability(&context, &call("CS001", Action::ChangeAvailability), request)
                .unwrap();
        assert_eq!(response.status, ChangeAvailabilityStatus::Accepted);
        assert_eq!(rx.try_recv().unwrap(), FollowUp::StatusChanged(vec![(1, 1)]));
    }

    #[test]
    fn test_data_transfer_vendor_check() {
        let (context, _rx) = context();
        let ctx = call("CS001", Action::DataTransfer);

        let response = data_transfer(
            &context,
            &ctx,
            DataTransferRequest::new("ACME").with_data("abc"),
        )
        .unwrap();
        assert_eq!(response.status, DataTransferStatus::Rejected);
        assert!(response.data.is_none());

        let response = data_transfer(
            &context,
            &ctx,
            DataTransferRequest::new("GraphDefined OEM").with_data("abc"),
        )
        .unwrap();
        assert_eq!(response.status, DataTransferStatus::Accepted);
        assert_eq!(response.data, Some(serde_json::json!("cba")));
    }

    #[test]
    fn test_trigger_message_rules() {
        let (context, mut rx) = context();
        let ctx = call("CS001", Action::TriggerMessage);
        let trigger = |message, evse| TriggerMessageRequest {
            requested_message: message,
            evse,
        };

        let response =
            trigger_message(&context, &ctx, trigger(MessageTrigger::LogStatusNotification, None))
                .unwrap();
        assert_eq!(response.status, TriggerMessageStatus::NotImplemented);

        let response = trigger_message(
            &context,
            &ctx,
            trigger(MessageTrigger::StatusNotification, Some(Evse::new(9))),
        )
        .unwrap();
        assert_eq!(response.status, TriggerMessageStatus::Rejected);

        context
            .state
            .handle_event(crate::state::SessionEvent::BootAccepted { interval: 60 });
        let response =
            trigger_message(&context, &ctx, trigger(MessageTrigger::BootNotification, None))
                .unwrap();
        assert_eq!(response.status, TriggerMessageStatus::Rejected);

        let response =
            trigger_message(&context, &ctx, trigger(MessageTrigger::Heartbeat, None)).unwrap();
        assert_eq!(response.status, TriggerMessageStatus::Accepted);
        assert_eq!(
            rx.try_recv().unwrap(),
            FollowUp::Trigger {
                message: MessageTrigger::Heartbeat,
                evse: None
            }
        );
    }

    #[test]
    fn test_remote_start_and_stop() {
        let (context, mut rx) = context();

        let response = request_start_transaction(
            &context,
            &call("CS001", Action::RequestStartTransaction),
            RequestStartTransactionRequest {
                evse_id: Some(2),
                remote_start_id: 42,
                id_token: IdToken::central("TOKEN"),
                charging_profile: None,
                group_id_token: None,
            },
        )
        .unwrap();
        assert_eq!(response.status, RequestStartStopStatus::Accepted);
        let transaction_id = response.transaction_id.unwrap();

        assert_eq!(rx.try_recv().unwrap(), FollowUp::StatusChanged(vec![(2, 1)]));
        match rx.try_recv().unwrap() {
            FollowUp::TransactionEvent(event) => {
                assert_eq!(event.event_type, TransactionEventType::Started);
                assert_eq!(event.transaction_info.remote_start_id, Some(42));
            }
            other => panic!("unexpected follow-up {:?}", other),
        }

        let ctx = call("CS001", Action::RequestStopTransaction);
        let stop = |id: &str| RequestStopTransactionRequest {
            transaction_id: id.to_string(),
        };
        let response = request_stop_transaction(&context, &ctx, stop(&transaction_id)).unwrap();
        assert_eq!(response.status, RequestStartStopStatus::Accepted);

        let response = request_stop_transaction(&context, &ctx, stop(&transaction_id)).unwrap();
        assert_eq!(response.status, RequestStartStopStatus::Rejected);
    }

    #[test]
    fn test_installed_certificate_ids_empty_is_not_found() {
        let (context, _rx) = context();
        let response = get_installed_certificate_ids(
            &context,
            &call("CS001", Action::GetInstalledCertificateIds),
            GetInstalledCertificateIdsRequest {
                certificate_type: Vec::new(),
            },
        )
        .unwrap();
        assert_eq!(response.status, GetInstalledCertificateStatus::NotFound);
        assert!(response.certificate_hash_data_chain.is_empty());
    }
}
