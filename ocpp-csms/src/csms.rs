//! CSMS facade
//!
//! Owns the dispatcher for the CSMS role, the station registry and the
//! per-station state. Carriers hand over each authenticated connection with
//! [`Csms::attach`]; outbound operations resolve the station in the registry
//! and degrade to a typed `Server` failure when it cannot be reached.

use std::sync::Arc;

use ocpp_core::catalog::*;
use ocpp_core::{
    CallFailure, CallOptions, CallOutcome, DispatchConfig, Dispatcher, Endpoint, FrameSink, Hooks,
    OcppRequest, Role, StationId,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::CsmsConfig;
use crate::handlers::{self, CsmsContext};
use crate::registry::{RegistryError, StationRegistry};
use crate::state::{CsmsState, StationSnapshot};

/// Charging station management system
#[derive(Debug)]
pub struct Csms {
    config: CsmsConfig,
    dispatcher: Dispatcher,
    registry: Arc<StationRegistry>,
    state: Arc<CsmsState>,
}

impl Csms {
    pub fn new(config: CsmsConfig) -> Self {
        let state = Arc::new(CsmsState::new());
        let registry = Arc::new(StationRegistry::new(config.registry_lock_timeout));

        let listener_state = Arc::clone(&state);
        registry
            .listeners()
            .register(move |event| listener_state.on_registry_event(event));

        let context = Arc::new(CsmsContext {
            config: config.clone(),
            state: Arc::clone(&state),
        });
        let dispatcher = Dispatcher::new(
            Role::Csms,
            handlers::router(&context),
            DispatchConfig::default().with_request_timeout(config.request_timeout),
        );

        Self {
            config,
            dispatcher,
            registry,
            state,
        }
    }

    pub fn config(&self) -> &CsmsConfig {
        &self.config
    }

    /// Request/response observation hooks for every station connection
    pub fn hooks(&self) -> &Arc<Hooks> {
        self.dispatcher.hooks()
    }

    pub fn registry(&self) -> &Arc<StationRegistry> {
        &self.registry
    }

    /// Take over an authenticated connection. Received frames are pumped on
    /// a spawned task until the carrier goes away or the connection is
    /// superseded; the registry record is then dropped if still ours.
    pub async fn attach(
        &self,
        station_id: impl Into<StationId>,
        sink: FrameSink,
        frames: mpsc::Receiver<String>,
    ) -> Result<Arc<Endpoint>, RegistryError> {
        let station_id = station_id.into();
        let endpoint = self.dispatcher.endpoint(station_id.clone(), sink);

        if let Some(previous) = self
            .registry
            .register(station_id.clone(), Arc::clone(&endpoint))
            .await?
        {
            info!(
                "[{}] Connection {} superseded by {}",
                station_id,
                previous.connection_id(),
                endpoint.connection_id()
            );
        }

        let registry = Arc::clone(&self.registry);
        let reader = Arc::clone(&endpoint);
        tokio::spawn(async move {
            let connection_id = reader.connection_id();
            let touched = (Arc::clone(&registry), station_id.clone());
            reader
                .run_with(frames, move || {
                    let (registry, station_id) = touched.clone();
                    async move {
                        if let Err(e) = registry.touch(&station_id).await {
                            debug!("[{}] last-seen not updated: {}", station_id, e);
                        }
                    }
                })
                .await;

            if let Err(e) = registry
                .unregister_connection(&station_id, connection_id)
                .await
            {
                warn!("[{}] Failed to unregister connection: {}", station_id, e);
            }
        });

        Ok(endpoint)
    }

    /// Send any CSMS-initiated request with the configured timeout
    pub async fn call<R: OcppRequest>(
        &self,
        station_id: &str,
        request: R,
    ) -> CallOutcome<R::Response> {
        self.call_with(station_id, request, CallOptions::default())
            .await
    }

    /// Send any CSMS-initiated request. An unknown or unreachable station is
    /// answered locally, without waiting.
    pub async fn call_with<R: OcppRequest>(
        &self,
        station_id: &str,
        request: R,
        options: CallOptions,
    ) -> CallOutcome<R::Response> {
        request.validate()?;

        let record = match self.registry.resolve(station_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("[{}] {} to unknown station", station_id, R::ACTION);
                return Err(CallFailure::unreachable());
            }
            Err(e) => {
                warn!("[{}] {} not routed: {}", station_id, R::ACTION, e);
                return Err(CallFailure::unreachable());
            }
        };

        record.connection.call(request, options).await
    }

    // ========================================================================
    // Admin query surface
    // ========================================================================

    /// Last-known state of every station seen since start
    pub fn stations(&self) -> Vec<StationSnapshot> {
        self.state.snapshots()
    }

    pub fn station(&self, station_id: &str) -> Option<StationSnapshot> {
        self.state.snapshot(station_id)
    }

    /// Ids of stations with a live connection
    pub async fn connected_stations(&self) -> Result<Vec<StationId>, RegistryError> {
        Ok(self
            .registry
            .list()
            .await?
            .into_iter()
            .map(|record| record.station_id)
            .collect())
    }
}

macro_rules! outbound {
    ($($(#[$doc:meta])* $method:ident($request:ty) -> $response:ty;)*) => {
        impl Csms {
            $(
                $(#[$doc])*
                pub async fn $method(
                    &self,
                    station_id: &str,
                    request: $request,
                ) -> CallOutcome<$response> {
                    self.call(station_id, request).await
                }
            )*
        }
    };
}

outbound! {
    reset(ResetRequest) -> ResetResponse;
    change_availability(ChangeAvailabilityRequest) -> ChangeAvailabilityResponse;
    /// Ask the station to send a station-initiated message now
    trigger_message(TriggerMessageRequest) -> TriggerMessageResponse;
    update_firmware(UpdateFirmwareRequest) -> UpdateFirmwareResponse;
    reserve_now(ReserveNowRequest) -> ReserveNowResponse;
    cancel_reservation(CancelReservationRequest) -> CancelReservationResponse;
    set_charging_profile(SetChargingProfileRequest) -> SetChargingProfileResponse;
    clear_charging_profile(ClearChargingProfileRequest) -> ClearChargingProfileResponse;
    get_composite_schedule(GetCompositeScheduleRequest) -> GetCompositeScheduleResponse;
    unlock_connector(UnlockConnectorRequest) -> UnlockConnectorResponse;
    get_local_list_version(GetLocalListVersionRequest) -> GetLocalListVersionResponse;
    send_local_list(SendLocalListRequest) -> SendLocalListResponse;
    clear_cache(ClearCacheRequest) -> ClearCacheResponse;
    request_start_transaction(RequestStartTransactionRequest) -> RequestStartTransactionResponse;
    request_stop_transaction(RequestStopTransactionRequest) -> RequestStopTransactionResponse;
    certificate_signed(CertificateSignedRequest) -> CertificateSignedResponse;
    install_certificate(InstallCertificateRequest) -> InstallCertificateResponse;
    delete_certificate(DeleteCertificateRequest) -> DeleteCertificateResponse;
    get_installed_certificate_ids(GetInstalledCertificateIdsRequest) -> GetInstalledCertificateIdsResponse;
    /// Vendor-specific exchange initiated by the CSMS
    data_transfer(DataTransferRequest) -> DataTransferResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::enums::*;
    use ocpp_core::messages::{CallResult, OcppMessage};
    use ocpp_core::transport::DEFAULT_FRAME_BUFFER;
    use ocpp_core::{pipe, FailureKind, PipeEnd, ResultCode, UNREACHABLE_STATION};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn reset() -> ResetRequest {
        ResetRequest {
            reset_type: ResetType::Immediate,
            evse_id: None,
        }
    }

    /// Answers every CALL with `payload`
    fn fake_station(end: PipeEnd, payload: serde_json::Value) {
        let PipeEnd { sink, mut frames } = end;
        tokio::spawn(async move {
            while let Some(text) = frames.recv().await {
                if let Ok(OcppMessage::Call(call)) = OcppMessage::parse(text.as_bytes()) {
                    let reply = OcppMessage::CallResult(
                        CallResult::new(call.message_id, &payload).unwrap(),
                    );
                    if sink.send(reply.to_text().unwrap()).await.is_err() {
                        break;
                    }
                }
            }
        });
    }

    #[tokio::test]
    async fn test_unreachable_station_is_typed_server_failure() {
        let csms = Csms::new(CsmsConfig::default());

        for _ in 0..3 {
            let failure = assert_err!(csms.reset("NOPE", reset()).await);
            assert_eq!(failure.kind, FailureKind::Routing);
            assert_eq!(failure.result_code(), ResultCode::Server);
            assert_eq!(failure.message, UNREACHABLE_STATION);
        }
    }

    #[tokio::test]
    async fn test_validation_runs_before_routing() {
        let csms = Csms::new(CsmsConfig::default());
        let failure = csms
            .get_composite_schedule(
                "NOPE",
                GetCompositeScheduleRequest {
                    duration: 0,
                    charging_rate_unit: None,
                    evse_id: 1,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Validation);
    }

    #[tokio::test]
    async fn test_call_over_pipe() {
        let csms = Csms::new(CsmsConfig::default());
        let (server_end, station_end) = pipe(DEFAULT_FRAME_BUFFER);
        csms.attach("CS001", server_end.sink, server_end.frames)
            .await
            .unwrap();
        fake_station(station_end, serde_json::json!({ "status": "Scheduled" }));

        let response = assert_ok!(csms.reset("CS001", reset()).await);
        assert_eq!(response.status, ResetStatus::Scheduled);
        assert!(csms.station("CS001").unwrap().connected);
        assert_eq!(csms.connected_stations().await.unwrap(), vec!["CS001".to_string()]);
    }

    #[tokio::test]
    async fn test_station_initiated_heartbeat_over_pipe() {
        let csms = Csms::new(CsmsConfig::default());
        let (server_end, station_end) = pipe(DEFAULT_FRAME_BUFFER);
        csms.attach("CS001", server_end.sink, server_end.frames)
            .await
            .unwrap();

        let PipeEnd { sink, mut frames } = station_end;
        sink.send(r#"[2,"hb-1","Heartbeat",{}]"#.to_string())
            .await
            .unwrap();

        let reply = frames.recv().await.unwrap();
        match OcppMessage::parse(reply.as_bytes()).unwrap() {
            OcppMessage::CallResult(result) => {
                assert_eq!(result.message_id, "hb-1");
                let response: HeartbeatResponse = result.parse_payload().unwrap();
                assert_eq!(
                    csms.station("CS001").unwrap().last_heartbeat,
                    Some(response.current_time)
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_received_frames_refresh_last_seen() {
        let csms = Csms::new(CsmsConfig::default());
        let (server_end, station_end) = pipe(DEFAULT_FRAME_BUFFER);
        csms.attach("CS001", server_end.sink, server_end.frames)
            .await
            .unwrap();
        let attached = csms.registry().resolve("CS001").await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let PipeEnd { sink, mut frames } = station_end;
        sink.send(r#"[2,"hb-2","Heartbeat",{}]"#.to_string())
            .await
            .unwrap();
        frames.recv().await.unwrap();

        let touched = csms.registry().resolve("CS001").await.unwrap().unwrap();
        assert!(touched.last_seen_at > attached.last_seen_at);
        assert_eq!(touched.connected_at, attached.connected_at);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let csms = Csms::new(CsmsConfig::default());
        let (server_end, station_end) = pipe(DEFAULT_FRAME_BUFFER);
        let endpoint = csms
            .attach("CS001", server_end.sink, server_end.frames)
            .await
            .unwrap();

        drop(station_end);
        endpoint.closed().await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while csms.registry().len().await.unwrap() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(!csms.station("CS001").unwrap().connected);
        let failure = csms.reset("CS001", reset()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Routing);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_connection() {
        let csms = Csms::new(CsmsConfig::default());

        let (first_server, _first_station) = pipe(DEFAULT_FRAME_BUFFER);
        let first = csms
            .attach("CS001", first_server.sink, first_server.frames)
            .await
            .unwrap();

        let (second_server, second_station) = pipe(DEFAULT_FRAME_BUFFER);
        csms.attach("CS001", second_server.sink, second_server.frames)
            .await
            .unwrap();
        fake_station(second_station, serde_json::json!({ "status": "Accepted" }));

        assert!(first.is_closed());
        let response = csms.reset("CS001", reset()).await.unwrap();
        assert_eq!(response.status, ResetStatus::Accepted);
        assert_eq!(csms.registry().len().await.unwrap(), 1);
    }
}
