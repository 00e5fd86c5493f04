//! Charging station runtime
//!
//! [`ChargingStation`] owns the dispatcher for the station role, the local
//! [`StationState`] and the periodic work (heartbeat, maintenance). A carrier
//! hands over each connection with [`ChargingStation::attach`]; the typed
//! outbound operations below then go through that connection, or fail with
//! the unreachable `Server` failure while there is none.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use ocpp_core::catalog::*;
use ocpp_core::enums::*;
use ocpp_core::types::{Evse, IdToken, OcspRequestData};
use ocpp_core::{
    CallFailure, CallOptions, CallOutcome, DispatchConfig, Dispatcher, Endpoint, FailureKind,
    FrameSink, Hooks, OcppRequest, PeriodicTask, Role,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::StationConfig;
use crate::handlers::{self, FollowUp, StationContext};
use crate::state::{SessionEvent, StationState};

/// Pause between reported firmware update steps
const FIRMWARE_STEP: Duration = Duration::from_millis(500);

struct Inner {
    config: StationConfig,
    state: Arc<StationState>,
    dispatcher: Dispatcher,
    endpoint: Mutex<Option<Arc<Endpoint>>>,
    follow_ups: Mutex<Option<mpsc::UnboundedReceiver<FollowUp>>>,
    heartbeat: Mutex<Option<PeriodicTask>>,
    maintenance: Mutex<Option<PeriodicTask>>,
}

impl Inner {
    fn endpoint(&self) -> Option<Arc<Endpoint>> {
        self.endpoint
            .lock()
            .as_ref()
            .filter(|endpoint| !endpoint.is_closed())
            .cloned()
    }

    /// Forget the connection if it is still the current one
    fn detach(&self, connection_id: uuid::Uuid) {
        let mut current = self.endpoint.lock();
        if current
            .as_ref()
            .is_some_and(|endpoint| endpoint.connection_id() == connection_id)
        {
            *current = None;
            drop(current);
            self.heartbeat.lock().take();
            self.state.handle_event(SessionEvent::Disconnected);
        }
    }
}

/// Handle to a charging station; clones share the same station
#[derive(Clone)]
pub struct ChargingStation {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChargingStation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargingStation")
            .field("station_id", &self.inner.config.station_id)
            .field("session", &self.inner.state.session())
            .finish()
    }
}

impl ChargingStation {
    pub fn new(config: StationConfig) -> Self {
        let state = Arc::new(StationState::new(&config));
        let (follow_ups, follow_up_rx) = mpsc::unbounded_channel();

        let context = Arc::new(StationContext {
            config: config.clone(),
            state: Arc::clone(&state),
            follow_ups,
        });
        let dispatcher = Dispatcher::new(
            Role::ChargingStation,
            handlers::router(&context),
            DispatchConfig::default().with_request_timeout(config.request_timeout),
        );

        Self {
            inner: Arc::new(Inner {
                config,
                state,
                dispatcher,
                endpoint: Mutex::new(None),
                follow_ups: Mutex::new(Some(follow_up_rx)),
                heartbeat: Mutex::new(None),
                maintenance: Mutex::new(None),
            }),
        }
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &StationConfig {
        &self.inner.config
    }

    pub fn state(&self) -> &Arc<StationState> {
        &self.inner.state
    }

    pub fn hooks(&self) -> &Arc<Hooks> {
        self.inner.dispatcher.hooks()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.endpoint().is_some()
    }

    /// Take over a connection to the CSMS. `identity` is the name the
    /// connection was established under; CSMS calls arriving on it are
    /// rejected unless it matches the configured station id. Received frames
    /// are pumped on a spawned task; a previous connection is closed.
    pub fn attach(
        &self,
        identity: impl Into<String>,
        sink: FrameSink,
        frames: mpsc::Receiver<String>,
    ) -> Arc<Endpoint> {
        let identity = identity.into();
        if identity != self.inner.config.station_id {
            warn!(
                "[{}] Connection established as {}",
                self.inner.config.station_id, identity
            );
        }
        let endpoint = self.inner.dispatcher.endpoint(identity, sink);

        let previous = self.inner.endpoint.lock().replace(Arc::clone(&endpoint));
        if let Some(previous) = previous {
            info!(
                "[{}] Connection {} replaced by {}",
                self.inner.config.station_id,
                previous.connection_id(),
                endpoint.connection_id()
            );
            previous.close();
        }
        self.inner.state.handle_event(SessionEvent::Connected);

        let weak = Arc::downgrade(&self.inner);
        let reader = Arc::clone(&endpoint);
        tokio::spawn(async move {
            let connection_id = reader.connection_id();
            reader.run(frames).await;
            if let Some(inner) = weak.upgrade() {
                inner.detach(connection_id);
            }
        });

        self.spawn_follow_up_worker();
        self.start_maintenance();
        endpoint
    }

    /// Close the current connection, if any
    pub fn disconnect(&self) {
        let endpoint = self.inner.endpoint.lock().take();
        if let Some(endpoint) = endpoint {
            endpoint.close();
            self.inner.heartbeat.lock().take();
            self.inner.state.handle_event(SessionEvent::Disconnected);
        }
    }

    /// Send any station-initiated request with the configured timeout
    pub async fn call<R: OcppRequest>(&self, request: R) -> CallOutcome<R::Response> {
        self.call_with(request, CallOptions::default()).await
    }

    pub async fn call_with<R: OcppRequest>(
        &self,
        request: R,
        options: CallOptions,
    ) -> CallOutcome<R::Response> {
        request.validate()?;

        let Some(endpoint) = self.inner.endpoint() else {
            debug!("[{}] {} while disconnected", self.inner.config.station_id, R::ACTION);
            return Err(CallFailure::unreachable());
        };
        endpoint.call(request, options).await
    }

    // ========================================================================
    // Provisioning
    // ========================================================================

    /// Send BootNotification and apply the registration outcome
    pub async fn boot_notification(
        &self,
        reason: BootReason,
    ) -> CallOutcome<BootNotificationResponse> {
        let request = BootNotificationRequest {
            charging_station: self.inner.state.charging_station_info(),
            reason,
        };
        let response = self.call(request).await?;

        let interval = response.interval;
        match response.status {
            RegistrationStatus::Accepted => {
                self.inner
                    .state
                    .handle_event(SessionEvent::BootAccepted { interval });
                self.start_heartbeat();
            }
            RegistrationStatus::Pending => {
                self.inner
                    .state
                    .handle_event(SessionEvent::BootPending { interval });
            }
            _ => {
                self.inner
                    .state
                    .handle_event(SessionEvent::BootRejected { interval });
            }
        }

        Ok(response)
    }

    /// Boot until the CSMS accepts, then report every connector
    pub async fn register(&self) -> CallOutcome<BootNotificationResponse> {
        loop {
            let response = self.boot_notification(BootReason::PowerUp).await?;
            if response.status == RegistrationStatus::Accepted {
                self.status_notification_all().await?;
                return Ok(response);
            }

            let retry = if response.interval > 0 {
                Duration::from_secs(response.interval as u64)
            } else {
                self.inner.config.reconnect_delay
            };
            info!(
                "[{}] Registration {}, retrying in {:?}",
                self.inner.config.station_id, response.status, retry
            );
            tokio::time::sleep(retry).await;
        }
    }

    /// Send Heartbeat and keep the CSMS clock
    pub async fn heartbeat(&self) -> CallOutcome<HeartbeatResponse> {
        let response = self.call(HeartbeatRequest {}).await?;
        self.inner.state.handle_event(SessionEvent::HeartbeatAnswered {
            current_time: response.current_time,
        });
        Ok(response)
    }

    // ========================================================================
    // Authorization and availability
    // ========================================================================

    /// Authorize a token with the CSMS and cache the answer
    pub async fn authorize(&self, id_token: IdToken) -> CallOutcome<AuthorizeResponse> {
        let token = id_token.id_token.clone();
        let response = self.call(AuthorizeRequest::new(id_token)).await?;
        self.inner
            .state
            .cache_authorization(&token, response.id_token_info.clone());
        Ok(response)
    }

    /// Report the current status of one connector
    pub async fn status_notification(
        &self,
        evse_id: i32,
        connector_id: i32,
    ) -> CallOutcome<StatusNotificationResponse> {
        let Some(status) = self.inner.state.connector_status(evse_id, connector_id) else {
            return Err(CallFailure::new(
                FailureKind::Validation,
                format!("unknown connector {}/{}", evse_id, connector_id),
            ));
        };

        self.call(StatusNotificationRequest {
            timestamp: Utc::now(),
            connector_status: status,
            evse_id,
            connector_id,
        })
        .await
    }

    /// Report every connector, optionally limited to one EVSE
    pub async fn status_notification_all(&self) -> CallOutcome<()> {
        self.status_notifications(None).await
    }

    async fn status_notifications(&self, evse: Option<&Evse>) -> CallOutcome<()> {
        let statuses = self.inner.state.connector_statuses();
        for (evse_id, connector_id, _) in statuses {
            let wanted = evse.map_or(true, |e| {
                e.id == evse_id && e.connector_id.map_or(true, |c| c == connector_id)
            });
            if wanted {
                self.status_notification(evse_id, connector_id).await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Send MeterValues with the register of one EVSE, or of all
    pub async fn meter_values(&self, evse_id: Option<i32>) -> CallOutcome<()> {
        for request in self.inner.state.meter_values(evse_id) {
            self.call(request).await?;
        }
        Ok(())
    }

    /// Send a TransactionEvent; a returned token status updates the cache
    pub async fn transaction_event(
        &self,
        request: TransactionEventRequest,
    ) -> CallOutcome<TransactionEventResponse> {
        let token = request.id_token.as_ref().map(|t| t.id_token.clone());
        let response = self.call(request).await?;

        if let (Some(token), Some(info)) = (token, response.id_token_info.as_ref()) {
            self.inner.state.cache_authorization(&token, info.clone());
        }
        Ok(response)
    }

    /// Start a locally initiated transaction: authorize with the CSMS unless
    /// the token is known locally, then report it
    pub async fn start_transaction(
        &self,
        evse_id: Option<i32>,
        id_token: IdToken,
    ) -> CallOutcome<Option<String>> {
        if self.inner.state.authorize_locally(&id_token.id_token).is_none() {
            let response = self.authorize(id_token.clone()).await?;
            if response.id_token_info.status != AuthorizationStatus::Accepted {
                info!(
                    "[{}] Token {} not authorized: {}",
                    self.inner.config.station_id,
                    id_token.id_token,
                    response.id_token_info.status
                );
                return Ok(None);
            }
        }

        let Some((event, changed)) = self
            .inner
            .state
            .start_transaction(evse_id, id_token, None, None)
        else {
            return Ok(None);
        };

        let transaction_id = event.transaction_info.transaction_id.clone();
        self.report_status(changed).await?;
        self.transaction_event(event).await?;
        Ok(Some(transaction_id))
    }

    /// Stop a transaction locally and report it
    pub async fn stop_transaction(
        &self,
        transaction_id: &str,
        reason: StopReason,
    ) -> CallOutcome<bool> {
        let Some((event, changed)) = self.inner.state.stop_transaction(
            transaction_id,
            reason,
            TriggerReason::StopAuthorized,
        ) else {
            return Ok(false);
        };

        self.transaction_event(event).await?;
        self.report_status(changed).await?;
        Ok(true)
    }

    async fn report_status(&self, changed: Vec<(i32, i32)>) -> CallOutcome<()> {
        for (evse_id, connector_id) in changed {
            self.status_notification(evse_id, connector_id).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Firmware and security
    // ========================================================================

    pub async fn firmware_status_notification(
        &self,
        status: FirmwareStatus,
        request_id: Option<i32>,
    ) -> CallOutcome<FirmwareStatusNotificationResponse> {
        self.call(FirmwareStatusNotificationRequest { status, request_id })
            .await
    }

    /// Ask the CSMS to sign a certificate signing request
    pub async fn sign_certificate(
        &self,
        csr: impl Into<String>,
        certificate_type: Option<CertificateSigningUse>,
    ) -> CallOutcome<SignCertificateResponse> {
        self.call(SignCertificateRequest {
            csr: csr.into(),
            certificate_type,
        })
        .await
    }

    pub async fn get_certificate_status(
        &self,
        ocsp_request_data: OcspRequestData,
    ) -> CallOutcome<GetCertificateStatusResponse> {
        self.call(GetCertificateStatusRequest { ocsp_request_data })
            .await
    }

    pub async fn get_15118_ev_certificate(
        &self,
        request: Get15118EvCertificateRequest,
    ) -> CallOutcome<Get15118EvCertificateResponse> {
        self.call(request).await
    }

    pub async fn data_transfer(
        &self,
        request: DataTransferRequest,
    ) -> CallOutcome<DataTransferResponse> {
        self.call(request).await
    }

    // ========================================================================
    // Periodic work
    // ========================================================================

    /// (Re)start the heartbeat with the interval handed out by the CSMS
    fn start_heartbeat(&self) {
        let period = self.inner.state.heartbeat_interval();
        let weak = Arc::downgrade(&self.inner);
        let task = PeriodicTask::spawn("heartbeat", period, move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let station = ChargingStation::from_inner(inner);
                if let Err(e) = station.heartbeat().await {
                    warn!("[{}] Heartbeat failed: {}", station.inner.config.station_id, e);
                }
            }
        });
        *self.inner.heartbeat.lock() = Some(task);
    }

    fn start_maintenance(&self) {
        let mut maintenance = self.inner.maintenance.lock();
        if maintenance.is_some() {
            return;
        }

        let period = self.inner.config.maintenance_interval;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        *maintenance = Some(PeriodicTask::spawn("maintenance", period, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    ChargingStation::from_inner(inner).maintain(period).await;
                }
            }
        }));
    }

    /// Expire reservations, advance meters and run a reset that became due
    async fn maintain(&self, elapsed: Duration) {
        let state = &self.inner.state;

        let expired = state.expire_reservations(Utc::now());
        let updates = state.sample_meters(elapsed);
        let due_reset = state.take_due_reset();

        if !self.is_connected() {
            return;
        }
        if let Err(e) = self.report_status(expired).await {
            debug!("[{}] Status report failed: {}", self.inner.config.station_id, e);
        }
        for event in updates {
            if let Err(e) = self.transaction_event(event).await {
                debug!("[{}] Meter update failed: {}", self.inner.config.station_id, e);
            }
        }
        if let Some(reset_type) = due_reset {
            self.perform_reset(reset_type).await;
        }
    }

    // ========================================================================
    // Follow-up work queued by handlers
    // ========================================================================

    fn spawn_follow_up_worker(&self) {
        let Some(mut rx) = self.inner.follow_ups.lock().take() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(work) = rx.recv().await {
                // Let the response to the triggering call go out first
                tokio::task::yield_now().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ChargingStation::from_inner(inner).perform(work).await;
            }
        });
    }

    async fn perform(&self, work: FollowUp) {
        let station_id = &self.inner.config.station_id;
        debug!("[{}] Follow-up: {:?}", station_id, work);

        let outcome = match work {
            FollowUp::StatusChanged(changed) => self.report_status(changed).await,
            FollowUp::TransactionEvent(event) => self.transaction_event(*event).await.map(|_| ()),
            FollowUp::Trigger { message, evse } => self.triggered(message, evse).await,
            FollowUp::Firmware { request_id } => self.run_firmware_update(request_id).await,
            FollowUp::Reset(reset_type) => {
                self.perform_reset(reset_type).await;
                Ok(())
            }
        };

        if let Err(e) = outcome {
            warn!("[{}] Follow-up failed: {}", station_id, e);
        }
    }

    async fn triggered(&self, message: MessageTrigger, evse: Option<Evse>) -> CallOutcome<()> {
        let evse_id = evse.as_ref().map(|e| e.id);
        match message {
            MessageTrigger::BootNotification => {
                self.boot_notification(BootReason::Triggered).await?;
            }
            MessageTrigger::Heartbeat => {
                self.heartbeat().await?;
            }
            MessageTrigger::StatusNotification => {
                self.status_notifications(evse.as_ref()).await?;
            }
            MessageTrigger::MeterValues => {
                self.meter_values(evse_id).await?;
            }
            MessageTrigger::TransactionEvent => {
                for event in self
                    .inner
                    .state
                    .transaction_updates(evse_id, TriggerReason::Trigger)
                {
                    self.transaction_event(event).await?;
                }
            }
            MessageTrigger::FirmwareStatusNotification => {
                let (status, request_id) = self.inner.state.firmware_status();
                self.firmware_status_notification(status, request_id).await?;
            }
            other => debug!("[{}] Trigger {} ignored", self.inner.config.station_id, other),
        }
        Ok(())
    }

    /// Walk an accepted firmware update through download and install,
    /// stopping when a newer request supersedes it
    async fn run_firmware_update(&self, request_id: i32) -> CallOutcome<()> {
        let Some(update) = self.inner.state.firmware() else {
            return Ok(());
        };
        if let Ok(wait) = (update.retrieve_date_time - Utc::now()).to_std() {
            tokio::time::sleep(wait).await;
        }

        for status in [
            FirmwareStatus::Downloading,
            FirmwareStatus::Downloaded,
            FirmwareStatus::Installing,
            FirmwareStatus::Installed,
        ] {
            if !self.inner.state.advance_firmware(request_id, status) {
                debug!(
                    "[{}] Firmware request {} superseded",
                    self.inner.config.station_id, request_id
                );
                return Ok(());
            }
            self.firmware_status_notification(status, Some(request_id))
                .await?;
            tokio::time::sleep(FIRMWARE_STEP).await;
        }

        info!(
            "[{}] Firmware from {} installed",
            self.inner.config.station_id, update.location
        );
        Ok(())
    }

    /// End every transaction and boot again
    async fn perform_reset(&self, reset_type: ResetType) {
        let station_id = &self.inner.config.station_id;
        info!("[{}] Performing {} reset", station_id, reset_type);

        for transaction_id in self.inner.state.transaction_ids() {
            let stopped = self.inner.state.stop_transaction(
                &transaction_id,
                StopReason::ImmediateReset,
                TriggerReason::ResetCommand,
            );
            if let Some((event, _)) = stopped {
                if let Err(e) = self.transaction_event(event).await {
                    warn!("[{}] Ending {} failed: {}", station_id, transaction_id, e);
                }
            }
        }

        match self.boot_notification(BootReason::RemoteReset).await {
            Ok(response) if response.status == RegistrationStatus::Accepted => {
                if let Err(e) = self.status_notification_all().await {
                    warn!("[{}] Status report after reset failed: {}", station_id, e);
                }
            }
            Ok(response) => info!("[{}] Boot after reset: {}", station_id, response.status),
            Err(e) => warn!("[{}] Boot after reset failed: {}", station_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::{result_code, ResultCode, UNREACHABLE_STATION};

    fn station() -> ChargingStation {
        ChargingStation::new(StationConfig::new("ws://localhost", "CS001"))
    }

    #[tokio::test]
    async fn test_calls_without_connection_are_unreachable() {
        let station = station();
        assert!(!station.is_connected());

        let outcome = station.heartbeat().await;
        assert_eq!(result_code(&outcome), ResultCode::Server);
        assert_eq!(outcome.unwrap_err().message, UNREACHABLE_STATION);
        assert!(station.state().csms_time().is_none());
    }

    #[tokio::test]
    async fn test_unknown_connector_status_is_validation_failure() {
        let station = station();
        let failure = station.status_notification(4, 1).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Validation);
    }

    #[tokio::test]
    async fn test_attach_and_disconnect_drive_session() {
        let station = station();
        let (sink, _outgoing) = FrameSink::channel(8);
        let (_frames_tx, frames) = mpsc::channel(8);

        let endpoint = station.attach("CS001", sink, frames);
        assert_eq!(endpoint.identity(), "CS001");
        assert!(station.is_connected());
        assert_eq!(station.state().session(), crate::state::SessionState::Connected);

        station.disconnect();
        assert!(!station.is_connected());
        assert!(endpoint.is_closed());
        assert_eq!(station.state().session(), crate::state::SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_attach_keeps_connection_identity() {
        let station = station();
        let (sink, _outgoing) = FrameSink::channel(8);
        let (_frames_tx, frames) = mpsc::channel(8);

        let endpoint = station.attach("CS999", sink, frames);
        assert_eq!(endpoint.identity(), "CS999");
        assert_eq!(station.config().station_id, "CS001");
    }
}
