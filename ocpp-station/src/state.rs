//! Local state of one charging station
//!
//! Tracks the session lifecycle toward the CSMS:
//! - Boot sequence (BootNotification -> registration)
//! - Heartbeat interval and the CSMS clock
//! - EVSEs, connectors and their operational status
//! - Transactions with their TransactionEvent sequence numbers
//! - Reservations, charging profiles, local list, certificates, firmware
//!
//! Every command from the CSMS ends in one of the methods below, which decide
//! locally and answer with the protocol status. Nothing here does I/O.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ocpp_core::catalog::{
    MeterValuesRequest, ReserveNowRequest, TransactionEventRequest, UpdateFirmwareRequest,
};
use ocpp_core::enums::*;
use ocpp_core::types::*;
use ocpp_core::StationId;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StationConfig;

/// Nominal line voltage used to convert ampere limits
const LINE_VOLTAGE: f64 = 230.0;
const PHASES: f64 = 3.0;

/// Session state in the OCPP connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state, waiting to connect
    Disconnected,
    /// Connected but not registered
    Connected,
    /// BootNotification answered Pending, retry later
    BootPending,
    /// Registered with CSMS
    Registered,
    /// Registration rejected, will retry
    Rejected,
}

/// Events that can occur in the session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    BootAccepted { interval: i32 },
    BootPending { interval: i32 },
    BootRejected { interval: i32 },
    /// Heartbeat answered with the CSMS clock
    HeartbeatAnswered { current_time: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorState {
    pub connector_id: i32,
    pub status: ConnectorStatus,
}

/// Active transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub transaction_id: String,
    pub evse_id: i32,
    pub connector_id: i32,
    pub id_token: IdToken,
    pub remote_start_id: Option<i32>,
    pub reservation_id: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub charging_state: ChargingState,
    pub meter_start_wh: f64,
    /// TxProfile bound to this transaction
    pub charging_profile: Option<ChargingProfile>,
    next_seq_no: i32,
}

impl Transaction {
    /// Next `seqNo`; strictly increasing per transaction
    pub fn next_seq_no(&self) -> i32 {
        self.next_seq_no
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub reservation_id: i32,
    pub evse_id: i32,
    pub id_token: IdToken,
    pub expiry: DateTime<Utc>,
}

/// EVSE (Electric Vehicle Supply Equipment) state
#[derive(Debug, Clone, PartialEq)]
pub struct EvseState {
    pub evse_id: i32,
    pub operational: OperationalStatus,
    /// Availability change deferred until the running transaction ends
    pub pending_operational: Option<OperationalStatus>,
    pub connectors: BTreeMap<i32, ConnectorState>,
    pub transaction: Option<Transaction>,
    pub reservation: Option<Reservation>,
    pub charging_profiles: Vec<ChargingProfile>,
    /// Energy import register
    pub meter_wh: f64,
}

impl EvseState {
    pub fn new(evse_id: i32, connectors: u32) -> Self {
        Self {
            evse_id,
            operational: OperationalStatus::Operative,
            pending_operational: None,
            connectors: (1..=connectors as i32)
                .map(|id| {
                    (
                        id,
                        ConnectorState {
                            connector_id: id,
                            status: ConnectorStatus::Available,
                        },
                    )
                })
                .collect(),
            transaction: None,
            reservation: None,
            charging_profiles: Vec::new(),
            meter_wh: 0.0,
        }
    }

    fn set_connector_status(&mut self, status: ConnectorStatus) -> Vec<(i32, i32)> {
        let mut changed = Vec::new();
        for connector in self.connectors.values_mut() {
            if connector.status != status {
                connector.status = status;
                changed.push((self.evse_id, connector.connector_id));
            }
        }
        changed
    }

    /// Connector status implied by availability, transaction and reservation
    fn idle_status(&self) -> ConnectorStatus {
        if self.operational == OperationalStatus::Inoperative {
            ConnectorStatus::Unavailable
        } else if self.transaction.is_some() {
            ConnectorStatus::Occupied
        } else if self.reservation.is_some() {
            ConnectorStatus::Reserved
        } else {
            ConnectorStatus::Available
        }
    }

    fn refresh_status(&mut self) -> Vec<(i32, i32)> {
        let status = self.idle_status();
        self.set_connector_status(status)
    }

    /// Profile in effect: the transaction's TxProfile, otherwise the highest
    /// stack level
    pub fn active_profile(&self) -> Option<&ChargingProfile> {
        self.transaction
            .as_ref()
            .and_then(|tx| tx.charging_profile.as_ref())
            .or_else(|| self.charging_profiles.iter().max_by_key(|p| p.stack_level))
    }

    /// Power limit in W at `offset_secs` into the active profile
    pub fn active_power_limit_w(&self, offset_secs: i64) -> Option<f64> {
        let profile = self.active_profile()?;
        let schedule = profile.charging_schedule.first()?;
        let limit = schedule.limit_at(offset_secs)?;
        Some(to_watts(limit, schedule.charging_rate_unit))
    }
}

fn to_watts(limit: f64, unit: ChargingRateUnit) -> f64 {
    match unit {
        ChargingRateUnit::A => limit * LINE_VOLTAGE * PHASES,
        _ => limit,
    }
}

fn from_watts(watts: f64, unit: ChargingRateUnit) -> f64 {
    match unit {
        ChargingRateUnit::A => watts / (LINE_VOLTAGE * PHASES),
        _ => watts,
    }
}

/// Installed root or chain certificate
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledCertificate {
    pub certificate_type: GetCertificateIdUse,
    pub hash_data: CertificateHashData,
    pub pem: String,
}

/// Firmware update in progress
#[derive(Debug, Clone, PartialEq)]
pub struct FirmwareUpdate {
    pub request_id: i32,
    pub location: String,
    pub retrieve_date_time: DateTime<Utc>,
    pub status: FirmwareStatus,
}

fn looks_like_pem(text: &str, label: &str) -> bool {
    text.trim_start()
        .starts_with(&format!("-----BEGIN {}-----", label))
}

/// SHA-256 fingerprint standing in for the X.509 issuer hashes, as
/// lowercase hex truncated to `max_len` characters
fn fingerprint(pem: &str, salt: &str, max_len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(pem.trim().as_bytes());
    let mut hex: String = hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();
    hex.truncate(max_len);
    hex
}

#[derive(Debug)]
struct Inner {
    session: SessionState,
    registered_at: Option<DateTime<Utc>>,
    heartbeat_interval: Duration,
    last_heartbeat: Option<DateTime<Utc>>,
    csms_time: Option<DateTime<Utc>>,
    evses: BTreeMap<i32, EvseState>,
    local_list_version: i32,
    local_list: HashMap<String, AuthorizationData>,
    auth_cache: HashMap<String, IdTokenInfo>,
    certificates: Vec<InstalledCertificate>,
    station_certificate: Option<String>,
    firmware: Option<FirmwareUpdate>,
    firmware_status: FirmwareStatus,
    pending_reset: Option<ResetType>,
}

/// Main session manager
#[derive(Debug)]
pub struct StationState {
    station_id: StationId,
    info: ChargingStationInfo,
    max_power_w: f64,
    inner: Mutex<Inner>,
}

impl StationState {
    pub fn new(config: &StationConfig) -> Self {
        let evses = (1..=config.evse_count as i32)
            .map(|id| (id, EvseState::new(id, config.connectors_per_evse)))
            .collect();

        Self {
            station_id: config.station_id.clone(),
            info: ChargingStationInfo {
                model: config.model.clone(),
                vendor_name: config.vendor.clone(),
                serial_number: config.serial_number.clone(),
                firmware_version: config.firmware_version.clone(),
            },
            max_power_w: config.simulated_power_w,
            inner: Mutex::new(Inner {
                session: SessionState::Disconnected,
                registered_at: None,
                heartbeat_interval: config.heartbeat_interval,
                last_heartbeat: None,
                csms_time: None,
                evses,
                local_list_version: 0,
                local_list: HashMap::new(),
                auth_cache: HashMap::new(),
                certificates: Vec::new(),
                station_certificate: None,
                firmware: None,
                firmware_status: FirmwareStatus::Idle,
                pending_reset: None,
            }),
        }
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    /// ChargingStationInfo for BootNotification
    pub fn charging_station_info(&self) -> ChargingStationInfo {
        self.info.clone()
    }

    // ========================================================================
    // Session
    // ========================================================================

    pub fn handle_event(&self, event: SessionEvent) {
        debug!("[{}] Session event: {:?}", self.station_id, event);
        let mut inner = self.inner.lock();

        match event {
            SessionEvent::Connected => {
                inner.session = SessionState::Connected;
                info!("[{}] Session connected, will send BootNotification", self.station_id);
            }
            SessionEvent::Disconnected => {
                inner.session = SessionState::Disconnected;
                inner.registered_at = None;
                warn!("[{}] Session disconnected", self.station_id);
            }
            SessionEvent::BootAccepted { interval } => {
                inner.session = SessionState::Registered;
                inner.registered_at = Some(Utc::now());
                if interval > 0 {
                    inner.heartbeat_interval = Duration::from_secs(interval as u64);
                }
                info!(
                    "[{}] Registered, heartbeat interval: {:?}",
                    self.station_id, inner.heartbeat_interval
                );
            }
            SessionEvent::BootPending { interval } => {
                inner.session = SessionState::BootPending;
                if interval > 0 {
                    inner.heartbeat_interval = Duration::from_secs(interval as u64);
                }
                info!("[{}] Boot pending, will retry in {}s", self.station_id, interval);
            }
            SessionEvent::BootRejected { interval } => {
                inner.session = SessionState::Rejected;
                if interval > 0 {
                    inner.heartbeat_interval = Duration::from_secs(interval as u64);
                }
                warn!("[{}] Boot rejected by CSMS", self.station_id);
            }
            SessionEvent::HeartbeatAnswered { current_time } => {
                inner.last_heartbeat = Some(Utc::now());
                inner.csms_time = Some(current_time);
            }
        }
    }

    pub fn session(&self) -> SessionState {
        self.inner.lock().session
    }

    pub fn is_registered(&self) -> bool {
        self.session() == SessionState::Registered
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().registered_at
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.inner.lock().heartbeat_interval
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_heartbeat
    }

    /// CSMS clock from the last Heartbeat response
    pub fn csms_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().csms_time
    }

    // ========================================================================
    // EVSEs and availability
    // ========================================================================

    pub fn evse(&self, evse_id: i32) -> Option<EvseState> {
        self.inner.lock().evses.get(&evse_id).cloned()
    }

    pub fn evse_ids(&self) -> Vec<i32> {
        self.inner.lock().evses.keys().copied().collect()
    }

    /// (evse, connector, status) of every connector
    pub fn connector_statuses(&self) -> Vec<(i32, i32, ConnectorStatus)> {
        self.inner
            .lock()
            .evses
            .values()
            .flat_map(|evse| {
                evse.connectors
                    .values()
                    .map(move |c| (evse.evse_id, c.connector_id, c.status))
            })
            .collect()
    }

    pub fn connector_status(&self, evse_id: i32, connector_id: i32) -> Option<ConnectorStatus> {
        self.inner
            .lock()
            .evses
            .get(&evse_id)
            .and_then(|evse| evse.connectors.get(&connector_id))
            .map(|c| c.status)
    }

    /// Handle ChangeAvailability. Returns the status and the connectors whose
    /// status changed.
    pub fn change_availability(
        &self,
        target: Option<&Evse>,
        status: OperationalStatus,
    ) -> (ChangeAvailabilityStatus, Vec<(i32, i32)>) {
        let mut inner = self.inner.lock();

        let evse_ids: Vec<i32> = match target {
            None => inner.evses.keys().copied().collect(),
            Some(evse) if evse.id == 0 => inner.evses.keys().copied().collect(),
            Some(evse) => {
                let Some(state) = inner.evses.get(&evse.id) else {
                    warn!("[{}] ChangeAvailability for unknown EVSE {}", self.station_id, evse.id);
                    return (ChangeAvailabilityStatus::Rejected, Vec::new());
                };
                if let Some(connector_id) = evse.connector_id {
                    if !state.connectors.contains_key(&connector_id) {
                        warn!(
                            "[{}] ChangeAvailability for unknown connector {}/{}",
                            self.station_id, evse.id, connector_id
                        );
                        return (ChangeAvailabilityStatus::Rejected, Vec::new());
                    }
                }
                vec![evse.id]
            }
        };

        let mut scheduled = false;
        let mut changed = Vec::new();
        for evse_id in evse_ids {
            let Some(evse) = inner.evses.get_mut(&evse_id) else {
                continue;
            };
            if evse.transaction.is_some() && evse.operational != status {
                evse.pending_operational = Some(status);
                scheduled = true;
                continue;
            }
            evse.operational = status;
            evse.pending_operational = None;
            changed.extend(evse.refresh_status());
        }

        info!("[{}] Availability -> {} ({} connectors changed)", self.station_id, status, changed.len());
        let outcome = if scheduled {
            ChangeAvailabilityStatus::Scheduled
        } else {
            ChangeAvailabilityStatus::Accepted
        };
        (outcome, changed)
    }

    /// Handle UnlockConnector
    pub fn unlock_connector(&self, evse_id: i32, connector_id: i32) -> UnlockStatus {
        let inner = self.inner.lock();
        let known = inner
            .evses
            .get(&evse_id)
            .is_some_and(|evse| evse.connectors.contains_key(&connector_id));

        if known {
            info!("[{}] Unlocked connector {}/{}", self.station_id, evse_id, connector_id);
            UnlockStatus::Unlocked
        } else {
            warn!("[{}] Unknown connector {}/{}", self.station_id, evse_id, connector_id);
            UnlockStatus::UnlockFailed
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub fn transaction(&self, transaction_id: &str) -> Option<Transaction> {
        self.inner
            .lock()
            .evses
            .values()
            .filter_map(|evse| evse.transaction.as_ref())
            .find(|tx| tx.transaction_id == transaction_id)
            .cloned()
    }

    pub fn transaction_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .evses
            .values()
            .filter_map(|evse| evse.transaction.as_ref())
            .map(|tx| tx.transaction_id.clone())
            .collect()
    }

    pub fn has_transactions(&self) -> bool {
        self.inner.lock().evses.values().any(|evse| evse.transaction.is_some())
    }

    /// Local authorization decision from the local list, then the cache
    pub fn authorize_locally(&self, id_token: &str) -> Option<AuthorizationStatus> {
        let inner = self.inner.lock();
        inner
            .local_list
            .get(id_token)
            .and_then(|entry| entry.id_token_info.as_ref())
            .or_else(|| inner.auth_cache.get(id_token))
            .map(|info| info.status)
    }

    /// Remember a CSMS authorization answer
    pub fn cache_authorization(&self, id_token: &str, info: IdTokenInfo) {
        self.inner.lock().auth_cache.insert(id_token.to_string(), info);
    }

    /// Start a transaction. Returns the Started event to report, or `None`
    /// when no suitable EVSE is free.
    pub fn start_transaction(
        &self,
        evse_id: Option<i32>,
        id_token: IdToken,
        remote_start_id: Option<i32>,
        charging_profile: Option<ChargingProfile>,
    ) -> Option<(TransactionEventRequest, Vec<(i32, i32)>)> {
        if let Some(status) = self.authorize_locally(&id_token.id_token) {
            if status != AuthorizationStatus::Accepted {
                warn!("[{}] Token {} is {} locally", self.station_id, id_token.id_token, status);
                return None;
            }
        }

        let mut inner = self.inner.lock();

        let usable = |evse: &EvseState| {
            evse.operational == OperationalStatus::Operative
                && evse.transaction.is_none()
                && evse
                    .reservation
                    .as_ref()
                    .map_or(true, |r| r.id_token.id_token == id_token.id_token)
        };

        let evse_id = match evse_id {
            Some(id) => id,
            None => inner.evses.values().find(|e| usable(e))?.evse_id,
        };
        let evse = inner.evses.get_mut(&evse_id)?;
        if !usable(evse) {
            warn!("[{}] EVSE {} cannot start a transaction", self.station_id, evse_id);
            return None;
        }

        let connector_id = evse.connectors.keys().next().copied().unwrap_or(1);
        let reservation_id = evse.reservation.take().map(|r| r.reservation_id);
        let now = Utc::now();
        let transaction_id = Uuid::new_v4().to_string();

        evse.transaction = Some(Transaction {
            transaction_id: transaction_id.clone(),
            evse_id,
            connector_id,
            id_token: id_token.clone(),
            remote_start_id,
            reservation_id,
            started_at: now,
            charging_state: ChargingState::Charging,
            meter_start_wh: evse.meter_wh,
            // A TxProfile sent with a remote start belongs to the new transaction
            charging_profile: charging_profile.map(|mut profile| {
                profile.transaction_id = Some(transaction_id.clone());
                profile
            }),
            next_seq_no: 0,
        });
        let changed = evse.refresh_status();

        info!(
            "[{}] Started transaction {} on EVSE {} for token {}",
            self.station_id, transaction_id, evse_id, id_token.id_token
        );

        let trigger = if remote_start_id.is_some() {
            TriggerReason::RemoteStart
        } else {
            TriggerReason::Authorized
        };
        let mut event = transaction_event(evse, TransactionEventType::Started, trigger, now)?;
        event.id_token = Some(id_token);
        event.reservation_id = reservation_id;
        Some((event, changed))
    }

    /// Stop a transaction. Returns the Ended event to report.
    pub fn stop_transaction(
        &self,
        transaction_id: &str,
        reason: StopReason,
        trigger: TriggerReason,
    ) -> Option<(TransactionEventRequest, Vec<(i32, i32)>)> {
        let mut inner = self.inner.lock();
        let evse = inner.evses.values_mut().find(|evse| {
            evse.transaction
                .as_ref()
                .is_some_and(|tx| tx.transaction_id == transaction_id)
        })?;

        let now = Utc::now();
        let mut event = transaction_event(evse, TransactionEventType::Ended, trigger, now)?;
        event.transaction_info.stopped_reason = Some(reason);
        event.transaction_info.charging_state = Some(ChargingState::Idle);

        if let Some(tx) = evse.transaction.take() {
            info!(
                "[{}] Stopped transaction {} on EVSE {}, energy: {:.0} Wh ({})",
                self.station_id,
                transaction_id,
                evse.evse_id,
                evse.meter_wh - tx.meter_start_wh,
                reason
            );
        }
        if let Some(status) = evse.pending_operational.take() {
            evse.operational = status;
        }
        let changed = evse.refresh_status();
        Some((event, changed))
    }

    /// Updated event for every transaction, optionally limited to one EVSE
    pub fn transaction_updates(
        &self,
        evse_id: Option<i32>,
        trigger: TriggerReason,
    ) -> Vec<TransactionEventRequest> {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        inner
            .evses
            .values_mut()
            .filter(|evse| evse_id.map_or(true, |id| id == evse.evse_id))
            .filter_map(|evse| transaction_event(evse, TransactionEventType::Updated, trigger, now))
            .collect()
    }

    /// Advance the energy register of every charging EVSE by `elapsed` at its
    /// active limit and report periodic updates
    pub fn sample_meters(&self, elapsed: Duration) -> Vec<TransactionEventRequest> {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        let hours = elapsed.as_secs_f64() / 3600.0;

        inner
            .evses
            .values_mut()
            .filter_map(|evse| {
                let started_at = evse.transaction.as_ref()?.started_at;
                let offset = (now - started_at).num_seconds();
                let power_w = evse
                    .active_power_limit_w(offset)
                    .unwrap_or(self.max_power_w)
                    .min(self.max_power_w);
                evse.meter_wh += power_w * hours;
                transaction_event(
                    evse,
                    TransactionEventType::Updated,
                    TriggerReason::MeterValuePeriodic,
                    now,
                )
            })
            .collect()
    }

    /// Register readings for MeterValues; every EVSE when `evse_id` is None
    pub fn meter_values(&self, evse_id: Option<i32>) -> Vec<MeterValuesRequest> {
        let inner = self.inner.lock();
        let now = Utc::now();
        inner
            .evses
            .values()
            .filter(|evse| evse_id.map_or(true, |id| id == evse.evse_id))
            .map(|evse| MeterValuesRequest {
                evse_id: evse.evse_id,
                meter_value: vec![energy_reading(evse.meter_wh, ReadingContext::Trigger, now)],
            })
            .collect()
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Handle Reset: OnIdle waits for running transactions
    pub fn reset(&self, reset_type: ResetType, evse_id: Option<i32>) -> ResetStatus {
        let mut inner = self.inner.lock();

        if let Some(id) = evse_id {
            if !inner.evses.contains_key(&id) {
                warn!("[{}] Reset of unknown EVSE {}", self.station_id, id);
                return ResetStatus::Rejected;
            }
        }

        let busy = inner
            .evses
            .values()
            .filter(|evse| evse_id.map_or(true, |id| id == evse.evse_id))
            .any(|evse| evse.transaction.is_some());

        match reset_type {
            ResetType::Immediate => ResetStatus::Accepted,
            ResetType::OnIdle if busy => {
                inner.pending_reset = Some(reset_type);
                ResetStatus::Scheduled
            }
            ResetType::OnIdle => ResetStatus::Accepted,
            _ => ResetStatus::Rejected,
        }
    }

    /// Scheduled reset that became due because the station is idle
    pub fn take_due_reset(&self) -> Option<ResetType> {
        let mut inner = self.inner.lock();
        let idle = inner.evses.values().all(|evse| evse.transaction.is_none());
        if idle {
            inner.pending_reset.take()
        } else {
            None
        }
    }

    // ========================================================================
    // Reservations
    // ========================================================================

    /// Handle ReserveNow
    pub fn reserve(&self, request: &ReserveNowRequest) -> (ReserveNowStatus, Vec<(i32, i32)>) {
        if request.expiry_date_time <= Utc::now() {
            return (ReserveNowStatus::Rejected, Vec::new());
        }

        let mut inner = self.inner.lock();

        // Same id replaces the previous reservation
        let mut changed = Vec::new();
        for evse in inner.evses.values_mut() {
            if evse
                .reservation
                .as_ref()
                .is_some_and(|r| r.reservation_id == request.id)
            {
                evse.reservation = None;
                changed.extend(evse.refresh_status());
            }
        }

        let evse_id = match request.evse_id {
            Some(id) => id,
            None => match inner.evses.values().find(|e| {
                e.operational == OperationalStatus::Operative
                    && e.transaction.is_none()
                    && e.reservation.is_none()
            }) {
                Some(evse) => evse.evse_id,
                None => return (ReserveNowStatus::Occupied, changed),
            },
        };

        let Some(evse) = inner.evses.get_mut(&evse_id) else {
            return (ReserveNowStatus::Rejected, changed);
        };
        if evse.operational == OperationalStatus::Inoperative {
            return (ReserveNowStatus::Unavailable, changed);
        }
        if evse
            .connectors
            .values()
            .any(|c| c.status == ConnectorStatus::Faulted)
        {
            return (ReserveNowStatus::Faulted, changed);
        }
        if evse.transaction.is_some() || evse.reservation.is_some() {
            return (ReserveNowStatus::Occupied, changed);
        }

        evse.reservation = Some(Reservation {
            reservation_id: request.id,
            evse_id,
            id_token: request.id_token.clone(),
            expiry: request.expiry_date_time,
        });
        changed.extend(evse.refresh_status());

        info!(
            "[{}] Reserved EVSE {} for token {}, expires {}",
            self.station_id, evse_id, request.id_token.id_token, request.expiry_date_time
        );
        (ReserveNowStatus::Accepted, changed)
    }

    /// Handle CancelReservation
    pub fn cancel_reservation(&self, reservation_id: i32) -> (CancelReservationStatus, Vec<(i32, i32)>) {
        let mut inner = self.inner.lock();
        for evse in inner.evses.values_mut() {
            if evse
                .reservation
                .as_ref()
                .is_some_and(|r| r.reservation_id == reservation_id)
            {
                info!("[{}] Cancelled reservation {} on EVSE {}", self.station_id, reservation_id, evse.evse_id);
                evse.reservation = None;
                return (CancelReservationStatus::Accepted, evse.refresh_status());
            }
        }

        warn!("[{}] Reservation {} not found", self.station_id, reservation_id);
        (CancelReservationStatus::Rejected, Vec::new())
    }

    /// Drop reservations whose expiry has passed
    pub fn expire_reservations(&self, now: DateTime<Utc>) -> Vec<(i32, i32)> {
        let mut inner = self.inner.lock();
        let mut changed = Vec::new();
        for evse in inner.evses.values_mut() {
            if evse.reservation.as_ref().is_some_and(|r| r.expiry <= now) {
                if let Some(r) = evse.reservation.take() {
                    info!("[{}] Reservation {} expired", self.station_id, r.reservation_id);
                }
                changed.extend(evse.refresh_status());
            }
        }
        changed
    }

    // ========================================================================
    // Smart charging
    // ========================================================================

    /// Handle SetChargingProfile
    pub fn set_charging_profile(&self, evse_id: i32, profile: ChargingProfile) -> ChargingProfileStatus {
        let mut inner = self.inner.lock();

        if evse_id == 0 {
            for evse in inner.evses.values_mut() {
                evse.charging_profiles.retain(|p| p.id != profile.id);
                evse.charging_profiles.push(profile.clone());
            }
            info!("[{}] Set charging profile {} on all EVSEs", self.station_id, profile.id);
            return ChargingProfileStatus::Accepted;
        }

        if let Some(ref transaction_id) = profile.transaction_id {
            let tx = inner
                .evses
                .values_mut()
                .filter_map(|evse| evse.transaction.as_mut())
                .find(|tx| &tx.transaction_id == transaction_id);
            return match tx {
                Some(tx) => {
                    info!(
                        "[{}] Set charging profile {} on transaction {}",
                        self.station_id, profile.id, transaction_id
                    );
                    tx.charging_profile = Some(profile);
                    ChargingProfileStatus::Accepted
                }
                None => {
                    warn!("[{}] No transaction {} for profile {}", self.station_id, transaction_id, profile.id);
                    ChargingProfileStatus::Rejected
                }
            };
        }

        match inner.evses.get_mut(&evse_id) {
            Some(evse) => {
                evse.charging_profiles.retain(|p| p.id != profile.id);
                evse.charging_profiles.push(profile.clone());
                info!(
                    "[{}] Set charging profile {} on EVSE {}, limit: {:?} W",
                    self.station_id,
                    profile.id,
                    evse_id,
                    evse.active_power_limit_w(0)
                );
                ChargingProfileStatus::Accepted
            }
            None => {
                warn!("[{}] Unknown EVSE {}", self.station_id, evse_id);
                ChargingProfileStatus::Rejected
            }
        }
    }

    /// Handle ClearChargingProfile
    pub fn clear_charging_profile(
        &self,
        profile_id: Option<i32>,
        criteria: Option<&ClearChargingProfileCriteria>,
    ) -> ClearChargingProfileStatus {
        let matches = |evse_id: i32, profile: &ChargingProfile| {
            if let Some(id) = profile_id {
                return profile.id == id;
            }
            let Some(c) = criteria else {
                return true;
            };
            c.evse_id.map_or(true, |id| id == evse_id || id == 0)
                && c
                    .charging_profile_purpose
                    .map_or(true, |p| p == profile.charging_profile_purpose)
                && c.stack_level.map_or(true, |s| s == profile.stack_level)
        };

        let mut inner = self.inner.lock();
        let mut removed = 0;
        for evse in inner.evses.values_mut() {
            let evse_id = evse.evse_id;
            let before = evse.charging_profiles.len();
            evse.charging_profiles.retain(|p| !matches(evse_id, p));
            removed += before - evse.charging_profiles.len();

            if let Some(tx) = evse.transaction.as_mut() {
                if tx.charging_profile.as_ref().is_some_and(|p| matches(evse_id, p)) {
                    tx.charging_profile = None;
                    removed += 1;
                }
            }
        }

        debug!("[{}] Cleared {} charging profiles", self.station_id, removed);
        if removed > 0 {
            ClearChargingProfileStatus::Accepted
        } else {
            ClearChargingProfileStatus::Unknown
        }
    }

    /// Handle GetCompositeSchedule: the active profile of the EVSE (or the
    /// station for EVSE 0) clamped to the station maximum
    pub fn composite_schedule(
        &self,
        evse_id: i32,
        duration: i32,
        unit: Option<ChargingRateUnit>,
    ) -> Option<CompositeSchedule> {
        let inner = self.inner.lock();
        let unit = unit
            .filter(|u| !u.is_unknown())
            .unwrap_or(ChargingRateUnit::W);

        let profile = if evse_id == 0 {
            inner
                .evses
                .values()
                .flat_map(|evse| evse.charging_profiles.iter())
                .filter(|p| p.charging_profile_purpose == ChargingProfilePurpose::ChargingStationMaxProfile)
                .max_by_key(|p| p.stack_level)
        } else {
            inner.evses.get(&evse_id)?.active_profile()
        };

        let max = from_watts(self.max_power_w, unit);
        let periods = match profile.and_then(|p| p.charging_schedule.first()) {
            Some(schedule) => schedule
                .charging_schedule_period
                .iter()
                .filter(|p| p.start_period < duration)
                .map(|p| {
                    let watts = to_watts(p.limit, schedule.charging_rate_unit);
                    ChargingSchedulePeriod::new(p.start_period, from_watts(watts, unit).min(max))
                })
                .collect(),
            None => vec![ChargingSchedulePeriod::new(0, max)],
        };

        Some(CompositeSchedule {
            evse_id,
            duration,
            schedule_start: Utc::now(),
            charging_rate_unit: unit,
            charging_schedule_period: periods,
        })
    }

    // ========================================================================
    // Local authorization list
    // ========================================================================

    pub fn local_list_version(&self) -> i32 {
        self.inner.lock().local_list_version
    }

    pub fn local_list_len(&self) -> usize {
        self.inner.lock().local_list.len()
    }

    /// Handle SendLocalList
    pub fn send_local_list(
        &self,
        version: i32,
        update_type: UpdateType,
        entries: &[AuthorizationData],
    ) -> SendLocalListStatus {
        let mut inner = self.inner.lock();

        match update_type {
            UpdateType::Full => {
                inner.local_list = entries
                    .iter()
                    .filter(|entry| entry.id_token_info.is_some())
                    .map(|entry| (entry.id_token.id_token.clone(), entry.clone()))
                    .collect();
            }
            UpdateType::Differential => {
                if version <= inner.local_list_version {
                    warn!(
                        "[{}] Local list version {} not above {}",
                        self.station_id, version, inner.local_list_version
                    );
                    return SendLocalListStatus::VersionMismatch;
                }
                for entry in entries {
                    if entry.id_token_info.is_some() {
                        inner
                            .local_list
                            .insert(entry.id_token.id_token.clone(), entry.clone());
                    } else {
                        inner.local_list.remove(&entry.id_token.id_token);
                    }
                }
            }
            _ => return SendLocalListStatus::Failed,
        }

        inner.local_list_version = version;
        info!(
            "[{}] Local list v{} ({} entries)",
            self.station_id,
            version,
            inner.local_list.len()
        );
        SendLocalListStatus::Accepted
    }

    /// Handle ClearCache
    pub fn clear_cache(&self) -> ClearCacheStatus {
        let mut inner = self.inner.lock();
        debug!("[{}] Clearing {} cached tokens", self.station_id, inner.auth_cache.len());
        inner.auth_cache.clear();
        ClearCacheStatus::Accepted
    }

    // ========================================================================
    // Certificates
    // ========================================================================

    /// Handle InstallCertificate
    pub fn install_certificate(
        &self,
        certificate_type: InstallCertificateUse,
        certificate: &str,
    ) -> InstallCertificateStatus {
        if !looks_like_pem(certificate, "CERTIFICATE") {
            return InstallCertificateStatus::Rejected;
        }
        let id_use = match certificate_type {
            InstallCertificateUse::V2gRootCertificate => GetCertificateIdUse::V2gRootCertificate,
            InstallCertificateUse::MoRootCertificate => GetCertificateIdUse::MoRootCertificate,
            InstallCertificateUse::CsmsRootCertificate => GetCertificateIdUse::CsmsRootCertificate,
            InstallCertificateUse::ManufacturerRootCertificate => {
                GetCertificateIdUse::ManufacturerRootCertificate
            }
            _ => return InstallCertificateStatus::Rejected,
        };

        let hash_data = CertificateHashData {
            hash_algorithm: HashAlgorithm::Sha256,
            issuer_name_hash: fingerprint(certificate, "issuer-name", 128),
            issuer_key_hash: fingerprint(certificate, "issuer-key", 128),
            serial_number: fingerprint(certificate, "serial", 40),
        };

        let mut inner = self.inner.lock();
        inner.certificates.retain(|c| c.hash_data != hash_data);
        inner.certificates.push(InstalledCertificate {
            certificate_type: id_use,
            hash_data,
            pem: certificate.to_string(),
        });
        info!("[{}] Installed {}", self.station_id, certificate_type);
        InstallCertificateStatus::Accepted
    }

    /// Handle DeleteCertificate
    pub fn delete_certificate(&self, hash_data: &CertificateHashData) -> DeleteCertificateStatus {
        let mut inner = self.inner.lock();
        let before = inner.certificates.len();
        inner.certificates.retain(|c| &c.hash_data != hash_data);
        if inner.certificates.len() < before {
            DeleteCertificateStatus::Accepted
        } else {
            DeleteCertificateStatus::NotFound
        }
    }

    /// Handle GetInstalledCertificateIds; an empty filter lists everything
    pub fn installed_certificates(
        &self,
        types: &[GetCertificateIdUse],
    ) -> Vec<CertificateHashDataChain> {
        self.inner
            .lock()
            .certificates
            .iter()
            .filter(|c| types.is_empty() || types.contains(&c.certificate_type))
            .map(|c| CertificateHashDataChain {
                certificate_type: c.certificate_type,
                certificate_hash_data: c.hash_data.clone(),
                child_certificate_hash_data: Vec::new(),
            })
            .collect()
    }

    /// Handle CertificateSigned
    pub fn certificate_signed(&self, chain: &str) -> CertificateSignedStatus {
        if !looks_like_pem(chain, "CERTIFICATE") {
            return CertificateSignedStatus::Rejected;
        }
        self.inner.lock().station_certificate = Some(chain.to_string());
        CertificateSignedStatus::Accepted
    }

    pub fn station_certificate(&self) -> Option<String> {
        self.inner.lock().station_certificate.clone()
    }

    // ========================================================================
    // Firmware
    // ========================================================================

    /// Handle UpdateFirmware. A new request replaces one still in progress.
    pub fn update_firmware(&self, request: &UpdateFirmwareRequest) -> UpdateFirmwareStatus {
        if let Some(ref cert) = request.firmware.signing_certificate {
            if !looks_like_pem(cert, "CERTIFICATE") {
                return UpdateFirmwareStatus::InvalidCertificate;
            }
        }

        let mut inner = self.inner.lock();
        let replaced = inner
            .firmware
            .as_ref()
            .is_some_and(|fw| !matches!(fw.status, FirmwareStatus::Installed | FirmwareStatus::Idle));

        inner.firmware = Some(FirmwareUpdate {
            request_id: request.request_id,
            location: request.firmware.location.clone(),
            retrieve_date_time: request.firmware.retrieve_date_time,
            status: FirmwareStatus::DownloadScheduled,
        });
        inner.firmware_status = FirmwareStatus::DownloadScheduled;

        if replaced {
            UpdateFirmwareStatus::AcceptedCanceled
        } else {
            UpdateFirmwareStatus::Accepted
        }
    }

    /// Record progress of the firmware update `request_id`; false when it has
    /// been superseded
    pub fn advance_firmware(&self, request_id: i32, status: FirmwareStatus) -> bool {
        let mut inner = self.inner.lock();
        match inner.firmware.as_mut() {
            Some(fw) if fw.request_id == request_id => {
                fw.status = status;
                inner.firmware_status = status;
                true
            }
            _ => false,
        }
    }

    pub fn firmware(&self) -> Option<FirmwareUpdate> {
        self.inner.lock().firmware.clone()
    }

    pub fn firmware_status(&self) -> (FirmwareStatus, Option<i32>) {
        let inner = self.inner.lock();
        (
            inner.firmware_status,
            inner.firmware.as_ref().map(|fw| fw.request_id),
        )
    }
}

fn energy_reading(wh: f64, context: ReadingContext, at: DateTime<Utc>) -> MeterValue {
    MeterValue {
        timestamp: at,
        sampled_value: vec![
            SampledValue::new(wh.round(), Measurand::EnergyActiveImportRegister, "Wh")
                .with_context(context),
        ],
    }
}

/// Build the next TransactionEvent for the EVSE's transaction, consuming a
/// sequence number
fn transaction_event(
    evse: &mut EvseState,
    event_type: TransactionEventType,
    trigger: TriggerReason,
    at: DateTime<Utc>,
) -> Option<TransactionEventRequest> {
    let meter_wh = evse.meter_wh;
    let evse_id = evse.evse_id;
    let tx = evse.transaction.as_mut()?;

    let seq_no = tx.next_seq_no;
    tx.next_seq_no += 1;

    let mut info = TransactionInfo::new(tx.transaction_id.clone());
    info.charging_state = Some(tx.charging_state);
    info.time_spent_charging = Some((at - tx.started_at).num_seconds().max(0));
    info.remote_start_id = tx.remote_start_id;

    let context = match event_type {
        TransactionEventType::Started => ReadingContext::TransactionBegin,
        TransactionEventType::Ended => ReadingContext::TransactionEnd,
        _ if trigger == TriggerReason::Trigger => ReadingContext::Trigger,
        _ => ReadingContext::SamplePeriodic,
    };

    let mut event = TransactionEventRequest::new(event_type, trigger, seq_no, info);
    event.timestamp = at;
    event.evse = Some(Evse::with_connector(evse_id, tx.connector_id));
    event.meter_value = vec![energy_reading(meter_wh, context, at)];
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::catalog::Firmware;

    fn state() -> StationState {
        StationState::new(&StationConfig::new("ws://localhost", "CS001").with_evses(2, 1))
    }

    fn profile(id: i32, limit_w: f64, transaction_id: Option<&str>) -> ChargingProfile {
        ChargingProfile {
            id,
            stack_level: 0,
            charging_profile_purpose: if transaction_id.is_some() {
                ChargingProfilePurpose::TxProfile
            } else {
                ChargingProfilePurpose::TxDefaultProfile
            },
            charging_profile_kind: ChargingProfileKind::Absolute,
            charging_schedule: vec![ChargingSchedule {
                id: 1,
                charging_rate_unit: ChargingRateUnit::W,
                charging_schedule_period: vec![ChargingSchedulePeriod::new(0, limit_w)],
                start_schedule: None,
                duration: None,
                min_charging_rate: None,
            }],
            valid_from: None,
            valid_to: None,
            recurrency_kind: None,
            transaction_id: transaction_id.map(str::to_string),
        }
    }

    #[test]
    fn test_session_lifecycle() {
        let state = state();
        assert_eq!(state.session(), SessionState::Disconnected);

        state.handle_event(SessionEvent::Connected);
        assert_eq!(state.session(), SessionState::Connected);

        state.handle_event(SessionEvent::BootAccepted { interval: 60 });
        assert!(state.is_registered());
        assert_eq!(state.heartbeat_interval(), Duration::from_secs(60));

        let csms_time = Utc::now() - chrono::Duration::hours(1);
        state.handle_event(SessionEvent::HeartbeatAnswered { current_time: csms_time });
        assert_eq!(state.csms_time(), Some(csms_time));

        state.handle_event(SessionEvent::Disconnected);
        assert_eq!(state.session(), SessionState::Disconnected);
        assert!(state.registered_at().is_none());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let state = state();

        let (started, changed) = state
            .start_transaction(Some(1), IdToken::central("TOKEN123"), Some(7), None)
            .unwrap();
        assert_eq!(started.event_type, TransactionEventType::Started);
        assert_eq!(started.trigger_reason, TriggerReason::RemoteStart);
        assert_eq!(started.seq_no, 0);
        assert_eq!(changed, vec![(1, 1)]);
        assert_eq!(state.connector_status(1, 1), Some(ConnectorStatus::Occupied));

        let tx_id = started.transaction_info.transaction_id.clone();
        let updates = state.transaction_updates(None, TriggerReason::Trigger);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].seq_no, 1);

        let (ended, _) = state
            .stop_transaction(&tx_id, StopReason::Remote, TriggerReason::RemoteStop)
            .unwrap();
        assert_eq!(ended.seq_no, 2);
        assert_eq!(ended.transaction_info.stopped_reason, Some(StopReason::Remote));
        assert_eq!(state.connector_status(1, 1), Some(ConnectorStatus::Available));
        assert!(state.stop_transaction(&tx_id, StopReason::Remote, TriggerReason::RemoteStop).is_none());
    }

    #[test]
    fn test_start_rejected_when_busy_or_blocked() {
        let state = state();
        assert!(state.start_transaction(Some(1), IdToken::central("A"), None, None).is_some());
        assert!(state.start_transaction(Some(1), IdToken::central("B"), None, None).is_none());
        assert!(state.start_transaction(Some(9), IdToken::central("B"), None, None).is_none());

        state.cache_authorization("BAD", IdTokenInfo::new(AuthorizationStatus::Blocked));
        assert!(state.start_transaction(Some(2), IdToken::central("BAD"), None, None).is_none());
    }

    #[test]
    fn test_change_availability() {
        let state = state();

        let (status, _) = state.change_availability(
            Some(&Evse::with_connector(9, 1)),
            OperationalStatus::Inoperative,
        );
        assert_eq!(status, ChangeAvailabilityStatus::Rejected);

        let (status, _) = state.change_availability(
            Some(&Evse::with_connector(1, 5)),
            OperationalStatus::Inoperative,
        );
        assert_eq!(status, ChangeAvailabilityStatus::Rejected);

        let (status, changed) =
            state.change_availability(Some(&Evse::new(2)), OperationalStatus::Inoperative);
        assert_eq!(status, ChangeAvailabilityStatus::Accepted);
        assert_eq!(changed, vec![(2, 1)]);
        assert_eq!(state.connector_status(2, 1), Some(ConnectorStatus::Unavailable));
        assert_eq!(state.connector_status(1, 1), Some(ConnectorStatus::Available));
    }

    #[test]
    fn test_change_availability_scheduled_during_transaction() {
        let state = state();
        let (started, _) = state
            .start_transaction(Some(1), IdToken::central("A"), None, None)
            .unwrap();

        let (status, _) = state.change_availability(None, OperationalStatus::Inoperative);
        assert_eq!(status, ChangeAvailabilityStatus::Scheduled);
        assert_eq!(state.connector_status(1, 1), Some(ConnectorStatus::Occupied));
        assert_eq!(state.connector_status(2, 1), Some(ConnectorStatus::Unavailable));

        state.stop_transaction(
            &started.transaction_info.transaction_id,
            StopReason::Local,
            TriggerReason::StopAuthorized,
        );
        assert_eq!(state.connector_status(1, 1), Some(ConnectorStatus::Unavailable));
    }

    #[test]
    fn test_unlock_connector() {
        let state = state();
        assert_eq!(state.unlock_connector(1, 1), UnlockStatus::Unlocked);
        assert_eq!(state.unlock_connector(1, 2), UnlockStatus::UnlockFailed);
        assert_eq!(state.unlock_connector(5, 1), UnlockStatus::UnlockFailed);
    }

    #[test]
    fn test_charging_profile_targets() {
        let state = state();

        assert_eq!(
            state.set_charging_profile(0, profile(1, 7_000.0, None)),
            ChargingProfileStatus::Accepted
        );
        assert_eq!(state.evse(1).unwrap().active_power_limit_w(0), Some(7_000.0));
        assert_eq!(state.evse(2).unwrap().active_power_limit_w(0), Some(7_000.0));

        assert_eq!(
            state.set_charging_profile(1, profile(2, 3_000.0, Some("nope"))),
            ChargingProfileStatus::Rejected
        );

        let (started, _) = state
            .start_transaction(Some(1), IdToken::central("A"), None, None)
            .unwrap();
        let tx_id = started.transaction_info.transaction_id;
        assert_eq!(
            state.set_charging_profile(1, profile(2, 3_000.0, Some(&tx_id))),
            ChargingProfileStatus::Accepted
        );
        assert_eq!(state.evse(1).unwrap().active_power_limit_w(0), Some(3_000.0));

        assert_eq!(
            state.set_charging_profile(4, profile(3, 1_000.0, None)),
            ChargingProfileStatus::Rejected
        );

        assert_eq!(
            state.clear_charging_profile(Some(2), None),
            ClearChargingProfileStatus::Accepted
        );
        assert_eq!(
            state.clear_charging_profile(Some(2), None),
            ClearChargingProfileStatus::Unknown
        );
    }

    #[test]
    fn test_composite_schedule_clamped_to_station_max() {
        let state = state();
        state.set_charging_profile(1, profile(1, 50_000.0, None));

        let schedule = state.composite_schedule(1, 3600, None).unwrap();
        assert_eq!(schedule.charging_rate_unit, ChargingRateUnit::W);
        assert_eq!(schedule.charging_schedule_period[0].limit, 11_000.0);

        let schedule = state.composite_schedule(2, 3600, Some(ChargingRateUnit::A)).unwrap();
        assert!((schedule.charging_schedule_period[0].limit - 11_000.0 / 690.0).abs() < 1e-9);

        assert!(state.composite_schedule(7, 3600, None).is_none());
    }

    #[test]
    fn test_reservations() {
        let state = state();
        let request = ReserveNowRequest {
            id: 5,
            expiry_date_time: Utc::now() + chrono::Duration::minutes(10),
            connector_type: None,
            id_token: IdToken::central("A"),
            evse_id: Some(1),
            group_id_token: None,
        };

        let (status, changed) = state.reserve(&request);
        assert_eq!(status, ReserveNowStatus::Accepted);
        assert_eq!(changed, vec![(1, 1)]);
        assert_eq!(state.connector_status(1, 1), Some(ConnectorStatus::Reserved));

        // Reserved EVSE only starts for the reserving token
        assert!(state.start_transaction(Some(1), IdToken::central("B"), None, None).is_none());

        assert_eq!(state.cancel_reservation(5).0, CancelReservationStatus::Accepted);
        assert_eq!(state.cancel_reservation(5).0, CancelReservationStatus::Rejected);

        state.reserve(&request);
        let expired = state.expire_reservations(Utc::now() + chrono::Duration::hours(1));
        assert_eq!(expired, vec![(1, 1)]);
        assert_eq!(state.connector_status(1, 1), Some(ConnectorStatus::Available));
    }

    #[test]
    fn test_reset_on_idle_waits_for_transactions() {
        let state = state();
        assert_eq!(state.reset(ResetType::OnIdle, None), ResetStatus::Accepted);
        assert_eq!(state.reset(ResetType::Immediate, Some(9)), ResetStatus::Rejected);

        let (started, _) = state
            .start_transaction(Some(1), IdToken::central("A"), None, None)
            .unwrap();
        assert_eq!(state.reset(ResetType::OnIdle, None), ResetStatus::Scheduled);
        assert!(state.take_due_reset().is_none());

        state.stop_transaction(
            &started.transaction_info.transaction_id,
            StopReason::Local,
            TriggerReason::StopAuthorized,
        );
        assert_eq!(state.take_due_reset(), Some(ResetType::OnIdle));
        assert!(state.take_due_reset().is_none());
    }

    #[test]
    fn test_local_list_versions() {
        let state = state();
        let entry = |token: &str, status: Option<AuthorizationStatus>| AuthorizationData {
            id_token: IdToken::central(token),
            id_token_info: status.map(IdTokenInfo::new),
        };

        assert_eq!(
            state.send_local_list(
                3,
                UpdateType::Full,
                &[entry("A", Some(AuthorizationStatus::Accepted)), entry("B", Some(AuthorizationStatus::Blocked))]
            ),
            SendLocalListStatus::Accepted
        );
        assert_eq!(state.local_list_version(), 3);
        assert_eq!(state.authorize_locally("B"), Some(AuthorizationStatus::Blocked));

        assert_eq!(
            state.send_local_list(3, UpdateType::Differential, &[entry("C", Some(AuthorizationStatus::Accepted))]),
            SendLocalListStatus::VersionMismatch
        );

        assert_eq!(
            state.send_local_list(4, UpdateType::Differential, &[entry("B", None)]),
            SendLocalListStatus::Accepted
        );
        assert_eq!(state.local_list_len(), 1);
        assert_eq!(state.authorize_locally("B"), None);
    }

    #[test]
    fn test_certificates() {
        let state = state();
        let pem = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----";

        assert_eq!(
            state.install_certificate(InstallCertificateUse::CsmsRootCertificate, "junk"),
            InstallCertificateStatus::Rejected
        );
        assert_eq!(
            state.install_certificate(InstallCertificateUse::CsmsRootCertificate, pem),
            InstallCertificateStatus::Accepted
        );

        let installed = state.installed_certificates(&[GetCertificateIdUse::CsmsRootCertificate]);
        assert_eq!(installed.len(), 1);
        assert!(state
            .installed_certificates(&[GetCertificateIdUse::V2gRootCertificate])
            .is_empty());

        let hash = installed[0].certificate_hash_data.clone();
        assert_eq!(state.delete_certificate(&hash), DeleteCertificateStatus::Accepted);
        assert_eq!(state.delete_certificate(&hash), DeleteCertificateStatus::NotFound);

        assert_eq!(state.certificate_signed(pem), CertificateSignedStatus::Accepted);
        assert_eq!(state.certificate_signed("nope"), CertificateSignedStatus::Rejected);
    }

    #[test]
    fn test_fingerprint_is_stable_sha256() {
        assert_eq!(
            fingerprint(" abc\n", "", 128),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fingerprint("abc", "serial", 40), "90c6bac2a65edaf369d10aa5823f56cf3129c347");

        let state = state();
        let pem = "-----BEGIN CERTIFICATE-----\nMIIC\n-----END CERTIFICATE-----";
        state.install_certificate(InstallCertificateUse::V2gRootCertificate, pem);
        let hash = &state.installed_certificates(&[])[0].certificate_hash_data;
        assert_eq!(hash.issuer_name_hash.len(), 64);
        assert_eq!(hash.serial_number.len(), 40);
        assert_eq!(hash.serial_number, fingerprint(pem, "serial", 40));
    }

    #[test]
    fn test_firmware_update_replaces_running_one() {
        let state = state();
        let request = |id| UpdateFirmwareRequest {
            retries: None,
            retry_interval: None,
            request_id: id,
            firmware: Firmware {
                location: "https://fw.example/ek3.bin".to_string(),
                retrieve_date_time: Utc::now(),
                install_date_time: None,
                signing_certificate: None,
                signature: None,
            },
        };

        assert_eq!(state.update_firmware(&request(1)), UpdateFirmwareStatus::Accepted);
        assert!(state.advance_firmware(1, FirmwareStatus::Downloading));
        assert_eq!(state.update_firmware(&request(2)), UpdateFirmwareStatus::AcceptedCanceled);
        assert!(!state.advance_firmware(1, FirmwareStatus::Downloaded));
        assert_eq!(state.firmware_status(), (FirmwareStatus::DownloadScheduled, Some(2)));
    }

    #[test]
    fn test_sample_meters_advances_register() {
        let state = state();
        state.set_charging_profile(1, profile(1, 3_600.0, None));
        state.start_transaction(Some(1), IdToken::central("A"), None, None);

        let events = state.sample_meters(Duration::from_secs(3600));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trigger_reason, TriggerReason::MeterValuePeriodic);
        assert_eq!(state.evse(1).unwrap().meter_wh, 3_600.0);
        assert_eq!(state.evse(2).unwrap().meter_wh, 0.0);
    }
}
