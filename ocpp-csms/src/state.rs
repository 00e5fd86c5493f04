//! Last-known state of every station, as reported to the CSMS
//!
//! Fed by the station-initiated handlers and by registry events; read by the
//! administrative query surface through [`StationSnapshot`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use ocpp_core::catalog::{BootNotificationRequest, TransactionEventRequest};
use ocpp_core::enums::*;
use ocpp_core::types::{ChargingStationInfo, MeterValue};
use ocpp_core::StationId;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::registry::RegistryEvent;

/// Most recent BootNotification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootInfo {
    pub charging_station: ChargingStationInfo,
    pub reason: BootReason,
    pub registration: RegistrationStatus,
    pub booted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSnapshot {
    pub evse_id: i32,
    pub connector_id: i32,
    pub status: ConnectorStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSnapshot {
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_state: Option<ChargingState>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seq_no: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_wh: Option<f64>,
    pub ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_reason: Option<StopReason>,
}

/// Everything the CSMS knows about one station
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSnapshot {
    pub station_id: StationId,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot: Option<BootInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_status: Option<FirmwareStatus>,
    pub connectors: Vec<ConnectorSnapshot>,
    pub transactions: Vec<TransactionSnapshot>,
}

#[derive(Debug, Default)]
struct StationRecord {
    connected: bool,
    connected_at: Option<DateTime<Utc>>,
    last_seen_at: Option<DateTime<Utc>>,
    boot: Option<BootInfo>,
    last_heartbeat: Option<DateTime<Utc>>,
    firmware_status: Option<FirmwareStatus>,
    connectors: BTreeMap<(i32, i32), ConnectorSnapshot>,
    transactions: BTreeMap<String, TransactionSnapshot>,
}

impl StationRecord {
    fn snapshot(&self, station_id: &str) -> StationSnapshot {
        StationSnapshot {
            station_id: station_id.to_string(),
            connected: self.connected,
            connected_at: self.connected_at,
            last_seen_at: self.last_seen_at,
            boot: self.boot.clone(),
            last_heartbeat: self.last_heartbeat,
            firmware_status: self.firmware_status,
            connectors: self.connectors.values().cloned().collect(),
            transactions: self.transactions.values().cloned().collect(),
        }
    }
}

/// Outcome of applying a TransactionEvent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    Applied,
    /// `seqNo` not above the last one seen for the transaction; ignored
    Stale { last_seq_no: i32 },
}

/// Per-station state keyed by station id
#[derive(Debug, Default)]
pub struct CsmsState {
    stations: RwLock<HashMap<StationId, StationRecord>>,
}

impl CsmsState {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_station<T>(&self, station_id: &str, f: impl FnOnce(&mut StationRecord) -> T) -> T {
        let mut stations = self.stations.write();
        let record = stations.entry(station_id.to_string()).or_default();
        record.last_seen_at = Some(Utc::now());
        f(record)
    }

    /// Track connectivity from registry changes
    pub fn on_registry_event(&self, event: &RegistryEvent) {
        let mut stations = self.stations.write();
        let record = stations.entry(event.station_id().to_string()).or_default();
        match event {
            RegistryEvent::Registered { .. } | RegistryEvent::Replaced { .. } => {
                record.connected = true;
                record.connected_at = Some(Utc::now());
            }
            RegistryEvent::Unregistered { .. } => {
                record.connected = false;
            }
        }
    }

    pub fn record_boot(
        &self,
        station_id: &str,
        request: &BootNotificationRequest,
        registration: RegistrationStatus,
    ) {
        self.with_station(station_id, |record| {
            record.boot = Some(BootInfo {
                charging_station: request.charging_station.clone(),
                reason: request.reason,
                registration,
                booted_at: Utc::now(),
            });
        });
    }

    pub fn record_heartbeat(&self, station_id: &str, at: DateTime<Utc>) {
        self.with_station(station_id, |record| record.last_heartbeat = Some(at));
    }

    pub fn record_status(
        &self,
        station_id: &str,
        evse_id: i32,
        connector_id: i32,
        status: ConnectorStatus,
        at: DateTime<Utc>,
    ) {
        self.with_station(station_id, |record| {
            record.connectors.insert(
                (evse_id, connector_id),
                ConnectorSnapshot {
                    evse_id,
                    connector_id,
                    status,
                    updated_at: at,
                },
            );
        });
    }

    pub fn record_firmware_status(&self, station_id: &str, status: FirmwareStatus) {
        self.with_station(station_id, |record| record.firmware_status = Some(status));
    }

    /// Attribute meter values to the running transaction on `evse_id`
    pub fn record_meter_values(&self, station_id: &str, evse_id: i32, values: &[MeterValue]) {
        let energy = latest_energy(values);
        self.with_station(station_id, |record| {
            if let Some(energy) = energy {
                for tx in record.transactions.values_mut() {
                    if !tx.ended && tx.evse_id == Some(evse_id) {
                        tx.energy_wh = Some(energy);
                    }
                }
            }
        });
    }

    /// Apply a TransactionEvent unless its `seqNo` is stale
    pub fn apply_transaction_event(
        &self,
        station_id: &str,
        event: &TransactionEventRequest,
    ) -> SequenceCheck {
        let tx_id = &event.transaction_info.transaction_id;
        self.with_station(station_id, |record| {
            if let Some(existing) = record.transactions.get(tx_id) {
                if event.seq_no <= existing.last_seq_no {
                    warn!(
                        "[{}] TransactionEvent for {} with seqNo {} after {}; ignored",
                        station_id, tx_id, event.seq_no, existing.last_seq_no
                    );
                    return SequenceCheck::Stale {
                        last_seq_no: existing.last_seq_no,
                    };
                }
            }

            let tx = record
                .transactions
                .entry(tx_id.clone())
                .or_insert_with(|| TransactionSnapshot {
                    transaction_id: tx_id.clone(),
                    evse_id: None,
                    id_token: None,
                    charging_state: None,
                    started_at: event.timestamp,
                    updated_at: event.timestamp,
                    last_seq_no: event.seq_no,
                    energy_wh: None,
                    ended: false,
                    stopped_reason: None,
                });

            tx.last_seq_no = event.seq_no;
            tx.updated_at = event.timestamp;
            if let Some(ref evse) = event.evse {
                tx.evse_id = Some(evse.id);
            }
            if let Some(ref token) = event.id_token {
                tx.id_token = Some(token.id_token.clone());
            }
            if let Some(state) = event.transaction_info.charging_state {
                tx.charging_state = Some(state);
            }
            if let Some(energy) = latest_energy(&event.meter_value) {
                tx.energy_wh = Some(energy);
            }
            if event.event_type == TransactionEventType::Ended {
                tx.ended = true;
                tx.stopped_reason = event.transaction_info.stopped_reason;
            }
            debug!(
                "[{}] Transaction {} {} (seqNo {})",
                station_id, tx_id, event.event_type, event.seq_no
            );
            SequenceCheck::Applied
        })
    }

    pub fn snapshot(&self, station_id: &str) -> Option<StationSnapshot> {
        self.stations
            .read()
            .get(station_id)
            .map(|record| record.snapshot(station_id))
    }

    pub fn snapshots(&self) -> Vec<StationSnapshot> {
        let stations = self.stations.read();
        let mut list: Vec<StationSnapshot> = stations
            .iter()
            .map(|(id, record)| record.snapshot(id))
            .collect();
        list.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        list
    }
}

/// Latest Energy.Active.Import.Register sample, in Wh
fn latest_energy(values: &[MeterValue]) -> Option<f64> {
    values
        .iter()
        .max_by_key(|value| value.timestamp)
        .and_then(|value| {
            value
                .sampled_value
                .iter()
                .find(|s| s.measurand == Some(Measurand::EnergyActiveImportRegister))
        })
        .map(|sample| {
            let multiplier = sample
                .unit_of_measure
                .as_ref()
                .map(|u| u.multiplier)
                .unwrap_or(0);
            let value = sample.value * 10f64.powi(multiplier);
            match sample.unit_of_measure.as_ref().map(|u| u.unit.as_str()) {
                Some("kWh") => value * 1000.0,
                _ => value,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::types::{Evse, SampledValue, TransactionInfo};

    fn event(kind: TransactionEventType, seq_no: i32) -> TransactionEventRequest {
        let mut request = TransactionEventRequest::new(
            kind,
            TriggerReason::Authorized,
            seq_no,
            TransactionInfo::new("tx-1"),
        );
        request.evse = Some(Evse::with_connector(1, 1));
        request
    }

    #[test]
    fn test_sequence_numbers_must_increase() {
        let state = CsmsState::new();
        assert_eq!(
            state.apply_transaction_event("CS001", &event(TransactionEventType::Started, 0)),
            SequenceCheck::Applied
        );
        assert_eq!(
            state.apply_transaction_event("CS001", &event(TransactionEventType::Updated, 1)),
            SequenceCheck::Applied
        );
        assert_eq!(
            state.apply_transaction_event("CS001", &event(TransactionEventType::Ended, 1)),
            SequenceCheck::Stale { last_seq_no: 1 }
        );

        let snapshot = state.snapshot("CS001").unwrap();
        assert_eq!(snapshot.transactions.len(), 1);
        assert!(!snapshot.transactions[0].ended);
        assert_eq!(snapshot.transactions[0].evse_id, Some(1));
    }

    #[test]
    fn test_meter_values_update_running_transaction() {
        let state = CsmsState::new();
        state.apply_transaction_event("CS001", &event(TransactionEventType::Started, 0));

        let value = MeterValue {
            timestamp: Utc::now(),
            sampled_value: vec![SampledValue::new(
                2.5,
                Measurand::EnergyActiveImportRegister,
                "kWh",
            )],
        };
        state.record_meter_values("CS001", 1, &[value]);

        let snapshot = state.snapshot("CS001").unwrap();
        assert_eq!(snapshot.transactions[0].energy_wh, Some(2500.0));
    }

    #[test]
    fn test_registry_events_track_connectivity() {
        let state = CsmsState::new();
        let id = uuid::Uuid::new_v4();
        state.on_registry_event(&RegistryEvent::Registered {
            station_id: "CS001".to_string(),
            connection_id: id,
        });
        assert!(state.snapshot("CS001").unwrap().connected);

        state.on_registry_event(&RegistryEvent::Unregistered {
            station_id: "CS001".to_string(),
            connection_id: id,
        });
        assert!(!state.snapshot("CS001").unwrap().connected);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let state = CsmsState::new();
        state.record_status("CS001", 1, 1, ConnectorStatus::Available, Utc::now());
        let json = serde_json::to_value(state.snapshot("CS001").unwrap()).unwrap();
        assert_eq!(json["stationId"], "CS001");
        assert_eq!(json["connectors"][0]["status"], "Available");
    }
}
