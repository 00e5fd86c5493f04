//! Station registry
//!
//! Maps a station id to the one connection currently able to reach it. All
//! operations take the same async mutex for their whole critical section,
//! with a bounded wait; listeners are notified only after the lock is
//! released. A new connection for a known station replaces the old record and
//! closes the superseded endpoint, failing its outstanding requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ocpp_core::{Endpoint, Observers, StationId};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry lock not acquired within {timeout:?} ({operation})")]
    LockTimeout {
        operation: &'static str,
        timeout: Duration,
    },
}

/// The live connection of one station
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub station_id: StationId,
    pub connection: Arc<Endpoint>,
    pub connected_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl ConnectionRecord {
    pub fn connection_id(&self) -> Uuid {
        self.connection.connection_id()
    }
}

/// Registry change, delivered to listeners after the lock is released
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered {
        station_id: StationId,
        connection_id: Uuid,
    },
    Replaced {
        station_id: StationId,
        previous: Uuid,
        current: Uuid,
    },
    Unregistered {
        station_id: StationId,
        connection_id: Uuid,
    },
}

impl RegistryEvent {
    pub fn station_id(&self) -> &str {
        match self {
            RegistryEvent::Registered { station_id, .. }
            | RegistryEvent::Replaced { station_id, .. }
            | RegistryEvent::Unregistered { station_id, .. } => station_id,
        }
    }
}

/// Station id to connection map
pub struct StationRegistry {
    records: Mutex<HashMap<StationId, ConnectionRecord>>,
    lock_timeout: Duration,
    listeners: Observers<RegistryEvent>,
}

impl std::fmt::Debug for StationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationRegistry")
            .field("lock_timeout", &self.lock_timeout)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl StationRegistry {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            lock_timeout,
            listeners: Observers::new("registry"),
        }
    }

    pub fn listeners(&self) -> &Observers<RegistryEvent> {
        &self.listeners
    }

    async fn lock(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, HashMap<StationId, ConnectionRecord>>, RegistryError> {
        match tokio::time::timeout(self.lock_timeout, self.records.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!(
                    "Station registry lock not acquired within {:?} for {}",
                    self.lock_timeout, operation
                );
                Err(RegistryError::LockTimeout {
                    operation,
                    timeout: self.lock_timeout,
                })
            }
        }
    }

    /// Insert or replace the record for `station_id`. Returns the superseded
    /// record, whose connection has been closed.
    pub async fn register(
        &self,
        station_id: impl Into<StationId>,
        connection: Arc<Endpoint>,
    ) -> Result<Option<ConnectionRecord>, RegistryError> {
        let station_id = station_id.into();
        let now = Utc::now();
        let current = connection.connection_id();

        let previous = {
            let mut records = self.lock("register").await?;
            let connected_at = match records.get(&station_id) {
                Some(existing) if existing.connection_id() == current => existing.connected_at,
                _ => now,
            };
            records.insert(
                station_id.clone(),
                ConnectionRecord {
                    station_id: station_id.clone(),
                    connection,
                    connected_at,
                    last_seen_at: now,
                },
            )
        };

        let event = match previous {
            Some(ref old) if old.connection_id() == current => {
                debug!("Station {} re-registered on the same connection", station_id);
                None
            }
            Some(ref old) => {
                info!(
                    "Station {} reconnected, replacing connection {}",
                    station_id,
                    old.connection_id()
                );
                old.connection.close();
                Some(RegistryEvent::Replaced {
                    station_id,
                    previous: old.connection_id(),
                    current,
                })
            }
            None => {
                info!("Station {} registered", station_id);
                Some(RegistryEvent::Registered {
                    station_id,
                    connection_id: current,
                })
            }
        };

        if let Some(event) = event {
            self.listeners.notify(&event);
        }
        Ok(previous)
    }

    /// Live record for `station_id`
    pub async fn resolve(&self, station_id: &str) -> Result<Option<ConnectionRecord>, RegistryError> {
        let records = self.lock("resolve").await?;
        Ok(records
            .get(station_id)
            .filter(|record| !record.connection.is_closed())
            .cloned())
    }

    /// Remove whatever record `station_id` has
    pub async fn unregister(&self, station_id: &str) -> Result<Option<ConnectionRecord>, RegistryError> {
        let removed = self.lock("unregister").await?.remove(station_id);
        if let Some(ref record) = removed {
            info!("Station {} unregistered", station_id);
            self.listeners.notify(&RegistryEvent::Unregistered {
                station_id: record.station_id.clone(),
                connection_id: record.connection_id(),
            });
        }
        Ok(removed)
    }

    /// Remove the record only if it still belongs to `connection_id`. A
    /// superseded connection going away leaves its replacement in place.
    pub async fn unregister_connection(
        &self,
        station_id: &str,
        connection_id: Uuid,
    ) -> Result<bool, RegistryError> {
        let removed = {
            let mut records = self.lock("unregister_connection").await?;
            match records.get(station_id) {
                Some(record) if record.connection_id() == connection_id => records.remove(station_id),
                _ => None,
            }
        };

        match removed {
            Some(record) => {
                info!("Station {} disconnected", station_id);
                self.listeners.notify(&RegistryEvent::Unregistered {
                    station_id: record.station_id,
                    connection_id,
                });
                Ok(true)
            }
            None => {
                debug!(
                    "Connection {} of {} already superseded, registry unchanged",
                    connection_id, station_id
                );
                Ok(false)
            }
        }
    }

    /// Record activity from `station_id`
    pub async fn touch(&self, station_id: &str) -> Result<bool, RegistryError> {
        let mut records = self.lock("touch").await?;
        match records.get_mut(station_id) {
            Some(record) => {
                record.last_seen_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot of every record
    pub async fn list(&self) -> Result<Vec<ConnectionRecord>, RegistryError> {
        let records = self.lock("list").await?;
        let mut list: Vec<ConnectionRecord> = records.values().cloned().collect();
        list.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        Ok(list)
    }

    pub async fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.lock("len").await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::catalog::HeartbeatRequest;
    use ocpp_core::{CallOptions, DispatchConfig, Dispatcher, FailureKind, FrameSink, Role, Router};
    use parking_lot::Mutex as SyncMutex;
    use tokio::sync::mpsc;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Role::Csms, Router::new(), DispatchConfig::default())
    }

    fn endpoint(dispatcher: &Dispatcher, id: &str) -> (Arc<Endpoint>, mpsc::Receiver<String>) {
        let (sink, rx) = FrameSink::channel(8);
        (dispatcher.endpoint(id, sink), rx)
    }

    fn registry() -> StationRegistry {
        StationRegistry::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = registry();
        let dispatcher = dispatcher();
        let (conn, _rx) = endpoint(&dispatcher, "CS001");

        assert!(registry.register("CS001", conn.clone()).await.unwrap().is_none());

        let record = registry.resolve("CS001").await.unwrap().unwrap();
        assert_eq!(record.connection_id(), conn.connection_id());
        assert!(registry.resolve("CS002").await.unwrap().is_none());
        assert_eq!(registry.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reregister_same_connection_is_idempotent() {
        let registry = registry();
        let dispatcher = dispatcher();
        let (conn, _rx) = endpoint(&dispatcher, "CS001");

        registry.register("CS001", conn.clone()).await.unwrap();
        let first = registry.resolve("CS001").await.unwrap().unwrap();
        registry.register("CS001", conn.clone()).await.unwrap();
        let second = registry.resolve("CS001").await.unwrap().unwrap();

        assert_eq!(first.connected_at, second.connected_at);
        assert!(!conn.is_closed());
        assert_eq!(registry.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_closes_superseded_connection() {
        let registry = registry();
        let dispatcher = dispatcher();
        let (old, mut old_rx) = endpoint(&dispatcher, "CS001");
        let (new, _new_rx) = endpoint(&dispatcher, "CS001");

        registry.register("CS001", old.clone()).await.unwrap();

        // A request in flight on the old connection
        let in_flight = {
            let old = old.clone();
            tokio::spawn(async move { old.call(HeartbeatRequest {}, CallOptions::default()).await })
        };
        old_rx.recv().await.unwrap();

        let previous = registry.register("CS001", new.clone()).await.unwrap().unwrap();
        assert_eq!(previous.connection_id(), old.connection_id());
        assert!(old.is_closed());

        let failure = in_flight.await.unwrap().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Routing);
        assert_eq!(new.pending_count(), 0);

        let record = registry.resolve("CS001").await.unwrap().unwrap();
        assert_eq!(record.connection_id(), new.connection_id());
    }

    #[tokio::test]
    async fn test_late_disconnect_of_superseded_connection() {
        let registry = registry();
        let dispatcher = dispatcher();
        let (old, _old_rx) = endpoint(&dispatcher, "CS001");
        let (new, _new_rx) = endpoint(&dispatcher, "CS001");

        registry.register("CS001", old.clone()).await.unwrap();
        registry.register("CS001", new.clone()).await.unwrap();

        assert!(!registry
            .unregister_connection("CS001", old.connection_id())
            .await
            .unwrap());
        assert!(registry.resolve("CS001").await.unwrap().is_some());

        assert!(registry
            .unregister_connection("CS001", new.connection_id())
            .await
            .unwrap());
        assert!(registry.resolve("CS001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listeners_run_after_lock_release() {
        let registry = Arc::new(registry());
        let dispatcher = dispatcher();
        let (conn, _rx) = endpoint(&dispatcher, "CS001");
        let seen = Arc::new(SyncMutex::new(Vec::new()));

        let watched = Arc::clone(&registry);
        let log = Arc::clone(&seen);
        registry.listeners().register(move |event: &RegistryEvent| {
            // Would fail if the registry lock were still held
            let free = watched.records.try_lock().is_ok();
            log.lock().push((event.clone(), free));
        });

        registry.register("CS001", conn.clone()).await.unwrap();
        registry.unregister("CS001").await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(_, free)| *free));
        assert!(matches!(seen[0].0, RegistryEvent::Registered { .. }));
        assert!(matches!(seen[1].0, RegistryEvent::Unregistered { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_timeout_is_reported() {
        let registry = StationRegistry::new(Duration::from_millis(100));
        let _held = registry.records.lock().await;

        let err = registry.touch("CS001").await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::LockTimeout {
                operation: "touch",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_touch_updates_last_seen() {
        let registry = registry();
        let dispatcher = dispatcher();
        let (conn, _rx) = endpoint(&dispatcher, "CS001");

        registry.register("CS001", conn).await.unwrap();
        let before = registry.resolve("CS001").await.unwrap().unwrap().last_seen_at;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(registry.touch("CS001").await.unwrap());
        let after = registry.resolve("CS001").await.unwrap().unwrap().last_seen_at;

        assert!(after > before);
        assert!(!registry.touch("CS404").await.unwrap());
    }
}
