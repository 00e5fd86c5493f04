//! CSMS configuration

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use ocpp_core::enums::AuthorizationStatus;
use ocpp_core::transport::MAX_MESSAGE_SIZE;
use ocpp_core::StationId;

/// Vendor id the CSMS answers DataTransfer for
pub const DEFAULT_ACCEPTED_VENDOR: &str = "GraphDefined OEM";

/// Complete CSMS configuration
#[derive(Debug, Clone)]
pub struct CsmsConfig {
    /// WebSocket listen address
    pub bind_addr: SocketAddr,

    /// Heartbeat interval handed out in BootNotification responses
    pub heartbeat_interval: Duration,

    /// Default bound on waiting for a station's response
    pub request_timeout: Duration,

    /// Bounded wait for the station registry lock
    pub registry_lock_timeout: Duration,

    /// Largest accepted WebSocket message
    pub max_message_size: usize,

    /// Stations allowed to register; empty accepts every station
    pub allowed_stations: HashSet<StationId>,

    /// Known id tokens and their authorization status
    pub id_tokens: HashMap<String, AuthorizationStatus>,

    /// Answer `Accepted` for tokens not in `id_tokens`
    pub accept_unknown_tokens: bool,

    /// Vendor id accepted for DataTransfer
    pub accepted_vendor: String,
}

impl Default for CsmsConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8180)),
            heartbeat_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            registry_lock_timeout: Duration::from_secs(5),
            max_message_size: MAX_MESSAGE_SIZE,
            allowed_stations: HashSet::new(),
            id_tokens: HashMap::new(),
            accept_unknown_tokens: true,
            accepted_vendor: DEFAULT_ACCEPTED_VENDOR.to_string(),
        }
    }
}

impl CsmsConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the registry lock timeout
    pub fn with_registry_lock_timeout(mut self, timeout: Duration) -> Self {
        self.registry_lock_timeout = timeout;
        self
    }

    /// Only let these stations register
    pub fn with_allowed_stations<I, S>(mut self, stations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StationId>,
    {
        self.allowed_stations = stations.into_iter().map(Into::into).collect();
        self
    }

    /// Add a known id token
    pub fn with_id_token(mut self, token: impl Into<String>, status: AuthorizationStatus) -> Self {
        self.id_tokens.insert(token.into(), status);
        self
    }

    /// Reject tokens that are not configured
    pub fn with_strict_authorization(mut self) -> Self {
        self.accept_unknown_tokens = false;
        self
    }

    /// Set the accepted DataTransfer vendor
    pub fn with_accepted_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.accepted_vendor = vendor.into();
        self
    }

    pub fn is_station_allowed(&self, station_id: &str) -> bool {
        self.allowed_stations.is_empty() || self.allowed_stations.contains(station_id)
    }

    /// Authorization decision for a raw token value
    pub fn authorize(&self, token: &str) -> AuthorizationStatus {
        match self.id_tokens.get(token) {
            Some(status) => *status,
            None if self.accept_unknown_tokens => AuthorizationStatus::Accepted,
            None => AuthorizationStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CsmsConfig::default();
        assert_eq!(config.bind_addr.port(), 8180);
        assert_eq!(config.accepted_vendor, "GraphDefined OEM");
        assert!(config.is_station_allowed("anything"));
    }

    #[test]
    fn test_allow_list() {
        let config = CsmsConfig::default().with_allowed_stations(["CS001"]);
        assert!(config.is_station_allowed("CS001"));
        assert!(!config.is_station_allowed("CS002"));
    }

    #[test]
    fn test_authorization_policy() {
        let config = CsmsConfig::default().with_id_token("BLOCKED-1", AuthorizationStatus::Blocked);
        assert_eq!(config.authorize("BLOCKED-1"), AuthorizationStatus::Blocked);
        assert_eq!(config.authorize("whoever"), AuthorizationStatus::Accepted);

        let strict = config.with_strict_authorization();
        assert_eq!(strict.authorize("whoever"), AuthorizationStatus::Unknown);
    }
}
