//! Charging station configuration

use std::time::Duration;

/// Vendor id the station answers DataTransfer for
pub const DEFAULT_ACCEPTED_VENDOR: &str = "GraphDefined OEM";

#[derive(Debug, Clone)]
pub struct StationConfig {
    /// CSMS WebSocket URL, without the station id
    pub csms_url: String,
    /// Station identity (last URL path segment)
    pub station_id: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    /// Number of EVSEs, numbered from 1
    pub evse_count: u32,
    /// Connectors per EVSE, numbered from 1
    pub connectors_per_evse: u32,
    /// Reconnect delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnect delay
    pub max_reconnect_delay: Duration,
    /// Default bound on waiting for a CSMS response
    pub request_timeout: Duration,
    /// Heartbeat interval until the CSMS hands out its own
    pub heartbeat_interval: Duration,
    /// Reservation expiry and meter sampling period
    pub maintenance_interval: Duration,
    /// Power drawn by a charging transaction when no profile limits it
    pub simulated_power_w: f64,
    /// Vendor id accepted for DataTransfer
    pub accepted_vendor: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            csms_url: "ws://localhost:8180/ocpp".to_string(),
            station_id: "EK3-001".to_string(),
            vendor: "Elektrokombinacija".to_string(),
            model: "EK3-OCPP".to_string(),
            serial_number: None,
            firmware_version: Some("0.1.0".to_string()),
            evse_count: 1,
            connectors_per_evse: 1,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(300),
            maintenance_interval: Duration::from_secs(60),
            simulated_power_w: 11_000.0,
            accepted_vendor: DEFAULT_ACCEPTED_VENDOR.to_string(),
        }
    }
}

impl StationConfig {
    pub fn new(csms_url: impl Into<String>, station_id: impl Into<String>) -> Self {
        Self {
            csms_url: csms_url.into(),
            station_id: station_id.into(),
            ..Default::default()
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn with_firmware(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }

    pub fn with_evses(mut self, evse_count: u32, connectors_per_evse: u32) -> Self {
        self.evse_count = evse_count;
        self.connectors_per_evse = connectors_per_evse;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max;
        self
    }

    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    pub fn with_accepted_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.accepted_vendor = vendor.into();
        self
    }

    /// Full WebSocket URL including the station id
    pub fn connect_url(&self) -> String {
        build_ocpp_url(&self.csms_url, &self.station_id)
    }
}

/// Build the full OCPP WebSocket URL
pub fn build_ocpp_url(base_url: &str, station_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), station_id)
}

/// Station identity a connection URL is established under: its last path segment
pub fn identity_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, path) = path.split_once('/')?;
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}
