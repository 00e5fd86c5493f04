//! OCPP Node - CLI for the OCPP 2.0.1 CSMS and charging station
//!
//! # Usage
//!
//! ```bash
//! # Run a CSMS on the default port
//! ocpp-node csms
//!
//! # Only accept two stations, heartbeat every minute
//! ocpp-node csms --bind 0.0.0.0:9000 --allow CS001 --allow CS002 --heartbeat 60
//!
//! # Connect a station with two EVSEs
//! ocpp-node station --station CS001 --csms-url ws://localhost:8180/ocpp --evse-count 2
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ocpp_csms::{Csms, CsmsConfig, CsmsServer};
use ocpp_station::{ChargingStation, StationClient, StationConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// OCPP 2.0.1 node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a charging station management system
    Csms {
        /// WebSocket listen address
        #[arg(long, default_value = "0.0.0.0:8180")]
        bind: SocketAddr,

        /// Heartbeat interval handed to stations, in seconds
        #[arg(long, default_value = "300")]
        heartbeat: u64,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        request_timeout: u64,

        /// Stations allowed to register (can be repeated; none allows all)
        #[arg(long)]
        allow: Vec<String>,

        /// Reject id tokens that are not configured
        #[arg(long)]
        strict_authorization: bool,

        /// Vendor id accepted for DataTransfer
        #[arg(long, default_value = ocpp_csms::config::DEFAULT_ACCEPTED_VENDOR)]
        vendor_id: String,
    },

    /// Run a charging station connected to a CSMS
    Station {
        /// OCPP station ID
        #[arg(short, long, default_value = "EK3-001")]
        station: String,

        /// OCPP CSMS WebSocket URL
        #[arg(long, default_value = "ws://localhost:8180/ocpp")]
        csms_url: String,

        /// Number of EVSEs
        #[arg(long, default_value = "1")]
        evse_count: u32,

        /// Connectors per EVSE
        #[arg(long, default_value = "1")]
        connectors: u32,

        /// Vendor name
        #[arg(long, default_value = "Elektrokombinacija")]
        vendor: String,

        /// Model name
        #[arg(long, default_value = "EK3-OCPP")]
        model: String,

        /// Serial number
        #[arg(long)]
        serial: Option<String>,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        request_timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Csms {
            bind,
            heartbeat,
            request_timeout,
            allow,
            strict_authorization,
            vendor_id,
        } => {
            let mut config = CsmsConfig::new(bind)
                .with_heartbeat_interval(Duration::from_secs(heartbeat))
                .with_request_timeout(Duration::from_secs(request_timeout))
                .with_allowed_stations(allow)
                .with_accepted_vendor(vendor_id);
            if strict_authorization {
                config = config.with_strict_authorization();
            }
            run_csms(config).await
        }
        Command::Station {
            station,
            csms_url,
            evse_count,
            connectors,
            vendor,
            model,
            serial,
            request_timeout,
        } => {
            let mut config = StationConfig::new(csms_url, station)
                .with_evses(evse_count, connectors)
                .with_request_timeout(Duration::from_secs(request_timeout));
            config.vendor = vendor;
            config.model = model;
            if let Some(serial) = serial {
                config = config.with_serial(serial);
            }
            run_station(config).await
        }
    }
}

async fn run_csms(config: CsmsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let csms = Arc::new(Csms::new(config));
    let server = CsmsServer::bind(Arc::clone(&csms)).await?;
    info!("CSMS ready on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down, {} stations known", csms.stations().len());
        }
    }
    Ok(())
}

async fn run_station(config: StationConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting station {} ({} EVSEs) for {}",
        config.station_id, config.evse_count, config.csms_url
    );

    let client = StationClient::new(ChargingStation::new(config));
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            token.cancel();
        }
    });

    client.run(shutdown).await?;
    Ok(())
}
