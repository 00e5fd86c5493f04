//! OCPP WebSocket client
//!
//! Connects a [`ChargingStation`] to its CSMS:
//! - WebSocket connection with the OCPP subprotocol
//! - Automatic reconnection with exponential backoff
//! - Registration (BootNotification, then StatusNotification per connector)

use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use ocpp_core::transport::{DEFAULT_FRAME_BUFFER, MAX_MESSAGE_SIZE, OCPP_SUBPROTOCOL};
use ocpp_core::FrameSink;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest,
        http::{header, HeaderValue},
        protocol::WebSocketConfig,
        Error as WsError, Message,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::identity_from_url;
use crate::error::StationError;
use crate::station::ChargingStation;

/// Keeps one station connected until shut down
#[derive(Debug, Clone)]
pub struct StationClient {
    station: ChargingStation,
}

impl StationClient {
    pub fn new(station: ChargingStation) -> Self {
        Self { station }
    }

    pub fn station(&self) -> &ChargingStation {
        &self.station
    }

    /// Run the connection loop until `shutdown` is canceled
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), StationError> {
        let config = self.station.config();
        let mut reconnect_delay = config.reconnect_delay;

        loop {
            info!("Connecting to CSMS: {}", config.connect_url());

            match self.connect_and_run(&shutdown).await {
                Ok(()) => {
                    // Was connected; start backing off from scratch
                    reconnect_delay = config.reconnect_delay;
                }
                Err(e) => error!("Connection error: {}", e),
            }

            if shutdown.is_cancelled() {
                info!("Station client stopped");
                return Ok(());
            }

            info!("Reconnecting in {:?}", reconnect_delay);
            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = shutdown.cancelled() => {
                    info!("Station client stopped");
                    return Ok(());
                }
            }
            reconnect_delay = next_delay(reconnect_delay, config.max_reconnect_delay);
        }
    }

    /// Connect, register and pump frames until disconnection
    async fn connect_and_run(&self, shutdown: &CancellationToken) -> Result<(), StationError> {
        let url = self.station.config().connect_url();

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| StationError::InvalidUrl(format!("{}: {}", url, e)))?;
        request.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(OCPP_SUBPROTOCOL),
        );

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(MAX_MESSAGE_SIZE);

        let (ws_stream, response) = connect_async_with_config(request, Some(ws_config), false).await?;

        // Verify subprotocol
        let accepted_protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        if accepted_protocol != Some(OCPP_SUBPROTOCOL) {
            warn!(
                "CSMS did not accept OCPP 2.0.1 subprotocol, got: {:?}",
                accepted_protocol
            );
        }

        info!("WebSocket connected to {}", url);

        let (ws_tx, mut ws_rx) = ws_stream.split();
        let (sink, outgoing) = FrameSink::channel(DEFAULT_FRAME_BUFFER);
        let (frames_tx, frames_rx) = mpsc::channel(DEFAULT_FRAME_BUFFER);
        let identity = identity_from_url(&url)
            .unwrap_or_else(|| self.station.config().station_id.clone());
        let endpoint = self.station.attach(identity, sink, frames_rx);

        let sender_handle = tokio::spawn(forward_frames(outgoing, ws_tx));

        let station = self.station.clone();
        let registration = tokio::spawn(async move {
            match station.register().await {
                Ok(response) => info!(
                    "[{}] Registered, CSMS time {}",
                    station.config().station_id,
                    response.current_time
                ),
                Err(e) => warn!("[{}] Registration failed: {}", station.config().station_id, e),
            }
        });

        loop {
            tokio::select! {
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if frames_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by server");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Pong is queued by tungstenite
                        debug!("Received ping");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break;
                    }
                },
                _ = endpoint.closed() => break,
                _ = shutdown.cancelled() => break,
            }
        }

        registration.abort();
        drop(frames_tx);
        self.station.disconnect();
        sender_handle.abort();
        Ok(())
    }
}

/// Write queued frames to the socket until the queue closes or a send
/// fails, then close the socket. Returns the number of frames written.
async fn forward_frames<S>(mut outgoing: mpsc::Receiver<String>, mut ws_tx: S) -> usize
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let mut written = 0;
    while let Some(text) = outgoing.recv().await {
        if let Err(e) = ws_tx.send(Message::Text(text)).await {
            error!("Failed to send WebSocket message: {}", e);
            break;
        }
        written += 1;
    }
    if let Err(e) = ws_tx.close().await {
        debug!("WebSocket close failed: {}", e);
    }
    written
}

/// Exponential backoff step
fn next_delay(current: Duration, max: Duration) -> Duration {
    std::cmp::min(current * 2, max)
}
