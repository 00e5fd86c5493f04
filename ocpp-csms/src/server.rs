//! OCPP WebSocket server
//!
//! Accepts station connections at `ws://<host>/<any path>/<stationId>`,
//! negotiates the `ocpp2.0.1` subprotocol and hands each connection to
//! [`Csms::attach`].

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use ocpp_core::transport::{DEFAULT_FRAME_BUFFER, OCPP_SUBPROTOCOL};
use ocpp_core::{FrameSink, StationId};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    accept_hdr_async_with_config,
    tungstenite::{
        self,
        handshake::server::{ErrorResponse, Request, Response},
        http::{header, HeaderValue, StatusCode},
        protocol::WebSocketConfig,
        Message,
    },
};
use tracing::{debug, error, info, warn};

use crate::csms::Csms;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Handshake rejected: {0}")]
    Handshake(String),
}

/// Station id from the last non-empty segment of the request path
pub fn station_id_from_path(path: &str) -> Option<StationId> {
    path.split('?')
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// Bound listener serving one [`Csms`]
pub struct CsmsServer {
    csms: Arc<Csms>,
    listener: TcpListener,
}

impl CsmsServer {
    pub async fn bind(csms: Arc<Csms>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(csms.config().bind_addr).await?;
        Ok(Self { csms, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> Result<(), ServerError> {
        info!("CSMS listening on {}", self.local_addr()?);

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let csms = Arc::clone(&self.csms);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(csms, stream, peer).await {
                    warn!("Connection from {} ended: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    csms: Arc<Csms>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), ServerError> {
    let mut station_id = None;

    let callback = |request: &Request, mut response: Response| {
        let Some(id) = station_id_from_path(request.uri().path()) else {
            return Err(reject(StatusCode::NOT_FOUND, "missing station id"));
        };

        let offered = request
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        match offered {
            Some(protocols) if protocols.split(',').any(|p| p.trim() == OCPP_SUBPROTOCOL) => {
                response.headers_mut().insert(
                    header::SEC_WEBSOCKET_PROTOCOL,
                    HeaderValue::from_static(OCPP_SUBPROTOCOL),
                );
            }
            Some(protocols) => {
                warn!("[{}] No supported subprotocol in {:?}", id, protocols);
                return Err(reject(StatusCode::BAD_REQUEST, "ocpp2.0.1 subprotocol required"));
            }
            None => {
                warn!("[{}] Connected without a subprotocol", id);
            }
        }

        station_id = Some(id);
        Ok(response)
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(csms.config().max_message_size);
    ws_config.max_frame_size = Some(csms.config().max_message_size);

    let ws_stream = accept_hdr_async_with_config(stream, callback, Some(ws_config)).await?;
    let station_id =
        station_id.ok_or_else(|| ServerError::Handshake(format!("no station id from {}", peer)))?;
    info!("[{}] WebSocket connected from {}", station_id, peer);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (sink, mut outgoing) = FrameSink::channel(DEFAULT_FRAME_BUFFER);
    let (frames_tx, frames_rx) = mpsc::channel(DEFAULT_FRAME_BUFFER);

    let endpoint = csms.attach(station_id.clone(), sink, frames_rx).await?;

    let sender_handle = tokio::spawn(async move {
        while let Some(text) = outgoing.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(text)).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if frames_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if frames_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => warn!("[{}] Dropping non UTF-8 binary frame", station_id),
                },
                Some(Ok(Message::Close(_))) => {
                    info!("[{}] WebSocket closed by station", station_id);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("[{}] WebSocket error: {}", station_id, e);
                    break;
                }
                None => {
                    debug!("[{}] WebSocket stream ended", station_id);
                    break;
                }
            },
            _ = endpoint.closed() => {
                info!("[{}] Connection {} closed locally", station_id, endpoint.connection_id());
                break;
            }
        }
    }

    drop(frames_tx);
    endpoint.close();
    sender_handle.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_id_from_path() {
        assert_eq!(
            station_id_from_path("/steve/websocket/CentralSystemService/EK3-001"),
            Some("EK3-001".to_string())
        );
        assert_eq!(station_id_from_path("/ocpp/CS001/"), Some("CS001".to_string()));
        assert_eq!(station_id_from_path("/CS001?token=x"), Some("CS001".to_string()));
        assert_eq!(station_id_from_path("/"), None);
        assert_eq!(station_id_from_path(""), None);
    }

    #[test]
    fn test_reject_sets_status() {
        let response = reject(StatusCode::NOT_FOUND, "missing station id");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_deref(), Some("missing station id"));
    }
}
