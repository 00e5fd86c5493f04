//! Transport boundary
//!
//! The dispatch core writes text frames into a [`FrameSink`] and is fed
//! received frames by whichever carrier owns the connection (WebSocket or the
//! in-memory [`pipe`]). Nothing here knows about sockets.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::OcppError;

/// Frames buffered per direction before senders wait
pub const DEFAULT_FRAME_BUFFER: usize = 64;

/// OCPP 2.0.1 WebSocket subprotocol
pub const OCPP_SUBPROTOCOL: &str = "ocpp2.0.1";

/// Largest accepted WebSocket message
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Outgoing half of one connection
#[derive(Debug, Clone)]
pub struct FrameSink {
    connection_id: Uuid,
    tx: mpsc::Sender<String>,
}

impl FrameSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            tx,
        }
    }

    /// Sink plus the receiver a carrier drains into its socket
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    /// Identity of this physical connection, distinct across reconnects
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub async fn send(&self, frame: String) -> Result<(), OcppError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| OcppError::ConnectionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One side of an in-memory connection
#[derive(Debug)]
pub struct PipeEnd {
    pub sink: FrameSink,
    pub frames: mpsc::Receiver<String>,
}

/// Two connected ends: frames sent on one arrive at the other
pub fn pipe(buffer: usize) -> (PipeEnd, PipeEnd) {
    let (a_tx, b_rx) = mpsc::channel(buffer);
    let (b_tx, a_rx) = mpsc::channel(buffer);

    (
        PipeEnd {
            sink: FrameSink::new(a_tx),
            frames: a_rx,
        },
        PipeEnd {
            sink: FrameSink::new(b_tx),
            frames: b_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pipe_is_crosswise() {
        let (mut left, mut right) = pipe(4);

        left.sink.send("ping".to_string()).await.unwrap();
        right.sink.send("pong".to_string()).await.unwrap();

        assert_eq!(right.frames.recv().await.as_deref(), Some("ping"));
        assert_eq!(left.frames.recv().await.as_deref(), Some("pong"));
        assert_ne!(left.sink.connection_id(), right.sink.connection_id());
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (sink, rx) = FrameSink::channel(1);
        drop(rx);
        assert!(sink.is_closed());
        assert!(matches!(
            sink.send("x".to_string()).await,
            Err(OcppError::ConnectionClosed)
        ));
    }
}
