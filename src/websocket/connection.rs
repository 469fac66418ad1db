use bytestring::ByteString;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use uuid::Uuid;

use crate::error::WebSocketError;

/// Pre-encoded text frame, shared by every recipient of one broadcast.
pub type Frame = ByteString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Server side of one live client session.
///
/// The registry owns the only `Connection` for a session. Once it is
/// dropped the outbound queue closes and the session shuts its socket.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: String,
    connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Frame>,
}

impl Connection {
    /// Create the handle plus the receiving end the session drains into its socket.
    pub fn open(peer_addr: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            peer_addr: peer_addr.into(),
            connected_at: Utc::now(),
            tx,
        };
        (connection, rx)
    }

    /// Queue a frame, waiting at most `timeout` for room.
    pub async fn send(&self, frame: Frame, timeout: Duration) -> Result<(), WebSocketError> {
        self.tx.send_timeout(frame, timeout).await.map_err(|e| match e {
            SendTimeoutError::Timeout(_) => WebSocketError::SendTimeout(timeout.as_millis() as u64),
            SendTimeoutError::Closed(_) => WebSocketError::ConnectionClosed,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
