//! The capability to talk to the remote peer.
//!
//! A `PeerLink` is what the registry hands out from `pick_connection()`. The
//! correlator holds on to the link it picked for the life of one request.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::channel::connection::ConnectionId;
use crate::correlation::BridgeError;
use crate::message::wire::{encode_outbound, WireError};
use crate::message::Message;

/// Reasons a send to the peer can fail.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("could not encode message: {0}")]
    Encode(#[from] WireError),

    /// The outbound buffer is full; the peer is not draining frames.
    #[error("outbound buffer full")]
    BufferFull,

    #[error("peer disconnected")]
    Disconnected,
}

impl From<SendError> for BridgeError {
    fn from(err: SendError) -> Self {
        BridgeError::SendFailed(err.to_string())
    }
}

/// One live control-channel connection.
pub trait PeerLink: Send + Sync + std::fmt::Debug {
    fn id(&self) -> ConnectionId;

    /// Best-effort, non-blocking send. Any error is final for the request.
    fn send(&self, message: &Message) -> Result<(), SendError>;

    fn is_alive(&self) -> bool;
}

/// `PeerLink` backed by the outbound frame buffer of a WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsPeer {
    id: ConnectionId,
    frames: mpsc::Sender<String>,
}

impl WsPeer {
    pub fn new(id: ConnectionId, frames: mpsc::Sender<String>) -> Self {
        Self { id, frames }
    }
}

impl PeerLink for WsPeer {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: &Message) -> Result<(), SendError> {
        let frame = encode_outbound(message)?;
        self.frames.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::BufferFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Disconnected,
        })
    }

    fn is_alive(&self) -> bool {
        !self.frames.is_closed()
    }
}
