//! Error types for the correlation engine.

use std::time::Duration;
use thiserror::Error;

use crate::message::CorrelationId;

/// Failure of a single `RendezvousQueue::consume` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was closed before or while waiting.
    #[error("queue closed")]
    Closed,

    /// Nothing arrived within the wait window.
    #[error("no message within {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced while bridging one HTTP request, or while running the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No channel peer is connected.
    #[error("no active channel connection")]
    NoActiveConnection,

    /// The peer answered with an `error` event.
    #[error("peer reported error {status}: {body}")]
    PeerReportedError { status: u16, body: String },

    /// The peer sent nothing within the timeout window.
    #[error("peer did not respond within {0:?}")]
    Timeout(Duration),

    /// The request's queue was closed underneath it (e.g. the peer disconnected).
    #[error("request queue closed")]
    QueueClosed,

    /// Handing the request to the peer failed.
    #[error("failed to send request to peer: {0}")]
    SendFailed(String),

    /// A queue already exists for this correlation id.
    #[error("correlation id {0} is already in flight")]
    DuplicateCorrelationId(CorrelationId),

    /// A listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A listener failed while serving.
    #[error("{server} server failed: {source}")]
    Serve {
        server: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// `start()` was called on a running bridge.
    #[error("bridge is already running")]
    AlreadyRunning,
}

impl BridgeError {
    /// HTTP status reported to the caller for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::NoActiveConnection => 503,
            BridgeError::PeerReportedError { status, .. } => *status,
            BridgeError::Timeout(_) => 504,
            BridgeError::QueueClosed | BridgeError::SendFailed(_) => 502,
            BridgeError::DuplicateCorrelationId(_)
            | BridgeError::Bind { .. }
            | BridgeError::Serve { .. }
            | BridgeError::AlreadyRunning => 500,
        }
    }
}

impl From<QueueError> for BridgeError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Closed => BridgeError::QueueClosed,
            QueueError::Timeout(after) => BridgeError::Timeout(after),
        }
    }
}
