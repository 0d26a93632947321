//! Control-channel connection identity.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Record who connected and when

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a control-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Details about a connected peer, captured when the channel opens.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Remote address, or "unknown" when the transport cannot tell.
    pub address: String,
    pub connected_at: SystemTime,
}

impl ClientInfo {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connected_at: SystemTime::now(),
        }
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self::new(addr.to_string())
    }
}
