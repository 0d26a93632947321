//! HTTP to control-channel bridge.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────┐
//!                          │                  BRIDGE                      │
//!     Client Request       │  ┌────────┐    ┌──────────────┐              │
//!     ─────────────────────┼─▶│  http  │───▶│  correlator  │──── send ────┼──▶ Peer
//!                          │  │ server │    │  (per req.)  │              │   (WebSocket)
//!                          │  └────────┘    └──────┬───────┘              │
//!                          │                       │ consume             │
//!                          │                       ▼                      │
//!     Client Response      │                ┌──────────────┐  route  ┌───┴─────┐
//!     ◀────────────────────┼────────────────│  rendezvous  │◀────────│ channel │◀── events
//!                          │                │    queues    │         │ server  │
//!                          │                └──────────────┘         └───┬─────┘
//!                          │            (owned by ConnectionRegistry)    │
//!                          └──────────────────────────────────────────────┘
//! ```

pub mod channel;
pub mod config;
pub mod correlation;
pub mod http;
pub mod lifecycle;
pub mod message;
pub mod observability;
pub mod system;

pub use config::BridgeConfig;
pub use correlation::{BridgeError, ConnectionRegistry, RendezvousQueue, RequestCorrelator};
pub use lifecycle::Shutdown;
pub use message::{CorrelationId, Message, MessageKind};
pub use system::{BoundAddresses, BridgeSystem};
