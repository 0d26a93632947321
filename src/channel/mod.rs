//! Control-channel transport.
//!
//! # Data Flow
//! ```text
//! Peer WebSocket connect
//!     → server.rs (upgrade, assign ConnectionId, registry.add_connection)
//!     → receive loop: text frame → wire decode → registry.route_inbound
//!     → close/error/shutdown → registry.remove_connection
//!
//! Correlator
//!     → peer.rs PeerLink::send (encode, try_send into outbound buffer)
//!     → writer task → WebSocket sink
//! ```
//!
//! # Design Decisions
//! - Sends never block: a full buffer fails the one request that tried
//! - The receive loop is the sole producer of inbound messages

pub mod connection;
pub mod peer;
pub mod server;

pub use connection::{ClientInfo, ConnectionId};
pub use peer::{PeerLink, SendError, WsPeer};
pub use server::ChannelState;
