//! Message model shared by both sides of the bridge.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → correlator builds Message { kind: ProxyRequest }
//!     → wire.rs encodes → control channel (text frame)
//!
//! control channel (text frame)
//!     → wire.rs decodes → Message { kind: ResponseHeaders | Chunk | Error | StreamClose }
//!     → registry routes by correlation id
//! ```
//!
//! # Design Decisions
//! - `Message` is an immutable value; routing never mutates it
//! - `StreamEnd` is synthesized by the registry, never decoded from the wire
//! - Unknown event types still decode so the registry can report them

pub mod id;
pub mod types;
pub mod wire;

pub use id::CorrelationId;
pub use types::{Message, MessageKind};
pub use wire::{ProxyRequestPayload, WireError};
