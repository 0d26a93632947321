//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop() → trigger → HTTP + channel listeners stop accepting
//!            → channel receive loops exit → connections removed → queues closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls BridgeSystem::stop()
//! ```
//!
//! # Design Decisions
//! - Listeners bind before start() reports success
//! - Shutdown has a deadline: server tasks still running after it are aborted

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
