//! HTTP front door.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, body limit, tracing)
//!     → request.rs (method, path, query, headers, buffered body)
//!     → RequestCorrelator (peer round trip)
//!     → response.rs (status, headers, reassembled body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use server::{router, serve, HttpState};
