//! Request/response correlation engine.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → correlator.rs (allocate id, create queue, send ProxyRequest to peer)
//!     → registry.rs (owns the queue under the id)
//!
//! channel receive loop
//!     → registry.rs route_inbound (look up queue by id, dispatch by kind)
//!     → queue.rs enqueue
//!
//! correlator.rs consume loop
//!     → headers, then chunks until StreamEnd
//!     → HTTP response; queue removed on every exit path
//! ```
//!
//! # Design Decisions
//! - Each queue has its own lock; unrelated requests never contend
//! - The registry's map and connection set are the only shared state
//! - The only suspension point is `RendezvousQueue::consume`

pub mod correlator;
pub mod error;
pub mod queue;
pub mod registry;

pub use correlator::{InboundRequest, OutboundResponse, RequestCorrelator, RequestPhase};
pub use error::{BridgeError, QueueError};
pub use queue::{RendezvousQueue, DEFAULT_CONSUME_TIMEOUT};
pub use registry::{ConnectionObserver, ConnectionRegistry, RouteOutcome};
