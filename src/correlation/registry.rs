//! Live connections and per-request queues.
//!
//! # Responsibilities
//! - Track live control-channel connections (added on open, removed on close)
//! - Own every `RendezvousQueue`, keyed by correlation id
//! - Route inbound channel events to the matching queue
//!
//! # Design Decisions
//! - Single meaningful peer: the most recently added live connection serves
//!   new requests, and losing any connection invalidates all in-flight requests
//! - The queue map is sharded (`DashMap`); queues are cloned out of the map
//!   before any enqueue so no shard lock is held across queue operations
//! - Observers run outside the connection lock

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use crate::channel::connection::{ClientInfo, ConnectionId};
use crate::channel::peer::PeerLink;
use crate::correlation::error::{BridgeError, QueueError};
use crate::correlation::queue::RendezvousQueue;
use crate::message::{CorrelationId, Message, MessageKind};
use crate::observability::metrics;

/// Callback invoked when a connection is added or removed.
pub type ConnectionObserver = Arc<dyn Fn(ConnectionId, &ClientInfo) + Send + Sync>;

/// What `route_inbound` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Enqueued as-is on the matching queue.
    Delivered,
    /// `StreamClose` translated into a `StreamEnd` sentinel.
    StreamEnded,
    /// No queue for the correlation id (request finished or timed out).
    Unroutable,
    /// Event kind the registry does not route.
    UnknownEvent,
    /// The queue was found but had already been closed.
    QueueClosed,
}

impl RouteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOutcome::Delivered => "delivered",
            RouteOutcome::StreamEnded => "stream_ended",
            RouteOutcome::Unroutable => "unroutable",
            RouteOutcome::UnknownEvent => "unknown_event",
            RouteOutcome::QueueClosed => "queue_closed",
        }
    }
}

struct LiveConnection {
    link: Arc<dyn PeerLink>,
    info: ClientInfo,
}

/// Registry of channel connections and in-flight request queues.
pub struct ConnectionRegistry {
    /// Ordered by registration time; the last live entry wins.
    connections: Mutex<Vec<LiveConnection>>,
    queues: DashMap<CorrelationId, Arc<RendezvousQueue>>,
    added_observers: RwLock<Vec<ConnectionObserver>>,
    removed_observers: RwLock<Vec<ConnectionObserver>>,
    queue_timeout: Duration,
}

impl ConnectionRegistry {
    /// Create an empty registry whose queues default to `queue_timeout` waits.
    pub fn new(queue_timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            queues: DashMap::new(),
            added_observers: RwLock::new(Vec::new()),
            removed_observers: RwLock::new(Vec::new()),
            queue_timeout,
        }
    }

    fn connections(&self) -> MutexGuard<'_, Vec<LiveConnection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(observers: &RwLock<Vec<ConnectionObserver>>, id: ConnectionId, info: &ClientInfo) {
        let observers = observers.read().unwrap_or_else(PoisonError::into_inner).clone();
        for observer in observers {
            observer(id, info);
        }
    }

    /// Register a newly opened connection.
    pub fn add_connection(&self, link: Arc<dyn PeerLink>, info: ClientInfo) {
        let id = link.id();
        let count = {
            let mut connections = self.connections();
            connections.retain(|c| c.link.id() != id);
            connections.push(LiveConnection {
                link,
                info: info.clone(),
            });
            connections.len()
        };

        tracing::info!(
            connection_id = %id,
            address = %info.address,
            active_connections = count,
            "Channel peer connected"
        );
        if count > 1 {
            tracing::warn!(
                active_connections = count,
                "Multiple channel peers connected; new requests go to the most recent one"
            );
        }
        metrics::set_active_connections(count);
        Self::notify(&self.added_observers, id, &info);
    }

    /// Unregister a closed connection.
    ///
    /// Every tracked queue is closed and discarded, because in-flight requests
    /// cannot be answered once their peer is gone. Returns `false` (and touches
    /// nothing) if the connection was not registered.
    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut connections = self.connections();
            let removed = connections
                .iter()
                .position(|c| c.link.id() == id)
                .map(|pos| connections.remove(pos));
            (removed, connections.len())
        };

        let Some(removed) = removed else {
            tracing::debug!(connection_id = %id, "Ignoring removal of unknown connection");
            return false;
        };

        let closed = self.close_all_queues();
        let connected_secs = removed
            .info
            .connected_at
            .elapsed()
            .map(|d| d.as_secs())
            .unwrap_or_default();
        tracing::info!(
            connection_id = %id,
            address = %removed.info.address,
            connected_secs,
            closed_requests = closed,
            active_connections = count,
            "Channel peer disconnected"
        );
        metrics::set_active_connections(count);
        Self::notify(&self.removed_observers, id, &removed.info);
        true
    }

    /// Close and discard every tracked queue. Returns how many were closed.
    pub fn close_all_queues(&self) -> usize {
        let mut closed = 0;
        self.queues.retain(|_, queue| {
            queue.close();
            closed += 1;
            false
        });
        closed
    }

    /// Whether any live connection is registered.
    pub fn has_active_connection(&self) -> bool {
        self.connections().iter().any(|c| c.link.is_alive())
    }

    /// The connection new requests should use: the most recently added live one.
    pub fn pick_connection(&self) -> Option<Arc<dyn PeerLink>> {
        self.connections()
            .iter()
            .rev()
            .find(|c| c.link.is_alive())
            .map(|c| c.link.clone())
    }

    /// Whether `id` is still tracked. Once this turns false the queue sweep
    /// for that connection has started.
    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections().iter().any(|c| c.link.id() == id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    /// Create and track the queue for `correlation_id`.
    pub fn create_queue(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Arc<RendezvousQueue>, BridgeError> {
        match self.queues.entry(correlation_id) {
            Entry::Occupied(entry) => Err(BridgeError::DuplicateCorrelationId(entry.key().clone())),
            Entry::Vacant(entry) => {
                let queue = Arc::new(RendezvousQueue::new(self.queue_timeout));
                entry.insert(queue.clone());
                Ok(queue)
            }
        }
    }

    /// Close and forget the queue for `correlation_id`. No-op if absent.
    pub fn remove_queue(&self, correlation_id: &CorrelationId) -> bool {
        match self.queues.remove(correlation_id) {
            Some((_, queue)) => {
                queue.close();
                true
            }
            None => false,
        }
    }

    pub fn has_queue(&self, correlation_id: &CorrelationId) -> bool {
        self.queues.contains_key(correlation_id)
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Route one decoded channel event to its request's queue.
    ///
    /// Never blocks and never fails; anything that cannot be delivered is
    /// logged and dropped.
    pub fn route_inbound(&self, message: Message) -> RouteOutcome {
        let outcome = self.dispatch(message);
        metrics::record_inbound(outcome.as_str());
        outcome
    }

    fn dispatch(&self, message: Message) -> RouteOutcome {
        let queue = match self.queues.get(&message.correlation_id) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::warn!(
                    request_id = %message.correlation_id,
                    event_type = %message.kind,
                    "Dropping message for unknown request id"
                );
                return RouteOutcome::Unroutable;
            }
        };

        let (message, outcome) = match message.kind {
            MessageKind::ResponseHeaders | MessageKind::Chunk | MessageKind::Error => {
                (message, RouteOutcome::Delivered)
            }
            MessageKind::StreamClose => (
                Message::stream_end(message.correlation_id),
                RouteOutcome::StreamEnded,
            ),
            ref other => {
                tracing::warn!(
                    request_id = %message.correlation_id,
                    event_type = %other,
                    "Dropping message with unknown event type"
                );
                return RouteOutcome::UnknownEvent;
            }
        };

        let request_id = message.correlation_id.clone();
        match queue.enqueue(message) {
            Ok(()) => outcome,
            Err(QueueError::Closed) | Err(QueueError::Timeout(_)) => {
                tracing::debug!(request_id = %request_id, "Dropping message for closed queue");
                RouteOutcome::QueueClosed
            }
        }
    }

    pub fn on_connection_added(&self, observer: ConnectionObserver) {
        self.added_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn on_connection_removed(&self, observer: ConnectionObserver) {
        self.removed_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connection_count())
            .field("queues", &self.queue_count())
            .field("queue_timeout", &self.queue_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::peer::SendError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StubPeer {
        id: ConnectionId,
        alive: AtomicBool,
    }

    impl StubPeer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(),
                alive: AtomicBool::new(true),
            })
        }
    }

    impl PeerLink for StubPeer {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn send(&self, _message: &Message) -> Result<(), SendError> {
            Ok(())
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Duration::from_secs(5))
    }

    #[test]
    fn test_duplicate_queue_rejected() {
        let registry = registry();
        let id = CorrelationId::from("1_dup");

        let first = registry.create_queue(id.clone()).unwrap();
        let err = registry.create_queue(id.clone()).unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateCorrelationId(ref dup) if *dup == id));

        // The first queue is untouched.
        assert!(!first.is_closed());
        assert_eq!(registry.queue_count(), 1);
    }

    #[test]
    fn test_remove_queue_is_idempotent() {
        let registry = registry();
        let id = CorrelationId::from("1_rm");
        let queue = registry.create_queue(id.clone()).unwrap();

        assert!(registry.remove_queue(&id));
        assert!(queue.is_closed());
        assert!(!registry.has_queue(&id));
        assert!(!registry.remove_queue(&id));
    }

    #[test]
    fn test_route_unknown_request_id() {
        let registry = registry();
        let msg = Message::new("1_nobody".into(), MessageKind::Chunk).with_body("x");
        assert_eq!(registry.route_inbound(msg), RouteOutcome::Unroutable);
    }

    #[tokio::test]
    async fn test_route_by_kind() {
        let registry = registry();
        let id = CorrelationId::from("1_route");
        let queue = registry.create_queue(id.clone()).unwrap();

        let headers = Message::new(id.clone(), MessageKind::ResponseHeaders).with_status(201);
        let chunk = Message::new(id.clone(), MessageKind::Chunk).with_body("ab");
        let close = Message::new(id.clone(), MessageKind::StreamClose).with_body("ignored");
        let unknown = Message::new(id.clone(), MessageKind::Unknown("ping".into()));
        let echoed = Message::new(id.clone(), MessageKind::ProxyRequest);

        assert_eq!(registry.route_inbound(headers), RouteOutcome::Delivered);
        assert_eq!(registry.route_inbound(chunk), RouteOutcome::Delivered);
        assert_eq!(registry.route_inbound(unknown), RouteOutcome::UnknownEvent);
        assert_eq!(registry.route_inbound(echoed), RouteOutcome::UnknownEvent);
        assert_eq!(registry.route_inbound(close), RouteOutcome::StreamEnded);
        assert_eq!(queue.pending_messages(), 3);

        let timeout = Duration::from_secs(1);
        assert_eq!(queue.consume(timeout).await.unwrap().status, 201);
        assert_eq!(queue.consume(timeout).await.unwrap().body, "ab");
        let end = queue.consume(timeout).await.unwrap();
        assert_eq!(end.kind, MessageKind::StreamEnd);
        assert!(end.body.is_empty());
    }

    #[test]
    fn test_route_to_closed_queue() {
        let registry = registry();
        let id = CorrelationId::from("1_closed");
        let queue = registry.create_queue(id.clone()).unwrap();
        queue.close();

        let msg = Message::new(id, MessageKind::Chunk);
        assert_eq!(registry.route_inbound(msg), RouteOutcome::QueueClosed);
    }

    #[test]
    fn test_pick_connection_last_wins() {
        let registry = registry();
        assert!(!registry.has_active_connection());
        assert!(registry.pick_connection().is_none());

        let first = StubPeer::new();
        let second = StubPeer::new();
        registry.add_connection(first.clone(), ClientInfo::new("a"));
        registry.add_connection(second.clone(), ClientInfo::new("b"));

        assert!(registry.has_active_connection());
        assert_eq!(registry.pick_connection().unwrap().id(), second.id);

        second.alive.store(false, Ordering::SeqCst);
        assert_eq!(registry.pick_connection().unwrap().id(), first.id);

        first.alive.store(false, Ordering::SeqCst);
        assert!(!registry.has_active_connection());
    }

    #[tokio::test]
    async fn test_remove_connection_closes_all_queues() {
        let registry = Arc::new(registry());
        let peer = StubPeer::new();
        registry.add_connection(peer.clone(), ClientInfo::new("peer"));
        assert!(registry.is_registered(peer.id));

        let mut waiters = Vec::new();
        for i in 0..5 {
            let queue = registry.create_queue(format!("1_req{i}").into()).unwrap();
            waiters.push(tokio::spawn(async move {
                queue.consume(Duration::from_secs(30)).await
            }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(registry.remove_connection(peer.id));
        assert_eq!(registry.queue_count(), 0);
        assert_eq!(registry.connection_count(), 0);
        assert!(!registry.is_registered(peer.id));

        for waiter in waiters {
            let result = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("consumer should wake promptly")
                .unwrap();
            assert_eq!(result, Err(QueueError::Closed));
        }

        assert!(!registry.remove_connection(peer.id));
    }

    #[test]
    fn test_unknown_connection_removal_keeps_queues() {
        let registry = registry();
        let queue = registry.create_queue("1_keep".into()).unwrap();

        assert!(!registry.remove_connection(ConnectionId::new()));
        assert!(!queue.is_closed());
        assert_eq!(registry.queue_count(), 1);
    }

    #[test]
    fn test_observers_invoked() {
        let registry = registry();
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));

        let counter = added.clone();
        registry.on_connection_added(Arc::new(move |_: ConnectionId, _: &ClientInfo| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let counter = removed.clone();
        registry.on_connection_removed(Arc::new(move |_: ConnectionId, info: &ClientInfo| {
            assert_eq!(info.address, "peer");
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let peer = StubPeer::new();
        registry.add_connection(peer.clone(), ClientInfo::new("peer"));
        registry.remove_connection(peer.id);

        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }
}
