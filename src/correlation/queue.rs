//! Per-request rendezvous queue.
//!
//! # Responsibilities
//! - Hand each inbound message to exactly one consumer, in arrival order
//! - Buffer messages that arrive before anyone is waiting
//! - Bound every wait with a timeout
//! - Fail all current and future waits once closed
//!
//! # Invariant
//! At any instant at most one of {buffered messages, waiting consumers} is
//! non-empty. Both sides are mutated under the queue's own mutex, which is
//! never held across an `.await`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::correlation::error::QueueError;
use crate::message::Message;

/// Wait used when a caller passes a zero timeout.
pub const DEFAULT_CONSUME_TIMEOUT: Duration = Duration::from_millis(600_000);

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Message>,
}

#[derive(Default)]
struct QueueState {
    closed: bool,
    buffer: VecDeque<Message>,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
}

/// Mailbox for the events answering one correlation id.
pub struct RendezvousQueue {
    state: Mutex<QueueState>,
    default_timeout: Duration,
}

impl RendezvousQueue {
    /// Create an open queue whose zero-timeout waits last `default_timeout`.
    pub fn new(default_timeout: Duration) -> Self {
        let default_timeout = if default_timeout.is_zero() {
            DEFAULT_CONSUME_TIMEOUT
        } else {
            default_timeout
        };

        Self {
            state: Mutex::new(QueueState::default()),
            default_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `message` to the oldest waiting consumer, or buffer it.
    ///
    /// Never blocks. Returns `QueueError::Closed` (and drops the message) once
    /// the queue is closed.
    pub fn enqueue(&self, message: Message) -> Result<(), QueueError> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }

        let mut message = message;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.tx.send(message) {
                Ok(()) => return Ok(()),
                // Consumer was dropped without deregistering; try the next one.
                Err(returned) => message = returned,
            }
        }

        state.buffer.push_back(message);
        Ok(())
    }

    /// Take the next message, waiting up to `timeout` for one to arrive.
    ///
    /// A zero `timeout` means the queue's default wait, not "don't wait".
    pub async fn consume(&self, timeout: Duration) -> Result<Message, QueueError> {
        let timeout = if timeout.is_zero() {
            self.default_timeout
        } else {
            timeout
        };

        let (waiter_id, mut rx) = {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            if let Some(message) = state.buffer.pop_front() {
                return Ok(message);
            }

            let (tx, rx) = oneshot::channel();
            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.waiters.push_back(Waiter { id, tx });
            (id, rx)
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(QueueError::Closed),
            Err(_) => self.abandon_wait(waiter_id, rx, timeout),
        }
    }

    /// Deregister a timed-out waiter, unless a delivery or close claimed it first.
    fn abandon_wait(
        &self,
        waiter_id: u64,
        mut rx: oneshot::Receiver<Message>,
        timeout: Duration,
    ) -> Result<Message, QueueError> {
        let mut state = self.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.id == waiter_id) {
            state.waiters.remove(pos);
            return Err(QueueError::Timeout(timeout));
        }
        drop(state);

        // Sends happen under the lock, so whatever claimed us has finished.
        rx.try_recv().map_err(|_| QueueError::Closed)
    }

    /// Close the queue, failing every waiter and discarding buffered messages.
    ///
    /// Safe to call more than once.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        // Dropping the senders wakes each waiter with `Closed`.
        state.waiters.clear();
        state.buffer.clear();
    }

    /// Point-in-time view; may be stale by the time the caller acts on it.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of buffered, undelivered messages.
    pub fn pending_messages(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Number of registered consumers still waiting.
    pub fn waiting_consumers(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

impl std::fmt::Debug for RendezvousQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RendezvousQueue")
            .field("closed", &state.closed)
            .field("buffered", &state.buffer.len())
            .field("waiting", &state.waiters.len())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
