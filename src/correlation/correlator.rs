//! End-to-end handling of one bridged HTTP request.
//!
//! # Request State Machine
//! ```text
//! Created → AwaitingHeaders → Streaming → { Completed | Errored | TimedOut } → Closed
//! ```
//! `Closed` is reached when the `RequestContext` drops, which also removes the
//! request's queue from the registry. That covers every exit path, including
//! the handler future being dropped because the HTTP client went away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::correlation::error::{BridgeError, QueueError};
use crate::correlation::queue::RendezvousQueue;
use crate::correlation::registry::ConnectionRegistry;
use crate::message::wire::parse_query;
use crate::message::{CorrelationId, MessageKind, ProxyRequestPayload};
use crate::observability::metrics;

/// Attempts at finding an unused correlation id before giving up.
const ID_ATTEMPTS: usize = 3;

/// An HTTP request as the bridge sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// The reassembled HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl OutboundResponse {
    /// Plain-text error response.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::from([(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )]),
            body: message.into(),
        }
    }

    fn from_error(err: &BridgeError) -> Self {
        match err {
            BridgeError::PeerReportedError { status, body } => Self::error(*status, body.clone()),
            BridgeError::NoActiveConnection => {
                Self::error(err.status_code(), "No channel peer connected")
            }
            BridgeError::Timeout(_) => Self::error(err.status_code(), "Request timed out"),
            other => Self::error(other.status_code(), format!("Bridge error: {}", other)),
        }
    }
}

/// Lifecycle phase of one bridged request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Created,
    AwaitingHeaders,
    Streaming,
    Completed,
    Errored,
    TimedOut,
    Closed,
}

impl RequestPhase {
    fn can_advance_to(self, next: RequestPhase) -> bool {
        use RequestPhase::*;
        matches!(
            (self, next),
            (Created, AwaitingHeaders)
                | (AwaitingHeaders, Streaming)
                | (Created | AwaitingHeaders | Streaming, Errored | TimedOut)
                | (Streaming, Completed)
                | (Created | AwaitingHeaders | Streaming | Completed | Errored | TimedOut, Closed)
        )
    }
}

/// Per-request state. Dropping it closes and removes the request's queue.
struct RequestContext {
    correlation_id: CorrelationId,
    queue: Arc<RendezvousQueue>,
    registry: Arc<ConnectionRegistry>,
    started: Instant,
    phase: RequestPhase,
}

impl RequestContext {
    fn new(
        correlation_id: CorrelationId,
        queue: Arc<RendezvousQueue>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        metrics::inflight_started();
        Self {
            correlation_id,
            queue,
            registry,
            started: Instant::now(),
            phase: RequestPhase::Created,
        }
    }

    fn advance(&mut self, next: RequestPhase) {
        if !self.phase.can_advance_to(next) {
            tracing::warn!(
                request_id = %self.correlation_id,
                from = ?self.phase,
                to = ?next,
                "Ignoring invalid request phase transition"
            );
            return;
        }
        tracing::debug!(
            request_id = %self.correlation_id,
            from = ?self.phase,
            to = ?next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Request phase change"
        );
        self.phase = next;
    }

    fn fail(&mut self, err: &QueueError) {
        match err {
            QueueError::Timeout(_) => self.advance(RequestPhase::TimedOut),
            QueueError::Closed => self.advance(RequestPhase::Errored),
        }
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.registry.remove_queue(&self.correlation_id);
        self.advance(RequestPhase::Closed);
        metrics::inflight_finished();
    }
}

/// How a request that produced headers finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    /// `StreamEnd` arrived.
    Complete,
    /// The stream broke off after headers; the body is partial.
    Truncated,
}

/// Bridges HTTP requests to the channel peer and reassembles their responses.
pub struct RequestCorrelator {
    registry: Arc<ConnectionRegistry>,
    request_timeout: Duration,
}

impl RequestCorrelator {
    /// `request_timeout` bounds each wait for the next event, not the whole request.
    pub fn new(registry: Arc<ConnectionRegistry>, request_timeout: Duration) -> Self {
        Self {
            registry,
            request_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Forward `request` to the peer and wait for its response.
    ///
    /// Always produces a response; failures map to error statuses.
    pub async fn handle(&self, request: InboundRequest) -> OutboundResponse {
        let started = Instant::now();
        let method = request.method.clone();

        tracing::info!(method = %request.method, path = %request.path, "Bridging request");

        let (response, outcome) = match self.bridge(request).await {
            Ok((response, Completion::Complete)) => (response, "completed"),
            Ok((response, Completion::Truncated)) => (response, "truncated"),
            Err(err) => {
                let outcome = match &err {
                    BridgeError::NoActiveConnection => "no_connection",
                    BridgeError::PeerReportedError { .. } => "peer_error",
                    BridgeError::Timeout(_) => "timeout",
                    BridgeError::QueueClosed => "queue_closed",
                    BridgeError::SendFailed(_) => "send_failed",
                    _ => "internal_error",
                };
                if matches!(err, BridgeError::PeerReportedError { .. }) {
                    tracing::info!(error = %err, "Peer answered with an error");
                } else {
                    tracing::warn!(error = %err, "Request failed");
                }
                (OutboundResponse::from_error(&err), outcome)
            }
        };

        metrics::record_request(&method, response.status, outcome, started);
        tracing::info!(
            status = response.status,
            outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request finished"
        );
        response
    }

    async fn bridge(
        &self,
        request: InboundRequest,
    ) -> Result<(OutboundResponse, Completion), BridgeError> {
        // Pin the request to the link that is current right now.
        let link = self
            .registry
            .pick_connection()
            .ok_or(BridgeError::NoActiveConnection)?;

        let mut ctx = self.open_context()?;

        let message = ProxyRequestPayload {
            request_id: ctx.correlation_id.clone(),
            method: request.method,
            path: request.path,
            headers: request.headers,
            query_params: request.query.as_deref().map(parse_query).unwrap_or_default(),
            body: request.body,
        }
        .into_message()
        .map_err(|e| BridgeError::SendFailed(e.to_string()))?;

        if let Err(err) = link.send(&message) {
            ctx.advance(RequestPhase::Errored);
            return Err(err.into());
        }
        // The queue was created before this check. If the link is still tracked
        // here, its removal sweep runs later and will close the queue.
        if !self.registry.is_registered(link.id()) {
            tracing::warn!(
                request_id = %ctx.correlation_id,
                connection_id = %link.id(),
                "Peer disconnected while the request was being sent"
            );
            ctx.advance(RequestPhase::Errored);
            return Err(BridgeError::QueueClosed);
        }
        tracing::debug!(
            request_id = %ctx.correlation_id,
            connection_id = %link.id(),
            "Request forwarded to peer"
        );
        ctx.advance(RequestPhase::AwaitingHeaders);

        let head = match ctx.queue.consume(self.request_timeout).await {
            Ok(head) => head,
            Err(err) => {
                ctx.fail(&err);
                return Err(err.into());
            }
        };

        let mut response = OutboundResponse {
            status: head.status,
            headers: head.headers,
            body: String::new(),
        };

        match head.kind {
            MessageKind::Error => {
                ctx.advance(RequestPhase::Errored);
                return Err(BridgeError::PeerReportedError {
                    status: head.status,
                    body: head.body,
                });
            }
            MessageKind::StreamEnd => {
                // Peer closed without sending anything else: an empty response.
                ctx.advance(RequestPhase::Streaming);
                ctx.advance(RequestPhase::Completed);
                return Ok((response, Completion::Complete));
            }
            MessageKind::Chunk => {
                tracing::warn!(
                    request_id = %ctx.correlation_id,
                    "First event was a chunk; using default status"
                );
                response.body.push_str(&head.body);
            }
            _ => {}
        }

        ctx.advance(RequestPhase::Streaming);
        let completion = self.stream_body(&mut ctx, &mut response.body).await;
        Ok((response, completion))
    }

    /// Append chunks to `body` until `StreamEnd`, an error, or a failed wait.
    async fn stream_body(&self, ctx: &mut RequestContext, body: &mut String) -> Completion {
        loop {
            let message = match ctx.queue.consume(self.request_timeout).await {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!(
                        request_id = %ctx.correlation_id,
                        error = %err,
                        received_bytes = body.len(),
                        "Stream interrupted; returning partial body"
                    );
                    ctx.fail(&err);
                    return Completion::Truncated;
                }
            };

            match message.kind {
                MessageKind::Chunk => body.push_str(&message.body),
                MessageKind::StreamEnd => {
                    ctx.advance(RequestPhase::Completed);
                    return Completion::Complete;
                }
                MessageKind::Error => {
                    tracing::warn!(
                        request_id = %ctx.correlation_id,
                        status = message.status,
                        error = %message.body,
                        "Peer reported error mid-stream; returning partial body"
                    );
                    ctx.advance(RequestPhase::Errored);
                    return Completion::Truncated;
                }
                other => {
                    tracing::warn!(
                        request_id = %ctx.correlation_id,
                        event_type = %other,
                        "Ignoring unexpected event during stream"
                    );
                }
            }
        }
    }

    fn open_context(&self) -> Result<RequestContext, BridgeError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let correlation_id = CorrelationId::generate();
            match self.registry.create_queue(correlation_id.clone()) {
                Ok(queue) => {
                    return Ok(RequestContext::new(
                        correlation_id,
                        queue,
                        self.registry.clone(),
                    ))
                }
                Err(err @ BridgeError::DuplicateCorrelationId(_)) if attempts < ID_ATTEMPTS => {
                    tracing::warn!(error = %err, attempts, "Regenerating correlation id");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
