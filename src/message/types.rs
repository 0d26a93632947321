//! Core message value types.

use std::collections::HashMap;

use crate::message::id::CorrelationId;

/// Kind of a bridge message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Translated HTTP request sent to the peer (outbound only).
    ProxyRequest,
    /// Status and headers of the peer's response.
    ResponseHeaders,
    /// One fragment of the response body.
    Chunk,
    /// Peer-reported failure.
    Error,
    /// Peer finished streaming (inbound only).
    StreamClose,
    /// End-of-stream sentinel produced by the registry from `StreamClose`.
    StreamEnd,
    /// Any `event_type` the bridge does not understand.
    Unknown(String),
}

impl MessageKind {
    /// Parse a wire `event_type` value.
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            "response_headers" => MessageKind::ResponseHeaders,
            "chunk" => MessageKind::Chunk,
            "error" => MessageKind::Error,
            "stream_close" => MessageKind::StreamClose,
            "proxy_request" => MessageKind::ProxyRequest,
            other => MessageKind::Unknown(other.to_string()),
        }
    }

    /// Name used on the wire and in logs.
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::ProxyRequest => "proxy_request",
            MessageKind::ResponseHeaders => "response_headers",
            MessageKind::Chunk => "chunk",
            MessageKind::Error => "error",
            MessageKind::StreamClose => "stream_close",
            MessageKind::StreamEnd => "stream_end",
            MessageKind::Unknown(name) => name,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default status carried by messages that do not specify one.
pub const DEFAULT_STATUS: u16 = 200;

/// Status of an `error` event that carries none.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// A value exchanged over the control channel, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub correlation_id: CorrelationId,
    pub kind: MessageKind,
    /// Meaningful only for `ResponseHeaders` and `Error`.
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Message {
    /// Create an empty message of the given kind.
    pub fn new(correlation_id: CorrelationId, kind: MessageKind) -> Self {
        Self {
            correlation_id,
            kind,
            status: DEFAULT_STATUS,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// The synthetic end-of-stream marker for `correlation_id`.
    pub fn stream_end(correlation_id: CorrelationId) -> Self {
        Self::new(correlation_id, MessageKind::StreamEnd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_parsing() {
        assert_eq!(MessageKind::from_event_type("chunk"), MessageKind::Chunk);
        assert_eq!(
            MessageKind::from_event_type("stream_close"),
            MessageKind::StreamClose
        );
        assert_eq!(
            MessageKind::from_event_type("heartbeat"),
            MessageKind::Unknown("heartbeat".into())
        );
    }

    #[test]
    fn test_stream_end_has_empty_body() {
        let msg = Message::stream_end("1_abc".into());
        assert_eq!(msg.kind, MessageKind::StreamEnd);
        assert!(msg.body.is_empty());
        assert_eq!(msg.status, DEFAULT_STATUS);
    }
}
