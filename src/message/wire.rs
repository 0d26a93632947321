//! JSON wire codec for control-channel frames.
//!
//! # Inbound shape
//! ```text
//! { "request_id": string, "event_type"?: string, "status"?: int,
//!   "data"?: string, "message"?: string, "headers"?: {string: string} }
//! ```
//!
//! # Outbound shape
//! ```text
//! { "type": "proxy_request", "request_id": string, "method": string,
//!   "path": string, "headers": {..}, "query_params": {..}, "body": string }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::message::id::CorrelationId;
use crate::message::types::{Message, MessageKind, DEFAULT_ERROR_STATUS, DEFAULT_STATUS};

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame carried no (or an empty) `request_id`.
    #[error("frame is missing request_id")]
    MissingRequestId,

    /// Frame was not valid JSON for the expected shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Only `proxy_request` messages travel to the peer.
    #[error("message kind {0} cannot be sent to the peer")]
    NotOutbound(String),
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    request_id: Option<String>,
    event_type: Option<String>,
    status: Option<u16>,
    data: Option<String>,
    message: Option<String>,
    headers: Option<HashMap<String, String>>,
}

/// Decode one text frame received from the peer.
pub fn decode_inbound(text: &str) -> Result<Message, WireError> {
    let frame: InboundFrame = serde_json::from_str(text)?;

    let request_id = CorrelationId::from(frame.request_id.unwrap_or_default());
    if request_id.is_empty() {
        return Err(WireError::MissingRequestId);
    }

    let kind = MessageKind::from_event_type(frame.event_type.as_deref().unwrap_or_default());
    let default_status = match kind {
        MessageKind::Error => DEFAULT_ERROR_STATUS,
        _ => DEFAULT_STATUS,
    };

    // Error events historically carried their text under `message`.
    let body = frame.data.or(frame.message).unwrap_or_default();

    Ok(Message::new(request_id, kind)
        .with_status(frame.status.unwrap_or(default_status))
        .with_headers(frame.headers.unwrap_or_default())
        .with_body(body))
}

/// Encode a message for transmission to the peer.
pub fn encode_outbound(message: &Message) -> Result<String, WireError> {
    match message.kind {
        MessageKind::ProxyRequest => Ok(message.body.clone()),
        ref other => Err(WireError::NotOutbound(other.to_string())),
    }
}

/// Serialized form of an inbound HTTP request handed to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "proxy_request")]
pub struct ProxyRequestPayload {
    pub request_id: CorrelationId,
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub body: String,
}

impl ProxyRequestPayload {
    /// Wrap the payload into a `ProxyRequest` message.
    pub fn into_message(self) -> Result<Message, WireError> {
        let body = serde_json::to_string(&self)?;
        Ok(Message::new(self.request_id, MessageKind::ProxyRequest).with_body(body))
    }
}

/// Split a raw query string into `key=value` pairs.
///
/// Segments without `=` are skipped; values are passed through undecoded.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chunk() {
        let msg = decode_inbound(r#"{"request_id":"1_a","event_type":"chunk","data":"ab"}"#)
            .unwrap();
        assert_eq!(msg.correlation_id.as_str(), "1_a");
        assert_eq!(msg.kind, MessageKind::Chunk);
        assert_eq!(msg.body, "ab");
        assert_eq!(msg.status, 200);
    }

    #[test]
    fn test_decode_response_headers() {
        let msg = decode_inbound(
            r#"{"request_id":"1_a","event_type":"response_headers","status":201,
                "headers":{"X-Trace":"t1"}}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageKind::ResponseHeaders);
        assert_eq!(msg.status, 201);
        assert_eq!(msg.headers.get("X-Trace").map(String::as_str), Some("t1"));
    }

    #[test]
    fn test_decode_error_message_fallback() {
        let msg = decode_inbound(
            r#"{"request_id":"1_a","event_type":"error","status":404,"message":"not found"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Error);
        assert_eq!(msg.body, "not found");
    }

    #[test]
    fn test_decode_error_without_status_is_server_error() {
        let msg = decode_inbound(r#"{"request_id":"1_a","event_type":"error","data":"boom"}"#)
            .unwrap();
        assert_eq!(msg.kind, MessageKind::Error);
        assert_eq!(msg.status, 500);
        assert_eq!(msg.body, "boom");
    }

    #[test]
    fn test_decode_missing_request_id() {
        let err = decode_inbound(r#"{"event_type":"chunk","data":"x"}"#).unwrap_err();
        assert!(matches!(err, WireError::MissingRequestId));

        let err = decode_inbound(r#"{"request_id":"","event_type":"chunk"}"#).unwrap_err();
        assert!(matches!(err, WireError::MissingRequestId));
    }

    #[test]
    fn test_decode_unknown_and_missing_event_type() {
        let msg = decode_inbound(r#"{"request_id":"1_a","event_type":"ping"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown("ping".into()));

        let msg = decode_inbound(r#"{"request_id":"1_a"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown(String::new()));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_inbound("not json"), Err(WireError::Json(_))));
    }

    #[test]
    fn test_proxy_request_encoding() {
        let payload = ProxyRequestPayload {
            request_id: "1_abc".into(),
            method: "POST".into(),
            path: "/v1/chat".into(),
            headers: HashMap::from([("content-type".into(), "application/json".into())]),
            query_params: parse_query("stream=true&x"),
            body: "{}".into(),
        };
        let message = payload.clone().into_message().unwrap();
        assert_eq!(message.kind, MessageKind::ProxyRequest);

        let text = encode_outbound(&message).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "proxy_request");
        assert_eq!(value["request_id"], "1_abc");
        assert_eq!(value["query_params"]["stream"], "true");
        assert!(value["query_params"].get("x").is_none());

        let decoded: ProxyRequestPayload = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_encode_rejects_inbound_kinds() {
        let chunk = Message::new("1_a".into(), MessageKind::Chunk);
        assert!(matches!(
            encode_outbound(&chunk),
            Err(WireError::NotOutbound(kind)) if kind == "chunk"
        ));
    }
}
