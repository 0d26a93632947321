//! Request extraction.
//!
//! # Responsibilities
//! - Read the method, path, query and headers of the incoming request
//! - Buffer the body up to the configured limit
//!
//! # Design Decisions
//! - Repeated headers are joined with ", " into one value
//! - Bodies are decoded lossily; the peer protocol carries text

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;

use crate::correlation::InboundRequest;

/// Convert an axum request into the bridge's request model.
///
/// Fails with a ready-made 413 response if the body cannot be read within
/// `limit` bytes.
pub async fn into_inbound(request: Request<Body>, limit: usize) -> Result<InboundRequest, Response> {
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Rejecting request body");
            return Err((StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response());
        }
    };

    Ok(InboundRequest {
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: flatten_headers(&parts.headers),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}
