//! Response conversion.
//!
//! # Responsibilities
//! - Turn a reassembled `OutboundResponse` into an axum response
//! - Copy peer-supplied headers
//!
//! # Design Decisions
//! - Hop-by-hop and framing headers are stripped; the body is already complete
//! - A status the HTTP stack cannot represent becomes 502

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::Response,
};

use crate::correlation::OutboundResponse;

fn is_stripped(name: &HeaderName) -> bool {
    *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
        || *name == header::CONNECTION
}

/// Build the HTTP response sent back to the client.
pub fn into_http_response(outbound: OutboundResponse) -> Response {
    let status = match StatusCode::from_u16(outbound.status) {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(status = outbound.status, "Peer sent an invalid status");
            StatusCode::BAD_GATEWAY
        }
    };

    let mut response = Response::new(Body::from(outbound.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in outbound.headers {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                tracing::warn!(header = %name, "Skipping invalid header name");
                continue;
            }
        };
        if is_stripped(&name) {
            continue;
        }
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.append(name, value);
            }
            Err(_) => tracing::warn!(header = %name, "Skipping invalid header value"),
        }
    }

    response
}
