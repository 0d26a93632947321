//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router that accepts any method on any path
//! - Wire up middleware (tracing, body limit)
//! - Hand every request to the correlator and convert what comes back

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::correlation::RequestCorrelator;
use crate::http::request::into_inbound;
use crate::http::response::into_http_response;
use crate::lifecycle::Shutdown;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct HttpState {
    pub correlator: Arc<RequestCorrelator>,
    /// Maximum accepted request body, in bytes.
    pub max_body_size: usize,
}

/// Build the Axum router with all middleware layers.
pub fn router(state: HttpState) -> Router {
    let limit = state.max_body_size;
    Router::new()
        .route("/", any(bridge_handler))
        .route("/{*path}", any(bridge_handler))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(limit))
        .layer(TraceLayer::new_for_http())
}

/// Serve HTTP on `listener` until `shutdown` is triggered.
pub async fn serve(listener: TcpListener, state: HttpState, shutdown: Shutdown) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.notified())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn bridge_handler(State(state): State<HttpState>, request: Request<Body>) -> Response {
    let inbound = match into_inbound(request, state.max_body_size).await {
        Ok(inbound) => inbound,
        Err(rejection) => return rejection,
    };
    into_http_response(state.correlator.handle(inbound).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ClientInfo, ConnectionId, PeerLink, SendError};
    use crate::correlation::ConnectionRegistry;
    use crate::message::{Message, MessageKind, ProxyRequestPayload};
    use axum::http::StatusCode;
    use std::collections::HashMap;
    use std::sync::Weak;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Answers every request in-line by echoing the method, path and body.
    #[derive(Debug)]
    struct EchoPeer {
        id: ConnectionId,
        registry: Weak<ConnectionRegistry>,
    }

    impl PeerLink for EchoPeer {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn send(&self, message: &Message) -> Result<(), SendError> {
            let payload: ProxyRequestPayload = serde_json::from_str(&message.body)
                .map_err(|e| SendError::Encode(e.into()))?;
            let registry = self.registry.upgrade().ok_or(SendError::Disconnected)?;
            let id = payload.request_id.clone();

            if payload.path == "/missing" {
                registry.route_inbound(
                    Message::new(id, MessageKind::Error).with_status(404).with_body("not here"),
                );
                return Ok(());
            }

            let echo_query = payload.query_params.get("q").cloned().unwrap_or_default();
            registry.route_inbound(
                Message::new(id.clone(), MessageKind::ResponseHeaders)
                    .with_headers(HashMap::from([("x-echo-query".to_string(), echo_query)])),
            );
            registry.route_inbound(
                Message::new(id.clone(), MessageKind::Chunk)
                    .with_body(format!("{} {} ", payload.method, payload.path)),
            );
            registry.route_inbound(Message::new(id.clone(), MessageKind::Chunk).with_body(payload.body));
            registry.route_inbound(Message::stream_end(id));
            Ok(())
        }

        fn is_alive(&self) -> bool {
            self.registry.strong_count() > 0
        }
    }

    fn app(with_peer: bool, max_body_size: usize) -> (Router, Arc<ConnectionRegistry>) {
        let timeout = Duration::from_secs(2);
        let registry = Arc::new(ConnectionRegistry::new(timeout));
        if with_peer {
            registry.add_connection(
                Arc::new(EchoPeer {
                    id: ConnectionId::new(),
                    registry: Arc::downgrade(&registry),
                }),
                ClientInfo::new("echo"),
            );
        }
        let state = HttpState {
            correlator: Arc::new(RequestCorrelator::new(registry.clone(), timeout)),
            max_body_size,
        };
        (router(state), registry)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_no_peer_is_service_unavailable() {
        let (app, _registry) = app(false, 1024);
        let response = app
            .oneshot(Request::builder().uri("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["content-type"], "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_request_bridged_through_peer() {
        let (app, registry) = app(true, 1024);
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/items/7?q=find")
                    .body(Body::from("data"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-echo-query"], "find");
        assert_eq!(body_text(response).await, "PUT /items/7 data");
        assert_eq!(registry.queue_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_error_status_passed_through() {
        let (app, _registry) = app(true, 1024);
        let response = app
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "not here");
    }

    #[tokio::test]
    async fn test_body_limit_enforced() {
        let (app, registry) = app(true, 8);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .body(Body::from("far more than eight bytes"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(registry.queue_count(), 0);
    }
}
