//! WebSocket server for the control channel.
//!
//! # Responsibilities
//! - Accept WebSocket upgrades on any path
//! - Register each connection with the registry exactly once, and remove it
//!   exactly once when the socket ends
//! - Drain the connection's outbound buffer into the socket
//! - Decode every inbound text frame and route it before anything else

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::channel::connection::{ClientInfo, ConnectionId};
use crate::channel::peer::WsPeer;
use crate::correlation::ConnectionRegistry;
use crate::lifecycle::Shutdown;
use crate::message::wire::{decode_inbound, WireError};
use crate::observability::metrics;

/// State shared by every channel connection handler.
#[derive(Clone)]
pub struct ChannelState {
    pub registry: Arc<ConnectionRegistry>,
    /// Capacity of each connection's outbound frame buffer.
    pub outbound_buffer: usize,
    pub shutdown: Shutdown,
}

/// Build the channel router.
pub fn router(state: ChannelState) -> Router {
    Router::new()
        .route("/", get(upgrade_handler))
        .route("/{*path}", get(upgrade_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the control channel on `listener` until shutdown is triggered.
pub async fn serve(listener: TcpListener, state: ChannelState) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Control channel listening");

    let shutdown = state.shutdown.clone();
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.notified())
        .await?;

    tracing::info!("Control channel stopped");
    Ok(())
}

async fn upgrade_handler(
    State(state): State<ChannelState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::debug!(address = %addr, "Channel peer upgrading");
    ws.on_upgrade(move |socket| serve_peer(socket, addr, state))
}

/// Run one peer connection to completion.
async fn serve_peer(socket: WebSocket, addr: SocketAddr, state: ChannelState) {
    let id = ConnectionId::new();
    let (mut sink, mut stream) = socket.split();
    let (frames_tx, mut frames_rx) = mpsc::channel::<String>(state.outbound_buffer);

    // Subscribe before registering so a concurrent stop() is never missed.
    let shutdown = state.shutdown.notified();
    tokio::pin!(shutdown);
    state
        .registry
        .add_connection(Arc::new(WsPeer::new(id, frames_tx)), ClientInfo::from_addr(addr));

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames_rx.recv().await {
            if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                tracing::debug!(connection_id = %id, error = %e, "Channel write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = &mut shutdown => {
                tracing::info!(connection_id = %id, "Closing channel peer for shutdown");
                break;
            }
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => handle_frame(&state.registry, id, text.as_str()),
            Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => handle_frame(&state.registry, id, text),
                Err(_) => {
                    tracing::warn!(connection_id = %id, "Dropping non-UTF-8 binary frame");
                    metrics::record_inbound("malformed");
                }
            },
            Some(Ok(WsMessage::Close(_))) | None => break,
            // Ping/pong are answered by the WebSocket layer.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(connection_id = %id, error = %e, "Channel read failed");
                break;
            }
        }
    }

    // Drop the outbound receiver before the sweep so any later send to this
    // link fails instead of landing in a queue nobody will close.
    writer.abort();
    let _ = writer.await;
    state.registry.remove_connection(id);
}

/// Decode one inbound frame and route it.
pub(crate) fn handle_frame(registry: &ConnectionRegistry, id: ConnectionId, text: &str) {
    match decode_inbound(text) {
        Ok(message) => {
            registry.route_inbound(message);
        }
        Err(WireError::MissingRequestId) => {
            tracing::warn!(connection_id = %id, "Dropping frame without request_id");
            metrics::record_inbound("missing_request_id");
        }
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "Dropping malformed frame");
            metrics::record_inbound("malformed");
        }
    }
}
