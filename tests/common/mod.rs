//! Shared utilities for integration tests.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use channel_bridge::message::ProxyRequestPayload;
use channel_bridge::{BoundAddresses, BridgeConfig, BridgeSystem};

/// Turns one forwarded request into the frames the peer answers with.
pub type Script = Arc<dyn Fn(&ProxyRequestPayload) -> Vec<Value> + Send + Sync>;

/// Start a bridge on ephemeral loopback ports.
pub async fn start_bridge(request_timeout_ms: u64) -> (Arc<BridgeSystem>, BoundAddresses) {
    let mut config = BridgeConfig::default();
    config.http.host = "127.0.0.1".into();
    config.http.port = 0;
    config.channel.host = "127.0.0.1".into();
    config.channel.port = 0;
    config.timeouts.request_ms = request_timeout_ms;

    let system = Arc::new(BridgeSystem::new(config));
    let addresses = system.start().await.expect("bridge failed to start");
    (system, addresses)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll until the registry reports `expected` live connections.
pub async fn wait_for_connections(system: &BridgeSystem, expected: usize) {
    for _ in 0..200 {
        if system.registry().connection_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} connections, found {}",
        system.registry().connection_count()
    );
}

/// A scripted channel peer running in the background.
pub struct ScriptedPeer {
    pub requests: tokio::sync::mpsc::UnboundedReceiver<ProxyRequestPayload>,
    task: JoinHandle<()>,
}

impl ScriptedPeer {
    /// Drop the WebSocket without a close handshake.
    pub fn disconnect(self) {
        self.task.abort();
    }
}

/// Connect a peer that answers every request according to `script`.
pub async fn connect_peer(system: &BridgeSystem, channel: SocketAddr, script: Script) -> ScriptedPeer {
    let before = system.registry().connection_count();
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{channel}/"))
        .await
        .expect("channel connect failed");
    let (mut sink, mut stream) = ws.split();
    let (requests_tx, requests) = tokio::sync::mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            let WsMessage::Text(text) = frame else {
                continue;
            };
            let payload: ProxyRequestPayload = match serde_json::from_str(text.as_str()) {
                Ok(payload) => payload,
                Err(_) => continue,
            };
            for reply in script(&payload) {
                if sink.send(WsMessage::text(reply.to_string())).await.is_err() {
                    return;
                }
            }
            let _ = requests_tx.send(payload);
        }
    });

    wait_for_connections(system, before + 1).await;
    ScriptedPeer { requests, task }
}

pub fn script<F>(f: F) -> Script
where
    F: Fn(&ProxyRequestPayload) -> Vec<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A peer that never answers.
pub fn silent() -> Script {
    script(|_| Vec::new())
}
