//! Top-level lifecycle holder.
//!
//! `BridgeSystem` owns the configuration, the registry and the correlator, and
//! runs the two listeners: HTTP for ordinary clients and the control channel
//! for the peer. Both share one `Shutdown` per run.

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::channel::{self, ChannelState};
use crate::config::BridgeConfig;
use crate::correlation::{BridgeError, ConnectionRegistry, RequestCorrelator};
use crate::http::{self, HttpState};
use crate::lifecycle::Shutdown;

/// How long `stop()` waits for the servers before aborting them.
const STOP_DEADLINE: Duration = Duration::from_secs(10);

/// Addresses the listeners actually bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddresses {
    pub http: SocketAddr,
    pub channel: SocketAddr,
}

pub type StartedObserver = Arc<dyn Fn(&BoundAddresses) + Send + Sync>;
pub type ErrorObserver = Arc<dyn Fn(&BridgeError) + Send + Sync>;

type ErrorObservers = Arc<RwLock<Vec<ErrorObserver>>>;

struct RunningServers {
    shutdown: Shutdown,
    addresses: BoundAddresses,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

pub struct BridgeSystem {
    config: BridgeConfig,
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<RequestCorrelator>,
    running: Mutex<Option<RunningServers>>,
    started_observers: RwLock<Vec<StartedObserver>>,
    error_observers: ErrorObservers,
}

impl BridgeSystem {
    pub fn new(config: BridgeConfig) -> Self {
        let timeout = config.timeouts.request_timeout();
        let registry = Arc::new(ConnectionRegistry::new(timeout));
        let correlator = Arc::new(RequestCorrelator::new(registry.clone(), timeout));

        Self {
            config,
            registry,
            correlator,
            running: Mutex::new(None),
            started_observers: RwLock::new(Vec::new()),
            error_observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Bind both listeners and start serving.
    ///
    /// Returns once both sockets are bound, with the addresses they bound to.
    pub async fn start(&self) -> Result<BoundAddresses, BridgeError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(BridgeError::AlreadyRunning);
        }

        match self.spawn_servers().await {
            Ok(servers) => {
                let addresses = servers.addresses;
                *running = Some(servers);
                drop(running);

                tracing::info!(
                    http_address = %addresses.http,
                    channel_address = %addresses.channel,
                    request_timeout_ms = self.config.timeouts.request_ms,
                    "Bridge started"
                );
                for observer in read_observers(&self.started_observers).iter() {
                    observer(&addresses);
                }
                Ok(addresses)
            }
            Err(err) => {
                tracing::error!(error = %err, "Bridge failed to start");
                notify_error(&self.error_observers, &err);
                Err(err)
            }
        }
    }

    async fn spawn_servers(&self) -> Result<RunningServers, BridgeError> {
        let http_listener = bind(self.config.http.bind_address()).await?;
        let channel_listener = bind(self.config.channel.bind_address()).await?;
        let addresses = BoundAddresses {
            http: local_addr(&http_listener, &self.config.http.bind_address())?,
            channel: local_addr(&channel_listener, &self.config.channel.bind_address())?,
        };

        let shutdown = Shutdown::new();

        let http_state = HttpState {
            correlator: self.correlator.clone(),
            max_body_size: self.config.http.max_body_size,
        };
        let http_task = {
            let shutdown = shutdown.clone();
            let observers = self.error_observers.clone();
            tokio::spawn(async move {
                if let Err(source) = http::serve(http_listener, http_state, shutdown).await {
                    report_serve_error(&observers, "http", source);
                }
            })
        };

        let channel_state = ChannelState {
            registry: self.registry.clone(),
            outbound_buffer: self.config.channel.outbound_buffer,
            shutdown: shutdown.clone(),
        };
        let channel_task = {
            let observers = self.error_observers.clone();
            tokio::spawn(async move {
                if let Err(source) = channel::server::serve(channel_listener, channel_state).await {
                    report_serve_error(&observers, "channel", source);
                }
            })
        };

        Ok(RunningServers {
            shutdown,
            addresses,
            tasks: vec![("http", http_task), ("channel", channel_task)],
        })
    }

    /// Stop both listeners and fail every in-flight request.
    ///
    /// A no-op if the bridge is not running.
    pub async fn stop(&self) {
        let Some(servers) = self.running.lock().await.take() else {
            return;
        };

        tracing::info!("Bridge stopping");
        servers.shutdown.trigger();
        let closed = self.registry.close_all_queues();
        if closed > 0 {
            tracing::info!(closed_queues = closed, "Failed in-flight requests for shutdown");
        }

        for (name, mut task) in servers.tasks {
            match tokio::time::timeout(STOP_DEADLINE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(server = name, error = %e, "Server task failed"),
                Err(_) => {
                    tracing::warn!(server = name, "Server did not stop in time; aborting");
                    task.abort();
                }
            }
        }
        tracing::info!("Bridge stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Bound addresses of the current run, if any.
    pub async fn addresses(&self) -> Option<BoundAddresses> {
        self.running.lock().await.as_ref().map(|servers| servers.addresses)
    }

    pub fn on_started(&self, observer: StartedObserver) {
        self.started_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Register an observer for start failures and listener failures.
    pub fn on_error(&self, observer: ErrorObserver) {
        self.error_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }
}

async fn bind(addr: String) -> Result<TcpListener, BridgeError> {
    TcpListener::bind(&addr)
        .await
        .map_err(|source| BridgeError::Bind { addr, source })
}

fn local_addr(listener: &TcpListener, addr: &str) -> Result<SocketAddr, BridgeError> {
    listener.local_addr().map_err(|source| BridgeError::Bind {
        addr: addr.to_string(),
        source,
    })
}

fn read_observers<T: Clone>(observers: &RwLock<Vec<T>>) -> Vec<T> {
    observers.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn notify_error(observers: &ErrorObservers, err: &BridgeError) {
    for observer in read_observers(observers.as_ref()).iter() {
        observer(err);
    }
}

fn report_serve_error(observers: &ErrorObservers, server: &'static str, source: std::io::Error) {
    let err = BridgeError::Serve { server, source };
    tracing::error!(error = %err, "Listener failed");
    notify_error(observers, &err);
}
