use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use herd_common::{HealthCheck, HerdError, Node, QueryMode, Result};
use herd_metrics::MetricsHandle;

use crate::coordinator::{Coordinator, CoordinatorHandle};
use crate::dispatcher::Dispatcher;
use crate::health::HealthChecker;
use crate::inventory::NodeInventory;
use crate::queue::QueueRegistry;
use crate::worker::WorkerContext;
use crate::{CONTROL_CAPACITY, DEFAULT_RESPONSE_TIMEOUT, MAX_SIGNALS};

/// Upper bound for the whole graceful shutdown sequence.
const SHUTDOWN_CAP: Duration = Duration::from_secs(60);

/// The assembled proxy engine: inventory, queue registry, coordinator and
/// dispatcher, plus the front-end HTTP listener and graceful shutdown.
pub struct ProxyServer {
    inventory: Arc<NodeInventory>,
    queues: Arc<QueueRegistry>,
    dispatcher: Arc<Dispatcher>,
    coordinator: CoordinatorHandle,
    quit_tx: mpsc::Sender<()>,
    response_rx: Mutex<mpsc::Receiver<()>>,
    response_timeout: Duration,
}

impl ProxyServer {
    /// Wires the engine with the default response timeout.
    pub fn new(
        query_mode: QueryMode,
        check: &HealthCheck,
        metrics: MetricsHandle,
    ) -> Result<Arc<ProxyServer>> {
        Self::with_response_timeout(query_mode, check, metrics, DEFAULT_RESPONSE_TIMEOUT)
    }

    /// Wires the engine. The response timeout bounds replication answers
    /// and worker liveness probes.
    pub fn with_response_timeout(
        query_mode: QueryMode,
        check: &HealthCheck,
        metrics: MetricsHandle,
        response_timeout: Duration,
    ) -> Result<Arc<ProxyServer>> {
        if query_mode.round_robin {
            info!("nodes will be queried in round-robin mode");
        }
        if query_mode.by_priority {
            info!("nodes will be queried according to priority");
        }

        let health = Arc::new(HealthChecker::new(check)?);
        let client = reqwest::Client::new();
        let worker_ctx = Arc::new(WorkerContext {
            health: health.clone(),
            metrics: metrics.clone(),
            client: client.clone(),
            retry_interval: Duration::from_secs(check.seconds),
        });

        let (job_tx, job_rx) = mpsc::channel(MAX_SIGNALS);
        let (quit_tx, quit_rx) = mpsc::channel(1);
        let (response_tx, response_rx) = mpsc::channel(CONTROL_CAPACITY);

        let handle = CoordinatorHandle::new(job_tx, query_mode);
        let queues = Arc::new(QueueRegistry::new());
        let inventory = Arc::new(NodeInventory::new(
            handle.clone(),
            queues.clone(),
            worker_ctx,
            response_timeout,
        ));
        Coordinator::spawn(job_rx, quit_rx, response_tx, inventory.clone());

        let dispatcher = Arc::new(Dispatcher::new(
            inventory.clone(),
            queues.clone(),
            health,
            metrics,
            client,
            query_mode,
            response_timeout,
        ));

        Ok(Arc::new(ProxyServer {
            inventory,
            queues,
            dispatcher,
            coordinator: handle,
            quit_tx,
            response_rx: Mutex::new(response_rx),
            response_timeout,
        }))
    }

    pub fn inventory(&self) -> Arc<NodeInventory> {
        self.inventory.clone()
    }

    /// Loads the boot node list through the normal mutation path; `false`
    /// when any record is invalid.
    pub async fn load_nodes(&self, nodes: Vec<Node>) -> bool {
        self.inventory.set_all(nodes).await
    }

    /// Binds the front-end listener and serves until the process exits.
    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| HerdError::Transport(format!("failed to bind {addr}: {err}")))?;
        self.serve_on(listener).await
    }

    /// Serves on a caller-provided listener.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        let app = Router::new()
            .fallback(proxy_entry)
            .with_state(self.dispatcher.clone());

        let local_addr = listener
            .local_addr()
            .map_err(|err| HerdError::Transport(err.to_string()))?;
        info!("proxy front-end listening on {}", local_addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|err| HerdError::Transport(err.to_string()))
    }

    /// Graceful shutdown: sweep stale response tokens, flush the
    /// coordinator through a response signal (it answers only once the
    /// jobs queued ahead of it are applied), then quit it, await its final
    /// token and stop every queue worker. Bounded by a one-minute cap
    /// overall.
    pub async fn shutdown(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + SHUTDOWN_CAP;
        let mut response_rx = self.response_rx.lock().await;
        while response_rx.try_recv().is_ok() {}

        self.coordinator.post_response().await;
        match tokio::time::timeout_at(deadline, response_rx.recv()).await {
            Ok(Some(())) => {}
            _ => return Err(HerdError::ShutdownTimeout),
        }

        let _ = self.quit_tx.send(()).await;
        match tokio::time::timeout_at(deadline, response_rx.recv()).await {
            Ok(Some(())) => {
                self.queues.shutdown(self.response_timeout).await;
                Ok(())
            }
            _ => Err(HerdError::ShutdownTimeout),
        }
    }
}

/// Every method and path lands here; replication is decided per request by
/// the dispatcher. Proxy-path failures are a bare 500 towards the client.
async fn proxy_entry(
    State(dispatcher): State<Arc<Dispatcher>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    match dispatcher.round_trip(remote, request).await {
        Ok(response) => response,
        Err(err) => {
            warn!("proxy request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
