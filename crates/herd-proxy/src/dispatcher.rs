use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use bytes::Bytes;
use http::header::{HeaderName, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tokio::sync::mpsc;
use tracing::warn;

use herd_common::{HerdError, QueryMode, Result};
use herd_metrics::{MethodClass, MetricKind, MetricsHandle};

use crate::health::HealthChecker;
use crate::inventory::NodeInventory;
use crate::queue::{QueueJob, QueueRegistry, WinnerLatch};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Largest request body the proxy will buffer for replay.
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// A request serialised into a replayable form: everything a worker needs
/// to reproduce it against any backend.
#[derive(Debug, Clone)]
pub struct ProxiedRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A backend response captured in full for the client.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl StoredResponse {
    /// Reads the whole backend response. Hop-by-hop headers are dropped
    /// since the captured body is re-framed towards the client.
    pub async fn read(response: reqwest::Response) -> Result<StoredResponse> {
        let status = response.status();
        let mut headers = response.headers().clone();
        headers.remove(TRANSFER_ENCODING);
        headers.remove(CONNECTION);
        let body = response.bytes().await?;
        Ok(StoredResponse {
            status,
            headers,
            body,
        })
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Replays a serialised request against one backend endpoint over plain
/// HTTP and captures the response.
pub(crate) async fn dispatch_request(
    client: &reqwest::Client,
    endpoint: &str,
    request: &ProxiedRequest,
) -> Result<StoredResponse> {
    let url = format!("http://{}{}", endpoint, request.path_and_query);
    let mut headers = request.headers.clone();
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);
    headers.remove(CONNECTION);
    let response = client
        .request(request.method.clone(), url)
        .headers(headers)
        .body(request.body.clone())
        .send()
        .await?;
    StoredResponse::read(response).await
}

/// The front-facing handler: routes reads to one selected node and writes
/// to every active node through the queues.
pub struct Dispatcher {
    inventory: Arc<NodeInventory>,
    queues: Arc<QueueRegistry>,
    health: Arc<HealthChecker>,
    metrics: MetricsHandle,
    client: reqwest::Client,
    policy: QueryMode,
    response_timeout: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        inventory: Arc<NodeInventory>,
        queues: Arc<QueueRegistry>,
        health: Arc<HealthChecker>,
        metrics: MetricsHandle,
        client: reqwest::Client,
        policy: QueryMode,
        response_timeout: Duration,
    ) -> Dispatcher {
        Dispatcher {
            inventory,
            queues,
            health,
            metrics,
            client,
            policy,
            response_timeout,
        }
    }

    /// Normalises the request (forwarded-for header, http scheme is forced
    /// at replay) and routes it by method.
    pub async fn round_trip(&self, remote: SocketAddr, request: Request) -> Result<Response> {
        let (mut parts, body) = request.into_parts();

        if !parts.headers.contains_key(X_FORWARDED_FOR) {
            if let Ok(value) = HeaderValue::from_str(&remote.ip().to_string()) {
                parts.headers.insert(X_FORWARDED_FOR, value);
            }
        }

        let body = axum::body::to_bytes(body, MAX_BODY_SIZE)
            .await
            .map_err(|err| HerdError::Transport(err.to_string()))?;
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let request = ProxiedRequest {
            method: parts.method,
            path_and_query,
            headers: parts.headers,
            body,
        };

        if is_replicated(&request.method) {
            self.process_update(request).await
        } else {
            self.process_read(request).await
        }
    }

    /// Reads: walk the ring when round-robin is on, otherwise try the
    /// snapshot (priority-sorted under that policy). Each candidate is
    /// health-probed before dispatch; transport errors log and move on.
    async fn process_read(&self, request: ProxiedRequest) -> Result<Response> {
        if self.policy.round_robin {
            let ring_len = self.inventory.ring_len().await;
            if ring_len > 0 {
                for _ in 0..ring_len {
                    let Some(node) = self.inventory.current_from_ring().await else {
                        break;
                    };
                    self.inventory.twist_ring().await;
                    if !node.active || node.maintenance {
                        continue;
                    }
                    let endpoint = node.endpoint();
                    if !self.health.check(&endpoint).await {
                        continue;
                    }
                    match dispatch_request(&self.client, &endpoint, &request).await {
                        Ok(response) => return Ok(response.into_response()),
                        Err(err) => warn!("read dispatch to {} failed: {}", endpoint, err),
                    }
                }
                warn!("no node in the ring accepted the request");
                return Err(HerdError::NoBackendAvailable);
            }
        }

        let (nodes, total) = self.inventory.get_all().await;
        if total > 0 {
            for node in nodes {
                if !node.active || node.maintenance {
                    continue;
                }
                let endpoint = node.endpoint();
                if !self.health.check(&endpoint).await {
                    continue;
                }
                match dispatch_request(&self.client, &endpoint, &request).await {
                    Ok(response) => return Ok(response.into_response()),
                    Err(err) => warn!("read dispatch to {} failed: {}", endpoint, err),
                }
            }
        }
        warn!("none of the nodes is active");
        Err(HerdError::NoBackendAvailable)
    }

    /// Writes: serialise once, enqueue a sibling job for every active node
    /// (maintenance nodes accumulate), then wait for the first answer.
    async fn process_update(&self, request: ProxiedRequest) -> Result<Response> {
        let request = Arc::new(request);
        let (nodes, total) = self.inventory.get_all().await;
        if total == 0 {
            return Err(HerdError::NoBackendAvailable);
        }

        let class = MethodClass::classify(request.method.as_str());
        let (answer_tx, mut answer_rx) = mpsc::channel(total);
        let winner = WinnerLatch::new();

        for node in nodes.into_iter().filter(|node| node.active) {
            let endpoint = node.endpoint();
            let (queue, _) = self.queues.check(&endpoint).await;
            let job = QueueJob {
                request: request.clone(),
                answer: answer_tx.clone(),
                winner: winner.clone(),
            };
            if queue.submit(job).await {
                self.metrics.record(&endpoint, MetricKind::Queued, class);
            }
        }
        drop(answer_tx);

        match tokio::time::timeout(self.response_timeout, answer_rx.recv()).await {
            Ok(Some(stored)) => Ok(stored.into_response()),
            _ => Err(HerdError::AnswerTimeout(self.response_timeout)),
        }
    }
}

/// Methods replicated through the queues rather than dispatched once.
fn is_replicated(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::DELETE
}
