//! End-to-end proxy scenarios against mock backends.
//!
//! Each test spins up real axum backends on ephemeral ports, assembles the
//! engine around them and drives it through the front-end listener with
//! reqwest.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use herd_common::{HealthCheck, Node, QueryMode};
use herd_metrics::MetricsRegistry;
use herd_proxy::ProxyServer;

/// A mock backend that records every request it receives and answers with
/// its own name.
struct MockBackend {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl MockBackend {
    async fn start(name: &'static str) -> MockBackend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::start_on(name, listener).await
    }

    async fn start_on(name: &'static str, listener: TcpListener) -> MockBackend {
        let requests: Arc<Mutex<Vec<(String, String, String)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        let app = Router::new().fallback(move |request: Request| {
            let recorded = recorded.clone();
            async move {
                let method = request.method().to_string();
                let path = request.uri().path().to_string();
                let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
                    .await
                    .unwrap_or_default();
                recorded.lock().await.push((
                    method,
                    path,
                    String::from_utf8_lossy(&body).into_owned(),
                ));
                (StatusCode::OK, format!("hello from {name}"))
            }
        });

        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        MockBackend { addr, requests }
    }

    fn node(&self, priority: i32, active: bool, maintenance: bool) -> Node {
        Node {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            priority,
            active,
            maintenance,
        }
    }

    /// Requests excluding health probes (GET /).
    async fn mutations(&self) -> Vec<(String, String, String)> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|(method, _, _)| method != "GET")
            .cloned()
            .collect()
    }
}

async fn start_proxy(
    query_mode: QueryMode,
    nodes: Vec<Node>,
    check_seconds: u64,
    response_timeout: Duration,
) -> (Arc<ProxyServer>, SocketAddr) {
    let (_registry, metrics) = MetricsRegistry::start();
    let check = HealthCheck {
        seconds: check_seconds,
        url: "/".to_string(),
        pattern: String::new(),
    };
    let server =
        ProxyServer::with_response_timeout(query_mode, &check, metrics, response_timeout).unwrap();

    let expected = nodes.len();
    assert!(server.load_nodes(nodes).await);
    wait_for_nodes(&server, expected).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let front = server.clone();
    tokio::spawn(async move {
        front.serve_on(listener).await.unwrap();
    });
    (server, addr)
}

async fn wait_for_nodes(server: &ProxyServer, expected: usize) {
    for _ in 0..200 {
        let (_, total) = server.inventory().get_all().await;
        if total == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("inventory never reached {expected} nodes");
}

async fn wait_for_ring(server: &ProxyServer, expected: usize) {
    for _ in 0..200 {
        if server.inventory().ring_len().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("ring never reached {expected} entries");
}

async fn wait_until<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_round_robin_reads_rotate_over_the_ring() {
    let a = MockBackend::start("a").await;
    let b = MockBackend::start("b").await;
    let c = MockBackend::start("c").await;

    let policy = QueryMode {
        round_robin: true,
        by_priority: true,
    };
    let nodes = vec![
        a.node(1, true, false),
        b.node(2, true, false),
        c.node(3, true, false),
    ];
    let (server, addr) = start_proxy(policy, nodes, 1, Duration::from_secs(2)).await;
    wait_for_ring(&server, 3).await;

    let client = reqwest::Client::new();
    let mut bodies = Vec::new();
    for _ in 0..4 {
        let response = client
            .get(format!("http://{addr}/whoami"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(response.text().await.unwrap());
    }
    assert_eq!(
        bodies,
        vec![
            "hello from a",
            "hello from b",
            "hello from c",
            "hello from a",
        ]
    );
}

#[tokio::test]
async fn test_priority_reads_without_round_robin() {
    let a = MockBackend::start("a").await;
    let b = MockBackend::start("b").await;

    let policy = QueryMode {
        round_robin: false,
        by_priority: true,
    };
    // b has the better priority, every read goes there
    let nodes = vec![a.node(2, true, false), b.node(1, true, false)];
    let (_server, addr) = start_proxy(policy, nodes, 1, Duration::from_secs(2)).await;

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let body = client
            .get(format!("http://{addr}/whoami"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "hello from b");
    }
}

#[tokio::test]
async fn test_reads_skip_maintenance_nodes() {
    let a = MockBackend::start("a").await;
    let b = MockBackend::start("b").await;

    let nodes = vec![a.node(0, true, true), b.node(0, true, false)];
    let (_server, addr) =
        start_proxy(QueryMode::default(), nodes, 1, Duration::from_secs(2)).await;

    let client = reqwest::Client::new();
    let body = client
        .get(format!("http://{addr}/whoami"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "hello from b");
}

#[tokio::test]
async fn test_read_with_empty_inventory_is_a_bare_500() {
    let (_server, addr) =
        start_proxy(QueryMode::default(), vec![], 1, Duration::from_millis(300)).await;
    let response = reqwest::get(format!("http://{addr}/anything")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_write_fans_out_to_every_active_node() {
    let a = MockBackend::start("a").await;
    let b = MockBackend::start("b").await;

    let nodes = vec![a.node(0, true, false), b.node(0, true, false)];
    let (_server, addr) =
        start_proxy(QueryMode::default(), nodes, 1, Duration::from_secs(3)).await;

    let client = reqwest::Client::new();
    let response = client
        .put(format!("http://{addr}/x"))
        .body(r#"{"k":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body == "hello from a" || body == "hello from b");

    wait_until("both backends to receive the PUT", || async {
        !a.mutations().await.is_empty() && !b.mutations().await.is_empty()
    })
    .await;

    for backend in [&a, &b] {
        let mutations = backend.mutations().await;
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].0, "PUT");
        assert_eq!(mutations[0].1, "/x");
        assert_eq!(mutations[0].2, r#"{"k":1}"#);
    }
}

#[tokio::test]
async fn test_x_forwarded_for_reaches_the_backend() {
    // a backend that echoes the forwarded-for header back as its body
    let app = Router::new().fallback(|request: Request| async move {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        (StatusCode::OK, forwarded)
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let node = Node {
        host: backend_addr.ip().to_string(),
        port: backend_addr.port(),
        priority: 0,
        active: true,
        maintenance: false,
    };
    let (_server, addr) =
        start_proxy(QueryMode::default(), vec![node], 1, Duration::from_secs(2)).await;

    let body = reqwest::Client::new()
        .get(format!("http://{addr}/who"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "127.0.0.1");
}

#[tokio::test]
async fn test_maintenance_accumulates_then_drains_in_order() {
    let a = MockBackend::start("a").await;

    let nodes = vec![a.node(0, true, true)];
    let (server, addr) =
        start_proxy(QueryMode::default(), nodes, 1, Duration::from_millis(200)).await;

    let client = reqwest::Client::new();
    for path in ["/one", "/two", "/three"] {
        let response = client
            .delete(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap();
        // no worker runs, the client times out with a bare 500
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert!(a.mutations().await.is_empty());

    // leaving maintenance restarts the worker and drains the queue
    assert!(server.inventory().set(a.node(0, true, false)).await);
    wait_until("the queue to drain", || async {
        a.mutations().await.len() == 3
    })
    .await;

    let paths: Vec<String> = a
        .mutations()
        .await
        .iter()
        .map(|(_, path, _)| path.clone())
        .collect();
    assert_eq!(paths, vec!["/one", "/two", "/three"]);
}

#[tokio::test]
async fn test_dead_node_times_out_then_recovers() {
    // reserve a port, then leave it dead
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = reserved.local_addr().unwrap();
    drop(reserved);

    let node = Node {
        host: dead_addr.ip().to_string(),
        port: dead_addr.port(),
        priority: 0,
        active: true,
        maintenance: false,
    };
    let (_server, addr) =
        start_proxy(QueryMode::default(), vec![node], 1, Duration::from_millis(300)).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/x"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // the backend comes up on the reserved port and the queued job lands
    let listener = TcpListener::bind(dead_addr).await.unwrap();
    let backend = MockBackend::start_on("late", listener).await;
    wait_until("the queued job to be delivered", || async {
        backend.mutations().await.len() == 1
    })
    .await;
    assert_eq!(backend.mutations().await[0].1, "/x");
}

#[tokio::test]
async fn test_shutdown_is_bounded_and_stops_workers() {
    // one dead node keeps a worker in its health retry loop
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = reserved.local_addr().unwrap();
    drop(reserved);

    let node = Node {
        host: dead_addr.ip().to_string(),
        port: dead_addr.port(),
        priority: 0,
        active: true,
        maintenance: false,
    };
    let (server, _addr) =
        start_proxy(QueryMode::default(), vec![node], 1, Duration::from_millis(300)).await;

    let started = std::time::Instant::now();
    server.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test]
async fn test_write_metrics_move_from_queued_to_success() {
    let a = MockBackend::start("a").await;

    let (registry, metrics) = MetricsRegistry::start();
    let check = HealthCheck {
        seconds: 1,
        url: "/".to_string(),
        pattern: String::new(),
    };
    let server = ProxyServer::with_response_timeout(
        QueryMode::default(),
        &check,
        metrics,
        Duration::from_secs(3),
    )
    .unwrap();
    assert!(server.load_nodes(vec![a.node(0, true, false)]).await);
    wait_for_nodes(&server, 1).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let front = server.clone();
    tokio::spawn(async move {
        front.serve_on(listener).await.unwrap();
    });

    let client = reqwest::Client::new();
    let response = client
        .put(format!("http://{addr}/x"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let endpoint = a.node(0, true, false).endpoint();
    wait_until("metrics to settle", || async {
        registry
            .snapshot()
            .get(&endpoint)
            .map(|m| m.success.set == 1 && m.queued.set == 0)
            .unwrap_or(false)
    })
    .await;
}
