use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use herd_common::auth::Authenticator;
use herd_common::{HerdError, Result};
use herd_metrics::MetricsRegistry;
use herd_proxy::NodeInventory;

use crate::envelope::{failure, Pretty};
use crate::{help, info as info_handler, nodes, session};

/// Shared state of all admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub inventory: Arc<NodeInventory>,
    pub auth: Arc<dyn Authenticator>,
    pub metrics: Arc<MetricsRegistry>,
    pub started_at: Instant,
}

/// The admin HTTP server.
pub struct AdminServer {
    state: AdminState,
}

impl AdminServer {
    pub fn new(
        inventory: Arc<NodeInventory>,
        auth: Arc<dyn Authenticator>,
        metrics: Arc<MetricsRegistry>,
    ) -> AdminServer {
        AdminServer {
            state: AdminState {
                inventory,
                auth,
                metrics,
                started_at: Instant::now(),
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/info",
                get(info_handler::info).options(|| async { preflight("GET, OPTIONS") }),
            )
            .route("/list", get(help::list_all))
            .route("/list/nodes", get(help::list_nodes))
            .route("/list/nodes/get", get(help::list_nodes_get))
            .route("/list/nodes/set", get(help::list_nodes_set))
            .route("/list/nodes/delete", get(help::list_nodes_delete))
            .route(
                "/login",
                post(session::login).options(|| async { preflight("POST, OPTIONS") }),
            )
            .route(
                "/login/:token",
                get(session::session_info).options(|| async { preflight("GET, OPTIONS") }),
            )
            .route(
                "/logout/:token",
                delete(session::logout).options(|| async { preflight("DELETE, OPTIONS") }),
            )
            .route(
                "/nodes",
                get(nodes::get_all)
                    .put(nodes::put_all)
                    .delete(nodes::delete_all)
                    .options(|| async { preflight("GET, PUT, DELETE, OPTIONS") }),
            )
            .route(
                "/nodes/:host",
                get(nodes::get_all_by_host)
                    .delete(nodes::delete_all_by_host)
                    .options(|| async { preflight("GET, DELETE, OPTIONS") }),
            )
            .route(
                "/nodes/:host/:port",
                get(nodes::get_record)
                    .put(nodes::put_record)
                    .delete(nodes::delete_record)
                    .options(|| async { preflight("GET, PUT, DELETE, OPTIONS") }),
            )
            .route("/metrics", get(metrics))
            .fallback(not_found)
            .layer(middleware::from_fn(cors))
            .layer(middleware::from_fn(log_request))
            .with_state(self.state.clone())
    }

    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| HerdError::Transport(format!("failed to bind {addr}: {err}")))?;
        self.serve_on(listener).await
    }

    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|err| HerdError::Transport(err.to_string()))?;
        info!("admin API listening on {}", local_addr);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|err| HerdError::Transport(err.to_string()))
    }
}

/// Preflight answer carrying the path's configured method set.
fn preflight(methods: &'static str) -> Response {
    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(methods),
    );
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    response
}

/// Any request carrying an `Origin` gets it echoed back.
async fn cors(request: Request, next: Next) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let mut response = next.run(request).await;
    if let Some(origin) = origin {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    response
}

async fn log_request(
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    info!("{} {} {}", remote, request.method(), request.uri().path());
    next.run(request).await
}

/// `GET /metrics`: the per-node counters as a text table.
async fn metrics(State(state): State<AdminState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render_table(),
    )
        .into_response()
}

async fn not_found(Pretty(pretty): Pretty) -> Response {
    failure(
        StatusCode::NOT_FOUND,
        "Method not found",
        "Please see list of the methods by using /list",
        pretty,
    )
}
