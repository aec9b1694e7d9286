use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;

use crate::envelope::{envelope, Pretty};
use crate::server::AdminState;

/// Current service version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Revision date of the service.
pub const DATE: &str = "2025-11-18T09:14:02Z";

/// `GET /info`: host, runtime stats and release data.
pub async fn info(State(state): State<AdminState>, Pretty(pretty): Pretty) -> Response {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let cpus = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1);
    let uptime = state.started_at.elapsed().as_secs();

    envelope(
        StatusCode::OK,
        json!({
            "Herd Proxy Service": {
                "Host": host,
                "Runtime": {
                    "CPU": cpus,
                    "Uptime": format!("{uptime}s"),
                },
                "Release": {
                    "Number": VERSION,
                    "Date": DATE,
                },
            }
        }),
        pretty,
    )
}
