use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;

use herd_common::{is_alphanumeric, Node, NodePatch};
use herd_proxy::NodeMutation;

use crate::envelope::{
    bad_body, could_not_be_empty, could_not_be_zero, envelope, not_recognized, record_not_found,
    results, Pretty,
};
use crate::server::AdminState;

fn decode_host(raw: &str, pretty: bool) -> Result<String, Response> {
    if !is_alphanumeric(raw) {
        return Err(not_recognized(
            raw,
            &format!("{raw} parameter is not alpha-numeric"),
            pretty,
        ));
    }
    if raw.is_empty() {
        return Err(could_not_be_empty(raw, pretty));
    }
    Ok(raw.to_string())
}

fn decode_port(raw: &str, pretty: bool) -> Result<u16, Response> {
    match raw.parse::<u16>() {
        Ok(0) => Err(could_not_be_zero("port", pretty)),
        Ok(port) => Ok(port),
        Err(err) => Err(not_recognized("port", &err.to_string(), pretty)),
    }
}

fn validate(record: &Node, pretty: bool) -> Result<(), Response> {
    if record.host.is_empty() {
        return Err(could_not_be_empty("host", pretty));
    }
    if !is_alphanumeric(&record.host) {
        return Err(not_recognized(
            &record.host,
            &format!("{} parameter is not alpha-numeric", record.host),
            pretty,
        ));
    }
    if record.port == 0 {
        return Err(could_not_be_zero("port", pretty));
    }
    Ok(())
}

/// `GET /nodes/:host/:port`
pub async fn get_record(
    State(state): State<AdminState>,
    Path((host, port)): Path<(String, String)>,
    Pretty(pretty): Pretty,
) -> Result<Response, Response> {
    let host = decode_host(&host, pretty)?;
    let port = decode_port(&port, pretty)?;

    match state.inventory.get(&host, port).await {
        Some(record) => Ok(results(StatusCode::OK, json!([record]), 1, pretty)),
        None => Ok(record_not_found(pretty)),
    }
}

/// `GET /nodes/:host`
pub async fn get_all_by_host(
    State(state): State<AdminState>,
    Path(host): Path<String>,
    Pretty(pretty): Pretty,
) -> Result<Response, Response> {
    let host = decode_host(&host, pretty)?;

    let (records, total) = state.inventory.get_all_by_host(&host).await;
    if total == 0 {
        return Ok(record_not_found(pretty));
    }
    Ok(results(StatusCode::OK, json!(records), total, pretty))
}

/// `GET /nodes`
pub async fn get_all(
    State(state): State<AdminState>,
    Pretty(pretty): Pretty,
) -> Response {
    let (records, total) = state.inventory.get_all().await;
    if total == 0 {
        return record_not_found(pretty);
    }
    results(StatusCode::OK, json!(records), total, pretty)
}

/// `PUT /nodes/:host/:port`: upsert with merge semantics: the body is a
/// partial record applied over the existing one. Renaming the identity of
/// an existing record deletes the old identity in the same transaction.
pub async fn put_record(
    State(state): State<AdminState>,
    Path((host, port)): Path<(String, String)>,
    Pretty(pretty): Pretty,
    body: Bytes,
) -> Result<Response, Response> {
    let host = decode_host(&host, pretty)?;
    let port = decode_port(&port, pretty)?;
    let patch: NodePatch =
        serde_json::from_slice(&body).map_err(|err| bad_body(&err.to_string(), pretty))?;

    let mut mutations = Vec::new();
    let (record, status) = match state.inventory.get(&host, port).await {
        Some(current) => {
            let merged = patch.apply(current);
            if merged.host != host || merged.port != port {
                mutations.push(NodeMutation::Delete {
                    host: host.clone(),
                    port,
                });
            }
            (merged, StatusCode::ACCEPTED)
        }
        None => {
            // on creation the path identity wins over the body
            let mut merged = patch.apply(Node::default());
            merged.host = host.clone();
            merged.port = port;
            (merged, StatusCode::CREATED)
        }
    };
    validate(&record, pretty)?;

    mutations.push(NodeMutation::Update(record.clone()));
    state.inventory.submit(mutations).await;

    Ok(results(status, json!([record]), 1, pretty))
}

/// `PUT /nodes`: batch upsert. A single parse failure aborts the whole
/// batch; every entry must carry its identity.
pub async fn put_all(
    State(state): State<AdminState>,
    Pretty(pretty): Pretty,
    body: Bytes,
) -> Result<Response, Response> {
    let patches: Vec<NodePatch> =
        serde_json::from_slice(&body).map_err(|err| bad_body(&err.to_string(), pretty))?;

    let mut mutations = Vec::with_capacity(patches.len());
    let mut updated = Vec::with_capacity(patches.len());
    for patch in &patches {
        let (host, port) = match (&patch.host, patch.port) {
            (Some(host), Some(port)) if !host.is_empty() && port != 0 => (host.clone(), port),
            _ => return Err(could_not_be_empty("host/port", pretty)),
        };
        if !is_alphanumeric(&host) {
            return Err(not_recognized(
                &host,
                &format!("{host} parameter is not alpha-numeric"),
                pretty,
            ));
        }
        let current = state
            .inventory
            .get(&host, port)
            .await
            .unwrap_or(Node {
                host: host.clone(),
                port,
                ..Node::default()
            });
        let merged = patch.apply(current);
        mutations.push(NodeMutation::Update(merged.clone()));
        updated.push(merged);
    }

    state.inventory.submit(mutations).await;
    let total = updated.len();
    Ok(results(StatusCode::ACCEPTED, json!(updated), total, pretty))
}

/// `DELETE /nodes/:host/:port`
pub async fn delete_record(
    State(state): State<AdminState>,
    Path((host, port)): Path<(String, String)>,
    Pretty(pretty): Pretty,
) -> Result<Response, Response> {
    let host = decode_host(&host, pretty)?;
    let port = decode_port(&port, pretty)?;

    if !state.inventory.delete(&host, port).await {
        return Ok(record_not_found(pretty));
    }
    Ok(envelope(StatusCode::OK, json!({"success": true}), pretty))
}

/// `DELETE /nodes/:host`
pub async fn delete_all_by_host(
    State(state): State<AdminState>,
    Path(host): Path<String>,
    Pretty(pretty): Pretty,
) -> Result<Response, Response> {
    let host = decode_host(&host, pretty)?;

    if !state.inventory.delete_all_by_host(&host).await {
        return Ok(record_not_found(pretty));
    }
    Ok(envelope(StatusCode::OK, json!({"success": true}), pretty))
}

/// `DELETE /nodes`
pub async fn delete_all(
    State(state): State<AdminState>,
    Pretty(pretty): Pretty,
) -> Response {
    state.inventory.delete_all().await;
    envelope(StatusCode::OK, json!({"success": true}), pretty)
}
