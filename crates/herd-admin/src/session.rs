use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use serde_json::json;

use herd_common::is_alphanumeric;

use crate::envelope::{envelope, not_authorized, not_recognized, Pretty};
use crate::server::AdminState;

fn decode_token(raw: &str, pretty: bool) -> Result<String, Response> {
    if !is_alphanumeric(raw) {
        return Err(not_recognized(
            raw,
            &format!("{raw} parameter is not alpha-numeric"),
            pretty,
        ));
    }
    Ok(raw.to_string())
}

/// `POST /login`: credentials as a JSON object or an urlencoded form,
/// selected by the request content type.
pub async fn login(
    State(state): State<AdminState>,
    Pretty(pretty): Pretty,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let params: HashMap<String, String> = if content_type.starts_with("application/json") {
        serde_json::from_slice(&body).unwrap_or_default()
    } else {
        serde_urlencoded::from_bytes(&body).unwrap_or_default()
    };

    let username = params.get("username").map(String::as_str).unwrap_or("");
    let password = params.get("password").map(String::as_str).unwrap_or("");
    if username.is_empty() || password.is_empty() {
        return not_authorized("Username/Password is required", pretty);
    }

    match state.auth.login(username, password) {
        Ok(token) => envelope(
            StatusCode::OK,
            json!({"success": true, "token": token}),
            pretty,
        ),
        Err(err) => not_authorized(&err.to_string(), pretty),
    }
}

/// `GET /login/:token`: the profile behind a session token.
pub async fn session_info(
    State(state): State<AdminState>,
    Path(token): Path<String>,
    Pretty(pretty): Pretty,
) -> Result<Response, Response> {
    let token = decode_token(&token, pretty)?;

    match state.auth.info(&token) {
        Some(profile) => Ok(envelope(
            StatusCode::OK,
            json!({"success": true, "info": profile}),
            pretty,
        )),
        None => Ok(not_authorized("Token is not valid", pretty)),
    }
}

/// `DELETE /logout/:token`
pub async fn logout(
    State(state): State<AdminState>,
    Path(token): Path<String>,
    Pretty(pretty): Pretty,
) -> Result<Response, Response> {
    let token = decode_token(&token, pretty)?;

    match state.auth.logout(&token) {
        Ok(()) => Ok(envelope(StatusCode::OK, json!({"success": true}), pretty)),
        Err(err) => Ok(not_authorized(&err.to_string(), pretty)),
    }
}
