use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

/// `?pretty=true` switches the endpoint to pretty-printed JSON.
#[derive(Debug, Clone, Copy)]
pub struct Pretty(pub bool);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Pretty
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let pretty = parts
            .uri
            .query()
            .map(|query| query.split('&').any(|pair| pair == "pretty=true"))
            .unwrap_or(false);
        Ok(Pretty(pretty))
    }
}

/// Renders `value` as the response body.
pub fn envelope(status: StatusCode, value: Value, pretty: bool) -> Response {
    let body = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_default();
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// The read envelope: `{success, total, results}`.
pub fn results(status: StatusCode, results: Value, total: usize, pretty: bool) -> Response {
    envelope(
        status,
        json!({"success": true, "total": total, "results": results}),
        pretty,
    )
}

/// The error envelope: `{success, error, message, info}`.
pub fn failure(status: StatusCode, message: &str, info: &str, pretty: bool) -> Response {
    envelope(
        status,
        json!({
            "success": false,
            "error": status.as_u16(),
            "message": message,
            "info": info,
        }),
        pretty,
    )
}

pub fn could_not_be_empty(param: &str, pretty: bool) -> Response {
    failure(
        StatusCode::BAD_REQUEST,
        &format!("The parameter '{param}' could not be empty"),
        "Please apply a non-empty value to the data",
        pretty,
    )
}

pub fn could_not_be_zero(param: &str, pretty: bool) -> Response {
    failure(
        StatusCode::BAD_REQUEST,
        &format!("The parameter '{param}' could not be zero value"),
        "Please apply a non-zero value to the data",
        pretty,
    )
}

pub fn not_recognized(param: &str, info: &str, pretty: bool) -> Response {
    failure(
        StatusCode::BAD_REQUEST,
        &format!("Could not recognize {param} parameter"),
        info,
        pretty,
    )
}

pub fn bad_body(info: &str, pretty: bool) -> Response {
    failure(
        StatusCode::BAD_REQUEST,
        "Could not recognize parameters",
        info,
        pretty,
    )
}

pub fn record_not_found(pretty: bool) -> Response {
    failure(
        StatusCode::NOT_FOUND,
        "Record(s) not found",
        "Please add a record(s) before using",
        pretty,
    )
}

pub fn not_authorized(info: &str, pretty: bool) -> Response {
    failure(StatusCode::UNAUTHORIZED, "Not authorized", info, pretty)
}
