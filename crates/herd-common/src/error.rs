use std::time::Duration;

use thiserror::Error;

/// Error taxonomy shared by every herd crate.
///
/// Validation failures surface as HTTP 400 at the admin API, `NotFound` as
/// 404, `Unauthorized` as 401. `NoBackendAvailable` and `AnswerTimeout` are
/// proxy-path failures that become a bare 500 towards the client.
#[derive(Error, Debug)]
pub enum HerdError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("record not found")]
    NotFound,

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("no backend available")]
    NoBackendAvailable,

    #[error("no replica answered within {0:?}")]
    AnswerTimeout(Duration),

    #[error("shutdown timed out")]
    ShutdownTimeout,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for HerdError {
    fn from(err: reqwest::Error) -> Self {
        HerdError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HerdError>;
