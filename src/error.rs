use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Request-level errors surfaced to a single caller.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Upstream fetch failed for {0}")]
    UpstreamFetchFailed(String),

    #[error("Cached object could not be read: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Invalid request path: {0}")]
    InvalidPath(String),
}

/// Why a single upstream retrieval did not produce a servable object.
///
/// These never leave the fetcher task: they are logged and folded into
/// `EntryState::Failed`.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("upstream returned an empty body")]
    EmptyBody,

    #[error("upstream did not complete within {0:?}")]
    Timeout(Duration),

    #[error("could not persist body: {0}")]
    Storage(#[from] std::io::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UpstreamFetchFailed(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("{}", self);
        }

        (status, format!("{}\n", self)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
