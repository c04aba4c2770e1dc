//! Error responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use agora_board::BoardError;

/// Failure of a single request.
#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Board(#[from] BoardError),

    /// Event stream requested for a kind that does not exist.
    #[error("{0}")]
    UnknownEventKind(String),

    /// Request body was missing, malformed or of the wrong type.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Board(err) => match err {
                BoardError::NotFound { .. } => StatusCode::NOT_FOUND,
                BoardError::Forbidden { .. } => StatusCode::FORBIDDEN,
                BoardError::AlreadyLiked { .. } | BoardError::NotLiked { .. } => {
                    StatusCode::CONFLICT
                }
                BoardError::DepthLimitExceeded { .. } | BoardError::InvalidInput(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                BoardError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            WebError::UnknownEventKind(_) => StatusCode::NOT_FOUND,
            WebError::InvalidBody(rejection) => rejection.status(),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, %status, "request rejected");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
