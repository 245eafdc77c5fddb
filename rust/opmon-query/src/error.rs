use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("query syntax error, got no url, unknown type: {0}")]
    UnknownField(String),

    #[error("backend request failed: {message}")]
    Backend {
        status: Option<u16>,
        message: String,
    },

    #[error("unexpected backend response: {0}")]
    InvalidResponse(String),

    #[error("authentication failed")]
    Auth,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn backend(status: Option<u16>, message: impl Into<String>) -> Self {
        ServiceError::Backend {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::backend(err.status().map(|status| status.as_u16()), err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::UnknownField(_) => StatusCode::BAD_REQUEST,
            ServiceError::Backend { .. } | ServiceError::InvalidResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::Auth => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match self {
            ServiceError::InvalidRequest(_)
            | ServiceError::Auth
            | ServiceError::UnknownField(_) => {}
            ServiceError::Backend { .. } | ServiceError::InvalidResponse(_) => {
                warn!(error = %self, "upstream request failed")
            }
            _ => error!(error = %self, "request failed"),
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
