use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ogp::{FailureKind, FetchError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The target page answered with a non-2xx status; the status is passed
    /// through to our caller.
    #[error("Upstream error: {message}")]
    Upstream { status: u16, message: String },

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("Internal server error")]
    Internal,
}

/// Map the OGP failure taxonomy onto HTTP-facing errors. Network failures
/// become a generic 500 so transport details never reach the client.
impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        match e.kind {
            FailureKind::InvalidUrl => AppError::Validation(e.message),
            FailureKind::Timeout => AppError::GatewayTimeout(e.message),
            FailureKind::UpstreamError { status } => AppError::Upstream {
                status,
                message: e.message,
            },
            FailureKind::NetworkError => {
                tracing::warn!(error = %e.message, "OGP fetch failed at the network layer");
                AppError::Internal
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, String) = match self {
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Upstream { status, message } => {
                let status = StatusCode::from_u16(status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                (status, message)
            }
            AppError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            AppError::Internal => {
                tracing::error!("Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
