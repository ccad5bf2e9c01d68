use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error as ThisError;

use crate::db::{QueryError, StartupConnectivityError};

#[derive(Debug, ThisError)]
pub enum EntregasError {
    #[error("Database error: {0}")]
    Query(#[from] QueryError),

    #[error("Startup error: {0}")]
    Startup(#[from] StartupConnectivityError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Message is shown to the caller as-is.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Message is shown to the caller as-is.
    #[error("{0}")]
    NotFound(&'static str),

    #[error("Missing or invalid API key")]
    Unauthorized,

    #[error("Insert did not report a generated id")]
    MissingInsertId,

    #[error("Unexpected row shape: {0}")]
    RowShape(String),
}

impl From<figment::Error> for EntregasError {
    fn from(e: figment::Error) -> Self {
        EntregasError::Config(Box::new(e))
    }
}

impl IntoResponse for EntregasError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match &self {
            EntregasError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone())
            }
            EntregasError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.to_string()),
            EntregasError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Acceso denegado. API key inválida o no proporcionada.".to_string(),
            ),
            EntregasError::Query(_)
            | EntregasError::Startup(_)
            | EntregasError::Config(_)
            | EntregasError::Io(_)
            | EntregasError::MissingInsertId
            | EntregasError::RowShape(_) => {
                // Engine details stay in the logs.
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Error interno del servidor".to_string(),
                )
            }
        };

        (status, Json(ApiErrorResponse::new(code, message))).into_response()
    }
}

/// Standardized API error response body: `{ success: false, code, message }`.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
}

impl ApiErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.to_string(),
            message: message.into(),
        }
    }
}
