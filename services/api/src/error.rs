//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each failure
//! is reported over HTTP.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use station_fit_core::gateway::GatewayError;
use station_fit_core::ports::PortError;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("{0}")]
    Port(#[from] PortError),

    /// A mutation rejected by validation, the role gate or the store.
    #[error("{0}")]
    Gateway(#[from] GatewayError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The request itself is malformed (bad path segment, unknown tier, ...).
    #[error("{0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

fn port_status(e: &PortError) -> StatusCode {
    match e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Invalid(_) => StatusCode::BAD_REQUEST,
        PortError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortError::MissingIndex(_) | PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Port(e) => port_status(e),
            ApiError::Gateway(GatewayError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Gateway(GatewayError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::Gateway(GatewayError::Port(e)) => port_status(e),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            "An unexpected internal error occurred".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
