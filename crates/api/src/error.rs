//! API error types with HTTP response mapping.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ErrorKind};
use projections::ProjectionError;
use serde::Serialize;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unknown credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Request body could not be read as the expected JSON shape.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    kind: &'static str,
}

impl ApiError {
    /// Stable, machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::BadRequest(_) => "validation",
            ApiError::Domain(err) => kind_name(err.kind()),
            ApiError::Projection(_) => kind_name(ErrorKind::Internal),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => kind_status(err.kind()),
            ApiError::Projection(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "not_found",
        ErrorKind::Validation => "validation",
        ErrorKind::EmptyCart => "empty_cart",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Transient => "transient",
        ErrorKind::Internal => "internal",
    }
}

fn kind_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation | ErrorKind::EmptyCart => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            "internal server error".to_string()
        } else {
            if status == StatusCode::SERVICE_UNAVAILABLE {
                tracing::warn!(error = %self, "dependency unavailable");
            }
            self.to_string()
        };

        let body = ErrorBody {
            error: &message,
            kind,
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
