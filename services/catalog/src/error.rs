use crate::validation::FieldViolation;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Errors during request validation")]
    Validation(Vec<FieldViolation>),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Origin {0} is not in the allow list!")]
    OriginNotAllowed(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldViolation>,
}

impl ApiError {
    pub fn media_not_found(id: &str) -> Self {
        Self::NotFound(format!("Media with id {id} not found!"))
    }

    pub fn review_not_found(id: &str) -> Self {
        Self::NotFound(format!("Review with id {id} not found!"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::OriginNotAllowed(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::OriginNotAllowed(_) => "ORIGIN_NOT_ALLOWED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();

        let body = match self {
            Self::Validation(errors) => ErrorResponse {
                error: "Errors during request validation".to_string(),
                code,
                errors,
            },
            Self::Internal(e) => {
                error!(error = ?e, "Request failed");
                ErrorResponse {
                    error: "Server side error".to_string(),
                    code,
                    errors: Vec::new(),
                }
            }
            other => ErrorResponse {
                error: other.to_string(),
                code,
                errors: Vec::new(),
            },
        };

        (status, Json(body)).into_response()
    }
}
