use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use skald_store::StoreError;

use crate::tracker::IngestError;
use crate::validation::ValidationError;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: None,
    }
  }

  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  StoreError(StoreError),
  ValidationError(ValidationError),
  InvalidBody(JsonRejection),
  Unauthorized,
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::StoreError(store_err) => {
        // Log the detailed error server-side, never expose it
        tracing::error!(
          ?store_err,
          unavailable = store_err.is_unavailable(),
          "State store error"
        );

        let error_response = ErrorResponse::new("state store unavailable");
        (StatusCode::SERVICE_UNAVAILABLE, Json(error_response)).into_response()
      }
      AppError::ValidationError(err) => {
        tracing::warn!(validation_error = %err, "Validation failed");
        let error_response = ErrorResponse::new(err.to_string());
        (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
      }
      AppError::InvalidBody(rejection) => {
        tracing::warn!(%rejection, "Rejected request body");
        // oversized bodies keep their 413
        let status = match rejection.status() {
          StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
          _ => StatusCode::BAD_REQUEST,
        };
        let error_response = ErrorResponse::with_details("Invalid request body", rejection.body_text());
        (status, Json(error_response)).into_response()
      }
      AppError::Unauthorized => {
        tracing::warn!("Rejected ingest with a missing or wrong API key");
        let error_response = ErrorResponse::new("Invalid or missing API key");
        (StatusCode::UNAUTHORIZED, Json(error_response)).into_response()
      }
    }
  }
}

impl From<StoreError> for AppError {
  fn from(err: StoreError) -> Self {
    AppError::StoreError(err)
  }
}

impl From<ValidationError> for AppError {
  fn from(err: ValidationError) -> Self {
    AppError::ValidationError(err)
  }
}

impl From<JsonRejection> for AppError {
  fn from(rejection: JsonRejection) -> Self {
    AppError::InvalidBody(rejection)
  }
}

impl From<IngestError> for AppError {
  fn from(err: IngestError) -> Self {
    match err {
      IngestError::InvalidInput(err) => AppError::ValidationError(err),
      IngestError::StoreUnavailable(err) => AppError::StoreError(err),
    }
  }
}
