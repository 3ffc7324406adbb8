//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure renders as `{status, userMessage, developerMessage}`. The
//! log level follows the kind of failure: caller mistakes are logged at
//! info or below, server-side failures at error.

use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use visits_core::Error as DomainError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Domain(#[from] DomainError),

  /// The request could not be decoded into the expected shape.
  #[error("bad request: {0}")]
  BadRequest(String),
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl ApiError {
  fn parts(&self) -> (StatusCode, Option<String>, String) {
    match self {
      ApiError::Domain(e @ DomainError::VisitNotFound(_)) => {
        tracing::info!("not found: {e}");
        (StatusCode::NOT_FOUND, Some("Visit not found".into()), e.to_string())
      }
      ApiError::Domain(DomainError::Validation { message, detail }) => {
        tracing::info!("validation failure: {message}: {detail}");
        (
          StatusCode::BAD_REQUEST,
          Some(format!("Validation failure: {message}")),
          detail.clone(),
        )
      }
      ApiError::Domain(e @ DomainError::AccessDenied(_)) => {
        tracing::debug!("forbidden: {e}");
        (StatusCode::FORBIDDEN, Some("Access denied".into()), e.to_string())
      }
      ApiError::Domain(e) => {
        tracing::error!(error = ?e, "unexpected error: {e}");
        (StatusCode::INTERNAL_SERVER_ERROR, None, e.to_string())
      }
      ApiError::BadRequest(m) => {
        tracing::info!("validation failure: {m}");
        (StatusCode::BAD_REQUEST, Some(format!("Validation failure: {m}")), m.clone())
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, user_message, developer_message) = self.parts();
    let body = json!({
      "status": status.as_u16(),
      "userMessage": user_message,
      "developerMessage": developer_message,
    });
    (status, Json(body)).into_response()
  }
}
