//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Domain(#[from] rapport_core::Error),

  #[error("missing or malformed X-User-Id header")]
  Unauthorized,
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    use rapport_core::Error as E;
    match self {
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::Domain(E::Validation(_)) => StatusCode::BAD_REQUEST,
      ApiError::Domain(E::NotFound(_)) => StatusCode::NOT_FOUND,
      ApiError::Domain(E::Conflict(_)) => StatusCode::CONFLICT,
      ApiError::Domain(E::Storage(_)) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Domain(E::Serialization(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
