//! Error types for `rapport-core`.
//!
//! The variants follow the failure classes callers react to differently:
//! bad input is shown and never retried, stale state may be re-fetched and
//! retried once, missing references trigger a refresh of the affected list,
//! and storage failures are left to the caller to retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Bad input shape: empty name, unknown field id, locked rename.
  #[error("validation error: {0}")]
  Validation(String),

  /// Stale state: already-resolved request, duplicate group name, blocked
  /// pair.
  #[error("conflict: {0}")]
  Conflict(String),

  /// A referenced group, connection or request no longer exists.
  #[error("not found: {0}")]
  NotFound(String),

  /// Transient failure reported by the storage collaborator.
  #[error("storage error: {0}")]
  Storage(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Only storage failures are worth retrying; the core never retries them
  /// itself.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Storage(_)) }

  /// Whether the caller should reload the list the failed operation came
  /// from.
  pub fn refresh_hint(&self) -> bool { matches!(self, Self::NotFound(_)) }

  pub fn conflict(msg: impl Into<String>) -> Self { Self::Conflict(msg.into()) }

  pub fn not_found(msg: impl Into<String>) -> Self { Self::NotFound(msg.into()) }

  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
