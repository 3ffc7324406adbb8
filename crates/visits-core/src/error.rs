//! Error types for `visits-core`.
//!
//! [`Error`] is the taxonomy every lifecycle operation reports. The boundary
//! layer decides status codes and log levels; nothing in here does.

use thiserror::Error;

use crate::event::PublishEventError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("visit reference {0} not found")]
  VisitNotFound(String),

  /// Malformed input, an illegal transition, or a mutation of an expired
  /// visit. `message` is safe to show to users; `detail` is for developers.
  #[error("{message}: {detail}")]
  Validation { message: String, detail: String },

  #[error("access denied: {0}")]
  AccessDenied(String),

  #[error(transparent)]
  PublishEvent(#[from] PublishEventError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn validation(message: impl Into<String>, detail: impl Into<String>) -> Self {
    Self::Validation { message: message.into(), detail: detail.into() }
  }

  /// Wrap a backend error as an unclassified internal failure.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
