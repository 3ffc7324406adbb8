//! Error type for `visits-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column held a value this build does not know.
  #[error("unknown {column} value: {value:?}")]
  UnknownValue { column: &'static str, value: String },

  /// `save` was called for a visit id that is not in the store.
  #[error("visit {0} not found")]
  VisitNotFound(i64),

  /// `save` was given a copy of the visit that has since been modified.
  #[error("visit {0} was modified concurrently")]
  Conflict(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
