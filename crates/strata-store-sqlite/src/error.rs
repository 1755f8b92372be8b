//! Error type for `strata-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] strata_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column held a value the domain types cannot represent.
  #[error("corrupt row: {0}")]
  Decode(String),

  #[error("chunk for {found:?} passed to replacement of {expected:?}")]
  ChunkOutsideGroup { expected: String, found: String },

  #[error("project already exists: {0}")]
  ProjectExists(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
