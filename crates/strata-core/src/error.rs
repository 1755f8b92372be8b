//! Error types for `strata-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("confidence must be within [0, 1], got {0}")]
  InvalidConfidence(f64),

  #[error(
    "invalid chunk configuration: overlap ({overlap}) must be smaller than \
     chunk_size ({chunk_size}) and chunk_size must be positive"
  )]
  InvalidChunkConfig { chunk_size: usize, overlap: usize },

  #[error("limit must be greater than zero")]
  InvalidLimit,

  #[error("invalid project id: {0:?}")]
  InvalidProjectId(String),

  #[error("invalid scope: {0:?}")]
  InvalidScope(String),

  #[error("unknown episode outcome: {0:?}")]
  UnknownOutcome(String),

  #[error("unknown fact value type: {0:?}")]
  UnknownValueType(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Configuration errors are raised before any work starts and are never
  /// worth retrying.
  pub fn is_configuration(&self) -> bool {
    matches!(
      self,
      Self::InvalidConfidence(_)
        | Self::InvalidChunkConfig { .. }
        | Self::InvalidLimit
        | Self::InvalidProjectId(_)
        | Self::InvalidScope(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
