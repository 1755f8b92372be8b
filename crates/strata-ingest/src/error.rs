//! Error types for `strata-ingest`.
//!
//! [`IngestError`] aborts a run. [`FailureKind`] classifies per-file problems
//! that are recorded in the summary and retried on the next run.

use std::{fmt, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gitignore::GitignoreError;

#[derive(Debug, Error)]
pub enum IngestError {
  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("an ingestion run for project {0} is already in progress")]
  AlreadyRunning(String),

  #[error("failed to lock {path:?}: {source}")]
  Lock {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("directory scan failed: {0}")]
  Scan(#[from] walkdir::Error),

  #[error("ledger i/o on {path:?}: {source}")]
  Ledger {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("ledger {path:?} is corrupt: {source}")]
  LedgerFormat {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Gitignore(#[from] GitignoreError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<strata_core::Error> for IngestError {
  fn from(e: strata_core::Error) -> Self { Self::Config(e.to_string()) }
}

/// Why a single file could not be ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// The file could not be read.
  Access,
  /// The file is not valid UTF-8.
  Encoding,
  /// The embedder failed or returned an unusable vector.
  Embedding,
  /// A read or embedding call exceeded its deadline.
  Timeout,
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Access => "access",
      Self::Encoding => "encoding",
      Self::Embedding => "embedding",
      Self::Timeout => "timeout",
    })
  }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
