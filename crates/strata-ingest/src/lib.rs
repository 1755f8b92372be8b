//! Incremental ingestion of a directory tree into the semantic tier.
//!
//! [`IngestionPipeline`] ties together the [`gitignore`] matcher, the
//! [`scanner`], the per-project [`ledger`]s and a run [`lock`]. It depends
//! only on the store and embedder traits from `strata-core`.

pub mod error;
pub mod gitignore;
pub mod ledger;
pub mod lock;
pub mod pipeline;
pub mod scanner;

pub use error::{FailureKind, IngestError, Result};
pub use gitignore::GitignoreMatcher;
pub use ledger::{ChecksumLedger, FailedIngestion, RetryLedger};
pub use lock::RunLock;
pub use pipeline::{FailedFile, IngestOptions, IngestSummary, IngestionPipeline};
pub use scanner::{FileScanner, ScannedFile};
