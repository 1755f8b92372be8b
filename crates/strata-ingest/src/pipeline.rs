//! [`IngestionPipeline`]: incremental sync of a directory tree into the
//! semantic store.
//!
//! A run scans the tree, adds every file left over in the retry ledger, and
//! processes each candidate independently: hash, compare against the
//! checksum ledger, chunk, embed, then swap the file's chunk group in one
//! store call. Files recorded under the root that the scan no longer yields
//! are dropped from the store and both ledgers. Per-file problems are
//! recorded and retried next time; only configuration, lock, scan, ledger
//! and store errors abort the run.
//!
//! Ledger and store keys are absolute paths below the canonicalized root, so
//! the same file maps to the same key however the root was spelled.

use std::{
  collections::{BTreeSet, HashSet},
  future::Future,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use strata_core::{
  chunk::{Chunk, ChunkConfig, chunk_text},
  embed::{Embedder, validate_embedding},
  project::ProjectId,
  store::SemanticStore,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  error::{FailureKind, IngestError, Result},
  gitignore::GitignoreMatcher,
  ledger::{ChecksumLedger, RetryLedger},
  lock::RunLock,
  scanner::{FileScanner, relative_path},
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Extensions ingested when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
  "md", "markdown", "txt", "rst", "adoc", "rs", "py", "js", "ts", "go", "java", "c", "h",
  "cpp", "toml", "yaml", "yml", "json", "sh",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOptions {
  pub project_id:     ProjectId,
  pub root:           PathBuf,
  pub chunk_size:     usize,
  pub chunk_overlap:  usize,
  /// Allow-list; empty admits every extension.
  pub extensions:     Vec<String>,
  /// Ignore patterns applied after the root `.gitignore`.
  pub exclude:        Vec<String>,
  pub use_gitignore:  bool,
  /// Skip files whose checksum matches the ledger.
  pub incremental:    bool,
  pub dry_run:        bool,
  /// Flush the ledgers after this many ledger-changing files; 0 flushes only
  /// at the end.
  pub flush_interval: usize,
  pub read_timeout:   Option<Duration>,
  /// Deadline for each chunk's embedding call.
  pub embed_timeout:  Option<Duration>,
}

impl IngestOptions {
  pub fn new(project_id: ProjectId, root: impl Into<PathBuf>) -> Self {
    let chunk = ChunkConfig::default();
    Self {
      project_id,
      root: root.into(),
      chunk_size: chunk.chunk_size(),
      chunk_overlap: chunk.overlap(),
      extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_owned()).collect(),
      exclude: Vec::new(),
      use_gitignore: true,
      incremental: true,
      dry_run: false,
      flush_interval: 25,
      read_timeout: None,
      embed_timeout: None,
    }
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
  pub path:    String,
  pub kind:    FailureKind,
  pub message: String,
}

/// What a run did, or in dry-run mode would have done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
  /// Scanned files plus retry-only candidates.
  pub files_found:    usize,
  pub processed:      usize,
  pub skipped:        usize,
  /// Processed files the checksum ledger had never seen.
  pub new:            usize,
  /// Processed files with a previous checksum.
  pub updated:        usize,
  pub errored:        usize,
  /// Previously ingested or queued files that have left the tree.
  pub removed:        usize,
  pub chunks_created: usize,
  pub failures:       Vec<FailedFile>,
  pub dry_run:        bool,
}

// ─── Internals ───────────────────────────────────────────────────────────────

struct Candidate {
  /// Ledger and store key: the file's absolute path under the canonical root.
  key:           String,
  path:          PathBuf,
  relative_path: String,
  extension:     String,
}

impl Candidate {
  fn from_retry(root: &Path, key: &str) -> Self {
    let path = PathBuf::from(key);
    Self {
      relative_path: relative_path(root, &path).unwrap_or_else(|| key.to_owned()),
      extension: extension_of(&path),
      key: key.to_owned(),
      path,
    }
  }
}

enum Disposition {
  Skipped,
  Ingested {
    checksum: String,
    chunks:   usize,
    is_new:   bool,
  },
}

enum FileError {
  Recoverable { kind: FailureKind, message: String },
  Fatal(IngestError),
}

impl FileError {
  fn recoverable(kind: FailureKind, message: impl ToString) -> Self {
    Self::Recoverable {
      kind,
      message: message.to_string(),
    }
  }
}

async fn with_deadline<T, F>(deadline: Option<Duration>, what: &str, fut: F) -> Result<T, FileError>
where
  F: Future<Output = Result<T, FileError>>,
{
  match deadline {
    Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
      FileError::recoverable(
        FailureKind::Timeout,
        format!("{what} exceeded {}ms", limit.as_millis()),
      )
    })?,
    None => fut.await,
  }
}

fn extension_of(path: &Path) -> String {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(str::to_lowercase)
    .unwrap_or_default()
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

pub struct IngestionPipeline<S, E> {
  store:     Arc<S>,
  embedder:  Arc<E>,
  state_dir: PathBuf,
}

impl<S, E> IngestionPipeline<S, E>
where
  S: SemanticStore,
  E: Embedder,
{
  pub fn new(store: Arc<S>, embedder: Arc<E>, state_dir: impl Into<PathBuf>) -> Self {
    Self {
      store,
      embedder,
      state_dir: state_dir.into(),
    }
  }

  pub fn state_dir(&self) -> &Path { &self.state_dir }

  /// Bring the project's chunks in line with the tree under
  /// `options.root`.
  ///
  /// Always returns a summary once past setup, even if every file failed.
  pub async fn run(&self, options: &IngestOptions) -> Result<IngestSummary> {
    let chunk_config = ChunkConfig::new(options.chunk_size, options.chunk_overlap)?;
    let root = std::fs::canonicalize(&options.root).map_err(|e| {
      IngestError::Config(format!("ingestion root {:?} is not accessible: {e}", options.root))
    })?;
    if !root.is_dir() {
      return Err(IngestError::Config(format!(
        "ingestion root {:?} is not a directory",
        options.root
      )));
    }

    let _lock = RunLock::acquire(&self.state_dir, &options.project_id)?;

    let matcher = if options.use_gitignore {
      GitignoreMatcher::from_gitignore_file(&root, options.exclude.as_slice())?
    } else {
      GitignoreMatcher::compile(&options.exclude)?
    };

    let mut checksums = ChecksumLedger::open(&self.state_dir, &options.project_id)?;
    let mut retries = RetryLedger::open(&self.state_dir, &options.project_id)?;

    let candidates = collect_candidates(&root, options, &matcher, &retries)?;
    let stale = stale_paths(&root, &candidates, &checksums, &retries);
    let mut summary = IngestSummary {
      files_found: candidates.len(),
      dry_run: options.dry_run,
      ..IngestSummary::default()
    };
    info!(
      project = %options.project_id,
      root = ?root,
      candidates = candidates.len(),
      stale = stale.len(),
      retries = retries.len(),
      dry_run = options.dry_run,
      "starting ingestion"
    );

    let mut unflushed = 0;
    for key in &stale {
      if !options.dry_run {
        // Chunks first; the ledger entry outlives a failed removal.
        if let Err(e) = self.store.remove_source(&options.project_id, key).await {
          checksums.flush()?;
          retries.flush()?;
          return Err(IngestError::Store(Box::new(e)));
        }
        checksums.remove(key);
        retries.clear(key);
        unflushed += 1;
      }
      debug!(path = %key, "no longer in the tree, removed");
      summary.removed += 1;
    }

    for candidate in &candidates {
      let pending = retries.contains(&candidate.key);
      match self
        .ingest_file(options, &chunk_config, candidate, &checksums, pending)
        .await
      {
        Ok(Disposition::Skipped) => {
          debug!(path = %candidate.relative_path, "unchanged, skipped");
          summary.skipped += 1;
        }
        Ok(Disposition::Ingested {
          checksum,
          chunks,
          is_new,
        }) => {
          debug!(path = %candidate.relative_path, chunks, is_new, "ingested");
          summary.processed += 1;
          summary.chunks_created += chunks;
          if is_new {
            summary.new += 1;
          } else {
            summary.updated += 1;
          }
          if !options.dry_run {
            checksums.set(candidate.key.clone(), checksum);
            retries.clear(&candidate.key);
            unflushed += 1;
          }
        }
        Err(FileError::Recoverable { kind, message }) => {
          warn!(path = %candidate.relative_path, %kind, error = %message, "ingestion failed");
          summary.errored += 1;
          if !options.dry_run {
            retries.record_failure(candidate.key.clone(), message.clone());
            unflushed += 1;
          }
          summary.failures.push(FailedFile {
            path: candidate.key.clone(),
            kind,
            message,
          });
        }
        Err(FileError::Fatal(e)) => {
          if !options.dry_run {
            retries.record_failure(candidate.key.clone(), e.to_string());
            checksums.flush()?;
            retries.flush()?;
          }
          return Err(e);
        }
      }

      if options.flush_interval > 0 && unflushed >= options.flush_interval {
        checksums.flush()?;
        retries.flush()?;
        unflushed = 0;
      }
    }

    if !options.dry_run {
      checksums.flush()?;
      retries.flush()?;
    }

    info!(
      project = %options.project_id,
      found = summary.files_found,
      processed = summary.processed,
      skipped = summary.skipped,
      new = summary.new,
      updated = summary.updated,
      errored = summary.errored,
      removed = summary.removed,
      chunks = summary.chunks_created,
      dry_run = summary.dry_run,
      "ingestion finished"
    );
    Ok(summary)
  }

  async fn ingest_file(
    &self,
    options: &IngestOptions,
    chunk_config: &ChunkConfig,
    candidate: &Candidate,
    checksums: &ChecksumLedger,
    pending: bool,
  ) -> Result<Disposition, FileError> {
    let bytes = with_deadline(options.read_timeout, "read", async {
      tokio::fs::read(&candidate.path)
        .await
        .map_err(|e| FileError::recoverable(FailureKind::Access, e))
    })
    .await?;

    let checksum = hex::encode(Sha256::digest(&bytes));
    let previous = checksums.get(&candidate.key);
    if options.incremental && !pending && previous == Some(checksum.as_str()) {
      return Ok(Disposition::Skipped);
    }
    let is_new = previous.is_none();

    if options.dry_run {
      return Ok(Disposition::Ingested {
        checksum,
        chunks: 0,
        is_new,
      });
    }

    let text = String::from_utf8(bytes)
      .map_err(|e| FileError::recoverable(FailureKind::Encoding, e))?;

    let ingested_at = Utc::now();
    let pieces = chunk_text(&text, chunk_config);
    let mut chunks = Vec::with_capacity(pieces.len());
    for (index, piece) in pieces.into_iter().enumerate() {
      let embedding = with_deadline(options.embed_timeout, "embedding", async {
        let vector = self
          .embedder
          .embed(&piece)
          .await
          .map_err(|e| FileError::recoverable(FailureKind::Embedding, e))?;
        validate_embedding(&vector)
          .map_err(|e| FileError::recoverable(FailureKind::Embedding, e))?;
        Ok(vector)
      })
      .await?;

      chunks.push(Chunk {
        chunk_id: Uuid::new_v4(),
        project_id: options.project_id.clone(),
        source_path: candidate.key.clone(),
        relative_path: candidate.relative_path.clone(),
        chunk_index: u32::try_from(index).unwrap_or(u32::MAX),
        text: piece,
        embedding,
        file_checksum: checksum.clone(),
        extension: candidate.extension.clone(),
        ingested_at,
      });
    }

    let created = self
      .store
      .replace_chunks(&options.project_id, &candidate.key, chunks)
      .await
      .map_err(|e| FileError::Fatal(IngestError::Store(Box::new(e))))?;

    Ok(Disposition::Ingested {
      checksum,
      chunks: created,
      is_new,
    })
  }
}

/// Scanned files in walk order, then retry-only paths in ledger order.
///
/// A queued path whose file no longer exists is not a candidate; it is left
/// for [`stale_paths`].
fn collect_candidates(
  root: &Path,
  options: &IngestOptions,
  matcher: &GitignoreMatcher,
  retries: &RetryLedger,
) -> Result<Vec<Candidate>> {
  let scanner = FileScanner::new(root, &options.extensions, matcher);
  let mut candidates = Vec::new();
  let mut seen = HashSet::new();

  for file in scanner.scan() {
    let file = file?;
    let key = file.path.to_string_lossy().into_owned();
    seen.insert(key.clone());
    candidates.push(Candidate {
      key,
      path: file.path,
      relative_path: file.relative_path,
      extension: file.extension,
    });
  }

  for key in retries.pending() {
    let gone = matches!(Path::new(key).try_exists(), Ok(false));
    if !gone && seen.insert(key.to_owned()) {
      candidates.push(Candidate::from_retry(root, key));
    }
  }

  Ok(candidates)
}

/// Ledger paths with nothing left to ingest: checksummed files under `root`
/// that are not candidates this run, and queued files that no longer exist.
///
/// Entries under other roots of the same project are left alone.
fn stale_paths(
  root: &Path,
  candidates: &[Candidate],
  checksums: &ChecksumLedger,
  retries: &RetryLedger,
) -> BTreeSet<String> {
  let live: HashSet<&str> = candidates.iter().map(|c| c.key.as_str()).collect();
  checksums
    .paths()
    .filter(|p| Path::new(p).starts_with(root))
    .chain(retries.pending())
    .filter(|p| !live.contains(p))
    .map(str::to_owned)
    .collect()
}
