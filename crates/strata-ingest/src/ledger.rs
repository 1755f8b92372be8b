//! Per-project ingestion state kept next to, not inside, the database.
//!
//! Both ledgers are loaded in full when opened and written back atomically
//! on [`flush`](ChecksumLedger::flush): the new contents go to a sibling
//! `.tmp` file, are synced, then renamed over the old file. A crash leaves
//! either the previous or the new version on disk.
//!
//! Layout under the state directory:
//!
//! ```text
//! <state_dir>/<project_id>/checksums.json   { "<project_id>": { "<path>": "<sha256>" } }
//! <state_dir>/<project_id>/retries.json     [ { "path", "error", "timestamp" } ]
//! ```

use std::{
  collections::BTreeMap,
  fs::{self, File},
  io::{self, Write as _},
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use strata_core::project::ProjectId;

use crate::error::{IngestError, Result};

pub const CHECKSUMS_FILE: &str = "checksums.json";
pub const RETRIES_FILE: &str = "retries.json";

/// Directory holding a project's ledgers and run lock.
pub fn project_state_dir(state_dir: &Path, project_id: &ProjectId) -> PathBuf {
  state_dir.join(project_id.as_str())
}

// ─── Checksums ───────────────────────────────────────────────────────────────

/// Content hash of every successfully ingested file.
#[derive(Debug)]
pub struct ChecksumLedger {
  path:       PathBuf,
  project_id: String,
  /// Keyed by project id. Entries for other projects are preserved as read.
  projects:   BTreeMap<String, BTreeMap<String, String>>,
  dirty:      bool,
}

impl ChecksumLedger {
  pub fn open(state_dir: &Path, project_id: &ProjectId) -> Result<Self> {
    let path = project_state_dir(state_dir, project_id).join(CHECKSUMS_FILE);
    let projects = load_json(&path)?.unwrap_or_default();
    Ok(Self {
      path,
      project_id: project_id.to_string(),
      projects,
      dirty: false,
    })
  }

  fn entries(&self) -> Option<&BTreeMap<String, String>> {
    self.projects.get(&self.project_id)
  }

  pub fn get(&self, path: &str) -> Option<&str> {
    self.entries()?.get(path).map(String::as_str)
  }

  pub fn set(&mut self, path: impl Into<String>, checksum: impl Into<String>) {
    self
      .projects
      .entry(self.project_id.clone())
      .or_default()
      .insert(path.into(), checksum.into());
    self.dirty = true;
  }

  pub fn remove(&mut self, path: &str) -> Option<String> {
    let removed = self.projects.get_mut(&self.project_id)?.remove(path);
    self.dirty |= removed.is_some();
    removed
  }

  /// Every recorded path of this project, in sorted order.
  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.entries().into_iter().flat_map(|m| m.keys().map(String::as_str))
  }

  pub fn len(&self) -> usize { self.entries().map_or(0, BTreeMap::len) }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  pub fn path(&self) -> &Path { &self.path }

  /// Write pending changes. A no-op when nothing changed.
  pub fn flush(&mut self) -> Result<()> {
    if self.dirty {
      store_json(&self.path, &self.projects)?;
      self.dirty = false;
    }
    Ok(())
  }
}

// ─── Retries ─────────────────────────────────────────────────────────────────

/// A file whose last ingestion attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedIngestion {
  pub path:      String,
  pub error:     String,
  pub timestamp: DateTime<Utc>,
}

/// Files to re-attempt on the next run regardless of their checksum.
#[derive(Debug)]
pub struct RetryLedger {
  path:    PathBuf,
  entries: Vec<FailedIngestion>,
  dirty:   bool,
}

impl RetryLedger {
  pub fn open(state_dir: &Path, project_id: &ProjectId) -> Result<Self> {
    let path = project_state_dir(state_dir, project_id).join(RETRIES_FILE);
    let entries = load_json(&path)?.unwrap_or_default();
    Ok(Self {
      path,
      entries,
      dirty: false,
    })
  }

  /// Queue `path`. An existing entry for the same path is replaced.
  pub fn record_failure(&mut self, path: impl Into<String>, error: impl Into<String>) {
    let entry = FailedIngestion {
      path:      path.into(),
      error:     error.into(),
      timestamp: Utc::now(),
    };
    match self.entries.iter_mut().find(|e| e.path == entry.path) {
      Some(existing) => *existing = entry,
      None => self.entries.push(entry),
    }
    self.dirty = true;
  }

  /// Drop `path` after a successful ingestion. Returns whether it was queued.
  pub fn clear(&mut self, path: &str) -> bool {
    let before = self.entries.len();
    self.entries.retain(|e| e.path != path);
    let cleared = self.entries.len() != before;
    self.dirty |= cleared;
    cleared
  }

  pub fn pending(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|e| e.path.as_str())
  }

  pub fn contains(&self, path: &str) -> bool {
    self.entries.iter().any(|e| e.path == path)
  }

  pub fn entries(&self) -> &[FailedIngestion] { &self.entries }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn path(&self) -> &Path { &self.path }

  pub fn flush(&mut self) -> Result<()> {
    if self.dirty {
      store_json(&self.path, &self.entries)?;
      self.dirty = false;
    }
    Ok(())
  }
}

// ─── File helpers ────────────────────────────────────────────────────────────

/// `Ok(None)` when the file does not exist yet.
fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
  let bytes = match fs::read(path) {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(IngestError::Ledger {
        path: path.to_path_buf(),
        source,
      });
    }
  };
  serde_json::from_slice(&bytes)
    .map(Some)
    .map_err(|source| IngestError::LedgerFormat {
      path: path.to_path_buf(),
      source,
    })
}

fn store_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  let bytes = serde_json::to_vec_pretty(value).map_err(|source| IngestError::LedgerFormat {
    path: path.to_path_buf(),
    source,
  })?;
  write_atomic(path, &bytes).map_err(|source| IngestError::Ledger {
    path: path.to_path_buf(),
    source,
  })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  let mut tmp_name = path.as_os_str().to_owned();
  tmp_name.push(".tmp");
  let tmp = PathBuf::from(tmp_name);

  let mut file = File::create(&tmp)?;
  file.write_all(bytes)?;
  file.sync_all()?;
  drop(file);
  fs::rename(&tmp, path)
}
