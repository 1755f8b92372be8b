//! Single-run guard: one ingestion per project at a time.
//!
//! An advisory `fs2` lock on `<state_dir>/<project_id>/ingest.lock`, held
//! for the lifetime of [`RunLock`]. The OS drops the lock if the process
//! dies, so a crashed run never blocks the next one.

use std::{
  fs::{self, File, OpenOptions},
  io::{self, Write as _},
  path::{Path, PathBuf},
};

use fs2::FileExt;
use strata_core::project::ProjectId;
use tracing::debug;

use crate::{
  error::{IngestError, Result},
  ledger::project_state_dir,
};

pub const LOCK_FILE: &str = "ingest.lock";

#[derive(Debug)]
pub struct RunLock {
  file: File,
  path: PathBuf,
}

impl RunLock {
  /// Take the project's lock without waiting.
  pub fn acquire(state_dir: &Path, project_id: &ProjectId) -> Result<Self> {
    let dir = project_state_dir(state_dir, project_id);
    let path = dir.join(LOCK_FILE);
    let lock_err = |source: io::Error| IngestError::Lock {
      path: path.clone(),
      source,
    };

    fs::create_dir_all(&dir).map_err(lock_err)?;
    let mut file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&path)
      .map_err(lock_err)?;

    if let Err(e) = file.try_lock_exclusive() {
      if is_contended(&e) {
        return Err(IngestError::AlreadyRunning(project_id.to_string()));
      }
      return Err(lock_err(e));
    }

    // The pid is informational only; the lock itself is what excludes.
    file.set_len(0).map_err(lock_err)?;
    writeln!(file, "{}", std::process::id()).map_err(lock_err)?;

    debug!(project = %project_id, path = ?path, "acquired ingestion lock");
    Ok(Self { file, path })
  }

  pub fn path(&self) -> &Path { &self.path }
}

impl Drop for RunLock {
  fn drop(&mut self) {
    let _ = FileExt::unlock(&self.file);
  }
}

fn is_contended(e: &io::Error) -> bool {
  e.kind() == io::ErrorKind::WouldBlock
    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_acquire_fails_until_release() {
    let dir = tempfile::tempdir().unwrap();
    let project = ProjectId::new("alpha").unwrap();

    let first = RunLock::acquire(dir.path(), &project).unwrap();
    assert!(first.path().ends_with("alpha/ingest.lock"));

    let err = RunLock::acquire(dir.path(), &project).unwrap_err();
    assert!(matches!(err, IngestError::AlreadyRunning(ref p) if p == "alpha"));

    drop(first);
    RunLock::acquire(dir.path(), &project).unwrap();
  }

  #[test]
  fn projects_lock_independently() {
    let dir = tempfile::tempdir().unwrap();
    let _alpha = RunLock::acquire(dir.path(), &ProjectId::new("alpha").unwrap()).unwrap();
    let _beta = RunLock::acquire(dir.path(), &ProjectId::new("beta").unwrap()).unwrap();
  }
}
