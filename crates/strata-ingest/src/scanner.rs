//! [`FileScanner`]: lazy, deterministic discovery of ingestion candidates.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use tracing::trace;
use walkdir::{DirEntry, WalkDir};

use crate::gitignore::GitignoreMatcher;

/// A regular file admitted by the allow-list and the matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
  pub path:          PathBuf,
  /// `/`-separated path relative to the scan root.
  pub relative_path: String,
  /// Lower-case extension without the dot; empty when the file has none.
  pub extension:     String,
}

pub struct FileScanner<'m> {
  root:       PathBuf,
  extensions: HashSet<String>,
  matcher:    &'m GitignoreMatcher,
}

impl<'m> FileScanner<'m> {
  /// `extensions` are compared case-insensitively and may carry a leading
  /// dot. An empty list admits every extension.
  pub fn new<I, S>(root: impl Into<PathBuf>, extensions: I, matcher: &'m GitignoreMatcher) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self {
      root: root.into(),
      extensions: extensions
        .into_iter()
        .map(|e| normalize_extension(e.as_ref()))
        .filter(|e| !e.is_empty())
        .collect(),
      matcher,
    }
  }

  pub fn root(&self) -> &Path { &self.root }

  /// Walk the tree under the root in file-name order.
  ///
  /// Symlinks are neither followed nor yielded. Excluded directories and
  /// `.git` are pruned without being read.
  pub fn scan(&self) -> impl Iterator<Item = Result<ScannedFile, walkdir::Error>> + '_ {
    WalkDir::new(&self.root)
      .follow_links(false)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(move |entry| entry.depth() == 0 || !self.prune(entry))
      .filter_map(move |entry| match entry {
        Ok(entry) => self.admit(&entry).map(Ok),
        Err(e) => Some(Err(e)),
      })
  }

  fn prune(&self, entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
      return false;
    }
    if entry.file_name() == ".git" {
      return true;
    }
    let pruned = self
      .relative(entry.path())
      .is_some_and(|rel| self.matcher.is_excluded(&rel, true));
    if pruned {
      trace!(path = ?entry.path(), "pruned directory");
    }
    pruned
  }

  fn admit(&self, entry: &DirEntry) -> Option<ScannedFile> {
    if !entry.file_type().is_file() {
      return None;
    }

    let extension = entry
      .path()
      .extension()
      .and_then(|e| e.to_str())
      .map(normalize_extension)
      .unwrap_or_default();
    if !self.extensions.is_empty() && !self.extensions.contains(&extension) {
      return None;
    }

    let Some(relative_path) = self.relative(entry.path()) else {
      trace!(path = ?entry.path(), "skipping path that is not valid UTF-8");
      return None;
    };
    if self.matcher.is_excluded(&relative_path, false) {
      trace!(path = %relative_path, "excluded by ignore rules");
      return None;
    }

    Some(ScannedFile {
      path: entry.path().to_path_buf(),
      relative_path,
      extension,
    })
  }

  fn relative(&self, path: &Path) -> Option<String> { relative_path(&self.root, path) }
}

/// `path` relative to `root`, `/`-separated. `None` if `path` lies outside
/// `root` or is not valid UTF-8.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
  let rel = path.strip_prefix(root).ok()?;
  let parts = rel
    .components()
    .map(|c| c.as_os_str().to_str())
    .collect::<Option<Vec<_>>>()?;
  Some(parts.join("/"))
}

fn normalize_extension(ext: &str) -> String {
  ext.trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, rel).unwrap();
  }

  fn scan(root: &Path, extensions: &[&str], patterns: &[&str]) -> Vec<String> {
    let matcher = GitignoreMatcher::compile(patterns).unwrap();
    FileScanner::new(root, extensions, &matcher)
      .scan()
      .map(|f| f.unwrap().relative_path)
      .collect()
  }

  #[test]
  fn filters_by_extension_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a.md");
    touch(dir.path(), "b.MD");
    touch(dir.path(), "c.rs");
    touch(dir.path(), "Makefile");

    assert_eq!(scan(dir.path(), &[".md"], &[]), ["a.md", "b.MD"]);
    assert_eq!(scan(dir.path(), &[], &[]).len(), 4);
  }

  #[test]
  fn prunes_excluded_directories_and_git() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "docs/guide.md");
    touch(dir.path(), "target/debug/out.md");
    touch(dir.path(), ".git/HEAD.md");
    touch(dir.path(), "src/notes.md");
    touch(dir.path(), "src/scratch.md");

    let found = scan(dir.path(), &["md"], &["target/", "scratch.md"]);
    assert_eq!(found, ["docs/guide.md", "src/notes.md"]);
  }

  #[test]
  fn yields_in_file_name_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["c.txt", "a.txt", "b/z.txt", "b/a.txt"] {
      touch(dir.path(), name);
    }
    assert_eq!(scan(dir.path(), &["txt"], &[]), ["a.txt", "b/a.txt", "b/z.txt", "c.txt"]);
  }

  #[cfg(unix)]
  #[test]
  fn symlinks_are_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "real/file.md");
    std::os::unix::fs::symlink(dir.path(), dir.path().join("real/loop")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("real/file.md"), dir.path().join("link.md"))
      .unwrap();

    assert_eq!(scan(dir.path(), &["md"], &[]), ["real/file.md"]);
  }

  #[test]
  fn scanned_file_carries_paths_and_extension() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "notes/Plan.Txt");
    let matcher = GitignoreMatcher::compile::<_, &str>([]).unwrap();
    let files: Vec<_> = FileScanner::new(dir.path(), ["txt"], &matcher)
      .scan()
      .collect::<Result<_, _>>()
      .unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, dir.path().join("notes/Plan.Txt"));
    assert_eq!(files[0].relative_path, "notes/Plan.Txt");
    assert_eq!(files[0].extension, "txt");
  }
}
