//! `.gitignore`-style exclusion rules.
//!
//! Each pattern is translated to a [`globset`] glob with `literal_separator`
//! enabled, so `*`, `?` and `[...]` never cross a `/` while `**` does.
//! Patterns containing a slash (other than a trailing one) are anchored at
//! the root; the rest are prefixed with `**/` and match at any depth. All
//! globs live in one [`GlobSet`]; among the rules matching a path the one
//! with the highest index, i.e. the last in the file, decides.

use std::{io, path::{Path, PathBuf}};

use globset::{Candidate, GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitignoreError {
  #[error("invalid ignore pattern {pattern:?}: {source}")]
  Pattern {
    pattern: String,
    #[source]
    source:  globset::Error,
  },

  #[error("failed to read {path:?}: {source}")]
  Read {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone)]
struct Rule {
  negated:  bool,
  dir_only: bool,
}

/// Compiled exclusion rules, evaluated against `/`-separated paths relative
/// to the ingestion root.
#[derive(Debug, Clone)]
pub struct GitignoreMatcher {
  rules: Vec<Rule>,
  set:   GlobSet,
}

impl GitignoreMatcher {
  /// Compile `patterns` in order. Blank lines and comments are skipped.
  pub fn compile<I, S>(patterns: I) -> Result<Self, GitignoreError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut rules = Vec::new();
    let mut builder = GlobSetBuilder::new();

    for line in patterns {
      let Some((rule, glob)) = parse_line(line.as_ref()) else {
        continue;
      };
      let compiled = GlobBuilder::new(&glob)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|source| GitignoreError::Pattern {
          pattern: line.as_ref().to_owned(),
          source,
        })?;
      builder.add(compiled);
      rules.push(rule);
    }

    let set = builder.build().map_err(|source| GitignoreError::Pattern {
      pattern: String::new(),
      source,
    })?;
    Ok(Self { rules, set })
  }

  /// Rules from `<root>/.gitignore` (if present) followed by `extra`.
  pub fn from_gitignore_file<S: AsRef<str>>(
    root: &Path,
    extra: &[S],
  ) -> Result<Self, GitignoreError> {
    let path = root.join(".gitignore");
    let contents = match std::fs::read_to_string(&path) {
      Ok(contents) => contents,
      Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
      Err(source) => return Err(GitignoreError::Read { path, source }),
    };

    Self::compile(
      contents
        .lines()
        .chain(extra.iter().map(|s| s.as_ref())),
    )
  }

  /// Whether `relative_path` is excluded, either itself or because one of
  /// its parent directories is. A file under an excluded directory cannot be
  /// re-included.
  pub fn is_excluded(&self, relative_path: &str, is_dir: bool) -> bool {
    let path = relative_path.trim_matches('/');
    if path.is_empty() || self.rules.is_empty() {
      return false;
    }

    let mut ancestors = path.match_indices('/').map(|(i, _)| &path[..i]);
    if ancestors.any(|dir| self.matches(dir, true)) {
      return true;
    }
    self.matches(path, is_dir)
  }

  /// Verdict of the last rule matching `path` alone, ignoring parents.
  fn matches(&self, path: &str, is_dir: bool) -> bool {
    let candidate = Candidate::new(path);
    self
      .set
      .matches_candidate(&candidate)
      .into_iter()
      .filter(|&i| is_dir || !self.rules[i].dir_only)
      .max()
      .is_some_and(|i| !self.rules[i].negated)
  }

  pub fn len(&self) -> usize { self.rules.len() }

  pub fn is_empty(&self) -> bool { self.rules.is_empty() }
}

/// Translate one `.gitignore` line into a rule and its glob.
fn parse_line(line: &str) -> Option<(Rule, String)> {
  let line = trim_trailing_space(line);
  if line.is_empty() || line.starts_with('#') {
    return None;
  }

  let (negated, mut pattern) = match line.strip_prefix('!') {
    Some(rest) => (true, rest),
    None => {
      let unescaped = line
        .strip_prefix('\\')
        .filter(|rest| rest.starts_with(['#', '!']));
      (false, unescaped.unwrap_or(line))
    }
  };

  let dir_only = pattern.ends_with('/');
  pattern = pattern.trim_end_matches('/');

  let anchored = pattern.contains('/');
  pattern = pattern.strip_prefix('/').unwrap_or(pattern);
  if pattern.is_empty() {
    return None;
  }

  let glob = if anchored || pattern.starts_with("**") {
    pattern.to_owned()
  } else {
    format!("**/{pattern}")
  };

  Some((Rule { negated, dir_only }, glob))
}

/// Trailing spaces are dropped unless escaped with a backslash.
fn trim_trailing_space(line: &str) -> &str {
  let trimmed = line.trim_end();
  if trimmed.ends_with('\\') && trimmed.len() < line.len() {
    &line[..=trimmed.len()]
  } else {
    trimmed
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn matcher(patterns: &[&str]) -> GitignoreMatcher {
    GitignoreMatcher::compile(patterns).unwrap()
  }

  #[test]
  fn negation_after_exclusion_reincludes() {
    let m = matcher(&["*.log", "!keep.log"]);
    assert!(m.is_excluded("debug.log", false));
    assert!(m.is_excluded("nested/trace.log", false));
    assert!(!m.is_excluded("keep.log", false));
    assert!(!m.is_excluded("nested/keep.log", false));
  }

  #[test]
  fn last_matching_rule_wins() {
    let m = matcher(&["!keep.log", "*.log"]);
    assert!(m.is_excluded("keep.log", false));
  }

  #[test]
  fn unanchored_pattern_matches_any_depth() {
    let m = matcher(&["target"]);
    assert!(m.is_excluded("target", true));
    assert!(m.is_excluded("crates/a/target", true));
    assert!(!m.is_excluded("targets", true));
  }

  #[test]
  fn slash_anchors_to_root() {
    let m = matcher(&["/build", "docs/*.md"]);
    assert!(m.is_excluded("build", true));
    assert!(!m.is_excluded("src/build", true));
    assert!(m.is_excluded("docs/intro.md", false));
    assert!(!m.is_excluded("other/docs/intro.md", false));
    // A single `*` does not cross directories.
    assert!(!m.is_excluded("docs/deep/intro.md", false));
  }

  #[test]
  fn trailing_slash_matches_directories_only() {
    let m = matcher(&["cache/"]);
    assert!(m.is_excluded("cache", true));
    assert!(!m.is_excluded("cache", false));
    assert!(m.is_excluded("cache/entry.bin", false));
  }

  #[test]
  fn double_star_forms() {
    let m = matcher(&["**/generated", "vendor/**", "a/**/z.txt"]);
    assert!(m.is_excluded("generated", true));
    assert!(m.is_excluded("x/y/generated", true));
    assert!(m.is_excluded("vendor/lib/mod.rs", false));
    assert!(m.is_excluded("a/z.txt", false));
    assert!(m.is_excluded("a/b/c/z.txt", false));
  }

  #[test]
  fn excluded_parent_cannot_be_reincluded() {
    let m = matcher(&["logs/", "!logs/keep.txt"]);
    assert!(m.is_excluded("logs/keep.txt", false));
  }

  #[test]
  fn comments_blanks_and_escapes() {
    let m = matcher(&["# comment", "", "   ", "\\#literal", "\\!bang", "spaced   "]);
    assert_eq!(m.len(), 3);
    assert!(m.is_excluded("#literal", false));
    assert!(m.is_excluded("!bang", false));
    assert!(m.is_excluded("spaced", false));
    assert!(!m.is_excluded("comment", false));
  }

  #[test]
  fn character_classes_and_wildcards() {
    let m = matcher(&["file?.[ch]"]);
    assert!(m.is_excluded("file1.c", false));
    assert!(m.is_excluded("src/fileA.h", false));
    assert!(!m.is_excluded("file10.c", false));
    assert!(!m.is_excluded("file1.rs", false));
  }

  #[test]
  fn empty_matcher_excludes_nothing() {
    let m = matcher(&[]);
    assert!(m.is_empty());
    assert!(!m.is_excluded("anything", false));
  }

  #[test]
  fn reads_root_gitignore_then_extra() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".gitignore"), "*.tmp\n!important.tmp\n").unwrap();

    let m = GitignoreMatcher::from_gitignore_file(dir.path(), &["important.tmp"]).unwrap();
    assert!(m.is_excluded("scratch.tmp", false));
    assert!(m.is_excluded("important.tmp", false));

    let missing = tempfile::tempdir().unwrap();
    let m = GitignoreMatcher::from_gitignore_file::<&str>(missing.path(), &[]).unwrap();
    assert!(m.is_empty());
  }
}
