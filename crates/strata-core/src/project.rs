//! Project: the tenancy partition every other record hangs off.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A validated project identifier.
///
/// Ids are restricted to ASCII alphanumerics plus `.`, `_` and `-` so they
/// can double as directory names for the per-project ingestion ledgers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
  pub fn new(id: impl Into<String>) -> Result<Self> {
    let id = id.into();
    let valid = !id.is_empty()
      && id != "."
      && id != ".."
      && id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
      Ok(Self(id))
    } else {
      Err(Error::InvalidProjectId(id))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ProjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for ProjectId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::new(s) }
}

impl TryFrom<String> for ProjectId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::new(s) }
}

impl From<ProjectId> for String {
  fn from(id: ProjectId) -> Self { id.0 }
}

impl AsRef<str> for ProjectId {
  fn as_ref(&self) -> &str { &self.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
  #[default]
  Active,
  Archived,
}

/// A tenancy partition created once at onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub project_id: ProjectId,
  pub name:       String,
  pub status:     ProjectStatus,
  pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_plain_identifiers() {
    for id in ["acme", "acme-web", "v1.2_beta"] {
      assert_eq!(ProjectId::new(id).unwrap().as_str(), id);
    }
  }

  #[test]
  fn rejects_path_like_identifiers() {
    for id in ["", ".", "..", "a/b", "a\\b", "has space"] {
      assert!(matches!(
        ProjectId::new(id),
        Err(Error::InvalidProjectId(_))
      ));
    }
  }
}
