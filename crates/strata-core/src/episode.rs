//! Episodes, the advisory tier. An append-only log of lessons learned.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, project::ProjectId};

/// How the experience behind a lesson turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  Success,
  Failure,
  Partial,
}

impl Outcome {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Success => "success",
      Self::Failure => "failure",
      Self::Partial => "partial",
    }
  }
}

impl fmt::Display for Outcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Outcome {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "success" => Ok(Self::Success),
      "failure" => Ok(Self::Failure),
      "partial" => Ok(Self::Partial),
      other => Err(Error::UnknownOutcome(other.to_owned())),
    }
  }
}

/// One recorded lesson. Never updated or deleted once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
  pub episode_id: Uuid,
  pub project_id: ProjectId,
  pub lesson:     String,
  pub outcome:    Outcome,
  /// Free-form context: what was being attempted, links, notes.
  pub context:    String,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::EpisodicStore::add_episode`].
#[derive(Debug, Clone)]
pub struct NewEpisode {
  pub project_id: ProjectId,
  pub lesson:     String,
  pub outcome:    Outcome,
  pub context:    String,
}

impl NewEpisode {
  pub fn new(project_id: ProjectId, lesson: impl Into<String>, outcome: Outcome) -> Self {
    Self {
      project_id,
      lesson: lesson.into(),
      outcome,
      context: String::new(),
    }
  }

  pub fn with_context(mut self, context: impl Into<String>) -> Self {
    self.context = context.into();
    self
  }
}
