//! Fact lifecycle: how an upsert resolves against the active fact of a key.
//!
//! Fact rows are never updated. Replacing the active value of a key records a
//! supersession; a rejected lower-confidence upsert is kept as a shadowed
//! fact. Both live in append-only tables, and a fact's status is computed at
//! query time from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fact::Fact;

// ─── Computed status ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FactStatus {
  Active,
  /// Replaced by a later upsert with equal or higher confidence.
  Superseded { by: Uuid, at: DateTime<Utc> },
  /// Rejected on arrival because a higher-confidence fact was active.
  Shadowed { by: Uuid, at: DateTime<Utc> },
}

impl FactStatus {
  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }
}

/// A fact bundled with its current lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedFact {
  pub fact:   Fact,
  pub status: FactStatus,
}

// ─── Upsert result ───────────────────────────────────────────────────────────

/// What an upsert did. Callers must be able to tell an accepted write from
/// one that lost to a more confident fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
  /// The new fact is now the active one for its key.
  Accepted { fact: Fact },
  /// The attempt was recorded as history only; `active` is unchanged.
  Shadowed { attempted: Fact, active: Fact },
}

impl UpsertOutcome {
  pub fn is_accepted(&self) -> bool { matches!(self, Self::Accepted { .. }) }

  /// The fact that is active for the key after the call.
  pub fn active(&self) -> &Fact {
    match self {
      Self::Accepted { fact } => fact,
      Self::Shadowed { active, .. } => active,
    }
  }

  pub fn into_active(self) -> Fact {
    match self {
      Self::Accepted { fact } => fact,
      Self::Shadowed { active, .. } => active,
    }
  }
}
