//! The composed answer to a context query.
//!
//! Every item is labelled with the tier it came from. The label is derived
//! from the tier alone, never from content, so a document chunk can never be
//! presented as authoritative however it is worded.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  chunk::ScoredChunk,
  episode::Episode,
  fact::Fact,
  project::ProjectId,
};

/// Which store an item came from, in precedence order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
  Symbolic,
  Episodic,
  Semantic,
}

impl Tier {
  pub fn authority(self) -> Authority {
    match self {
      Self::Symbolic => Authority::Authoritative,
      Self::Episodic => Authority::Advisory,
      Self::Semantic => Authority::Evidentiary,
    }
  }
}

/// How much weight a consumer should give an item.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
  /// Ground truth. Overrides anything below it.
  Authoritative,
  /// Past experience; guidance, not truth.
  Advisory,
  /// Supporting or historical material only.
  Evidentiary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextPayload {
  Fact(Fact),
  Episode(Episode),
  Chunk(ScoredChunk),
}

impl ContextPayload {
  pub fn tier(&self) -> Tier {
    match self {
      Self::Fact(_) => Tier::Symbolic,
      Self::Episode(_) => Tier::Episodic,
      Self::Chunk(_) => Tier::Semantic,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
  pub tier:      Tier,
  pub authority: Authority,
  /// Position within the tier, starting at 0.
  pub rank:      usize,
  pub payload:   ContextPayload,
}

impl ContextItem {
  pub fn new(rank: usize, payload: ContextPayload) -> Self {
    let tier = payload.tier();
    Self {
      tier,
      authority: tier.authority(),
      rank,
      payload,
    }
  }
}

/// Items ordered symbolic, then episodic, then semantic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
  pub project_id:   ProjectId,
  pub query:        String,
  pub generated_at: DateTime<Utc>,
  pub items:        Vec<ContextItem>,
}

impl ContextBundle {
  pub fn facts(&self) -> impl Iterator<Item = &Fact> {
    self.items.iter().filter_map(|i| match &i.payload {
      ContextPayload::Fact(f) => Some(f),
      _ => None,
    })
  }

  pub fn episodes(&self) -> impl Iterator<Item = &Episode> {
    self.items.iter().filter_map(|i| match &i.payload {
      ContextPayload::Episode(e) => Some(e),
      _ => None,
    })
  }

  pub fn chunks(&self) -> impl Iterator<Item = &ScoredChunk> {
    self.items.iter().filter_map(|i| match &i.payload {
      ContextPayload::Chunk(c) => Some(c),
      _ => None,
    })
  }

  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  /// Render as a plain-text prompt section. The headings spell out the
  /// precedence so a downstream model applies it when tiers disagree.
  pub fn render(&self) -> String {
    let mut out = String::new();

    let facts: Vec<_> = self.facts().collect();
    if !facts.is_empty() {
      out.push_str(
        "## Facts [authoritative: ground truth, overrides everything below]\n",
      );
      for f in facts {
        let _ = writeln!(
          out,
          "- ({}) {}.{} = {} [confidence {}, source {}]",
          f.scope, f.category, f.key, f.value, f.confidence, f.source
        );
      }
      out.push('\n');
    }

    let episodes: Vec<_> = self.episodes().collect();
    if !episodes.is_empty() {
      out.push_str("## Lessons [advisory: past experience, not ground truth]\n");
      for e in episodes {
        let _ = writeln!(
          out,
          "- [{}] {} ({})",
          e.outcome,
          e.lesson,
          e.created_at.format("%Y-%m-%d")
        );
      }
      out.push('\n');
    }

    let chunks: Vec<_> = self.chunks().collect();
    if !chunks.is_empty() {
      out.push_str(
        "## Documents [evidentiary: supporting context; facts above win on conflict]\n",
      );
      for c in chunks {
        let _ = writeln!(
          out,
          "--- {} #{} (similarity {:.3})\n{}",
          c.chunk.relative_path,
          c.chunk.chunk_index,
          c.score,
          c.chunk.text.trim_end()
        );
      }
    }

    out
  }
}
