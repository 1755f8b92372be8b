//! Store traits for the three memory tiers.
//!
//! Each tier is its own trait so backends can be mixed; the SQLite backend
//! (`strata-store-sqlite`) implements all three on one connection. Higher
//! layers (`strata-ingest`, the resolver) depend on these abstractions only.
//!
//! All methods return `Send` futures so the traits can be used from
//! multi-threaded async runtimes.

use std::future::Future;

use crate::{
  chunk::{Chunk, ScoredChunk, SourceSummary},
  episode::{Episode, NewEpisode},
  fact::{Fact, NewFact, Scope},
  lifecycle::{ResolvedFact, UpsertOutcome},
  project::ProjectId,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`SymbolicStore::query_facts`].
#[derive(Debug, Clone)]
pub struct FactQuery {
  pub scope:    Scope,
  pub category: Option<String>,
  pub key:      Option<String>,
}

impl FactQuery {
  pub fn scope(scope: Scope) -> Self {
    Self {
      scope,
      category: None,
      key: None,
    }
  }

  pub fn category(mut self, category: impl Into<String>) -> Self {
    self.category = Some(category.into());
    self
  }

  pub fn key(mut self, key: impl Into<String>) -> Self {
    self.key = Some(key.into());
    self
  }
}

// ─── Symbolic ────────────────────────────────────────────────────────────────

/// Authoritative facts, one active version per `(scope, category, key)`.
pub trait SymbolicStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Record `input` and resolve it against the active fact for its key.
  ///
  /// An active fact with strictly higher confidence wins and the attempt is
  /// kept as shadowed history. Equal or higher confidence replaces the
  /// active fact (last write wins on ties). Confidence outside `[0, 1]` is
  /// rejected before anything is written.
  fn upsert_fact(
    &self,
    input: NewFact,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  /// Active facts matching `query`, ordered by confidence then recency.
  fn query_facts<'a>(
    &'a self,
    query: &'a FactQuery,
  ) -> impl Future<Output = Result<Vec<Fact>, Self::Error>> + Send + 'a;

  /// Every recorded version of a key with its lifecycle status, oldest
  /// first.
  fn fact_history<'a>(
    &'a self,
    scope: &'a Scope,
    category: &'a str,
    key: &'a str,
  ) -> impl Future<Output = Result<Vec<ResolvedFact>, Self::Error>> + Send + 'a;
}

// ─── Episodic ────────────────────────────────────────────────────────────────

/// Append-only lesson log. There is deliberately no update or delete.
pub trait EpisodicStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn add_episode(
    &self,
    input: NewEpisode,
  ) -> impl Future<Output = Result<Episode, Self::Error>> + Send + '_;

  /// Most recent first, at most `limit` entries. `limit` must be positive.
  fn query_episodes<'a>(
    &'a self,
    project_id: &'a ProjectId,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Episode>, Self::Error>> + Send + 'a;
}

// ─── Semantic ────────────────────────────────────────────────────────────────

/// Document chunks and their embeddings, partitioned by project.
pub trait SemanticStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Atomically swap every chunk of `(project_id, source_path)` for
  /// `chunks`. Readers see either the old group or the new one. Returns the
  /// number of chunks inserted.
  fn replace_chunks<'a>(
    &'a self,
    project_id: &'a ProjectId,
    source_path: &'a str,
    chunks: Vec<Chunk>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Drop every chunk of a source. Returns how many were removed.
  fn remove_source<'a>(
    &'a self,
    project_id: &'a ProjectId,
    source_path: &'a str,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Rank the project's chunks by cosine similarity to `query_embedding`,
  /// most similar first, newest first among equals. Fewer than `top_k` hits
  /// (including none) is not an error.
  fn search<'a>(
    &'a self,
    project_id: &'a ProjectId,
    query_embedding: &'a [f32],
    top_k: usize,
  ) -> impl Future<Output = Result<Vec<ScoredChunk>, Self::Error>> + Send + 'a;

  fn list_sources<'a>(
    &'a self,
    project_id: &'a ProjectId,
  ) -> impl Future<Output = Result<Vec<SourceSummary>, Self::Error>> + Send + 'a;
}
