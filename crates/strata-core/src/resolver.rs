//! [`AuthorityResolver`] composes the three tiers into one context answer.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
  chunk::ScoredChunk,
  context::{ContextBundle, ContextItem, ContextPayload},
  embed::{EmbedError, Embedder, validate_embedding},
  episode::Episode,
  fact::Scope,
  project::ProjectId,
  store::{EpisodicStore, FactQuery, SemanticStore, SymbolicStore},
};

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("query embedding failed: {0}")]
  Embedding(#[from] EmbedError),
}

fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> ResolveError {
  ResolveError::Store(Box::new(e))
}

/// How much of the non-authoritative tiers to include.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResolverConfig {
  /// Most recent lessons to include.
  pub episode_limit: usize,
  /// Most similar chunks to include.
  pub top_k:         usize,
}

impl Default for ResolverConfig {
  fn default() -> Self {
    Self {
      episode_limit: 5,
      top_k:         8,
    }
  }
}

/// Read-only orchestrator over the symbolic, episodic and semantic stores.
pub struct AuthorityResolver<Sy, Ep, Se, E> {
  symbolic: Arc<Sy>,
  episodic: Arc<Ep>,
  semantic: Arc<Se>,
  embedder: Arc<E>,
  config:   ResolverConfig,
}

impl<Sy, Ep, Se, E> AuthorityResolver<Sy, Ep, Se, E>
where
  Sy: SymbolicStore,
  Ep: EpisodicStore,
  Se: SemanticStore,
  E: Embedder,
{
  pub fn new(
    symbolic: Arc<Sy>,
    episodic: Arc<Ep>,
    semantic: Arc<Se>,
    embedder: Arc<E>,
    config: ResolverConfig,
  ) -> Self {
    Self {
      symbolic,
      episodic,
      semantic,
      embedder,
      config,
    }
  }

  pub fn config(&self) -> &ResolverConfig { &self.config }

  /// Gather facts, lessons and evidence for `query` within `project_id`.
  ///
  /// Facts are never truncated. Project-scoped facts precede global ones;
  /// both keep the store's confidence ordering. A disabled tier (limit 0)
  /// is simply left out.
  pub async fn get_context(
    &self,
    project_id: &ProjectId,
    query: &str,
  ) -> Result<ContextBundle, ResolveError> {
    let global_q = FactQuery::scope(Scope::Global);
    let project_q = FactQuery::scope(Scope::project(project_id));

    let (project_facts, global_facts, episodes, chunks) = tokio::try_join!(
      async { self.symbolic.query_facts(&project_q).await.map_err(store_err) },
      async { self.symbolic.query_facts(&global_q).await.map_err(store_err) },
      self.recent_episodes(project_id),
      self.evidence(project_id, query),
    )?;

    debug!(
      project = %project_id,
      facts = project_facts.len() + global_facts.len(),
      episodes = episodes.len(),
      chunks = chunks.len(),
      "resolved context"
    );

    let facts = project_facts
      .into_iter()
      .chain(global_facts)
      .enumerate()
      .map(|(rank, f)| ContextItem::new(rank, ContextPayload::Fact(f)));
    let episodes = episodes
      .into_iter()
      .enumerate()
      .map(|(rank, e)| ContextItem::new(rank, ContextPayload::Episode(e)));
    let chunks = chunks
      .into_iter()
      .enumerate()
      .map(|(rank, c)| ContextItem::new(rank, ContextPayload::Chunk(c)));

    Ok(ContextBundle {
      project_id:   project_id.clone(),
      query:        query.to_owned(),
      generated_at: Utc::now(),
      items:        facts.chain(episodes).chain(chunks).collect(),
    })
  }

  async fn recent_episodes(
    &self,
    project_id: &ProjectId,
  ) -> Result<Vec<Episode>, ResolveError> {
    if self.config.episode_limit == 0 {
      return Ok(Vec::new());
    }
    self
      .episodic
      .query_episodes(project_id, self.config.episode_limit)
      .await
      .map_err(store_err)
  }

  async fn evidence(
    &self,
    project_id: &ProjectId,
    query: &str,
  ) -> Result<Vec<ScoredChunk>, ResolveError> {
    if self.config.top_k == 0 {
      return Ok(Vec::new());
    }
    let embedding = self.embedder.embed(query).await?;
    validate_embedding(&embedding)?;
    self
      .semantic
      .search(project_id, &embedding, self.config.top_k)
      .await
      .map_err(store_err)
  }
}

