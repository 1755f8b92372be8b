//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use strata_core::{
  chunk::Chunk,
  context::{Authority, Tier},
  embed::HashEmbedder,
  episode::{NewEpisode, Outcome},
  fact::{FactValue, NewFact, Scope},
  lifecycle::{FactStatus, UpsertOutcome},
  project::ProjectId,
  resolver::{AuthorityResolver, ResolverConfig},
  store::{EpisodicStore, FactQuery, SemanticStore, SymbolicStore},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn project(id: &str) -> ProjectId { ProjectId::new(id).unwrap() }

fn port_fact(scope: Scope, port: f64, confidence: f64) -> NewFact {
  NewFact::new(scope, "network", "port", port).with_confidence(confidence)
}

// ─── Projects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_list_projects() {
  let s = store().await;
  s.create_project(&project("beta"), "Beta").await.unwrap();
  s.create_project(&project("alpha"), "Alpha").await.unwrap();

  let all = s.list_projects().await.unwrap();
  let ids: Vec<_> = all.iter().map(|p| p.project_id.as_str()).collect();
  assert_eq!(ids, ["alpha", "beta"]);

  let fetched = s.get_project(&project("alpha")).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Alpha");
  assert!(s.get_project(&project("gamma")).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_project_errors() {
  let s = store().await;
  s.create_project(&project("alpha"), "Alpha").await.unwrap();
  let err = s.create_project(&project("alpha"), "Again").await.unwrap_err();
  assert!(matches!(err, Error::ProjectExists(_)));
}

// ─── Facts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_into_empty_key_is_accepted() {
  let s = store().await;
  let outcome = s
    .upsert_fact(port_fact(Scope::Global, 8002.0, 1.0))
    .await
    .unwrap();
  assert!(outcome.is_accepted());

  let facts = s.query_facts(&FactQuery::scope(Scope::Global)).await.unwrap();
  assert_eq!(facts.len(), 1);
  assert_eq!(facts[0].value, FactValue::Number(8002.0));
  assert_eq!(facts[0].source, "manual");
}

#[tokio::test]
async fn higher_confidence_replaces_active() {
  let s = store().await;
  s.upsert_fact(port_fact(Scope::Global, 8000.0, 0.5))
    .await
    .unwrap();
  let outcome = s
    .upsert_fact(port_fact(Scope::Global, 8002.0, 0.9))
    .await
    .unwrap();
  assert!(outcome.is_accepted());

  let facts = s.query_facts(&FactQuery::scope(Scope::Global)).await.unwrap();
  assert_eq!(facts.len(), 1);
  assert_eq!(facts[0].value, FactValue::Number(8002.0));
}

#[tokio::test]
async fn lower_confidence_is_shadowed() {
  let s = store().await;
  s.upsert_fact(port_fact(Scope::Global, 8002.0, 1.0))
    .await
    .unwrap();
  let outcome = s
    .upsert_fact(port_fact(Scope::Global, 9000.0, 0.4).with_source("docs"))
    .await
    .unwrap();

  match &outcome {
    UpsertOutcome::Shadowed { attempted, active } => {
      assert_eq!(attempted.value, FactValue::Number(9000.0));
      assert_eq!(active.value, FactValue::Number(8002.0));
    }
    other => panic!("expected shadowed, got {other:?}"),
  }
  assert_eq!(outcome.active().value, FactValue::Number(8002.0));

  let facts = s.query_facts(&FactQuery::scope(Scope::Global)).await.unwrap();
  assert_eq!(facts.len(), 1);
  assert_eq!(facts[0].value, FactValue::Number(8002.0));
}

#[tokio::test]
async fn equal_confidence_last_write_wins() {
  let s = store().await;
  let first = s
    .upsert_fact(port_fact(Scope::Global, 8000.0, 0.8))
    .await
    .unwrap()
    .into_active();
  let second = s
    .upsert_fact(port_fact(Scope::Global, 8001.0, 0.8))
    .await
    .unwrap();
  assert!(second.is_accepted());

  let second = second.into_active();
  assert_eq!(second.value, FactValue::Number(8001.0));
  // The key's creation time survives the replacement.
  assert_eq!(second.created_at, first.created_at);
  assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn written_records_equal_what_is_read_back() {
  let s = store().await;
  let alpha = project("alpha");

  let fact = s
    .upsert_fact(port_fact(Scope::project(&alpha), 8002.0, 0.9))
    .await
    .unwrap()
    .into_active();
  let stored = s
    .query_facts(&FactQuery::scope(Scope::project(&alpha)))
    .await
    .unwrap();
  assert_eq!(stored, [fact]);

  let episode = s
    .add_episode(NewEpisode::new(alpha.clone(), "pin the toolchain", Outcome::Partial))
    .await
    .unwrap();
  assert_eq!(s.query_episodes(&alpha, 1).await.unwrap(), [episode]);

  let created = s.create_project(&alpha, "Alpha").await.unwrap();
  assert_eq!(s.get_project(&alpha).await.unwrap(), Some(created));
}

#[tokio::test]
async fn out_of_range_confidence_writes_nothing() {
  let s = store().await;
  for bad in [1.5, -0.1, f64::NAN] {
    let err = s
      .upsert_fact(port_fact(Scope::Global, 1.0, bad))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Core(strata_core::Error::InvalidConfidence(_))));
  }
  let history = s
    .fact_history(&Scope::Global, "network", "port")
    .await
    .unwrap();
  assert!(history.is_empty());
}

#[tokio::test]
async fn scopes_do_not_interfere() {
  let s = store().await;
  let alpha = project("alpha");
  s.upsert_fact(port_fact(Scope::Global, 8002.0, 1.0))
    .await
    .unwrap();
  let outcome = s
    .upsert_fact(port_fact(Scope::project(&alpha), 7000.0, 0.1))
    .await
    .unwrap();
  // A project-scoped key is independent of the global one.
  assert!(outcome.is_accepted());

  let project_facts = s
    .query_facts(&FactQuery::scope(Scope::project(&alpha)))
    .await
    .unwrap();
  assert_eq!(project_facts.len(), 1);
  assert_eq!(project_facts[0].value, FactValue::Number(7000.0));
}

#[tokio::test]
async fn query_filters_and_orders_by_confidence() {
  let s = store().await;
  s.upsert_fact(NewFact::new(Scope::Global, "network", "port", 8002.0).with_confidence(0.6))
    .await
    .unwrap();
  s.upsert_fact(NewFact::new(Scope::Global, "network", "host", "db.internal"))
    .await
    .unwrap();
  s.upsert_fact(NewFact::new(Scope::Global, "owner", "team", "infra").with_confidence(0.9))
    .await
    .unwrap();

  let all = s.query_facts(&FactQuery::scope(Scope::Global)).await.unwrap();
  let keys: Vec<_> = all.iter().map(|f| f.key.as_str()).collect();
  assert_eq!(keys, ["host", "team", "port"]);

  let network = s
    .query_facts(&FactQuery::scope(Scope::Global).category("network"))
    .await
    .unwrap();
  assert_eq!(network.len(), 2);

  let host = s
    .query_facts(&FactQuery::scope(Scope::Global).category("network").key("host"))
    .await
    .unwrap();
  assert_eq!(host.len(), 1);
  assert_eq!(host[0].value, FactValue::Text("db.internal".into()));
}

#[tokio::test]
async fn history_records_every_version() {
  let s = store().await;
  let v1 = s
    .upsert_fact(port_fact(Scope::Global, 8000.0, 0.7))
    .await
    .unwrap()
    .into_active();
  let v2 = s
    .upsert_fact(port_fact(Scope::Global, 8002.0, 0.9))
    .await
    .unwrap()
    .into_active();
  let rejected = match s
    .upsert_fact(port_fact(Scope::Global, 9000.0, 0.2))
    .await
    .unwrap()
  {
    UpsertOutcome::Shadowed { attempted, .. } => attempted,
    other => panic!("expected shadowed, got {other:?}"),
  };

  let history = s
    .fact_history(&Scope::Global, "network", "port")
    .await
    .unwrap();
  assert_eq!(history.len(), 3);

  assert_eq!(history[0].fact.fact_id, v1.fact_id);
  assert!(matches!(history[0].status, FactStatus::Superseded { by, .. } if by == v2.fact_id));

  assert_eq!(history[1].fact.fact_id, v2.fact_id);
  assert!(history[1].status.is_active());

  assert_eq!(history[2].fact.fact_id, rejected.fact_id);
  assert!(matches!(history[2].status, FactStatus::Shadowed { by, .. } if by == v2.fact_id));

  let active = history.iter().filter(|h| h.status.is_active()).count();
  assert_eq!(active, 1);
}

#[tokio::test]
async fn facts_are_append_only() {
  let s = store().await;
  s.upsert_fact(port_fact(Scope::Global, 8002.0, 1.0))
    .await
    .unwrap();

  assert!(s.execute_raw("UPDATE facts SET confidence = 0.1").await.is_err());
  assert!(s.execute_raw("DELETE FROM facts").await.is_err());

  let facts = s.query_facts(&FactQuery::scope(Scope::Global)).await.unwrap();
  assert_eq!(facts.len(), 1);
}

// ─── Episodes ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn episodes_newest_first() {
  let s = store().await;
  let alpha = project("alpha");
  for lesson in ["first", "second", "third"] {
    s.add_episode(NewEpisode::new(alpha.clone(), lesson, Outcome::Success))
      .await
      .unwrap();
  }

  let latest = s.query_episodes(&alpha, 1).await.unwrap();
  assert_eq!(latest.len(), 1);
  assert_eq!(latest[0].lesson, "third");

  let all = s.query_episodes(&alpha, 10).await.unwrap();
  let lessons: Vec<_> = all.iter().map(|e| e.lesson.as_str()).collect();
  assert_eq!(lessons, ["third", "second", "first"]);
}

#[tokio::test]
async fn episodes_are_partitioned_by_project() {
  let s = store().await;
  s.add_episode(
    NewEpisode::new(project("alpha"), "pin the toolchain", Outcome::Failure)
      .with_context("ci broke on nightly"),
  )
  .await
  .unwrap();

  let beta = s.query_episodes(&project("beta"), 5).await.unwrap();
  assert!(beta.is_empty());

  let alpha = s.query_episodes(&project("alpha"), 5).await.unwrap();
  assert_eq!(alpha[0].outcome, Outcome::Failure);
  assert_eq!(alpha[0].context, "ci broke on nightly");
}

#[tokio::test]
async fn zero_episode_limit_errors() {
  let s = store().await;
  let err = s.query_episodes(&project("alpha"), 0).await.unwrap_err();
  assert!(matches!(err, Error::Core(strata_core::Error::InvalidLimit)));
}

#[tokio::test]
async fn episodes_are_append_only() {
  let s = store().await;
  s.add_episode(NewEpisode::new(project("alpha"), "lesson", Outcome::Partial))
    .await
    .unwrap();
  assert!(s.execute_raw("UPDATE episodes SET lesson = 'x'").await.is_err());
  assert!(s.execute_raw("DELETE FROM episodes").await.is_err());
}

// ─── Chunks ──────────────────────────────────────────────────────────────────

fn chunk(project_id: &ProjectId, source: &str, index: u32, text: &str, embedding: Vec<f32>) -> Chunk {
  Chunk {
    chunk_id: Uuid::new_v4(),
    project_id: project_id.clone(),
    source_path: source.to_owned(),
    relative_path: source.trim_start_matches("/repo/").to_owned(),
    chunk_index: index,
    text: text.to_owned(),
    embedding,
    file_checksum: "abc123".to_owned(),
    extension: "md".to_owned(),
    ingested_at: Utc::now(),
  }
}

#[tokio::test]
async fn replace_swaps_whole_group() {
  let s = store().await;
  let alpha = project("alpha");
  let src = "/repo/notes.md";

  let first = vec![
    chunk(&alpha, src, 0, "one", vec![1.0, 0.0]),
    chunk(&alpha, src, 1, "two", vec![0.0, 1.0]),
    chunk(&alpha, src, 2, "three", vec![1.0, 1.0]),
  ];
  assert_eq!(s.replace_chunks(&alpha, src, first).await.unwrap(), 3);

  let second = vec![chunk(&alpha, src, 0, "only", vec![1.0, 0.0])];
  assert_eq!(s.replace_chunks(&alpha, src, second.clone()).await.unwrap(), 1);
  assert_eq!(s.chunk_count(&alpha).await.unwrap(), 1);

  // Replaying the same group is idempotent.
  s.replace_chunks(&alpha, src, second).await.unwrap();
  let sources = s.list_sources(&alpha).await.unwrap();
  assert_eq!(sources.len(), 1);
  assert_eq!(sources[0].chunk_count, 1);
  assert_eq!(sources[0].relative_path, "notes.md");
}

#[tokio::test]
async fn replace_rejects_foreign_chunk_and_keeps_old_group() {
  let s = store().await;
  let alpha = project("alpha");
  s.replace_chunks(&alpha, "/repo/a.md", vec![chunk(&alpha, "/repo/a.md", 0, "a", vec![1.0])])
    .await
    .unwrap();

  let err = s
    .replace_chunks(&alpha, "/repo/a.md", vec![chunk(&alpha, "/repo/b.md", 0, "b", vec![1.0])])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ChunkOutsideGroup { .. }));
  assert_eq!(s.chunk_count(&alpha).await.unwrap(), 1);
}

#[tokio::test]
async fn remove_source_drops_chunks() {
  let s = store().await;
  let alpha = project("alpha");
  s.replace_chunks(&alpha, "/repo/a.md", vec![
    chunk(&alpha, "/repo/a.md", 0, "a", vec![1.0]),
    chunk(&alpha, "/repo/a.md", 1, "b", vec![1.0]),
  ])
  .await
  .unwrap();

  assert_eq!(s.remove_source(&alpha, "/repo/a.md").await.unwrap(), 2);
  assert_eq!(s.remove_source(&alpha, "/repo/a.md").await.unwrap(), 0);
  assert!(s.list_sources(&alpha).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_ranks_by_cosine() {
  let s = store().await;
  let alpha = project("alpha");
  s.replace_chunks(&alpha, "/repo/a.md", vec![
    chunk(&alpha, "/repo/a.md", 0, "orthogonal", vec![0.0, 1.0]),
    chunk(&alpha, "/repo/a.md", 1, "close", vec![0.6, 0.8]),
    chunk(&alpha, "/repo/a.md", 2, "exact", vec![1.0, 0.0]),
  ])
  .await
  .unwrap();

  let hits = s.search(&alpha, &[1.0, 0.0], 2).await.unwrap();
  let texts: Vec<_> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
  assert_eq!(texts, ["exact", "close"]);
  assert!((hits[0].score - 1.0).abs() < 1e-9);
  assert!((hits[1].score - 0.6).abs() < 1e-6);
  assert_eq!(hits[0].chunk.embedding, vec![1.0, 0.0]);
}

#[tokio::test]
async fn search_ties_prefer_newest() {
  let s = store().await;
  let alpha = project("alpha");
  let mut old = chunk(&alpha, "/repo/old.md", 0, "old", vec![1.0, 0.0]);
  old.ingested_at = Utc::now() - Duration::days(1);
  let new = chunk(&alpha, "/repo/new.md", 0, "new", vec![2.0, 0.0]);

  s.replace_chunks(&alpha, "/repo/old.md", vec![old]).await.unwrap();
  s.replace_chunks(&alpha, "/repo/new.md", vec![new]).await.unwrap();

  let hits = s.search(&alpha, &[1.0, 0.0], 5).await.unwrap();
  let texts: Vec<_> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
  assert_eq!(texts, ["new", "old"]);
}

#[tokio::test]
async fn search_empty_or_other_project_returns_nothing() {
  let s = store().await;
  let alpha = project("alpha");
  assert!(s.search(&alpha, &[1.0, 0.0], 5).await.unwrap().is_empty());

  s.replace_chunks(&alpha, "/repo/a.md", vec![chunk(&alpha, "/repo/a.md", 0, "a", vec![1.0, 0.0])])
    .await
    .unwrap();
  assert!(s.search(&project("beta"), &[1.0, 0.0], 5).await.unwrap().is_empty());
  assert!(s.search(&alpha, &[1.0, 0.0], 0).await.unwrap().is_empty());
  // Mismatched dimensions never match.
  assert!(s.search(&alpha, &[1.0, 0.0, 0.0], 5).await.unwrap().is_empty());
}

// ─── Resolver ────────────────────────────────────────────────────────────────

fn resolver(
  s: &SqliteStore,
  config: ResolverConfig,
) -> AuthorityResolver<SqliteStore, SqliteStore, SqliteStore, HashEmbedder> {
  let shared = Arc::new(s.clone());
  AuthorityResolver::new(
    shared.clone(),
    shared.clone(),
    shared,
    Arc::new(HashEmbedder::default()),
    config,
  )
}

#[tokio::test]
async fn facts_outrank_conflicting_documents() {
  let s = store().await;
  let alpha = project("alpha");
  let embedder = HashEmbedder::default();

  s.upsert_fact(NewFact::new(Scope::Global, "network", "port", 8002.0))
    .await
    .unwrap();
  let text = "The service listens on port 9000.";
  s.replace_chunks(&alpha, "/repo/README.md", vec![chunk(
    &alpha,
    "/repo/README.md",
    0,
    text,
    embedder.embed_sync(text),
  )])
  .await
  .unwrap();
  s.add_episode(NewEpisode::new(alpha.clone(), "check the port fact first", Outcome::Success))
    .await
    .unwrap();

  let bundle = resolver(&s, ResolverConfig::default())
    .get_context(&alpha, "which port does the service listen on")
    .await
    .unwrap();

  assert_eq!(bundle.items.len(), 3);
  assert_eq!(bundle.items[0].tier, Tier::Symbolic);
  assert_eq!(bundle.items[0].authority, Authority::Authoritative);
  assert_eq!(bundle.items[1].authority, Authority::Advisory);
  assert_eq!(bundle.items[2].tier, Tier::Semantic);
  assert_eq!(bundle.items[2].authority, Authority::Evidentiary);

  let fact = bundle.facts().next().unwrap();
  assert_eq!(fact.value, FactValue::Number(8002.0));
  assert!(bundle.chunks().next().unwrap().chunk.text.contains("9000"));

  let rendered = bundle.render();
  let facts_at = rendered.find("## Facts").unwrap();
  let lessons_at = rendered.find("## Lessons").unwrap();
  let docs_at = rendered.find("## Documents").unwrap();
  assert!(facts_at < lessons_at && lessons_at < docs_at);
  assert!(rendered.contains("8002"));
}

#[tokio::test]
async fn project_facts_precede_global_facts() {
  let s = store().await;
  let alpha = project("alpha");
  s.upsert_fact(NewFact::new(Scope::Global, "owner", "team", "platform"))
    .await
    .unwrap();
  s.upsert_fact(NewFact::new(Scope::project(&alpha), "owner", "team", "payments"))
    .await
    .unwrap();
  s.upsert_fact(NewFact::new(Scope::project(&project("beta")), "owner", "team", "other"))
    .await
    .unwrap();

  let bundle = resolver(&s, ResolverConfig::default())
    .get_context(&alpha, "who owns this")
    .await
    .unwrap();

  let values: Vec<_> = bundle.facts().map(|f| f.value.to_string()).collect();
  assert_eq!(values, ["payments", "platform"]);
  assert!(bundle.chunks().next().is_none());
}

#[tokio::test]
async fn disabled_tiers_are_omitted() {
  let s = store().await;
  let alpha = project("alpha");
  s.add_episode(NewEpisode::new(alpha.clone(), "lesson", Outcome::Success))
    .await
    .unwrap();

  let bundle = resolver(&s, ResolverConfig {
    episode_limit: 0,
    top_k:         0,
  })
  .get_context(&alpha, "anything")
  .await
  .unwrap();
  assert!(bundle.is_empty());
  assert_eq!(bundle.render(), "");
}
