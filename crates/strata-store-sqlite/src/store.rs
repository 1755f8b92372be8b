//! [`SqliteStore`]: the SQLite implementation of the three memory tiers.

use std::path::Path;

use rusqlite::{OptionalExtension as _, TransactionBehavior};
use strata_core::{
  chunk::{Chunk, ScoredChunk, SourceSummary},
  embed::cosine_similarity,
  episode::{Episode, NewEpisode},
  fact::{Confidence, Fact, NewFact, Scope},
  lifecycle::{ResolvedFact, UpsertOutcome},
  project::{Project, ProjectId, ProjectStatus},
  store::{EpisodicStore, FactQuery, SemanticStore, SymbolicStore},
};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    CHUNK_COLUMNS, FACT_COLUMNS, RawChunk, RawFact, RawSourceSummary, decode_dt,
    decode_embedding, encode_dt, encode_project_status, encode_uuid, now, read_chunk,
    read_episode, read_fact, read_project, read_resolved_fact,
  },
  schema::SCHEMA,
};

/// `WHERE` fragment selecting facts that are neither superseded nor shadowed.
const ACTIVE_FACT: &str = "NOT EXISTS (SELECT 1 FROM supersessions s WHERE s.old_fact_id = f.fact_id)
   AND NOT EXISTS (SELECT 1 FROM shadowings h WHERE h.fact_id = f.fact_id)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// All three memory tiers backed by a single SQLite file.
///
/// Every call runs on the connection's dedicated thread, so writes are
/// serialised and multi-statement writes run in one transaction. Cloning is
/// cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Projects ──────────────────────────────────────────────────────────────

  /// Register a project. Fails if the id is already taken.
  pub async fn create_project(&self, project_id: &ProjectId, name: &str) -> Result<Project> {
    let project = Project {
      project_id: project_id.clone(),
      name:       name.to_owned(),
      status:     ProjectStatus::Active,
      created_at: now(),
    };

    let id_str     = project.project_id.to_string();
    let name_str   = project.name.clone();
    let status_str = encode_project_status(project.status);
    let at_str     = encode_dt(project.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO projects (project_id, name, status, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (project_id) DO NOTHING",
          rusqlite::params![id_str, name_str, status_str, at_str],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::ProjectExists(project_id.to_string()));
    }
    Ok(project)
  }

  pub async fn get_project(&self, project_id: &ProjectId) -> Result<Option<Project>> {
    let id_str = project_id.to_string();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT project_id, name, status, created_at FROM projects WHERE project_id = ?1",
              rusqlite::params![id_str],
              read_project,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(|r| r.into_project()).transpose()
  }

  pub async fn list_projects(&self) -> Result<Vec<Project>> {
    let raws = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT project_id, name, status, created_at FROM projects ORDER BY project_id",
        )?;
        let rows = stmt
          .query_map([], read_project)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(|r| r.into_project()).collect()
  }

  // ── Semantic statistics ───────────────────────────────────────────────────

  pub async fn chunk_count(&self, project_id: &ProjectId) -> Result<usize> {
    let id_str = project_id.to_string();
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM chunks WHERE project_id = ?1",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(usize::try_from(count).unwrap_or_default())
  }
}

// ─── SymbolicStore impl ──────────────────────────────────────────────────────

/// What happened inside the upsert transaction, in raw form.
struct UpsertRaw {
  active:     Option<RawFact>,
  shadowed:   bool,
  created_at: String,
}

impl SymbolicStore for SqliteStore {
  type Error = Error;

  async fn upsert_fact(&self, input: NewFact) -> Result<UpsertOutcome> {
    let confidence = Confidence::new(input.confidence)?;
    let now = now();
    let mut fact = Fact {
      fact_id: Uuid::new_v4(),
      scope: input.scope,
      category: input.category,
      key: input.key,
      value: input.value,
      confidence,
      source: input.source,
      created_at: now,
      updated_at: now,
    };

    let mut raw = RawFact::from_fact(&fact)?;
    let recorded_at = encode_dt(now);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let active = tx
          .query_row(
            &format!(
              "SELECT {FACT_COLUMNS} FROM facts f
               WHERE f.scope = ?1 AND f.category = ?2 AND f.key = ?3 AND {ACTIVE_FACT}
               ORDER BY f.updated_at DESC, f.rowid DESC
               LIMIT 1"
            ),
            rusqlite::params![raw.scope, raw.category, raw.key],
            read_fact,
          )
          .optional()?;

        // Strictly higher confidence keeps the incumbent; ties go to the
        // newer write.
        let shadowed = active
          .as_ref()
          .is_some_and(|a| a.confidence > raw.confidence);
        if let Some(a) = active.as_ref().filter(|_| !shadowed) {
          raw.created_at = a.created_at.clone();
        }

        tx.execute(
          "INSERT INTO facts (
             fact_id, scope, category, key, value_type, value_json,
             confidence, source, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            raw.fact_id,
            raw.scope,
            raw.category,
            raw.key,
            raw.value_type,
            raw.value_json,
            raw.confidence,
            raw.source,
            raw.created_at,
            raw.updated_at,
          ],
        )?;

        match &active {
          Some(a) if shadowed => {
            tx.execute(
              "INSERT INTO shadowings (fact_id, active_fact_id, recorded_at)
               VALUES (?1, ?2, ?3)",
              rusqlite::params![raw.fact_id, a.fact_id, recorded_at],
            )?;
          }
          Some(a) => {
            tx.execute(
              "INSERT INTO supersessions (old_fact_id, new_fact_id, recorded_at)
               VALUES (?1, ?2, ?3)",
              rusqlite::params![a.fact_id, raw.fact_id, recorded_at],
            )?;
          }
          None => {}
        }

        tx.commit()?;
        Ok(UpsertRaw {
          active,
          shadowed,
          created_at: raw.created_at,
        })
      })
      .await?;

    fact.created_at = decode_dt(&outcome.created_at)?;

    match outcome.active {
      Some(active) if outcome.shadowed => {
        let active = active.into_fact()?;
        debug!(
          scope = %fact.scope,
          category = %fact.category,
          key = %fact.key,
          attempted = fact.confidence.get(),
          active = active.confidence.get(),
          "fact upsert shadowed by more confident fact"
        );
        Ok(UpsertOutcome::Shadowed {
          attempted: fact,
          active,
        })
      }
      _ => Ok(UpsertOutcome::Accepted { fact }),
    }
  }

  async fn query_facts(&self, query: &FactQuery) -> Result<Vec<Fact>> {
    let scope_str = query.scope.to_string();
    let category  = query.category.clone();
    let key       = query.key.clone();

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FACT_COLUMNS} FROM facts f
           WHERE f.scope = ?1
             AND (?2 IS NULL OR f.category = ?2)
             AND (?3 IS NULL OR f.key = ?3)
             AND {ACTIVE_FACT}
           ORDER BY f.confidence DESC, f.updated_at DESC, f.rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![scope_str, category, key], read_fact)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFact::into_fact).collect()
  }

  async fn fact_history(
    &self,
    scope: &Scope,
    category: &str,
    key: &str,
  ) -> Result<Vec<ResolvedFact>> {
    let scope_str = scope.to_string();
    let category  = category.to_owned();
    let key       = key.to_owned();

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FACT_COLUMNS},
             s.new_fact_id    AS superseded_by,
             s.recorded_at    AS superseded_at,
             h.active_fact_id AS shadowed_by,
             h.recorded_at    AS shadowed_at
           FROM facts f
           LEFT JOIN supersessions s ON s.old_fact_id = f.fact_id
           LEFT JOIN shadowings    h ON h.fact_id     = f.fact_id
           WHERE f.scope = ?1 AND f.category = ?2 AND f.key = ?3
           ORDER BY f.updated_at ASC, f.rowid ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![scope_str, category, key], read_resolved_fact)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_resolved()).collect()
  }
}

// ─── EpisodicStore impl ──────────────────────────────────────────────────────

impl EpisodicStore for SqliteStore {
  type Error = Error;

  async fn add_episode(&self, input: NewEpisode) -> Result<Episode> {
    let episode = Episode {
      episode_id: Uuid::new_v4(),
      project_id: input.project_id,
      lesson:     input.lesson,
      outcome:    input.outcome,
      context:    input.context,
      created_at: now(),
    };

    let id_str      = encode_uuid(episode.episode_id);
    let project_str = episode.project_id.to_string();
    let lesson      = episode.lesson.clone();
    let outcome_str = episode.outcome.as_str();
    let context     = episode.context.clone();
    let at_str      = encode_dt(episode.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO episodes (episode_id, project_id, lesson, outcome, context, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, project_str, lesson, outcome_str, context, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(episode)
  }

  async fn query_episodes(&self, project_id: &ProjectId, limit: usize) -> Result<Vec<Episode>> {
    if limit == 0 {
      return Err(strata_core::Error::InvalidLimit.into());
    }
    let project_str = project_id.to_string();
    let limit_val   = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT episode_id, project_id, lesson, outcome, context, created_at
           FROM episodes
           WHERE project_id = ?1
           ORDER BY created_at DESC, seq DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![project_str, limit_val], read_episode)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_episode()).collect()
  }
}

// ─── SemanticStore impl ──────────────────────────────────────────────────────

impl SemanticStore for SqliteStore {
  type Error = Error;

  async fn replace_chunks(
    &self,
    project_id: &ProjectId,
    source_path: &str,
    chunks: Vec<Chunk>,
  ) -> Result<usize> {
    if let Some(stray) = chunks
      .iter()
      .find(|c| &c.project_id != project_id || c.source_path != source_path)
    {
      return Err(Error::ChunkOutsideGroup {
        expected: format!("{project_id}:{source_path}"),
        found:    format!("{}:{}", stray.project_id, stray.source_path),
      });
    }

    let project_str = project_id.to_string();
    let source_str  = source_path.to_owned();
    let raws: Vec<(RawChunk, i64)> = chunks
      .iter()
      .map(|c| {
        let dims = i64::try_from(c.embedding.len()).unwrap_or(i64::MAX);
        (RawChunk::from_chunk(c), dims)
      })
      .collect();

    let (removed, inserted) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute(
          "DELETE FROM chunks WHERE project_id = ?1 AND source_path = ?2",
          rusqlite::params![project_str, source_str],
        )?;
        {
          let mut insert = tx.prepare(&format!(
            "INSERT INTO chunks ({CHUNK_COLUMNS}, dimensions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
          ))?;
          for (raw, dims) in &raws {
            insert.execute(rusqlite::params![
              raw.chunk_id,
              raw.project_id,
              raw.source_path,
              raw.relative_path,
              raw.chunk_index,
              raw.text,
              raw.embedding,
              raw.file_checksum,
              raw.extension,
              raw.ingested_at,
              dims,
            ])?;
          }
        }
        tx.commit()?;
        Ok((removed, raws.len()))
      })
      .await?;

    debug!(project = %project_id, source = source_path, removed, inserted, "replaced chunks");
    Ok(inserted)
  }

  async fn remove_source(&self, project_id: &ProjectId, source_path: &str) -> Result<usize> {
    let project_str = project_id.to_string();
    let source_str  = source_path.to_owned();
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM chunks WHERE project_id = ?1 AND source_path = ?2",
          rusqlite::params![project_str, source_str],
        )?)
      })
      .await?;
    Ok(removed)
  }

  async fn search(
    &self,
    project_id: &ProjectId,
    query_embedding: &[f32],
    top_k: usize,
  ) -> Result<Vec<ScoredChunk>> {
    if top_k == 0 || query_embedding.is_empty() {
      return Ok(Vec::new());
    }

    let project_str = project_id.to_string();
    let query       = query_embedding.to_vec();
    let dims        = i64::try_from(query.len()).unwrap_or(i64::MAX);

    // Score on (rowid, embedding, ingested_at) only, then fetch the full rows
    // of the winners.
    let hits: Vec<(RawChunk, f64)> = self
      .conn
      .call(move |conn| {
        let mut scan = conn.prepare(
          "SELECT rowid, embedding, ingested_at FROM chunks
           WHERE project_id = ?1 AND dimensions = ?2",
        )?;
        let mut scored = Vec::new();
        let rows = scan.query_map(rusqlite::params![project_str, dims], |row| {
          Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Vec<u8>>(1)?,
            row.get::<_, String>(2)?,
          ))
        })?;
        for row in rows {
          let (rowid, blob, ingested_at) = row?;
          if let Some(score) = cosine_similarity(&query, &decode_embedding(&blob)) {
            scored.push((rowid, score, ingested_at));
          }
        }

        scored.sort_by(|a, b| {
          b.1
            .total_cmp(&a.1)
            .then_with(|| b.2.cmp(&a.2))
            .then_with(|| b.0.cmp(&a.0))
        });
        scored.truncate(top_k);

        let mut fetch =
          conn.prepare(&format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE rowid = ?1"))?;
        let mut hits = Vec::with_capacity(scored.len());
        for (rowid, score, _) in scored {
          hits.push((fetch.query_row(rusqlite::params![rowid], read_chunk)?, score));
        }
        Ok(hits)
      })
      .await?;

    hits
      .into_iter()
      .map(|(raw, score)| {
        Ok(ScoredChunk {
          chunk: raw.into_chunk()?,
          score,
        })
      })
      .collect()
  }

  async fn list_sources(&self, project_id: &ProjectId) -> Result<Vec<SourceSummary>> {
    let project_str = project_id.to_string();
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT source_path, relative_path, COUNT(*), file_checksum, MAX(ingested_at)
           FROM chunks
           WHERE project_id = ?1
           GROUP BY source_path
           ORDER BY source_path",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![project_str], |row| {
            Ok(RawSourceSummary {
              source_path:   row.get(0)?,
              relative_path: row.get(1)?,
              chunk_count:   row.get(2)?,
              file_checksum: row.get(3)?,
              ingested_at:   row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSourceSummary::into_summary).collect()
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Run arbitrary SQL, bypassing the store API.
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<usize> {
    Ok(self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await?)
  }
}
