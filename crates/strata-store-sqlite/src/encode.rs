//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that lexical order equals chronological order.
//! Embeddings are little-endian `f32` blobs. UUIDs are hyphenated lowercase.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use strata_core::{
  chunk::{Chunk, SourceSummary},
  episode::{Episode, Outcome},
  fact::{Confidence, Fact, FactValue, Scope},
  lifecycle::{FactStatus, ResolvedFact},
  project::{Project, ProjectId, ProjectStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

/// The current time truncated to the precision [`encode_dt`] keeps, so a
/// record handed back from a write equals the one read back later.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_project_status(s: ProjectStatus) -> &'static str {
  match s {
    ProjectStatus::Active => "active",
    ProjectStatus::Archived => "archived",
  }
}

pub fn decode_project_status(s: &str) -> Result<ProjectStatus> {
  match s {
    "active" => Ok(ProjectStatus::Active),
    "archived" => Ok(ProjectStatus::Archived),
    other => Err(Error::Decode(format!("unknown project status: {other:?}"))),
  }
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
  for value in vector {
    bytes.extend_from_slice(&value.to_le_bytes());
  }
  bytes
}

/// Trailing bytes that do not form a whole `f32` are ignored; the
/// `dimensions` column is what callers trust.
pub fn decode_embedding(blob: &[u8]) -> Vec<f32> {
  blob
    .chunks_exact(4)
    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    .collect()
}

// ─── Facts ───────────────────────────────────────────────────────────────────

/// Column list matching [`read_fact`]; prefix with a table alias as needed.
pub const FACT_COLUMNS: &str = "f.fact_id, f.scope, f.category, f.key, f.value_type, \
   f.value_json, f.confidence, f.source, f.created_at, f.updated_at";

/// Raw values read directly from a `facts` row.
#[derive(Debug, Clone)]
pub struct RawFact {
  pub fact_id:    String,
  pub scope:      String,
  pub category:   String,
  pub key:        String,
  pub value_type: String,
  pub value_json: String,
  pub confidence: f64,
  pub source:     String,
  pub created_at: String,
  pub updated_at: String,
}

pub fn read_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFact> {
  Ok(RawFact {
    fact_id:    row.get(0)?,
    scope:      row.get(1)?,
    category:   row.get(2)?,
    key:        row.get(3)?,
    value_type: row.get(4)?,
    value_json: row.get(5)?,
    confidence: row.get(6)?,
    source:     row.get(7)?,
    created_at: row.get(8)?,
    updated_at: row.get(9)?,
  })
}

impl RawFact {
  pub fn from_fact(fact: &Fact) -> Result<Self> {
    Ok(Self {
      fact_id:    encode_uuid(fact.fact_id),
      scope:      fact.scope.to_string(),
      category:   fact.category.clone(),
      key:        fact.key.clone(),
      value_type: fact.value.discriminant().to_owned(),
      value_json: fact.value.to_json()?.to_string(),
      confidence: fact.confidence.get(),
      source:     fact.source.clone(),
      created_at: encode_dt(fact.created_at),
      updated_at: encode_dt(fact.updated_at),
    })
  }

  pub fn into_fact(self) -> Result<Fact> {
    let value_json: serde_json::Value = serde_json::from_str(&self.value_json)?;
    Ok(Fact {
      fact_id:    decode_uuid(&self.fact_id)?,
      scope:      self.scope.parse::<Scope>()?,
      category:   self.category,
      key:        self.key,
      value:      FactValue::from_parts(&self.value_type, value_json)?,
      confidence: Confidence::new(self.confidence)?,
      source:     self.source,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// A `facts` row joined with both lifecycle tables.
pub struct RawResolvedFact {
  pub fact:          RawFact,
  pub superseded_by: Option<String>,
  pub superseded_at: Option<String>,
  pub shadowed_by:   Option<String>,
  pub shadowed_at:   Option<String>,
}

pub fn read_resolved_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawResolvedFact> {
  Ok(RawResolvedFact {
    fact:          read_fact(row)?,
    superseded_by: row.get(10)?,
    superseded_at: row.get(11)?,
    shadowed_by:   row.get(12)?,
    shadowed_at:   row.get(13)?,
  })
}

impl RawResolvedFact {
  pub fn into_resolved(self) -> Result<ResolvedFact> {
    let status = if let (Some(by), Some(at)) = (self.superseded_by, self.superseded_at) {
      FactStatus::Superseded {
        by: decode_uuid(&by)?,
        at: decode_dt(&at)?,
      }
    } else if let (Some(by), Some(at)) = (self.shadowed_by, self.shadowed_at) {
      FactStatus::Shadowed {
        by: decode_uuid(&by)?,
        at: decode_dt(&at)?,
      }
    } else {
      FactStatus::Active
    };
    Ok(ResolvedFact {
      fact: self.fact.into_fact()?,
      status,
    })
  }
}

// ─── Episodes ────────────────────────────────────────────────────────────────

pub struct RawEpisode {
  pub episode_id: String,
  pub project_id: String,
  pub lesson:     String,
  pub outcome:    String,
  pub context:    String,
  pub created_at: String,
}

pub fn read_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEpisode> {
  Ok(RawEpisode {
    episode_id: row.get(0)?,
    project_id: row.get(1)?,
    lesson:     row.get(2)?,
    outcome:    row.get(3)?,
    context:    row.get(4)?,
    created_at: row.get(5)?,
  })
}

impl RawEpisode {
  pub fn into_episode(self) -> Result<Episode> {
    Ok(Episode {
      episode_id: decode_uuid(&self.episode_id)?,
      project_id: ProjectId::new(self.project_id)?,
      lesson:     self.lesson,
      outcome:    self.outcome.parse::<Outcome>()?,
      context:    self.context,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Chunks ──────────────────────────────────────────────────────────────────

pub const CHUNK_COLUMNS: &str = "chunk_id, project_id, source_path, relative_path, \
   chunk_index, text, embedding, file_checksum, extension, ingested_at";

pub struct RawChunk {
  pub chunk_id:      String,
  pub project_id:    String,
  pub source_path:   String,
  pub relative_path: String,
  pub chunk_index:   i64,
  pub text:          String,
  pub embedding:     Vec<u8>,
  pub file_checksum: String,
  pub extension:     String,
  pub ingested_at:   String,
}

pub fn read_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawChunk> {
  Ok(RawChunk {
    chunk_id:      row.get(0)?,
    project_id:    row.get(1)?,
    source_path:   row.get(2)?,
    relative_path: row.get(3)?,
    chunk_index:   row.get(4)?,
    text:          row.get(5)?,
    embedding:     row.get(6)?,
    file_checksum: row.get(7)?,
    extension:     row.get(8)?,
    ingested_at:   row.get(9)?,
  })
}

impl RawChunk {
  pub fn from_chunk(chunk: &Chunk) -> Self {
    Self {
      chunk_id:      encode_uuid(chunk.chunk_id),
      project_id:    chunk.project_id.to_string(),
      source_path:   chunk.source_path.clone(),
      relative_path: chunk.relative_path.clone(),
      chunk_index:   i64::from(chunk.chunk_index),
      text:          chunk.text.clone(),
      embedding:     encode_embedding(&chunk.embedding),
      file_checksum: chunk.file_checksum.clone(),
      extension:     chunk.extension.clone(),
      ingested_at:   encode_dt(chunk.ingested_at),
    }
  }

  pub fn into_chunk(self) -> Result<Chunk> {
    let chunk_index = u32::try_from(self.chunk_index)
      .map_err(|_| Error::Decode(format!("chunk_index out of range: {}", self.chunk_index)))?;
    Ok(Chunk {
      chunk_id: decode_uuid(&self.chunk_id)?,
      project_id: ProjectId::new(self.project_id)?,
      source_path: self.source_path,
      relative_path: self.relative_path,
      chunk_index,
      text: self.text,
      embedding: decode_embedding(&self.embedding),
      file_checksum: self.file_checksum,
      extension: self.extension,
      ingested_at: decode_dt(&self.ingested_at)?,
    })
  }
}

pub struct RawSourceSummary {
  pub source_path:   String,
  pub relative_path: String,
  pub chunk_count:   i64,
  pub file_checksum: String,
  pub ingested_at:   String,
}

impl RawSourceSummary {
  pub fn into_summary(self) -> Result<SourceSummary> {
    Ok(SourceSummary {
      source_path:   self.source_path,
      relative_path: self.relative_path,
      chunk_count:   usize::try_from(self.chunk_count).unwrap_or_default(),
      file_checksum: self.file_checksum,
      ingested_at:   decode_dt(&self.ingested_at)?,
    })
  }
}

// ─── Projects ────────────────────────────────────────────────────────────────

pub struct RawProject {
  pub project_id: String,
  pub name:       String,
  pub status:     String,
  pub created_at: String,
}

pub fn read_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawProject> {
  Ok(RawProject {
    project_id: row.get(0)?,
    name:       row.get(1)?,
    status:     row.get(2)?,
    created_at: row.get(3)?,
  })
}

impl RawProject {
  pub fn into_project(self) -> Result<Project> {
    Ok(Project {
      project_id: ProjectId::new(self.project_id)?,
      name:       self.name,
      status:     decode_project_status(&self.status)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
