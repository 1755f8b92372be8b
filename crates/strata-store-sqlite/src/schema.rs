//! SQL schema for the Strata SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS projects (
    project_id  TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'active',   -- 'active' | 'archived'
    created_at  TEXT NOT NULL
);

-- ── Symbolic tier ───────────────────────────────────────────────────────────
-- Every upsert attempt lands here. Rows are never updated or deleted; which
-- row is active is derived from the two lifecycle tables below.
CREATE TABLE IF NOT EXISTS facts (
    fact_id     TEXT PRIMARY KEY,
    scope       TEXT NOT NULL,      -- 'global' | 'project:<id>'
    category    TEXT NOT NULL,
    key         TEXT NOT NULL,
    value_type  TEXT NOT NULL,      -- discriminant of FactValue
    value_json  TEXT NOT NULL,      -- JSON payload (inner value only)
    confidence  REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    source      TEXT NOT NULL,
    created_at  TEXT NOT NULL,      -- first assertion of the key
    updated_at  TEXT NOT NULL       -- when this row was recorded
);

-- An active fact replaced by an upsert of equal or higher confidence.
CREATE TABLE IF NOT EXISTS supersessions (
    old_fact_id TEXT NOT NULL REFERENCES facts(fact_id),
    new_fact_id TEXT NOT NULL REFERENCES facts(fact_id),
    recorded_at TEXT NOT NULL,
    UNIQUE (old_fact_id),
    CHECK  (old_fact_id != new_fact_id)
);

-- An upsert rejected because a more confident fact was active.
CREATE TABLE IF NOT EXISTS shadowings (
    fact_id        TEXT NOT NULL REFERENCES facts(fact_id),
    active_fact_id TEXT NOT NULL REFERENCES facts(fact_id),
    recorded_at    TEXT NOT NULL,
    UNIQUE (fact_id)
);

CREATE INDEX IF NOT EXISTS facts_key_idx ON facts(scope, category, key);

CREATE TRIGGER IF NOT EXISTS facts_no_update BEFORE UPDATE ON facts
BEGIN SELECT RAISE(ABORT, 'facts are append-only'); END;
CREATE TRIGGER IF NOT EXISTS facts_no_delete BEFORE DELETE ON facts
BEGIN SELECT RAISE(ABORT, 'facts are append-only'); END;

-- ── Episodic tier ───────────────────────────────────────────────────────────
-- `seq` orders episodes recorded within the same microsecond.
CREATE TABLE IF NOT EXISTS episodes (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    episode_id  TEXT NOT NULL UNIQUE,
    project_id  TEXT NOT NULL,
    lesson      TEXT NOT NULL,
    outcome     TEXT NOT NULL,      -- 'success' | 'failure' | 'partial'
    context     TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS episodes_project_idx ON episodes(project_id, created_at);

CREATE TRIGGER IF NOT EXISTS episodes_no_update BEFORE UPDATE ON episodes
BEGIN SELECT RAISE(ABORT, 'episodes are append-only'); END;
CREATE TRIGGER IF NOT EXISTS episodes_no_delete BEFORE DELETE ON episodes
BEGIN SELECT RAISE(ABORT, 'episodes are append-only'); END;

-- ── Semantic tier ───────────────────────────────────────────────────────────
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id       TEXT PRIMARY KEY,
    project_id     TEXT NOT NULL,
    source_path    TEXT NOT NULL,
    relative_path  TEXT NOT NULL,
    chunk_index    INTEGER NOT NULL,
    text           TEXT NOT NULL,
    embedding      BLOB NOT NULL,   -- little-endian f32 values
    dimensions     INTEGER NOT NULL,
    file_checksum  TEXT NOT NULL,
    extension      TEXT NOT NULL,
    ingested_at    TEXT NOT NULL,
    UNIQUE (project_id, source_path, chunk_index)
);

CREATE INDEX IF NOT EXISTS chunks_source_idx ON chunks(project_id, source_path);
CREATE INDEX IF NOT EXISTS chunks_dims_idx   ON chunks(project_id, dimensions);

PRAGMA user_version = 1;
";
