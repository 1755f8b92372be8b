//! Fact types: the authoritative tier of the memory engine.
//!
//! A fact is a key/value assertion inside a scope. Fact rows are immutable
//! once written; replacing the active value of a key records a new fact and a
//! lifecycle event (see [`crate::lifecycle`]).

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, project::ProjectId};

// ─── Scope ───────────────────────────────────────────────────────────────────

/// The partition a fact lives in. Rendered as `global` or `project:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
  /// Applies to every project.
  Global,
  /// Applies to a single project only.
  Project(ProjectId),
}

impl Scope {
  pub fn project(id: &ProjectId) -> Self { Self::Project(id.clone()) }

  pub fn is_global(&self) -> bool { matches!(self, Self::Global) }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Global => f.write_str("global"),
      Self::Project(id) => write!(f, "project:{id}"),
    }
  }
}

impl FromStr for Scope {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    if s == "global" {
      return Ok(Self::Global);
    }
    match s.strip_prefix("project:") {
      Some(id) => ProjectId::new(id)
        .map(Self::Project)
        .map_err(|_| Error::InvalidScope(s.to_owned())),
      None => Err(Error::InvalidScope(s.to_owned())),
    }
  }
}

impl TryFrom<String> for Scope {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<Scope> for String {
  fn from(scope: Scope) -> Self { scope.to_string() }
}

// ─── Confidence ──────────────────────────────────────────────────────────────

/// How strongly the source vouches for a fact, validated to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
  pub const CERTAIN: Self = Self(1.0);

  pub fn new(value: f64) -> Result<Self> {
    if (0.0..=1.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(Error::InvalidConfidence(value))
    }
  }

  pub fn get(self) -> f64 { self.0 }
}

impl TryFrom<f64> for Confidence {
  type Error = Error;

  fn try_from(value: f64) -> Result<Self> { Self::new(value) }
}

impl From<Confidence> for f64 {
  fn from(c: Confidence) -> Self { c.0 }
}

impl fmt::Display for Confidence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:.2}", self.0)
  }
}

// ─── FactValue ───────────────────────────────────────────────────────────────

/// The typed payload of a fact. The variant name is the `value_type`
/// discriminant stored alongside the JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FactValue {
  Text(String),
  Number(f64),
  /// Structured values that do not reduce to a scalar.
  Json(serde_json::Value),
}

impl FactValue {
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Text(_) => "text",
      Self::Number(_) => "number",
      Self::Json(_) => "json",
    }
  }

  /// Serialise the inner payload (without the type tag).
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("value").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild a value from its discriminant and JSON payload.
  pub fn from_parts(discriminant: &str, data: serde_json::Value) -> Result<Self> {
    if !matches!(discriminant, "text" | "number" | "json") {
      return Err(Error::UnknownValueType(discriminant.to_owned()));
    }
    let wrapped = serde_json::json!({ "type": discriminant, "value": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

impl fmt::Display for FactValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Text(s) => f.write_str(s),
      Self::Number(n) => write!(f, "{n}"),
      Self::Json(v) => write!(f, "{v}"),
    }
  }
}

impl From<&str> for FactValue {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for FactValue {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<f64> for FactValue {
  fn from(n: f64) -> Self { Self::Number(n) }
}

// ─── Fact ────────────────────────────────────────────────────────────────────

/// One recorded version of a `(scope, category, key)` assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
  pub fact_id:    Uuid,
  pub scope:      Scope,
  pub category:   String,
  pub key:        String,
  pub value:      FactValue,
  pub confidence: Confidence,
  pub source:     String,
  /// When the key was first asserted; carried across replacements.
  pub created_at: DateTime<Utc>,
  /// When this version was recorded.
  pub updated_at: DateTime<Utc>,
}

// ─── NewFact ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::SymbolicStore::upsert_fact`]. Timestamps are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewFact {
  pub scope:      Scope,
  pub category:   String,
  pub key:        String,
  pub value:      FactValue,
  pub confidence: f64,
  pub source:     String,
}

impl NewFact {
  /// Convenience constructor: full confidence, `manual` source.
  pub fn new(
    scope: Scope,
    category: impl Into<String>,
    key: impl Into<String>,
    value: impl Into<FactValue>,
  ) -> Self {
    Self {
      scope,
      category: category.into(),
      key: key.into(),
      value: value.into(),
      confidence: 1.0,
      source: "manual".to_owned(),
    }
  }

  pub fn with_confidence(mut self, confidence: f64) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn with_source(mut self, source: impl Into<String>) -> Self {
    self.source = source.into();
    self
  }
}
