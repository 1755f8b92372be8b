//! The embedding boundary.
//!
//! Model inference is an external collaborator; the engine only needs
//! `embed(text) -> vector`. [`HashEmbedder`] is a deterministic offline
//! implementation used for tests and as a zero-setup default.

use std::future::Future;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
  #[error("embedding provider error: {0}")]
  Provider(String),

  #[error("embedding provider returned an empty vector")]
  EmptyVector,

  #[error("embedding contains non-finite values")]
  NonFinite,
}

/// Turns text into a dense vector.
pub trait Embedder: Send + Sync {
  fn embed<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Vec<f32>, EmbedError>> + Send + 'a;
}

impl<E: Embedder> Embedder for std::sync::Arc<E> {
  fn embed<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Vec<f32>, EmbedError>> + Send + 'a {
    (**self).embed(text)
  }
}

/// Reject vectors that would poison similarity scores.
pub fn validate_embedding(vector: &[f32]) -> Result<(), EmbedError> {
  if vector.is_empty() {
    return Err(EmbedError::EmptyVector);
  }
  if vector.iter().any(|v| !v.is_finite()) {
    return Err(EmbedError::NonFinite);
  }
  Ok(())
}

/// Cosine similarity, or `None` when the vectors are incomparable (length
/// mismatch, empty, or zero norm).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
  if a.len() != b.len() || a.is_empty() {
    return None;
  }

  let mut dot = 0.0f64;
  let mut norm_a = 0.0f64;
  let mut norm_b = 0.0f64;
  for (&x, &y) in a.iter().zip(b) {
    let (x, y) = (f64::from(x), f64::from(y));
    dot += x * y;
    norm_a += x * x;
    norm_b += y * y;
  }
  let denom = norm_a.sqrt() * norm_b.sqrt();
  if denom <= f64::EPSILON {
    return None;
  }
  Some(dot / denom)
}

// ─── HashEmbedder ────────────────────────────────────────────────────────────

/// Feature-hashing bag-of-words embedder.
///
/// Lower-cased alphanumeric tokens are hashed (FNV-1a) into `dimensions`
/// signed buckets and the result is L2-normalised. Texts sharing vocabulary
/// score higher, which is all the tests and offline use need.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
  dimensions: usize,
}

impl HashEmbedder {
  pub const DEFAULT_DIMENSIONS: usize = 256;

  pub fn new(dimensions: usize) -> Self {
    Self {
      dimensions: dimensions.max(1),
    }
  }

  pub fn dimensions(&self) -> usize { self.dimensions }

  pub fn embed_sync(&self, text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; self.dimensions];
    for token in text
      .split(|c: char| !c.is_alphanumeric())
      .filter(|t| !t.is_empty())
    {
      let hash = fnv1a(&token.to_lowercase());
      let bucket = (hash % self.dimensions as u64) as usize;
      let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
      vector[bucket] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
      vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
  }
}

impl Default for HashEmbedder {
  fn default() -> Self { Self::new(Self::DEFAULT_DIMENSIONS) }
}

impl Embedder for HashEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    Ok(self.embed_sync(text))
  }
}

fn fnv1a(s: &str) -> u64 {
  s.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
    (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
  })
}
