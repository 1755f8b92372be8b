//! Chunks of the evidentiary tier, and the text splitter that produces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, project::ProjectId};

// ─── Records ─────────────────────────────────────────────────────────────────

/// One contiguous slice of an ingested document.
///
/// Chunks of a `(project_id, source_path)` pair are always replaced as a
/// group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
  pub chunk_id:      Uuid,
  pub project_id:    ProjectId,
  pub source_path:   String,
  /// Path relative to the ingestion root, `/`-separated.
  pub relative_path: String,
  pub chunk_index:   u32,
  pub text:          String,
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub embedding:     Vec<f32>,
  /// SHA-256 hex digest of the whole source file.
  pub file_checksum: String,
  /// Lower-case extension without the dot; empty when the file has none.
  pub extension:     String,
  pub ingested_at:   DateTime<Utc>,
}

/// A search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
  pub chunk: Chunk,
  /// Cosine similarity to the query embedding, in `[-1, 1]`.
  pub score: f64,
}

/// Per-file summary of what the semantic store currently holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
  pub source_path:   String,
  pub relative_path: String,
  pub chunk_count:   usize,
  pub file_checksum: String,
  pub ingested_at:   DateTime<Utc>,
}

// ─── Chunker ─────────────────────────────────────────────────────────────────

/// Window parameters for [`chunk_text`], measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
  chunk_size: usize,
  overlap:    usize,
}

impl ChunkConfig {
  pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
    if chunk_size == 0 || overlap >= chunk_size {
      return Err(Error::InvalidChunkConfig { chunk_size, overlap });
    }
    Ok(Self { chunk_size, overlap })
  }

  pub fn chunk_size(&self) -> usize { self.chunk_size }

  pub fn overlap(&self) -> usize { self.overlap }

  /// How far back from the hard cut a paragraph or sentence break may be.
  /// Capped so that every window still advances past the overlap.
  fn tolerance(&self) -> usize {
    (self.chunk_size / 10).min(self.chunk_size - self.overlap - 1)
  }
}

impl Default for ChunkConfig {
  fn default() -> Self {
    Self {
      chunk_size: 1000,
      overlap:    100,
    }
  }
}

/// Split `text` into overlapping windows.
///
/// Consecutive chunks share exactly `overlap` characters. A window ends on a
/// paragraph break, else a sentence end, when one lies within the tolerance
/// window before the hard cut.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
  let chars: Vec<char> = text.chars().collect();
  let len = chars.len();
  let mut chunks = Vec::new();
  let mut start = 0;

  while start < len {
    if len - start <= config.chunk_size {
      chunks.push(chars[start..].iter().collect());
      break;
    }

    let hard_end = start + config.chunk_size;
    let end = find_break(&chars, hard_end - config.tolerance(), hard_end)
      .unwrap_or(hard_end);

    chunks.push(chars[start..end].iter().collect());
    start = end - config.overlap;
  }

  chunks
}

/// Find the best cut position in `[lo, hi]`, scanning backwards. Returns the
/// index one past the break so the delimiter stays with the earlier chunk.
fn find_break(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
  let paragraph = (lo..=hi)
    .rev()
    .find(|&i| i >= 2 && chars[i - 1] == '\n' && chars[i - 2] == '\n');
  if paragraph.is_some() {
    return paragraph;
  }

  (lo..=hi).rev().find(|&i| {
    i >= 2
      && i < chars.len()
      && matches!(chars[i - 2], '.' | '!' | '?')
      && chars[i - 1].is_whitespace()
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cfg(size: usize, overlap: usize) -> ChunkConfig {
    ChunkConfig::new(size, overlap).unwrap()
  }

  #[test]
  fn rejects_overlap_not_smaller_than_size() {
    assert!(matches!(
      ChunkConfig::new(100, 100),
      Err(Error::InvalidChunkConfig { .. })
    ));
    assert!(ChunkConfig::new(100, 150).is_err());
    assert!(ChunkConfig::new(0, 0).is_err());
    assert!(ChunkConfig::new(2, 1).is_ok());
  }

  #[test]
  fn empty_text_has_no_chunks() {
    assert!(chunk_text("", &cfg(10, 2)).is_empty());
  }

  #[test]
  fn short_text_is_a_single_chunk() {
    assert_eq!(chunk_text("hello", &cfg(10, 2)), vec!["hello".to_owned()]);
  }

  #[test]
  fn twelve_hundred_chars_make_three_overlapping_chunks() {
    let text: String = (0..1200).map(|i| (b'a' + (i % 26) as u8) as char).collect();
    let chunks = chunk_text(&text, &cfg(500, 50));
    assert_eq!(chunks.len(), 3);

    for pair in chunks.windows(2) {
      let (prev, next) = (&pair[0], &pair[1]);
      let tail: String = prev.chars().skip(prev.chars().count() - 50).collect();
      assert!(next.starts_with(&tail));
    }
    assert_eq!(chunks, chunk_text(&text, &cfg(500, 50)));
  }

  #[test]
  fn overlap_holds_with_sentence_breaks() {
    let sentence = "The quick brown fox jumps over the lazy dog. ";
    let text = sentence.repeat(27);
    assert_eq!(text.chars().count(), 1215);

    let chunks = chunk_text(&text, &cfg(500, 50));
    assert_eq!(chunks.len(), 3);
    for pair in chunks.windows(2) {
      let prev: Vec<char> = pair[0].chars().collect();
      let tail: String = prev[prev.len() - 50..].iter().collect();
      assert!(pair[1].starts_with(&tail));
    }
    // The first window ends on a sentence boundary, not mid-word.
    assert!(chunks[0].ends_with(". "));
  }

  #[test]
  fn prefers_paragraph_break_over_sentence_end() {
    let mut text = "a".repeat(90);
    text.push_str("\n\n");
    text.push_str("Short. ");
    text.push_str(&"b".repeat(200));
    let chunks = chunk_text(&text, &cfg(100, 10));
    assert!(chunks[0].ends_with("\n\n"));
    assert_eq!(chunks[0].chars().count(), 92);
  }

  #[test]
  fn hard_cut_without_nearby_break() {
    let text = "x".repeat(250);
    let chunks = chunk_text(&text, &cfg(100, 20));
    assert_eq!(
      chunks.iter().map(|c| c.chars().count()).collect::<Vec<_>>(),
      vec![100, 100, 90]
    );
  }

  #[test]
  fn counts_characters_not_bytes() {
    let text = "é".repeat(30);
    let chunks = chunk_text(&text, &cfg(20, 5));
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chars().count(), 20);
    assert_eq!(chunks[1].chars().count(), 15);
  }

  #[test]
  fn minimal_stride_still_terminates() {
    let text = "ab. cd. ef. gh. ".repeat(4);
    let chunks = chunk_text(&text, &cfg(2, 1));
    assert!(!chunks.is_empty());
    assert_eq!(chunks.len(), text.chars().count() - 1);
  }
}
