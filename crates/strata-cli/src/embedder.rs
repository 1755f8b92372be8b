//! Embedders selectable from settings.

use std::time::Duration;

use anyhow::{Context as _, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use strata_core::embed::{EmbedError, Embedder, HashEmbedder};

use crate::settings::{EmbedderKind, EmbedderSettings};

// ─── HTTP ────────────────────────────────────────────────────────────────────

/// Client for an Ollama-style embedding endpoint.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpEmbedder {
  client: Client,
  url:    String,
  model:  String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model:  &'a str,
  prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  embedding: Vec<f32>,
}

impl HttpEmbedder {
  pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self {
      client,
      url: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
      model: model.to_owned(),
    })
  }
}

impl Embedder for HttpEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    let resp = self
      .client
      .post(&self.url)
      .json(&EmbeddingRequest {
        model:  &self.model,
        prompt: text,
      })
      .send()
      .await
      .map_err(|e| EmbedError::Provider(format!("POST {}: {e}", self.url)))?;

    if !resp.status().is_success() {
      return Err(EmbedError::Provider(format!(
        "POST {} → {}",
        self.url,
        resp.status()
      )));
    }

    let body: EmbeddingResponse = resp
      .json()
      .await
      .map_err(|e| EmbedError::Provider(format!("decoding embedding response: {e}")))?;
    Ok(body.embedding)
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

pub enum ConfiguredEmbedder {
  Hash(HashEmbedder),
  Http(HttpEmbedder),
}

impl ConfiguredEmbedder {
  pub fn from_settings(settings: &EmbedderSettings) -> Result<Self> {
    Ok(match settings.kind {
      EmbedderKind::Hash => Self::Hash(HashEmbedder::new(settings.dimensions)),
      EmbedderKind::Http => Self::Http(HttpEmbedder::new(
        &settings.url,
        &settings.model,
        Duration::from_secs(settings.timeout_secs),
      )?),
    })
  }

  pub fn describe(&self) -> String {
    match self {
      Self::Hash(e) => format!("hash ({} dimensions)", e.dimensions()),
      Self::Http(e) => format!("http ({} via {})", e.model, e.url),
    }
  }
}

impl Embedder for ConfiguredEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    match self {
      Self::Hash(e) => e.embed(text).await,
      Self::Http(e) => e.embed(text).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn hash_kind_is_deterministic() {
    let settings = EmbedderSettings {
      dimensions: 32,
      ..EmbedderSettings::default()
    };
    let embedder = ConfiguredEmbedder::from_settings(&settings).unwrap();
    let a = embedder.embed("port 8002").await.unwrap();
    let b = embedder.embed("port 8002").await.unwrap();
    assert_eq!(a.len(), 32);
    assert_eq!(a, b);
    assert_eq!(embedder.describe(), "hash (32 dimensions)");
  }

  #[test]
  fn http_url_is_normalised() {
    let settings = EmbedderSettings {
      kind: EmbedderKind::Http,
      url: "http://embed.local:11434/".to_owned(),
      ..EmbedderSettings::default()
    };
    let ConfiguredEmbedder::Http(http) = ConfiguredEmbedder::from_settings(&settings).unwrap()
    else {
      panic!("expected http embedder");
    };
    assert_eq!(http.url, "http://embed.local:11434/api/embeddings");
  }
}
