//! Layered configuration: built-in defaults, an optional TOML file, then
//! `STRATA_*` environment variables (`STRATA_EMBEDDER__URL` for nested keys).

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use serde::Deserialize;
use strata_core::{chunk::ChunkConfig, embed::HashEmbedder, resolver::ResolverConfig};
use strata_ingest::pipeline::DEFAULT_EXTENSIONS;

/// Read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
  /// Offline feature-hashing embedder.
  Hash,
  /// Ollama-compatible `POST /api/embeddings` endpoint.
  Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbedderSettings {
  pub kind:         EmbedderKind,
  pub url:          String,
  pub model:        String,
  /// Output size of the hash embedder. Ignored for `http`.
  pub dimensions:   usize,
  pub timeout_secs: u64,
}

impl Default for EmbedderSettings {
  fn default() -> Self {
    Self {
      kind:         EmbedderKind::Hash,
      url:          "http://localhost:11434".to_owned(),
      model:        "nomic-embed-text".to_owned(),
      dimensions:   HashEmbedder::DEFAULT_DIMENSIONS,
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub database_path:      PathBuf,
  /// Root of the per-project ledger and lock directories.
  pub state_dir:          PathBuf,
  pub chunk_size:         usize,
  pub chunk_overlap:      usize,
  pub extensions:         Vec<String>,
  pub exclude:            Vec<String>,
  pub use_gitignore:      bool,
  pub flush_interval:     usize,
  pub read_timeout_secs:  Option<u64>,
  pub embed_timeout_secs: Option<u64>,
  pub episode_limit:      usize,
  pub top_k:              usize,
  pub embedder:           EmbedderSettings,
}

impl Default for Settings {
  fn default() -> Self {
    let chunk = ChunkConfig::default();
    let resolver = ResolverConfig::default();
    Self {
      database_path:      PathBuf::from("~/.local/share/strata/strata.db"),
      state_dir:          PathBuf::from("~/.local/share/strata/state"),
      chunk_size:         chunk.chunk_size(),
      chunk_overlap:      chunk.overlap(),
      extensions:         DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_owned()).collect(),
      exclude:            Vec::new(),
      use_gitignore:      true,
      flush_interval:     25,
      read_timeout_secs:  Some(30),
      embed_timeout_secs: Some(60),
      episode_limit:      resolver.episode_limit,
      top_k:              resolver.top_k,
      embedder:           EmbedderSettings::default(),
    }
  }
}

impl Settings {
  /// Read the configuration file and the environment, with `~` expanded in
  /// the path settings.
  ///
  /// An explicitly given file must exist; without one, `strata.toml` in the
  /// working directory is read if present.
  pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
    let file = match path {
      Some(path) => config::File::from(path.to_path_buf()).required(true),
      None => config::File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
    };
    let raw = config::Config::builder()
      .add_source(file)
      .add_source(
        config::Environment::with_prefix("STRATA")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?;

    let mut settings: Self = raw
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.database_path = expand_tilde(&settings.database_path);
    settings.state_dir = expand_tilde(&settings.state_dir);
    Ok(settings)
  }

  pub fn resolver_config(&self) -> ResolverConfig {
    ResolverConfig {
      episode_limit: self.episode_limit,
      top_k:         self.top_k,
    }
  }

  pub fn read_timeout(&self) -> Option<Duration> {
    self.read_timeout_secs.map(Duration::from_secs)
  }

  pub fn embed_timeout(&self) -> Option<Duration> {
    self.embed_timeout_secs.map(Duration::from_secs)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
