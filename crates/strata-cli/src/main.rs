//! `strata`: command-line front end for the Strata memory engine.
//!
//! Reads `strata.toml` (or the path given with `--config`) layered under
//! `STRATA_*` environment variables, opens the SQLite store and runs one
//! command. Ingestion is meant to be run on demand or from cron.
//!
//! # Usage
//!
//! ```text
//! strata project add payments --name "Payments API"
//! strata ingest payments ~/src/payments
//! strata fact set global network port 8002 --kind number
//! strata episode add payments "pin the toolchain before bumping deps" --outcome failure
//! strata context payments "which port does the service listen on"
//! ```

mod embedder;
mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use strata_core::{
  context::ContextPayload,
  embed::{Embedder as _, validate_embedding},
  episode::{NewEpisode, Outcome},
  fact::{FactValue, NewFact, Scope},
  lifecycle::{FactStatus, UpsertOutcome},
  project::ProjectId,
  resolver::AuthorityResolver,
  store::{EpisodicStore as _, FactQuery, SemanticStore as _, SymbolicStore as _},
};
use strata_ingest::{IngestOptions, IngestSummary, IngestionPipeline};
use strata_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{
  embedder::ConfiguredEmbedder,
  settings::{Settings, expand_tilde},
};

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "strata", author, version, about = "Multi-tier memory engine")]
struct Cli {
  /// Path to the TOML configuration file; must exist when given. Defaults
  /// to `strata.toml` in the working directory, if present.
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Database path, overriding the configuration.
  #[arg(long, global = true, value_name = "FILE")]
  database: Option<PathBuf>,

  /// Print machine-readable JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Sync a directory tree into a project's document store.
  Ingest(IngestArgs),

  /// Authoritative facts.
  #[command(subcommand)]
  Fact(FactCommand),

  /// Lessons learned.
  #[command(subcommand)]
  Episode(EpisodeCommand),

  /// Project registry.
  #[command(subcommand)]
  Project(ProjectCommand),

  /// Similarity search over a project's documents.
  Search {
    project: ProjectId,
    query:   String,
    #[arg(long)]
    top_k:   Option<usize>,
  },

  /// Facts, lessons and documents for a query, in precedence order.
  Context {
    project:  ProjectId,
    query:    String,
    /// Number of lessons to include.
    #[arg(long)]
    episodes: Option<usize>,
    /// Number of document chunks to include.
    #[arg(long)]
    top_k:    Option<usize>,
  },

  /// Files currently indexed for a project.
  Sources { project: ProjectId },
}

#[derive(clap::Args)]
struct IngestArgs {
  project: ProjectId,
  root:    PathBuf,

  /// Re-ingest every file, ignoring stored checksums.
  #[arg(long)]
  full: bool,

  /// Report what would change without touching the store or ledgers.
  #[arg(long)]
  dry_run: bool,

  /// Extension allow-list (comma separated), replacing the configured one.
  #[arg(long = "ext", value_delimiter = ',')]
  extensions: Vec<String>,

  /// Extra ignore pattern; may be repeated.
  #[arg(long)]
  exclude: Vec<String>,

  /// Do not read the root `.gitignore`.
  #[arg(long)]
  no_gitignore: bool,

  #[arg(long)]
  chunk_size: Option<usize>,

  #[arg(long)]
  chunk_overlap: Option<usize>,
}

#[derive(Subcommand)]
enum FactCommand {
  /// Assert a fact; a more confident active fact is kept.
  Set {
    /// `global` or `project:<id>`.
    scope:      Scope,
    category:   String,
    key:        String,
    value:      String,
    #[arg(long, value_enum, default_value_t = ValueKind::Text)]
    kind:       ValueKind,
    #[arg(long, default_value_t = 1.0)]
    confidence: f64,
    #[arg(long, default_value = "manual")]
    source:     String,
  },

  /// Active facts in a scope.
  Get {
    scope:    Scope,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    key:      Option<String>,
  },

  /// Every recorded version of one key.
  History {
    scope:    Scope,
    category: String,
    key:      String,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum ValueKind {
  Text,
  Number,
  Json,
}

#[derive(Subcommand)]
enum EpisodeCommand {
  /// Record a lesson.
  Add {
    project: ProjectId,
    lesson:  String,
    #[arg(long, default_value = "success")]
    outcome: Outcome,
    #[arg(long, default_value = "")]
    context: String,
  },

  /// Most recent lessons first.
  List {
    project: ProjectId,
    #[arg(long, default_value_t = 10)]
    limit:   usize,
  },
}

#[derive(Subcommand)]
enum ProjectCommand {
  Add {
    id:   ProjectId,
    #[arg(long)]
    name: Option<String>,
  },
  List,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  // Logs go to stderr so `--json` output stays clean.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut settings = Settings::load(cli.config.as_deref())?;
  if let Some(database) = &cli.database {
    settings.database_path = expand_tilde(database);
  }

  if let Some(parent) = settings.database_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = Arc::new(
    SqliteStore::open(&settings.database_path)
      .await
      .with_context(|| format!("failed to open store at {:?}", settings.database_path))?,
  );

  let out = Output { json: cli.json };
  match cli.command {
    Command::Ingest(args) => ingest(&settings, store, args, out).await,
    Command::Fact(cmd) => fact(&store, cmd, out).await,
    Command::Episode(cmd) => episode(&store, cmd, out).await,
    Command::Project(cmd) => project(&store, cmd, out).await,
    Command::Search {
      project,
      query,
      top_k,
    } => search(&settings, &store, &project, &query, top_k, out).await,
    Command::Context {
      project,
      query,
      episodes,
      top_k,
    } => context(&settings, store, &project, &query, episodes, top_k, out).await,
    Command::Sources { project } => {
      let sources = store.list_sources(&project).await?;
      out.emit(&sources, |sources| {
        for s in sources {
          println!(
            "{:>4} chunks  {}  {}  {}",
            s.chunk_count,
            &s.file_checksum[..s.file_checksum.len().min(12)],
            s.ingested_at.format("%Y-%m-%d %H:%M"),
            s.relative_path
          );
        }
      })
    }
  }
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct Output {
  json: bool,
}

impl Output {
  fn emit<T: Serialize>(self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if self.json {
      println!("{}", serde_json::to_string_pretty(value)?);
    } else {
      human(value);
    }
    Ok(())
  }
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn ingest(
  settings: &Settings,
  store: Arc<SqliteStore>,
  args: IngestArgs,
  out: Output,
) -> Result<()> {
  let embedder = Arc::new(ConfiguredEmbedder::from_settings(&settings.embedder)?);
  tracing::info!(embedder = %embedder.describe(), "using embedder");

  let mut options = IngestOptions::new(args.project, expand_tilde(&args.root));
  options.chunk_size = args.chunk_size.unwrap_or(settings.chunk_size);
  options.chunk_overlap = args.chunk_overlap.unwrap_or(settings.chunk_overlap);
  options.extensions = if args.extensions.is_empty() {
    settings.extensions.clone()
  } else {
    args.extensions
  };
  options.exclude = settings
    .exclude
    .iter()
    .cloned()
    .chain(args.exclude)
    .collect();
  options.use_gitignore = settings.use_gitignore && !args.no_gitignore;
  options.incremental = !args.full;
  options.dry_run = args.dry_run;
  options.flush_interval = settings.flush_interval;
  options.read_timeout = settings.read_timeout();
  options.embed_timeout = settings.embed_timeout();

  let pipeline = IngestionPipeline::new(store, embedder, &settings.state_dir);
  let summary = pipeline.run(&options).await?;
  out.emit(&summary, print_summary)
}

fn print_summary(s: &IngestSummary) {
  let prefix = if s.dry_run { "[dry run] " } else { "" };
  println!(
    "{prefix}found {}  processed {} (new {}, updated {})  skipped {}  removed {}  errored {}  \
     chunks {}",
    s.files_found, s.processed, s.new, s.updated, s.skipped, s.removed, s.errored, s.chunks_created
  );
  for f in &s.failures {
    println!("  failed [{}] {}: {}", f.kind, f.path, f.message);
  }
}

async fn fact(store: &SqliteStore, cmd: FactCommand, out: Output) -> Result<()> {
  match cmd {
    FactCommand::Set {
      scope,
      category,
      key,
      value,
      kind,
      confidence,
      source,
    } => {
      let value = match kind {
        ValueKind::Text => FactValue::Text(value),
        ValueKind::Number => FactValue::Number(
          value
            .parse()
            .with_context(|| format!("{value:?} is not a number"))?,
        ),
        ValueKind::Json => {
          FactValue::Json(serde_json::from_str(&value).context("value is not valid JSON")?)
        }
      };
      let input = NewFact::new(scope, category, key, value)
        .with_confidence(confidence)
        .with_source(source);
      let outcome = store.upsert_fact(input).await?;
      out.emit(&outcome, |outcome| match outcome {
        UpsertOutcome::Accepted { fact } => {
          println!("accepted {} ({})", fact.fact_id, fact.confidence);
        }
        UpsertOutcome::Shadowed { attempted, active } => {
          println!(
            "shadowed {}: active value {} has confidence {} > {}",
            attempted.fact_id, active.value, active.confidence, attempted.confidence
          );
        }
      })
    }

    FactCommand::Get {
      scope,
      category,
      key,
    } => {
      let mut query = FactQuery::scope(scope);
      if let Some(category) = category {
        query = query.category(category);
      }
      if let Some(key) = key {
        query = query.key(key);
      }
      let facts = store.query_facts(&query).await?;
      out.emit(&facts, |facts| {
        for f in facts {
          println!(
            "{}.{} = {}  [confidence {}, source {}]",
            f.category, f.key, f.value, f.confidence, f.source
          );
        }
      })
    }

    FactCommand::History {
      scope,
      category,
      key,
    } => {
      let history = store.fact_history(&scope, &category, &key).await?;
      out.emit(&history, |history| {
        for h in history {
          let status = match &h.status {
            FactStatus::Active => "active".to_owned(),
            FactStatus::Superseded { by, .. } => format!("superseded by {by}"),
            FactStatus::Shadowed { by, .. } => format!("shadowed by {by}"),
          };
          println!(
            "{}  {} = {}  [confidence {}, {}]",
            h.fact.updated_at.format("%Y-%m-%d %H:%M:%S"),
            h.fact.fact_id,
            h.fact.value,
            h.fact.confidence,
            status
          );
        }
      })
    }
  }
}

async fn episode(store: &SqliteStore, cmd: EpisodeCommand, out: Output) -> Result<()> {
  match cmd {
    EpisodeCommand::Add {
      project,
      lesson,
      outcome,
      context,
    } => {
      let episode = store
        .add_episode(NewEpisode::new(project, lesson, outcome).with_context(context))
        .await?;
      out.emit(&episode, |e| println!("recorded {}", e.episode_id))
    }
    EpisodeCommand::List { project, limit } => {
      let episodes = store.query_episodes(&project, limit).await?;
      out.emit(&episodes, |episodes| {
        for e in episodes {
          println!(
            "{}  [{}] {}",
            e.created_at.format("%Y-%m-%d %H:%M"),
            e.outcome,
            e.lesson
          );
        }
      })
    }
  }
}

async fn project(store: &SqliteStore, cmd: ProjectCommand, out: Output) -> Result<()> {
  match cmd {
    ProjectCommand::Add { id, name } => {
      let name = name.unwrap_or_else(|| id.to_string());
      let project = store.create_project(&id, &name).await?;
      out.emit(&project, |p| println!("created {} ({})", p.project_id, p.name))
    }
    ProjectCommand::List => {
      let projects = store.list_projects().await?;
      out.emit(&projects, |projects| {
        for p in projects {
          println!("{:<24} {}", p.project_id.as_str(), p.name);
        }
      })
    }
  }
}

async fn search(
  settings: &Settings,
  store: &SqliteStore,
  project: &ProjectId,
  query: &str,
  top_k: Option<usize>,
  out: Output,
) -> Result<()> {
  let embedder = ConfiguredEmbedder::from_settings(&settings.embedder)?;
  let embedding = embedder.embed(query).await?;
  validate_embedding(&embedding)?;

  let mut hits = store
    .search(project, &embedding, top_k.unwrap_or(settings.top_k))
    .await?;
  for hit in &mut hits {
    hit.chunk.embedding.clear();
  }
  out.emit(&hits, |hits| {
    for h in hits {
      println!(
        "{:.3}  {} #{}\n{}\n",
        h.score,
        h.chunk.relative_path,
        h.chunk.chunk_index,
        h.chunk.text.trim_end()
      );
    }
  })
}

async fn context(
  settings: &Settings,
  store: Arc<SqliteStore>,
  project: &ProjectId,
  query: &str,
  episodes: Option<usize>,
  top_k: Option<usize>,
  out: Output,
) -> Result<()> {
  let mut config = settings.resolver_config();
  config.episode_limit = episodes.unwrap_or(config.episode_limit);
  config.top_k = top_k.unwrap_or(config.top_k);

  let embedder = Arc::new(ConfiguredEmbedder::from_settings(&settings.embedder)?);
  let resolver = AuthorityResolver::new(store.clone(), store.clone(), store, embedder, config);
  let mut bundle = resolver.get_context(project, query).await?;

  for item in &mut bundle.items {
    if let ContextPayload::Chunk(c) = &mut item.payload {
      c.chunk.embedding.clear();
    }
  }
  out.emit(&bundle, |bundle| print!("{}", bundle.render()))
}
