//! pricescout server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! catalog and either serves the JSON API or runs a single search.
//!
//! ```text
//! server --config config.toml                 # serve
//! server search "galaxy a14" --source jumia --persist
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use pricescout_api::AppState;
use pricescout_pipeline::SearchRequest;
use pricescout_server::ServerConfig;
use pricescout_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "pricescout price aggregation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API (the default).
  Serve,
  /// Run one search and print the result as JSON.
  Search {
    query:   String,
    /// Restrict to these sources; repeatable.
    #[arg(short, long = "source")]
    sources: Vec<String>,
    /// Write the grouped products to the catalog.
    #[arg(long)]
    persist: bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.as_path()).required(false))
    .add_source(
      config::Environment::with_prefix("PRICESCOUT")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let aggregator = server_cfg
    .build_aggregator(Arc::new(store))
    .context("invalid pipeline configuration")?;

  if aggregator.orchestrator().registry().is_empty() {
    tracing::warn!("no sources configured; searches will return nothing");
  }

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => {
      let app = pricescout_api::api_router(AppState::new(aggregator))
        .layer(TraceLayer::new_for_http());
      let address = format!("{}:{}", server_cfg.host, server_cfg.port);

      tracing::info!("Listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

      axum::serve(listener, app).await.context("server error")?;
    }
    Command::Search { query, sources, persist } => {
      let request = SearchRequest { sources, persist, ..SearchRequest::new(query) };
      let outcome = aggregator.search(&request).await.context("search failed")?;
      println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
