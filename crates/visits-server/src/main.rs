//! visits-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) and
//! `VISITS__*` environment overrides, opens an in-process SQLite store, and
//! serves the visit booking API over HTTP.

mod publisher;
mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use visits_core::reference::ReferenceCodec;
use visits_service::{EventNotifier, VisitService};
use visits_store_sqlite::SqliteStore;

use crate::{
  publisher::HttpPublisher,
  settings::{ServerConfig, expand_tilde},
};

#[derive(Parser)]
#[command(author, version, about = "Prison visit booking server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
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
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("VISITS").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let codec = ReferenceCodec::try_from(&server_cfg.reference)
    .context("invalid reference configuration")?;
  let notifier_cfg = server_cfg.events.notifier_config()?;

  // Open SQLite store.
  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let publisher = HttpPublisher::new(server_cfg.events.endpoint.clone().unwrap_or_default())?;
  tracing::info!(
    enabled = notifier_cfg.enabled,
    topic = %notifier_cfg.topic,
    zone = %notifier_cfg.zone,
    "domain events configured"
  );

  let service = VisitService::new(
    Arc::new(store),
    EventNotifier::new(Arc::new(publisher), notifier_cfg),
    codec,
  );

  let app = visits_api::api_router(Arc::new(service)).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
