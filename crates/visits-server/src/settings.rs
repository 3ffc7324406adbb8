//! Runtime configuration, deserialised from `config.toml` and `VISITS__*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use chrono_tz::Tz;
use serde::Deserialize;
use visits_core::reference::ReferenceConfig;
use visits_service::NotifierConfig;

/// Top-level server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub reference:  ReferenceConfig,
  #[serde(default)]
  pub events:     EventsConfig,
}

/// Domain-event publication settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EventsConfig {
  pub enabled:  bool,
  pub topic:    String,
  /// Base URL of the message broker's HTTP interface.
  pub endpoint: Option<String>,
  /// IANA zone for visit wall-clock times and event timestamps.
  pub zone:     String,
}

impl Default for EventsConfig {
  fn default() -> Self {
    Self {
      enabled:  true,
      topic:    visits_service::DEFAULT_TOPIC.to_owned(),
      endpoint: None,
      zone:     "Europe/London".to_owned(),
    }
  }
}

impl EventsConfig {
  /// Resolve into the notifier's fixed settings. Publication is switched
  /// off when no endpoint is configured.
  pub fn notifier_config(&self) -> anyhow::Result<NotifierConfig> {
    let zone: Tz = self
      .zone
      .parse()
      .map_err(|e| anyhow!("invalid event zone {:?}: {e}", self.zone))?;

    let enabled = self.enabled && self.endpoint.is_some();
    if self.enabled && !enabled {
      tracing::warn!("no events endpoint configured, domain events will not be published");
    }

    Ok(NotifierConfig { enabled, topic: self.topic.clone(), zone })
  }
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/visits/visits.db") }

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
