use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::worker::Settings;

/// Environment variable overriding the configured generation tag at deploy time.
const VERSION_ENV: &str = "HB_SYNC_VERSION";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin of the web application, e.g. https://haushaltsbuch.example
  pub origin: String,
  /// Cache generation tag of this build
  #[serde(default = "default_version")]
  pub version: String,
  /// Shell resources stored at install time, relative to the origin
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  #[serde(default)]
  pub mutation: MutationConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// Where the databases and the log file live (defaults to $XDG_DATA_HOME/hb-sync)
  pub data_dir: Option<PathBuf>,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MutationConfig {
  /// The one path whose POSTs are queued while offline
  #[serde(default = "default_mutation_path")]
  pub path: String,
}

impl Default for MutationConfig {
  fn default() -> Self {
    Self {
      path: default_mutation_path(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Connectivity-trigger channel used for replay
  #[serde(default = "default_sync_tag")]
  pub tag: String,
  /// Notice returned to the application when a submission was queued
  #[serde(default = "default_queued_message")]
  pub queued_message: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: default_sync_tag(),
      queued_message: default_queued_message(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter used when HB_SYNC_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
    }
  }
}

fn default_version() -> String {
  "v3".to_string()
}

fn default_precache() -> Vec<String> {
  [
    "/",
    "/static/styles.css",
    "/static/manifest.json",
    "/static/icons/icon-192.png",
    "/static/icons/icon-512.png",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

fn default_mutation_path() -> String {
  "/add".to_string()
}

fn default_sync_tag() -> String {
  "sync-entries".to_string()
}

fn default_queued_message() -> String {
  "Eintrag wird synchronisiert, sobald du wieder online bist.".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hb-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hb-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/hb-sync/config.yaml"
        ))
      }
    };

    if let Ok(version) = std::env::var(VERSION_ENV) {
      config.version = version;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("hb-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hb-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Directory holding the databases and the log file.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("hb-sync"))
  }

  /// Validate and convert into the worker's settings.
  pub fn settings(&self) -> Result<Settings> {
    let origin = Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))?;
    if origin.cannot_be_a_base() {
      return Err(eyre!("Origin {} cannot be used as a base URL", self.origin));
    }
    if !self.mutation.path.starts_with('/') {
      return Err(eyre!(
        "Mutation path must be absolute, got {}",
        self.mutation.path
      ));
    }
    if self.version.trim().is_empty() {
      return Err(eyre!("Cache version must not be empty"));
    }

    Ok(Settings {
      origin,
      version: self.version.clone(),
      precache: self.precache.clone(),
      mutation_path: self.mutation.path.clone(),
      sync_tag: self.sync.tag.clone(),
      queued_message: self.sync.queued_message.clone(),
    })
  }
}
