use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::content::SortOrder;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  /// Signed-in user; enables interaction lookups and write actions
  pub user_id: Option<String>,
  #[serde(default)]
  pub feed: FeedConfig,
  #[serde(default)]
  pub offline: OfflineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL of the hosted backend (the REST API lives under /rest/v1/)
  pub url: String,
  /// Request timeout applied by the HTTP client
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  #[serde(default = "default_page_size")]
  pub page_size: u32,
  pub category: Option<String>,
  #[serde(default)]
  pub sort: SortOrder,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      category: None,
      sort: SortOrder::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfflineConfig {
  /// Keep the cache and action queue on disk; false keeps them in memory only
  #[serde(default = "default_true")]
  pub persist: bool,
  #[serde(default = "default_cache_capacity")]
  pub cache_capacity: usize,
  #[serde(default = "default_retention_hours")]
  pub retention_hours: i64,
  #[serde(default = "default_max_replay_attempts")]
  pub max_replay_attempts: u32,
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      persist: true,
      cache_capacity: default_cache_capacity(),
      retention_hours: default_retention_hours(),
      max_replay_attempts: default_max_replay_attempts(),
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

impl OfflineConfig {
  pub fn retention(&self) -> Duration {
    Duration::hours(self.retention_hours)
  }
}

fn default_timeout_secs() -> u64 {
  15
}

fn default_page_size() -> u32 {
  10
}

fn default_true() -> bool {
  true
}

fn default_cache_capacity() -> usize {
  20
}

fn default_retention_hours() -> i64 {
  24
}

fn default_max_replay_attempts() -> u32 {
  3
}

fn default_probe_interval_secs() -> u64 {
  15
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sitefeed.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sitefeed/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/sitefeed/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("sitefeed.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sitefeed").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.feed.page_size == 0 {
      return Err(eyre!("feed.page_size must be at least 1"));
    }
    if config.offline.cache_capacity == 0 {
      return Err(eyre!("offline.cache_capacity must be at least 1"));
    }
    Ok(config)
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks SITEFEED_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("SITEFEED_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Set SITEFEED_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Directory for the offline database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("sitefeed"))
  }
}
