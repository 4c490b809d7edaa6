use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Business to select when the session has none stored
  pub default_business: Option<String>,
  /// Branch to select when the session has none stored
  pub default_branch: Option<String>,
  #[serde(default)]
  pub lists: ListsConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the management API, without the `/api` prefix
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListsConfig {
  /// Items requested per page
  #[serde(default = "default_page_size")]
  pub page_size: u64,
}

impl Default for ListsConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
    }
  }
}

fn default_page_size() -> u64 {
  20
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long cached list pages stay valid, in seconds
  #[serde(default = "default_ttl_seconds")]
  pub ttl_seconds: u64,
  /// Disable the persistent store entirely (in-memory only)
  #[serde(default)]
  pub disabled: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_seconds: default_ttl_seconds(),
      disabled: false,
    }
  }
}

fn default_ttl_seconds() -> u64 {
  300
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./boh.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/boh/config.yaml
  /// 4. ~/.config/boh/config.yaml
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
        "No configuration file found. Create one at ~/.config/boh/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("boh.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("boh").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    config.validate()?;

    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.api.url.trim().is_empty() {
      return Err(eyre!("api.url must be non-empty"));
    }
    if self.lists.page_size == 0 {
      return Err(eyre!("lists.page_size must be > 0"));
    }
    Ok(())
  }

  /// Get an API token from environment variables, overriding the session.
  ///
  /// Checks BOH_API_TOKEN. Used for scripted invocations where no login
  /// step has run.
  pub fn env_token() -> Option<String> {
    std::env::var("BOH_API_TOKEN").ok()
  }
}
