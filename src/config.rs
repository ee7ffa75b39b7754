use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::db::StoreSettings;
use crate::paths::{DEFAULT_FILENAME, DEFAULT_FOLDER};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Folder under the data directory holding the store
  pub folder: String,
  pub filename: String,
  /// Skip the durable tier entirely
  pub mem_only: bool,
  /// Queue durable writes until the cache is closed
  pub delay_write: bool,
  /// Mixed into every checksum; bump it to invalidate all cached entries at once
  pub global_checksum: Option<String>,
  pub cleanup_interval_hours: u64,
  /// Base directory override (defaults to the platform data directory)
  pub data_dir: Option<PathBuf>,
  pub store: StoreSettings,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      folder: DEFAULT_FOLDER.to_string(),
      filename: DEFAULT_FILENAME.to_string(),
      mem_only: false,
      delay_write: false,
      global_checksum: None,
      cleanup_interval_hours: 4,
      data_dir: None,
      store: StoreSettings::default(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./simplecache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/simplecache/config.yaml
  ///
  /// Falls back to defaults when no file is found and no explicit path was given.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("simplecache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("simplecache").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }
}
