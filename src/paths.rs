//! Resolution of the durable store's location on disk.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_FOLDER: &str = "database_v2";
pub const DEFAULT_FILENAME: &str = "defaultcache.db";

/// Get the default base directory for cache stores.
pub fn default_base_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("simplecache"))
}

/// Resolve `<base>/<folder>/<filename>`, creating the folder if needed.
pub fn store_path(base: Option<&Path>, folder: &str, filename: &str) -> Result<PathBuf> {
  let base = match base {
    Some(base) => base.to_path_buf(),
    None => default_base_dir()?,
  };
  let dir = base.join(folder);

  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create cache directory {}: {}", dir.display(), e))?;

  Ok(dir.join(filename))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_store_path_creates_folder() {
    let tmp = TempDir::new().unwrap();
    let path = store_path(Some(tmp.path()), "nested/db", "x.db").unwrap();

    assert_eq!(path, tmp.path().join("nested/db").join("x.db"));
    assert!(tmp.path().join("nested/db").is_dir());
  }

  #[test]
  fn test_store_path_fails_on_file_in_the_way() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("blocker"), b"").unwrap();

    assert!(store_path(Some(tmp.path()), "blocker", "x.db").is_err());
  }
}
