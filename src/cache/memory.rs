//! Ephemeral tier adapter over the host's shared property table.

use std::sync::Arc;
use tracing::warn;

use super::entry::CacheEntry;
use crate::host::EphemeralStore;

/// Namespaced view of the property table for one cache.
#[derive(Clone)]
pub struct MemoryTier {
  store: Arc<dyn EphemeralStore>,
  namespace: String,
}

impl MemoryTier {
  pub fn new(store: Arc<dyn EphemeralStore>, namespace: String) -> Self {
    Self { store, namespace }
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  fn entry_key(&self, endpoint: &str) -> String {
    format!("{}_{}", self.namespace, endpoint)
  }

  fn last_cleanup_key(&self) -> String {
    format!("{}.clean.lastexecuted", self.namespace)
  }

  fn cleanup_busy_key(&self) -> String {
    format!("{}.cleanbusy", self.namespace)
  }

  /// Stored entry for `endpoint`, valid or not. Unreadable entries count as absent.
  pub fn get(&self, endpoint: &str) -> Option<CacheEntry> {
    let raw = self.store.get_property(&self.entry_key(endpoint));
    if raw.is_empty() {
      return None;
    }
    match CacheEntry::decode(&raw) {
      Ok(entry) => Some(entry),
      Err(e) => {
        warn!("Discarding unreadable memory entry {}: {}", endpoint, e);
        None
      }
    }
  }

  pub fn set(&self, endpoint: &str, entry: &CacheEntry) {
    match entry.encode() {
      Ok(raw) => self.store.set_property(&self.entry_key(endpoint), &raw),
      Err(e) => warn!("Failed to encode memory entry {}: {}", endpoint, e),
    }
  }

  pub fn clear(&self, endpoint: &str) {
    self.store.clear_property(&self.entry_key(endpoint));
  }

  /// When cleanup last ran for this namespace, if ever.
  pub fn last_cleanup(&self) -> Option<i64> {
    let raw = self.store.get_property(&self.last_cleanup_key());
    if raw.is_empty() {
      return None;
    }
    raw.trim().parse().ok()
  }

  pub fn set_last_cleanup(&self, timestamp: i64) {
    self
      .store
      .set_property(&self.last_cleanup_key(), &timestamp.to_string());
  }

  pub fn cleanup_busy(&self) -> bool {
    !self.store.get_property(&self.cleanup_busy_key()).is_empty()
  }

  pub fn set_cleanup_busy(&self, busy: bool) {
    if busy {
      self.store.set_property(&self.cleanup_busy_key(), "busy");
    } else {
      self.store.clear_property(&self.cleanup_busy_key());
    }
  }
}
