//! Periodic cleanup of both tiers.
//!
//! Cleanup is opportunistic: every new cache checks a "last executed" marker in the
//! ephemeral tier and sweeps the store once the interval has passed. A second marker keeps
//! caches sharing a namespace from sweeping at the same time.

use tracing::{debug, info};

use super::engine::SimpleCache;

const CLEANUP_TASK: &str = "cleanup";

impl SimpleCache {
  /// Run cleanup if the interval since the last run has elapsed.
  ///
  /// The first check in a fresh process only records the current time.
  pub fn check_cleanup(&self) {
    if self.mem_only {
      return;
    }
    let now = self.clock.now();
    match self.memory.last_cleanup() {
      None => self.memory.set_last_cleanup(now),
      Some(last) if now - last >= self.cleanup_interval => {
        self.cleanup(false);
      }
      Some(_) => {}
    }
  }

  /// Drop every ephemeral entry that has a stored row, and delete stored rows that
  /// expired (or all of them with `force`). Then compact the store.
  ///
  /// Returns the number of deleted rows, or `None` when the run was skipped.
  pub fn cleanup(&self, force: bool) -> Option<usize> {
    self.sweep(force, false)
  }

  /// Invalidate the whole cache: a forced cleanup followed by deleting every row.
  pub fn purge_all(&self) -> Option<usize> {
    self.sweep(true, true)
  }

  fn stopping(&self) -> bool {
    self.exit.load(std::sync::atomic::Ordering::SeqCst) || self.signal.abort_requested()
  }

  fn sweep(&self, force: bool, delete_all: bool) -> Option<usize> {
    if self.mem_only || self.stopping() {
      return None;
    }

    let _busy = self.busy.enter(CLEANUP_TASK);
    if self.memory.cleanup_busy() {
      debug!("Cleanup already running for {}", self.namespace());
      return None;
    }
    let now = self.clock.now();
    info!("Running cleanup for {}", self.namespace());
    self.memory.set_cleanup_busy(true);

    let mut removed = 0;
    for (id, expires) in self.store.expiries().unwrap_or_default() {
      if self.stopping() {
        debug!("Cleanup of {} interrupted", self.namespace());
        break;
      }
      self.memory.clear(&id);
      if (force || expires < now) && self.store.delete(&id) {
        removed += 1;
        debug!("Deleted {} from store", id);
      }
    }

    if delete_all && !self.stopping() && self.store.delete_all() {
      info!("Deleted all entries from {}", self.namespace());
    }
    self.store.vacuum();

    self.memory.set_last_cleanup(now);
    self.memory.set_cleanup_busy(false);
    info!("Cleanup of {} done, {} rows removed", self.namespace(), removed);
    Some(removed)
  }
}
