//! Collaborators supplied by the host process.
//!
//! The cache never owns these: the ephemeral property table outlives every engine, and the
//! abort signal belongs to whoever drives the process.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, OnceLock, RwLock};
use std::time::{Duration, Instant};

/// String-only key-value table shared by every engine in the process.
///
/// Writes must be atomic per key. Implementations are assumed to always be available; a
/// panic here is fatal to the caller.
pub trait EphemeralStore: Send + Sync {
  /// Value for `key`, or the empty string when unset.
  fn get_property(&self, key: &str) -> String;

  fn set_property(&self, key: &str, value: &str);

  fn clear_property(&self, key: &str);
}

/// Cooperative cancellation requested by the host.
pub trait AbortSignal: Send + Sync {
  fn abort_requested(&self) -> bool;

  /// Sleep for up to `timeout`, returning early with `true` if abort fires.
  fn wait_for_abort(&self, timeout: Duration) -> bool;
}

/// In-memory property table.
///
/// Clones share the same table. [`SharedProperties::global`] is the process-wide instance;
/// [`SharedProperties::new`] gives an isolated table.
#[derive(Debug, Clone, Default)]
pub struct SharedProperties {
  inner: Arc<RwLock<HashMap<String, String>>>,
}

impl SharedProperties {
  pub fn new() -> Self {
    Self::default()
  }

  /// The table shared by every engine in this process.
  pub fn global() -> Self {
    static GLOBAL: OnceLock<SharedProperties> = OnceLock::new();
    GLOBAL.get_or_init(SharedProperties::new).clone()
  }

  pub fn len(&self) -> usize {
    self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl EphemeralStore for SharedProperties {
  fn get_property(&self, key: &str) -> String {
    self
      .inner
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(key)
      .cloned()
      .unwrap_or_default()
  }

  fn set_property(&self, key: &str, value: &str) {
    self
      .inner
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .insert(key.to_string(), value.to_string());
  }

  fn clear_property(&self, key: &str) {
    self
      .inner
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .remove(key);
  }
}

/// Abort flag that can be raised from any thread and waited on.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
  inner: Arc<(Mutex<bool>, Condvar)>,
}

impl AbortHandle {
  pub fn new() -> Self {
    Self::default()
  }

  /// Raise the abort flag and wake every waiter.
  pub fn abort(&self) {
    let (lock, cvar) = &*self.inner;
    *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
    cvar.notify_all();
  }
}

impl AbortSignal for AbortHandle {
  fn abort_requested(&self) -> bool {
    let (lock, _) = &*self.inner;
    *lock.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn wait_for_abort(&self, timeout: Duration) -> bool {
    let (lock, cvar) = &*self.inner;
    // A timeout too large to represent waits until abort
    let deadline = Instant::now().checked_add(timeout);
    let mut aborted = lock.lock().unwrap_or_else(|e| e.into_inner());
    while !*aborted {
      let Some(deadline) = deadline else {
        aborted = cvar.wait(aborted).unwrap_or_else(|e| e.into_inner());
        continue;
      };
      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        break;
      }
      aborted = cvar
        .wait_timeout(aborted, remaining)
        .unwrap_or_else(|e| e.into_inner())
        .0;
    }
    *aborted
  }
}
