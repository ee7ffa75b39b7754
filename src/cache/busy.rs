//! In-flight operation tracking used as a shutdown barrier.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::host::AbortSignal;

/// Multiset of labels for operations that are still running.
///
/// Clones share the same set, so several caches can be handed one registry and close
/// only once all of them are idle.
#[derive(Debug, Clone, Default)]
pub struct BusyTasks {
  tasks: Arc<Mutex<Vec<String>>>,
}

impl BusyTasks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Mark `label` busy until the returned guard is dropped.
  pub fn enter(&self, label: impl Into<String>) -> BusyGuard {
    let label = label.into();
    self
      .tasks
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(label.clone());
    BusyGuard {
      tasks: self.clone(),
      label,
    }
  }

  pub fn len(&self) -> usize {
    self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Poll until no task is busy. Returns `false` if abort fired first.
  pub fn wait_idle(&self, signal: &dyn AbortSignal, poll: Duration) -> bool {
    while !self.is_empty() {
      if signal.wait_for_abort(poll) {
        return false;
      }
    }
    true
  }

  fn leave(&self, label: &str) {
    let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(pos) = tasks.iter().position(|t| t == label) {
      tasks.swap_remove(pos);
    }
  }
}

/// Releases its label on drop, including during unwinding.
#[must_use = "the task is only marked busy while the guard is alive"]
pub struct BusyGuard {
  tasks: BusyTasks,
  label: String,
}

impl Drop for BusyGuard {
  fn drop(&mut self) {
    self.tasks.leave(&self.label);
  }
}
