//! Timestamp source used for expiry math.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

pub const TIME_MINUTES: i64 = 60;
pub const TIME_HOURS: i64 = 60 * TIME_MINUTES;
pub const TIME_DAYS: i64 = 24 * TIME_HOURS;

/// Wall-clock source in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
  fn now(&self) -> i64;

  /// Timestamp `secs` seconds from now.
  fn offset(&self, secs: i64) -> i64 {
    self.now().saturating_add(secs)
  }
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> i64 {
    Utc::now().timestamp()
  }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
  now: AtomicI64,
}

impl ManualClock {
  pub fn new(now: i64) -> Self {
    Self {
      now: AtomicI64::new(now),
    }
  }

  pub fn set(&self, now: i64) {
    self.now.store(now, Ordering::SeqCst);
  }

  pub fn advance(&self, secs: i64) {
    self.now.fetch_add(secs, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> i64 {
    self.now.load(Ordering::SeqCst)
  }
}
