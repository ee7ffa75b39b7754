//! The two-tier cache engine.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::busy::BusyTasks;
use super::checksum;
use super::entry::{CacheEntry, QueuedWrite};
use super::memory::MemoryTier;
use crate::clock::{Clock, SystemClock, TIME_DAYS, TIME_HOURS};
use crate::config::Config;
use crate::db::{Store, StoreSettings, StoredRow};
use crate::host::{AbortHandle, AbortSignal, EphemeralStore, SharedProperties};
use crate::paths::{self, DEFAULT_FILENAME, DEFAULT_FOLDER};

/// Lifetime used by callers that have no better idea.
pub const DEFAULT_CACHE_DAYS: u32 = 30;

/// How often `close` re-checks the busy-task set.
const CLOSE_POLL: Duration = Duration::from_millis(25);

/// Builder for [`SimpleCache`].
///
/// Collaborators that are not supplied fall back to the process-wide property table, an
/// abort handle that never fires, the system clock and a private busy-task registry.
pub struct CacheBuilder {
  folder: String,
  filename: String,
  mem_only: bool,
  delay_write: bool,
  global_checksum: Option<String>,
  cleanup_interval: Duration,
  data_dir: Option<PathBuf>,
  store_settings: StoreSettings,
  ephemeral: Option<Arc<dyn EphemeralStore>>,
  signal: Option<Arc<dyn AbortSignal>>,
  clock: Option<Arc<dyn Clock>>,
  busy: Option<BusyTasks>,
}

impl CacheBuilder {
  pub fn new(folder: impl Into<String>, filename: impl Into<String>) -> Self {
    Self {
      folder: folder.into(),
      filename: filename.into(),
      mem_only: false,
      delay_write: false,
      global_checksum: None,
      cleanup_interval: Duration::from_secs(4 * TIME_HOURS as u64),
      data_dir: None,
      store_settings: StoreSettings::default(),
      ephemeral: None,
      signal: None,
      clock: None,
      busy: None,
    }
  }

  pub fn from_config(config: &Config) -> Self {
    let mut builder = Self::new(config.folder.clone(), config.filename.clone())
      .mem_only(config.mem_only)
      .delay_write(config.delay_write)
      .cleanup_interval(Duration::from_secs(
        config.cleanup_interval_hours.saturating_mul(TIME_HOURS as u64),
      ))
      .store_settings(config.store.clone());
    builder.global_checksum = config.global_checksum.clone();
    builder.data_dir = config.data_dir.clone();
    builder
  }

  /// Keep everything in the ephemeral tier and never touch the store file.
  pub fn mem_only(mut self, mem_only: bool) -> Self {
    self.mem_only = mem_only;
    self
  }

  /// Queue durable writes and flush them on close.
  pub fn delay_write(mut self, delay_write: bool) -> Self {
    self.delay_write = delay_write;
    self
  }

  pub fn global_checksum(mut self, global_checksum: impl Into<String>) -> Self {
    self.global_checksum = Some(global_checksum.into());
    self
  }

  pub fn cleanup_interval(mut self, interval: Duration) -> Self {
    self.cleanup_interval = interval;
    self
  }

  pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.data_dir = Some(dir.into());
    self
  }

  pub fn store_settings(mut self, settings: StoreSettings) -> Self {
    self.store_settings = settings;
    self
  }

  pub fn ephemeral(mut self, store: Arc<dyn EphemeralStore>) -> Self {
    self.ephemeral = Some(store);
    self
  }

  pub fn abort_signal(mut self, signal: Arc<dyn AbortSignal>) -> Self {
    self.signal = Some(signal);
    self
  }

  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = Some(clock);
    self
  }

  /// Share a busy-task registry so that closing waits on every cache holding it.
  pub fn busy_tasks(mut self, busy: BusyTasks) -> Self {
    self.busy = Some(busy);
    self
  }

  /// Resolve the store path and construct the cache, running a cleanup check.
  pub fn open(self) -> Result<SimpleCache> {
    let path = paths::store_path(self.data_dir.as_deref(), &self.folder, &self.filename)?;
    let namespace = format!("{}_{}_simplecache", self.folder, self.filename);

    let ephemeral = self
      .ephemeral
      .unwrap_or_else(|| Arc::new(SharedProperties::global()) as Arc<dyn EphemeralStore>);
    let signal = self
      .signal
      .unwrap_or_else(|| Arc::new(AbortHandle::new()) as Arc<dyn AbortSignal>);
    let exit = Arc::new(AtomicBool::new(false));

    let cache = SimpleCache {
      memory: MemoryTier::new(ephemeral, namespace),
      store: Store::new(path, self.store_settings, signal.clone(), exit.clone()),
      clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>),
      signal,
      busy: self.busy.unwrap_or_default(),
      exit,
      closed: AtomicBool::new(false),
      queue: Mutex::new(Vec::new()),
      write_order: Mutex::new(()),
      mem_only: self.mem_only,
      delay_write: self.delay_write,
      global_checksum: self.global_checksum.filter(|g| !g.is_empty()),
      cleanup_interval: i64::try_from(self.cleanup_interval.as_secs()).unwrap_or(i64::MAX),
    };

    cache.check_cleanup();
    info!("Cache initialized: {}", cache.namespace());
    Ok(cache)
  }
}

/// Two-tier TTL cache: a shared ephemeral property table in front of a SQLite file.
///
/// Lookups never fail. Anything that goes wrong in the durable tier shows up as a miss
/// (or a write that did not persist) and is logged. The cache flushes its queued writes
/// when closed, either explicitly or on drop.
pub struct SimpleCache {
  pub(super) memory: MemoryTier,
  pub(super) store: Store,
  pub(super) clock: Arc<dyn Clock>,
  pub(super) signal: Arc<dyn AbortSignal>,
  pub(super) busy: BusyTasks,
  /// Tells in-flight durable work to stop
  pub(super) exit: Arc<AtomicBool>,
  closed: AtomicBool,
  queue: Mutex<Vec<QueuedWrite>>,
  /// Keeps the two tiers in the same order for sets through this instance
  write_order: Mutex<()>,
  pub(super) mem_only: bool,
  delay_write: bool,
  global_checksum: Option<String>,
  pub(super) cleanup_interval: i64,
}

impl SimpleCache {
  /// Open a cache with default collaborators. Missing names fall back to
  /// `database_v2/defaultcache.db`.
  pub fn new(
    folder: Option<&str>,
    filename: Option<&str>,
    mem_only: bool,
    delay_write: bool,
  ) -> Result<Self> {
    CacheBuilder::new(
      folder.unwrap_or(DEFAULT_FOLDER),
      filename.unwrap_or(DEFAULT_FILENAME),
    )
    .mem_only(mem_only)
    .delay_write(delay_write)
    .open()
  }

  pub fn builder(folder: impl Into<String>, filename: impl Into<String>) -> CacheBuilder {
    CacheBuilder::new(folder, filename)
  }

  pub fn from_config(config: &Config) -> Result<Self> {
    CacheBuilder::from_config(config).open()
  }

  /// Prefix of every ephemeral key this cache owns.
  pub fn namespace(&self) -> &str {
    self.memory.namespace()
  }

  pub fn store_path(&self) -> &Path {
    self.store.path()
  }

  /// Direct access to the durable tier.
  pub fn store(&self) -> &Store {
    &self.store
  }

  /// Direct access to the ephemeral tier.
  pub fn memory(&self) -> &MemoryTier {
    &self.memory
  }

  pub fn busy_tasks(&self) -> &BusyTasks {
    &self.busy
  }

  pub fn queued_writes(&self) -> usize {
    self.lock_queue().len()
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  fn checksum(&self, input: &str) -> i64 {
    checksum::derive(Some(input), self.global_checksum.as_deref())
  }

  fn lock_queue(&self) -> MutexGuard<'_, Vec<QueuedWrite>> {
    self.queue.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Get a cached value.
  ///
  /// A non-empty `checksum` must match the one the value was stored with. Expired,
  /// mismatched, missing and unreadable entries all return `None`.
  pub fn get<T: DeserializeOwned>(&self, endpoint: &str, checksum: &str) -> Option<T> {
    let checksum = self.checksum(checksum);
    let now = self.clock.now();

    let entry = match self
      .memory
      .get(endpoint)
      .filter(|entry| entry.is_valid(now, checksum))
    {
      Some(entry) => entry,
      None if self.mem_only => return None,
      None => self.get_stored(endpoint, checksum, now)?,
    };

    match serde_json::from_value(entry.data) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!("Cached value for {} has an unexpected shape: {}", endpoint, e);
        None
      }
    }
  }

  /// Durable-tier lookup. A hit is copied back into the ephemeral tier.
  fn get_stored(&self, endpoint: &str, checksum: i64, now: i64) -> Option<CacheEntry> {
    let row = self.store.select(endpoint)?;
    let entry = match CacheEntry::from_row(&row) {
      Ok(entry) => entry,
      Err(e) => {
        warn!("Discarding unreadable stored entry {}: {}", endpoint, e);
        return None;
      }
    };
    if !entry.is_valid(now, checksum) {
      return None;
    }
    self.memory.set(endpoint, &entry);
    Some(entry)
  }

  /// Store `data` for `cache_days` days.
  ///
  /// The ephemeral tier is always written. The durable tier is written through, queued
  /// until close when the cache delays writes, or skipped for memory-only caches. Once the
  /// cache is closed there is no queue to flush, so delayed writes go straight to the store.
  ///
  /// Concurrent sets of one key through this cache leave both tiers holding the same value.
  /// Separate caches sharing a property table and store file only get last-write-wins in
  /// the store; their ephemeral entries may briefly disagree with it.
  pub fn set<T: Serialize + ?Sized>(
    &self,
    endpoint: &str,
    data: &T,
    checksum: &str,
    cache_days: u32,
  ) {
    let _busy = self.busy.enter(format!("set.{}", endpoint));

    let data = match serde_json::to_value(data) {
      Ok(data) => data,
      Err(e) => {
        warn!("Not caching {}: {}", endpoint, e);
        return;
      }
    };
    let entry = CacheEntry {
      expires: self.clock.offset(i64::from(cache_days) * TIME_DAYS),
      data,
      checksum: self.checksum(checksum),
    };

    let _order = self.write_order.lock().unwrap_or_else(|e| e.into_inner());
    self.memory.set(endpoint, &entry);
    if self.mem_only {
      return;
    }
    if self.delay_write && !self.is_closed() {
      self.lock_queue().push(QueuedWrite {
        endpoint: endpoint.to_string(),
        entry,
      });
      return;
    }
    self.persist(endpoint, &entry);
  }

  fn persist(&self, endpoint: &str, entry: &CacheEntry) {
    match entry.to_row(endpoint) {
      Ok(row) => {
        // Single statements give up once closing; the batch path does not
        let written = if self.is_closed() {
          self.store.upsert_many(std::slice::from_ref(&row))
        } else {
          self.store.upsert(&row)
        };
        if !written {
          debug!("Entry {} was not persisted", endpoint);
        }
      }
      Err(e) => warn!("Failed to encode {} for the store: {}", endpoint, e),
    }
  }

  /// Stop in-flight work, wait for busy tasks, then flush queued writes.
  ///
  /// Safe to call more than once. If the host aborts while waiting, the flush is still
  /// attempted but may be dropped by the store.
  pub fn close(&self) {
    if self.closed.swap(true, Ordering::SeqCst) {
      return;
    }
    self.exit.store(true, Ordering::SeqCst);

    if !self.busy.wait_idle(self.signal.as_ref(), CLOSE_POLL) {
      warn!(
        "Abort requested while {} still had {} busy tasks",
        self.namespace(),
        self.busy.len()
      );
    }

    let queued = std::mem::take(&mut *self.lock_queue());
    if !queued.is_empty() {
      info!("Writing {} queued items for {}", queued.len(), self.namespace());
      let rows: Vec<StoredRow> = queued
        .iter()
        .filter_map(|q| match q.entry.to_row(&q.endpoint) {
          Ok(row) => Some(row),
          Err(e) => {
            warn!("Dropping queued write {}: {}", q.endpoint, e);
            None
          }
        })
        .collect();
      if !self.store.upsert_many(&rows) {
        warn!("Lost {} queued writes for {}", rows.len(), self.namespace());
      }
    }

    info!("Cache closed: {}", self.namespace());
  }
}

impl Drop for SimpleCache {
  fn drop(&mut self) {
    self.close();
  }
}
