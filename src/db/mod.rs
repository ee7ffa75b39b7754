//! Durable tier: a single-table SQLite store.
//!
//! Every call opens its own connection. Several engines, in this process or another one,
//! may share the same file, and a fresh handle per statement is what lets each of them see
//! the others' writes without holding a long-lived lock.

pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, ToSql};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::host::AbortSignal;

/// Connection and retry tuning for the durable store.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreSettings {
  /// SQLite busy timeout applied to every connection
  pub timeout_ms: u64,
  /// Attempts per statement while the store is locked by another writer
  pub max_retries: u32,
  pub retry_pause_ms: u64,
  /// Extra attempts at recreating an unusable store file
  pub open_retries: u32,
  pub open_pause_ms: u64,
}

impl Default for StoreSettings {
  fn default() -> Self {
    Self {
      timeout_ms: 30_000,
      max_retries: 10,
      retry_pause_ms: 500,
      open_retries: 2,
      open_pause_ms: 1_000,
    }
  }
}

impl StoreSettings {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn retry_pause(&self) -> Duration {
    Duration::from_millis(self.retry_pause_ms)
  }

  pub fn open_pause(&self) -> Duration {
    Duration::from_millis(self.open_pause_ms)
  }
}

/// One row of the cache table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
  pub id: String,
  pub expires: i64,
  /// JSON encoding of the cached value
  pub data: String,
  pub checksum: i64,
}

/// Row counts reported by [`Store::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
  pub total: i64,
  pub expired: i64,
}

/// Whether a failure means another writer currently holds the store.
pub(crate) fn is_locked(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

/// Handle-per-call access to the cache table.
pub struct Store {
  path: PathBuf,
  settings: StoreSettings,
  signal: Arc<dyn AbortSignal>,
  /// Raised by the owning engine on close; pending statements give up when set
  exit: Arc<AtomicBool>,
}

impl Store {
  pub fn new(
    path: PathBuf,
    settings: StoreSettings,
    signal: Arc<dyn AbortSignal>,
    exit: Arc<AtomicBool>,
  ) -> Self {
    Self {
      path,
      settings,
      signal,
      exit,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Open a connection, recreating the store if it is missing or unreadable.
  pub fn open(&self) -> Result<Connection> {
    let mut retries_left = self.settings.open_retries;
    loop {
      match self.try_open() {
        Ok(conn) => return Ok(conn),
        Err(e) => {
          warn!(
            "Failed to initialize cache store {}: {} ({} retries left)",
            self.path.display(),
            e,
            retries_left
          );
          if retries_left == 0 {
            return Err(eyre!(
              "Giving up on cache store {}: {}",
              self.path.display(),
              e
            ));
          }
          retries_left -= 1;
          if self.signal.wait_for_abort(self.settings.open_pause()) {
            return Err(eyre!("Abort requested while opening {}", self.path.display()));
          }
        }
      }
    }
  }

  fn connect(&self) -> rusqlite::Result<Connection> {
    let conn = Connection::open(&self.path)?;
    conn.busy_timeout(self.settings.timeout())?;
    Ok(conn)
  }

  fn try_open(&self) -> rusqlite::Result<Connection> {
    if let Ok(conn) = self.connect() {
      match conn.query_row(schema::PROBE, [], |_| Ok(())).optional() {
        Ok(_) => return Ok(conn),
        // Busy is not corruption; let the statement retry loop deal with it
        Err(e) if is_locked(&e) => return Ok(conn),
        Err(e) => debug!("Cache store {} failed probe: {}", self.path.display(), e),
      }
    }

    if self.path.exists() {
      info!("Recreating cache store {}", self.path.display());
      if let Err(e) = std::fs::remove_file(&self.path) {
        warn!("Failed to remove {}: {}", self.path.display(), e);
      }
    }

    let conn = self.connect()?;
    conn.execute_batch(schema::SCHEMA)?;
    Ok(conn)
  }

  /// Run `op` on a fresh connection, retrying while the store is locked.
  ///
  /// Returns `None` on any failure, on abort, or (when `honor_exit`) once the owning
  /// engine is closing.
  fn run<T, F>(&self, honor_exit: bool, mut op: F) -> Option<T>
  where
    F: FnMut(&Connection) -> rusqlite::Result<T>,
  {
    let conn = match self.open() {
      Ok(conn) => conn,
      Err(e) => {
        error!("Cache store unavailable: {}", e);
        return None;
      }
    };

    let mut retries = 0;
    let mut last_error = None;
    while retries < self.settings.max_retries && !self.signal.abort_requested() {
      if honor_exit && self.exit.load(Ordering::SeqCst) {
        return None;
      }
      match op(&conn) {
        Ok(value) => return Some(value),
        Err(e) if is_locked(&e) => {
          info!("Cache store locked, retrying ({})", retries + 1);
          retries += 1;
          last_error = Some(e);
          self.signal.wait_for_abort(self.settings.retry_pause());
        }
        Err(e) => {
          last_error = Some(e);
          break;
        }
      }
    }

    match last_error {
      Some(e) => error!("Cache store error on {}: {}", self.path.display(), e),
      None => debug!("Cache store call on {} aborted", self.path.display()),
    }
    None
  }

  /// Execute one statement. Returns the number of changed rows.
  pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Option<usize> {
    self.run(true, |conn| conn.execute(sql, params))
  }

  /// Execute one statement per parameter row inside a single transaction.
  ///
  /// Ignores the exit flag so it can be used to flush queued writes during close.
  pub fn execute_many(&self, sql: &str, rows: &[Vec<Value>]) -> Option<usize> {
    self.run(false, |conn| {
      let tx = conn.unchecked_transaction()?;
      let mut changed = 0;
      {
        let mut stmt = tx.prepare(sql)?;
        for row in rows {
          changed += stmt.execute(params_from_iter(row.iter()))?;
        }
      }
      tx.commit()?;
      Ok(changed)
    })
  }

  pub fn select(&self, id: &str) -> Option<StoredRow> {
    self
      .run(true, |conn| {
        conn
          .query_row(schema::SELECT_ENTRY, params![id], |row| {
            Ok(StoredRow {
              id: id.to_string(),
              expires: row.get(0)?,
              data: row.get(1)?,
              checksum: row.get(2)?,
            })
          })
          .optional()
      })
      .flatten()
  }

  pub fn upsert(&self, row: &StoredRow) -> bool {
    self
      .execute(
        schema::UPSERT_ENTRY,
        params![row.id, row.expires, row.data, row.checksum],
      )
      .is_some()
  }

  /// Write every row in one batch, even while the engine is closing.
  pub fn upsert_many(&self, rows: &[StoredRow]) -> bool {
    let rows: Vec<Vec<Value>> = rows
      .iter()
      .map(|row| {
        vec![
          Value::Text(row.id.clone()),
          Value::Integer(row.expires),
          Value::Text(row.data.clone()),
          Value::Integer(row.checksum),
        ]
      })
      .collect();
    self.execute_many(schema::UPSERT_ENTRY, &rows).is_some()
  }

  /// All `(id, expires)` pairs in the table.
  pub fn expiries(&self) -> Option<Vec<(String, i64)>> {
    self.run(true, |conn| {
      let mut stmt = conn.prepare(schema::SELECT_EXPIRIES)?;
      let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
  }

  pub fn delete(&self, id: &str) -> bool {
    self.execute(schema::DELETE_ENTRY, params![id]).is_some()
  }

  pub fn delete_all(&self) -> bool {
    self.execute(schema::DELETE_ALL, &[]).is_some()
  }

  /// Reclaim free pages.
  pub fn vacuum(&self) -> bool {
    self
      .run(true, |conn| conn.execute_batch(schema::VACUUM))
      .is_some()
  }

  /// Total rows and rows already expired at `now`.
  pub fn stats(&self, now: i64) -> Option<StoreStats> {
    self.run(true, |conn| {
      conn.query_row(schema::COUNT_EXPIRED, params![now], |row| {
        Ok(StoreStats {
          total: row.get(0)?,
          expired: row.get(1)?,
        })
      })
    })
  }
}
