//! A two-tier, TTL-based object cache for short-lived host instances.
//!
//! Values live in a process-shared ephemeral table and in a SQLite file that survives
//! restarts. Reads try the ephemeral tier first and fall back to the file; writes go to
//! both, optionally deferring the file write until the cache is closed.

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod host;
pub mod logging;
pub mod paths;

pub use cache::{CacheBuilder, SimpleCache, DEFAULT_CACHE_DAYS};
pub use config::Config;
