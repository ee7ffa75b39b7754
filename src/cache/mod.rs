//! Two-tier TTL cache.
//!
//! This module provides the cache engine and the pieces it is built from:
//! - A checksum deriver turning version strings into comparable fingerprints
//! - An ephemeral tier stored as `[expires, data, checksum]` strings in a shared table
//! - Write-through or deferred writes to the durable SQLite tier
//! - Busy-task tracking so that closing waits for in-flight sets
//! - Periodic cleanup of expired entries across both tiers

mod busy;
pub mod checksum;
mod cleanup;
mod engine;
mod entry;
mod memory;

pub use busy::{BusyGuard, BusyTasks};
pub use engine::{CacheBuilder, SimpleCache, DEFAULT_CACHE_DAYS};
pub use entry::{CacheEntry, QueuedWrite};
pub use memory::MemoryTier;
