/// Schema for the cache table. Part of the on-disk format shared with other readers.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS simplecache(
    id TEXT UNIQUE, expires INTEGER, data TEXT, checksum INTEGER)
"#;

/// Cheap integrity probe run against every freshly opened handle.
pub const PROBE: &str = "SELECT * FROM simplecache LIMIT 1";

pub const SELECT_ENTRY: &str = "SELECT expires, data, checksum FROM simplecache WHERE id = ?";

pub const UPSERT_ENTRY: &str =
  "INSERT OR REPLACE INTO simplecache( id, expires, data, checksum) VALUES (?, ?, ?, ?)";

pub const SELECT_EXPIRIES: &str = "SELECT id, expires FROM simplecache";

pub const DELETE_ENTRY: &str = "DELETE FROM simplecache WHERE id = ?";

pub const DELETE_ALL: &str = "DELETE FROM simplecache";

pub const COUNT_EXPIRED: &str =
  "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires <= ? THEN 1 ELSE 0 END), 0) FROM simplecache";

pub const VACUUM: &str = "VACUUM";
