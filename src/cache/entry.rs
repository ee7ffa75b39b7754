//! Cache entry shape shared by both tiers.

use serde_json::Value;

use crate::db::StoredRow;

/// A cached value with its absolute expiry and the checksum in effect when written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub expires: i64,
  pub data: Value,
  pub checksum: i64,
}

impl CacheEntry {
  /// Valid iff not yet expired and, when a checksum is requested, it matches.
  pub fn is_valid(&self, now: i64, checksum: i64) -> bool {
    self.expires > now && (checksum == 0 || checksum == self.checksum)
  }

  /// Ephemeral-tier encoding: the JSON array `[expires, data, checksum]`.
  pub fn encode(&self) -> serde_json::Result<String> {
    serde_json::to_string(&(self.expires, &self.data, self.checksum))
  }

  pub fn decode(raw: &str) -> serde_json::Result<Self> {
    let (expires, data, checksum): (i64, Value, i64) = serde_json::from_str(raw)?;
    Ok(Self {
      expires,
      data,
      checksum,
    })
  }

  pub fn from_row(row: &StoredRow) -> serde_json::Result<Self> {
    Ok(Self {
      expires: row.expires,
      data: serde_json::from_str(&row.data)?,
      checksum: row.checksum,
    })
  }

  pub fn to_row(&self, endpoint: &str) -> serde_json::Result<StoredRow> {
    Ok(StoredRow {
      id: endpoint.to_string(),
      expires: self.expires,
      data: serde_json::to_string(&self.data)?,
      checksum: self.checksum,
    })
  }
}

/// A durable write held back until the cache is closed.
///
/// `entry.data` is an owned snapshot taken at `set` time, so later changes to the
/// caller's value never reach the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedWrite {
  pub endpoint: String,
  pub entry: CacheEntry,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn entry(expires: i64, checksum: i64) -> CacheEntry {
    CacheEntry {
      expires,
      data: json!({"title": "x", "ids": [1, 2]}),
      checksum,
    }
  }

  #[test]
  fn test_expiry_is_exclusive() {
    assert!(entry(100, 0).is_valid(99, 0));
    assert!(!entry(100, 0).is_valid(100, 0));
    assert!(!entry(100, 0).is_valid(101, 0));
  }

  #[test]
  fn test_checksum_gate() {
    let e = entry(100, 167);
    assert!(e.is_valid(0, 0));
    assert!(e.is_valid(0, 167));
    assert!(!e.is_valid(0, 168));
  }

  #[test]
  fn test_encoding_is_a_triple() {
    let raw = entry(100, 5).encode().unwrap();
    assert_eq!(raw, r#"[100,{"ids":[1,2],"title":"x"},5]"#);
    assert_eq!(CacheEntry::decode(&raw).unwrap(), entry(100, 5));
  }

  #[test]
  fn test_decode_rejects_other_shapes() {
    assert!(CacheEntry::decode("").is_err());
    assert!(CacheEntry::decode("[1, 2]").is_err());
    assert!(CacheEntry::decode(r#"{"expires": 1}"#).is_err());
  }

  #[test]
  fn test_row_conversion() {
    let row = entry(100, 5).to_row("ep").unwrap();
    assert_eq!(row.id, "ep");
    assert_eq!(row.data, r#"{"ids":[1,2],"title":"x"}"#);
    assert_eq!(CacheEntry::from_row(&row).unwrap(), entry(100, 5));
  }
}
