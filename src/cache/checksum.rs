//! Version fingerprints.
//!
//! A checksum is the sum of the Unicode code points of the version string, optionally
//! prefixed by a cache-wide override as `"<override>-<input>"`. It is cheap and collides
//! easily, which is fine for a "has this changed" tag. Stores written by other readers of
//! the same file use this exact sum, so changing it invalidates every persisted entry.

/// Derive the integer checksum for `input`. Zero means "no checksum".
pub fn derive(input: Option<&str>, global: Option<&str>) -> i64 {
  let input = input.unwrap_or_default();
  let global = global.filter(|g| !g.is_empty());

  match global {
    None if input.is_empty() => 0,
    None => code_point_sum(input),
    Some(global) => code_point_sum(&format!("{}-{}", global, input)),
  }
}

fn code_point_sum(s: &str) -> i64 {
  s.chars().map(|c| i64::from(u32::from(c))).sum()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_is_zero() {
    assert_eq!(derive(None, None), 0);
    assert_eq!(derive(Some(""), None), 0);
    assert_eq!(derive(Some(""), Some("")), 0);
  }

  #[test]
  fn test_sum_of_code_points() {
    // 'v' = 118, '1' = 49
    assert_eq!(derive(Some("v1"), None), 167);
    assert_eq!(derive(Some("é"), None), 233);
  }

  #[test]
  fn test_order_independent() {
    assert_eq!(derive(Some("ab"), None), derive(Some("ba"), None));
  }

  #[test]
  fn test_global_override_prefix() {
    // "g-v1" = 103 + 45 + 118 + 49
    assert_eq!(derive(Some("v1"), Some("g")), 315);
    // "g-" with no input still yields a checksum
    assert_eq!(derive(None, Some("g")), 148);
  }
}
