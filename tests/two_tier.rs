//! End-to-end behaviour of the two tiers working together.

use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use simplecache::cache::{BusyTasks, CacheBuilder};
use simplecache::db::StoreSettings;
use simplecache::host::{AbortHandle, EphemeralStore, SharedProperties};
use simplecache::SimpleCache;

fn builder(dir: &TempDir, props: &SharedProperties) -> CacheBuilder {
  SimpleCache::builder("db", "shared.db")
    .data_dir(dir.path())
    .ephemeral(Arc::new(props.clone()))
}

#[test]
fn test_round_trip_various_values() {
  let dir = TempDir::new().unwrap();
  let props = SharedProperties::new();
  let cache = builder(&dir, &props).open().unwrap();

  let values = [
    json!(null),
    json!(0),
    json!("text with \"quotes\" and ünïcödé"),
    json!([1, "two", {"three": 3}]),
    json!({"nested": {"list": [true, false]}, "n": -1.5}),
  ];
  for (i, value) in values.iter().enumerate() {
    let endpoint = format!("item.{}", i);
    cache.set(&endpoint, value, "v1", 30);
    assert_eq!(cache.get::<Value>(&endpoint, "v1").as_ref(), Some(value));
  }
}

#[test]
fn test_other_process_sees_durable_writes() {
  let dir = TempDir::new().unwrap();
  let writer_props = SharedProperties::new();
  let reader_props = SharedProperties::new();

  let writer = builder(&dir, &writer_props).open().unwrap();
  writer.set("shared", &json!({"v": 1}), "", 1);

  // A separate property table stands in for a separate process
  let reader = builder(&dir, &reader_props).open().unwrap();
  assert_eq!(reader.get::<Value>("shared", ""), Some(json!({"v": 1})));
  assert!(!reader_props.get_property("db_shared.db_simplecache_shared").is_empty());
}

#[test]
fn test_deferred_write_reaches_store_only_after_close() {
  let dir = TempDir::new().unwrap();
  let props = SharedProperties::new();
  let cache = builder(&dir, &props).delay_write(true).open().unwrap();
  let inspector = builder(&dir, &SharedProperties::new()).open().unwrap();

  cache.set("deferred", "payload", "", 1);
  assert_eq!(inspector.store().select("deferred"), None);

  cache.close();
  let row = inspector.store().select("deferred").unwrap();
  assert_eq!(row.data, "\"payload\"");
}

#[test]
fn test_drop_flushes_deferred_writes() {
  let dir = TempDir::new().unwrap();
  {
    let cache = builder(&dir, &SharedProperties::new())
      .delay_write(true)
      .open()
      .unwrap();
    for i in 0..5 {
      cache.set(&format!("k{}", i), &i, "", 1);
    }
  }

  let reader = builder(&dir, &SharedProperties::new()).open().unwrap();
  for i in 0..5 {
    assert_eq!(reader.get::<i32>(&format!("k{}", i), ""), Some(i));
  }
}

#[test]
fn test_concurrent_sets_leave_tiers_consistent() {
  let dir = TempDir::new().unwrap();
  let props = SharedProperties::new();
  let cache = Arc::new(builder(&dir, &props).open().unwrap());

  let handles: Vec<_> = ["d1", "d2"]
    .into_iter()
    .map(|value| {
      let cache = cache.clone();
      thread::spawn(move || {
        for _ in 0..20 {
          cache.set("same", value, "", 1);
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  let durable = cache.store().select("same").unwrap();
  let memory = cache.memory().get("same").unwrap();
  assert_eq!(serde_json::to_string(&memory.data).unwrap(), durable.data);
  assert_eq!(
    cache.get::<String>("same", ""),
    serde_json::from_str::<String>(&durable.data).ok()
  );
}

#[test]
fn test_many_instances_write_the_same_file() {
  let dir = Arc::new(TempDir::new().unwrap());
  let props = SharedProperties::new();

  let handles: Vec<_> = (0..4)
    .map(|t| {
      let dir = dir.clone();
      let props = props.clone();
      thread::spawn(move || {
        let cache = builder(&dir, &props).open().unwrap();
        for i in 0..10 {
          cache.set(&format!("t{}.{}", t, i), &(t * 100 + i), "", 1);
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  let reader = builder(&dir, &SharedProperties::new()).open().unwrap();
  assert_eq!(reader.store().stats(0).unwrap().total, 40);
  assert_eq!(reader.get::<i32>("t3.9", ""), Some(309));
}

#[test]
fn test_close_waits_for_shared_busy_tasks() {
  let dir = TempDir::new().unwrap();
  let props = SharedProperties::new();
  let busy = BusyTasks::new();
  let cache = builder(&dir, &props)
    .busy_tasks(busy.clone())
    .open()
    .unwrap();

  let guard = busy.enter("set.elsewhere");
  let releaser = thread::spawn(move || {
    thread::sleep(Duration::from_millis(80));
    drop(guard);
  });

  let started = Instant::now();
  cache.close();
  assert!(started.elapsed() >= Duration::from_millis(50));
  assert!(busy.is_empty());
  releaser.join().unwrap();
}

#[test]
fn test_abort_during_close_is_best_effort() {
  let dir = TempDir::new().unwrap();
  let props = SharedProperties::new();
  let busy = BusyTasks::new();
  let signal = AbortHandle::new();
  let cache = builder(&dir, &props)
    .delay_write(true)
    .busy_tasks(busy.clone())
    .abort_signal(Arc::new(signal.clone()))
    .open()
    .unwrap();
  cache.set("queued", "x", "", 1);

  let _stuck = busy.enter("set.never-finishes");
  let aborter = thread::spawn(move || {
    thread::sleep(Duration::from_millis(50));
    signal.abort();
  });

  let started = Instant::now();
  cache.close();
  assert!(started.elapsed() < Duration::from_secs(5));
  aborter.join().unwrap();

  let reader = builder(&dir, &SharedProperties::new()).open().unwrap();
  assert_eq!(reader.store().select("queued"), None);
}

#[test]
fn test_corrupt_store_reads_as_empty_and_recovers() {
  let dir = TempDir::new().unwrap();
  let props = SharedProperties::new();
  let cache = builder(&dir, &props)
    .store_settings(StoreSettings {
      open_pause_ms: 10,
      ..StoreSettings::default()
    })
    .open()
    .unwrap();

  std::fs::write(cache.store_path(), vec![0xAB; 4096]).unwrap();
  assert_eq!(cache.get::<Value>("anything", ""), None);

  cache.set("after", "ok", "", 1);
  props.clear_property("db_shared.db_simplecache_after");
  assert_eq!(cache.get::<String>("after", ""), Some("ok".into()));
}
