//! Integration tests for the filesystem cache.
//!
//! These exercise the full store → bin → pool → disk path, including the
//! write-behind overlay and the synchronous fallback mode.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tilevault::cache::{
    BinaryCodec, CacheBin, CacheKey, CacheObject, CacheStore, CodecError, Metadata, ObjectCodec,
    ReadResult, RecordStatus,
};
use tilevault::config::{CacheConfig, Compressor};

fn open_store(root: &Path, threads: usize) -> CacheStore {
    CacheStore::new(CacheConfig::new(root).with_threads(threads)).unwrap()
}

/// Poll until the record reaches the expected durable status, failing
/// the test if it takes more than a few seconds.
fn wait_for_status(bin: &CacheBin, key: &CacheKey, expected: RecordStatus) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if bin.record_status(key) == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "record {key} never reached status {expected:?}"
        );
        thread::sleep(Duration::from_millis(5));
    }
}

/// Codec that delays every encode, keeping background writes in flight
/// long enough for tests to observe the overlay.
struct SlowCodec {
    inner: BinaryCodec,
    delay: Duration,
}

impl SlowCodec {
    fn new(delay: Duration) -> Self {
        Self {
            inner: BinaryCodec::new(Compressor::Zlib),
            delay,
        }
    }
}

impl ObjectCodec for SlowCodec {
    fn format(&self) -> &str {
        self.inner.format()
    }

    fn extension(&self) -> &str {
        self.inner.extension()
    }

    fn encode(&self, object: &CacheObject) -> Result<Vec<u8>, CodecError> {
        thread::sleep(self.delay);
        self.inner.encode(object)
    }

    fn decode(&self, bytes: &[u8]) -> Result<CacheObject, CodecError> {
        self.inner.decode(bytes)
    }
}

#[test]
fn test_async_write_becomes_durable() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 2);
    let bin = store.get_or_create_bin("elevation");

    let key = CacheKey::new("tile/3/2/1");
    let image = CacheObject::Image(vec![0xAB; 512]);
    let metadata = Metadata::new().with("format", "png");

    assert!(bin.write(&key, image.clone(), metadata.clone()));

    // Visible immediately, from the overlay or from disk.
    let record = bin.read(&key).into_record().unwrap();
    assert_eq!(*record.object, image);
    assert_eq!(record.metadata, metadata);

    // Eventually durable.
    wait_for_status(&bin, &key, RecordStatus::Found);

    // And still correct once read from disk.
    let record = bin.read(&key).into_record().unwrap();
    assert_eq!(*record.object, image);
    assert_eq!(record.metadata, metadata);
}

#[test]
fn test_overlay_masks_write_in_flight() {
    let tmp = TempDir::new().unwrap();
    let store = CacheStore::with_codec(
        CacheConfig::new(tmp.path()).with_threads(1),
        Arc::new(SlowCodec::new(Duration::from_millis(200))),
    )
    .unwrap();
    let bin = store.get_or_create_bin("imagery");

    let key = CacheKey::new("tile/5/9/12");
    let image = CacheObject::Image(vec![7; 256]);

    assert!(bin.write(&key, image.clone(), Metadata::new()));

    // The background encode is still sleeping, so nothing has been
    // persisted yet, but the read already sees the new record.
    assert_eq!(bin.pending_writes(), 1);
    let record = bin.read(&key).into_record().unwrap();
    assert_eq!(*record.object, image);

    // Flushing drains the pool; afterwards the record is durable and
    // the overlay entry is gone.
    store.flush();
    assert_eq!(bin.pending_writes(), 0);
    assert_eq!(bin.record_status(&key), RecordStatus::Found);
    let record = bin.read(&key).into_record().unwrap();
    assert_eq!(*record.object, image);
}

#[test]
fn test_remove_is_observed_and_second_remove_fails() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 0);
    let bin = store.get_or_create_bin("features");
    let key = CacheKey::new("layer/42");

    assert!(bin.write(&key, CacheObject::Text("geojson".into()), Metadata::new()));
    assert_eq!(bin.record_status(&key), RecordStatus::Found);

    assert!(bin.remove(&key));
    assert!(matches!(bin.read(&key), ReadResult::NotFound));
    assert_eq!(bin.record_status(&key), RecordStatus::NotFound);
    assert!(!bin.remove(&key));
}

#[test]
fn test_clear_empties_one_bin_and_leaves_others() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 0);
    let imagery = store.get_or_create_bin("imagery");
    let terrain = store.get_or_create_bin("terrain");

    let keys: Vec<_> = (0..8).map(|i| CacheKey::new(format!("tile/4/{i}/0"))).collect();
    for key in &keys {
        assert!(imagery.write(key, CacheObject::Image(vec![1; 32]), Metadata::new()));
        assert!(terrain.write(key, CacheObject::Generic(vec![2; 32]), Metadata::new()));
    }
    assert!(imagery.write_bin_metadata(&Metadata::new().with("profile", "global-geodetic")));

    assert!(imagery.clear());

    for key in &keys {
        assert_eq!(imagery.record_status(key), RecordStatus::NotFound);
        assert_eq!(terrain.record_status(key), RecordStatus::Found);
    }
    // The bin-level metadata record survives the clear.
    assert_eq!(
        imagery.read_bin_metadata(),
        Some(Metadata::new().with("profile", "global-geodetic"))
    );
}

#[test]
fn test_sync_mode_sequential_overwrites_read_latest() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 0);
    let bin = store.get_or_create_bin("imagery");
    let key = CacheKey::new("tile/0/0/0");

    for version in 0..10u8 {
        assert!(bin.write(
            &key,
            CacheObject::Image(vec![version; 64]),
            Metadata::new()
        ));
        let record = bin.read(&key).into_record().unwrap();
        assert_eq!(*record.object, CacheObject::Image(vec![version; 64]));
    }
}

#[test]
fn test_sync_mode_concurrent_writers_last_write_wins() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open_store(tmp.path(), 0));
    let bin = store.get_or_create_bin("imagery");
    let key = CacheKey::new("contested/tile");

    // Synchronous writes are durable when `write` returns, so ordering
    // writer turns with a mutex fixes the real-time last write; the
    // reads below it race freely through the per-key gate.
    let turn = Arc::new(Mutex::new(0u8));

    let mut handles = Vec::new();
    for version in 1..=4u8 {
        let bin = Arc::clone(&bin);
        let key = key.clone();
        let turn = Arc::clone(&turn);
        handles.push(thread::spawn(move || {
            for _ in 0..25 {
                {
                    let mut last = turn.lock().unwrap();
                    assert!(bin.write(
                        &key,
                        CacheObject::Image(vec![version; 64]),
                        Metadata::new()
                    ));
                    *last = version;
                }
                assert!(bin.read(&key).is_found());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let last = *turn.lock().unwrap();
    let record = bin.read(&key).into_record().unwrap();
    assert_eq!(*record.object, CacheObject::Image(vec![last; 64]));
}

#[test]
fn test_concurrent_same_key_reads_never_see_partial_records() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open_store(tmp.path(), 4));
    let bin = store.get_or_create_bin("imagery");
    let key = CacheKey::new("hot/tile");

    // Seed so every read has something to find.
    assert!(bin.write(&key, CacheObject::Image(vec![0; 128]), Metadata::new()));
    store.flush();

    let mut handles = Vec::new();
    for version in 1..=4u8 {
        let bin = Arc::clone(&bin);
        let key = key.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..25 {
                assert!(bin.write(&key, CacheObject::Image(vec![version; 128]), Metadata::new()));
                // Any successful read must decode to one complete,
                // previously written record.
                if let ReadResult::Found(record) = bin.read(&key) {
                    match record.object.as_ref() {
                        CacheObject::Image(payload) => {
                            assert_eq!(payload.len(), 128);
                            let first = payload[0];
                            assert!(first <= 4);
                            assert!(payload.iter().all(|b| *b == first));
                        }
                        other => panic!("unexpected object variant: {other:?}"),
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    store.flush();
    assert_eq!(bin.pending_writes(), 0);
    assert_eq!(bin.record_status(&key), RecordStatus::Found);
}

#[test]
fn test_switching_write_modes_at_runtime() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 2);
    let bin = store.get_or_create_bin("imagery");
    assert_eq!(store.write_threads(), 2);

    // Disable background writes; a write is now durable on return.
    store.set_num_threads(0);
    assert_eq!(store.write_threads(), 0);
    let key = CacheKey::new("tile/1/1/1");
    assert!(bin.write(&key, CacheObject::Generic(vec![3; 16]), Metadata::new()));
    assert_eq!(bin.record_status(&key), RecordStatus::Found);

    // Re-enable; the existing bin uses the new pool.
    store.set_num_threads(4);
    assert_eq!(store.write_threads(), 4);
    let key2 = CacheKey::new("tile/2/2/2");
    assert!(bin.write(&key2, CacheObject::Generic(vec![4; 16]), Metadata::new()));
    wait_for_status(&bin, &key2, RecordStatus::Found);
}

#[test]
fn test_bins_are_shared_across_threads() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open_store(tmp.path(), 1));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || store.get_or_create_bin("shared")));
    }
    let bins: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for bin in &bins[1..] {
        assert!(Arc::ptr_eq(&bins[0], bin));
    }
}

#[test]
fn test_default_bin_round_trip() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 0);
    let bin = store.get_or_create_default_bin();

    let key = CacheKey::new("standalone");
    assert!(bin.write(&key, CacheObject::Text("hello".into()), Metadata::new()));
    let record = bin.read(&key).into_record().unwrap();
    assert_eq!(*record.object, CacheObject::Text("hello".into()));
}
