//! Integration tests for the extendible hash index

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use emberdb::buffer::BufferPoolManager;
use emberdb::index::{DefaultKeyComparator, ExtendibleHashIndex, HashFunction};
use emberdb::storage::disk::DiskManager;
use emberdb::storage::page::BUCKET_ARRAY_SIZE;
use emberdb::{PageId, RecordId, SlotId, Transaction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::NamedTempFile;

/// Routes each key by its own value, making directory shapes predictable.
struct IdentityHash;

impl HashFunction for IdentityHash {
    fn hash_of(&self, key: u32) -> u64 {
        key as u64
    }
}

fn record(n: u32) -> RecordId {
    RecordId::new(PageId::new(n), SlotId::new(0))
}

fn global_depth(index: &ExtendibleHashIndex) -> u32 {
    index
        .get_global_depth()
        .unwrap()
        .expect("directory page should be available")
}

fn create_index(pool_size: usize) -> (ExtendibleHashIndex, Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
    let index = ExtendibleHashIndex::new(Arc::clone(&bpm)).unwrap();
    (index, bpm, temp_file)
}

fn create_identity_index(
    pool_size: usize,
    max_depth: u32,
) -> (ExtendibleHashIndex, Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
    let index = ExtendibleHashIndex::with_parts(
        Arc::clone(&bpm),
        Box::new(DefaultKeyComparator),
        Box::new(IdentityHash),
        max_depth,
    )
    .unwrap();
    (index, bpm, temp_file)
}

#[test]
fn test_duplicate_pair_is_rejected() {
    let (index, _bpm, _temp) = create_index(16);
    let txn = Transaction::new(0);

    assert!(index.insert(&txn, 7, record(100)).unwrap());
    assert!(!index.insert(&txn, 7, record(100)).unwrap());

    let mut values = Vec::new();
    assert!(index.get_value(&txn, 7, &mut values).unwrap());
    assert_eq!(values, vec![record(100)]);
}

#[test]
fn test_same_key_multiple_values() {
    let (index, _bpm, _temp) = create_index(16);
    let txn = Transaction::new(0);

    assert!(index.insert(&txn, 7, record(100)).unwrap());
    assert!(index.insert(&txn, 7, record(101)).unwrap());
    assert!(index.insert(&txn, 7, record(102)).unwrap());

    let mut values = Vec::new();
    assert!(index.get_value(&txn, 7, &mut values).unwrap());
    assert_eq!(values.len(), 3);
    for n in [100, 101, 102] {
        assert!(values.contains(&record(n)));
    }

    // Removing one pair leaves the other values untouched.
    assert!(index.remove(&txn, 7, record(101)).unwrap());
    values.clear();
    assert!(index.get_value(&txn, 7, &mut values).unwrap());
    assert_eq!(values.len(), 2);
    assert!(!values.contains(&record(101)));
}

#[test]
fn test_round_trip_law() {
    let (index, _bpm, _temp) = create_index(32);
    let txn = Transaction::new(0);

    for key in 0..500u32 {
        assert!(index.insert(&txn, key, record(key)).unwrap());
    }
    assert!(index.verify_integrity().unwrap());

    let mut values = Vec::new();
    for key in 0..500u32 {
        values.clear();
        assert!(index.get_value(&txn, key, &mut values).unwrap());
        assert_eq!(values, vec![record(key)]);
    }

    for key in 0..500u32 {
        assert!(index.remove(&txn, key, record(key)).unwrap());
        // Removing again is a miss.
        assert!(!index.remove(&txn, key, record(key)).unwrap());
    }

    for key in 0..500u32 {
        values.clear();
        assert!(!index.get_value(&txn, key, &mut values).unwrap());
    }
}

#[test]
fn test_split_cascades_until_key_fits() {
    // All keys are multiples of 16, so the first four splits cannot
    // separate them; the directory has to grow until bit 4 comes into
    // play.
    let (index, _bpm, _temp) = create_identity_index(64, 9);
    let txn = Transaction::new(0);

    assert_eq!(global_depth(&index), 0);

    let keys: Vec<u32> = (0..=BUCKET_ARRAY_SIZE as u32).map(|k| k * 16).collect();
    for &key in &keys {
        assert!(index.insert(&txn, key, record(key)).unwrap());
    }

    assert_eq!(global_depth(&index), 5);
    assert!(index.verify_integrity().unwrap());

    let mut values = Vec::new();
    for &key in &keys {
        values.clear();
        assert!(index.get_value(&txn, key, &mut values).unwrap());
        assert_eq!(values, vec![record(key)]);
    }

    // Tearing everything down collapses the directory again.
    for &key in &keys {
        assert!(index.remove(&txn, key, record(key)).unwrap());
    }
    assert_eq!(global_depth(&index), 0);
    assert!(index.verify_integrity().unwrap());
}

#[test]
fn test_remove_triggers_merge_and_shrink() {
    let (index, bpm, _temp) = create_identity_index(32, 9);
    let txn = Transaction::new(0);

    // Fill the initial bucket with even keys, then add one odd key: the
    // split routes by bit 0, evens stay put and the retry lands the odd
    // key in the fresh bucket.
    let even_keys: Vec<u32> = (0..BUCKET_ARRAY_SIZE as u32).map(|k| k * 2).collect();
    for &key in &even_keys {
        assert!(index.insert(&txn, key, record(key)).unwrap());
    }
    assert_eq!(global_depth(&index), 0);

    assert!(index.insert(&txn, 1, record(1)).unwrap());
    assert_eq!(global_depth(&index), 1);
    assert!(index.verify_integrity().unwrap());

    // Removing the odd key empties its bucket: the bucket merges into its
    // split image, the page is deallocated and the directory shrinks.
    let deallocs_before = bpm.disk_manager().num_deallocations();
    assert!(index.remove(&txn, 1, record(1)).unwrap());

    assert_eq!(global_depth(&index), 0);
    assert_eq!(bpm.disk_manager().num_deallocations(), deallocs_before + 1);
    assert!(index.verify_integrity().unwrap());

    // The surviving bucket is intact.
    let mut values = Vec::new();
    for &key in even_keys.iter().take(10) {
        values.clear();
        assert!(index.get_value(&txn, key, &mut values).unwrap());
        assert_eq!(values, vec![record(key)]);
    }
}

#[test]
fn test_split_refused_at_directory_capacity() {
    // A directory capped at depth 1 can hold two buckets, no more.
    let (index, _bpm, _temp) = create_identity_index(32, 1);
    let txn = Transaction::new(0);

    let even_keys: Vec<u32> = (0..BUCKET_ARRAY_SIZE as u32).map(|k| k * 2).collect();
    for &key in &even_keys {
        assert!(index.insert(&txn, key, record(key)).unwrap());
    }

    // One more even key: the depth-0 split is allowed but separates
    // nothing, and the follow-up split is refused at the cap.
    let overflow_key = BUCKET_ARRAY_SIZE as u32 * 2;
    assert!(!index.insert(&txn, overflow_key, record(overflow_key)).unwrap());

    // The failed insert must leave the directory consistent.
    assert_eq!(global_depth(&index), 1);
    assert!(index.verify_integrity().unwrap());

    let mut values = Vec::new();
    for &key in even_keys.iter().take(10) {
        values.clear();
        assert!(index.get_value(&txn, key, &mut values).unwrap());
    }

    // Odd keys route to the second bucket, which still has room.
    assert!(index.insert(&txn, 3, record(3)).unwrap());
}

#[test]
fn test_random_workload_shrinks_back() {
    let (index, _bpm, _temp) = create_index(64);
    let txn = Transaction::new(0);

    let mut rng = StdRng::seed_from_u64(0xE0B5);
    let mut keys = HashSet::new();
    while keys.len() < 1200 {
        keys.insert(rng.gen::<u32>());
    }
    let keys: Vec<u32> = keys.into_iter().collect();

    for &key in &keys {
        assert!(index.insert(&txn, key, record(key)).unwrap());
    }
    assert!(global_depth(&index) >= 1);
    assert!(index.verify_integrity().unwrap());

    let mut values = Vec::new();
    for &key in &keys {
        values.clear();
        assert!(index.get_value(&txn, key, &mut values).unwrap());
        assert_eq!(values, vec![record(key)]);
    }

    for &key in &keys {
        assert!(index.remove(&txn, key, record(key)).unwrap());
    }

    assert_eq!(global_depth(&index), 0);
    assert!(index.verify_integrity().unwrap());
    for &key in keys.iter().take(50) {
        values.clear();
        assert!(!index.get_value(&txn, key, &mut values).unwrap());
    }
}

#[test]
fn test_operations_refuse_when_pool_is_starved() {
    // Two frames fit the index's own pages, but once both frames are
    // pinned elsewhere nothing can be brought back in.
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(2, dm));
    let index = ExtendibleHashIndex::new(Arc::clone(&bpm)).unwrap();
    let txn = Transaction::new(0);

    assert!(index.insert(&txn, 1, record(1)).unwrap());

    // Evict the index pages and keep both frames pinned.
    let (hog_a, _frame_a) = bpm.new_page().unwrap().unwrap();
    let (hog_b, _frame_b) = bpm.new_page().unwrap().unwrap();

    // Every operation reports refusal; none of them errors.
    let mut values = Vec::new();
    assert!(!index.get_value(&txn, 1, &mut values).unwrap());
    assert!(!index.insert(&txn, 2, record(2)).unwrap());
    assert!(!index.remove(&txn, 1, record(1)).unwrap());
    assert_eq!(index.get_global_depth().unwrap(), None);
    assert!(!index.verify_integrity().unwrap());

    // Releasing the frames brings the index back to life.
    bpm.unpin_page(hog_a, false);
    bpm.unpin_page(hog_b, false);

    values.clear();
    assert!(index.get_value(&txn, 1, &mut values).unwrap());
    assert_eq!(values, vec![record(1)]);
    assert!(index.insert(&txn, 2, record(2)).unwrap());
    assert_eq!(index.get_global_depth().unwrap(), Some(0));
    assert!(index.verify_integrity().unwrap());
}

#[test]
fn test_split_refused_when_no_frame_for_new_bucket() {
    // Three frames: directory, bucket, and one spare. With the spare
    // pinned, the split cannot allocate its new bucket page and the
    // insert is refused without touching the directory.
    let (index, bpm, _temp) = create_identity_index(3, 9);
    let txn = Transaction::new(0);

    for key in 0..BUCKET_ARRAY_SIZE as u32 {
        assert!(index.insert(&txn, key, record(key)).unwrap());
    }

    let (hog, _frame) = bpm.new_page().unwrap().unwrap();

    let overflow_key = BUCKET_ARRAY_SIZE as u32;
    assert!(!index.insert(&txn, overflow_key, record(overflow_key)).unwrap());
    assert_eq!(global_depth(&index), 0);
    assert!(index.verify_integrity().unwrap());

    // With the frame released the same insert goes through and splits.
    bpm.unpin_page(hog, false);
    assert!(index.insert(&txn, overflow_key, record(overflow_key)).unwrap());
    assert_eq!(global_depth(&index), 1);
    assert!(index.verify_integrity().unwrap());

    let mut values = Vec::new();
    assert!(index.get_value(&txn, overflow_key, &mut values).unwrap());
    assert_eq!(values, vec![record(overflow_key)]);
}

#[test]
fn test_reopen_index_from_directory_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let txn = Transaction::new(0);
    let directory_page_id;

    {
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(32, dm));
        let index = ExtendibleHashIndex::new(Arc::clone(&bpm)).unwrap();
        directory_page_id = index.directory_page_id();

        for key in 0..500u32 {
            assert!(index.insert(&txn, key, record(key)).unwrap());
        }
        bpm.flush_all_pages().unwrap();
    }

    // A fresh pool over the same file sees the same index.
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(32, dm));
    let index = ExtendibleHashIndex::open(Arc::clone(&bpm), directory_page_id);

    assert!(index.verify_integrity().unwrap());
    let mut values = Vec::new();
    for key in (0..500u32).step_by(17) {
        values.clear();
        assert!(index.get_value(&txn, key, &mut values).unwrap());
        assert_eq!(values, vec![record(key)]);
    }
}

#[test]
fn test_concurrent_inserts_and_lookups() {
    let (index, _bpm, _temp) = create_index(64);
    let index = Arc::new(index);

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let txn = Transaction::new(t as u64);
                let base = t * 1000;
                for key in base..base + 250 {
                    assert!(index.insert(&txn, key, record(key)).unwrap());
                    // Read-your-writes inside the same thread.
                    let mut values = Vec::new();
                    assert!(index.get_value(&txn, key, &mut values).unwrap());
                    assert!(values.contains(&record(key)));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(index.verify_integrity().unwrap());

    let txn = Transaction::new(99);
    let mut values = Vec::new();
    for t in 0..4u32 {
        let base = t * 1000;
        for key in base..base + 250 {
            values.clear();
            assert!(index.get_value(&txn, key, &mut values).unwrap());
            assert_eq!(values, vec![record(key)]);
        }
    }
}

#[test]
fn test_concurrent_removes_drain_index() {
    let (index, _bpm, _temp) = create_index(64);
    let index = Arc::new(index);

    let txn = Transaction::new(0);
    for key in 0..1000u32 {
        assert!(index.insert(&txn, key, record(key)).unwrap());
    }

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let txn = Transaction::new(t as u64);
                for key in (t..1000).step_by(4) {
                    assert!(index.remove(&txn, key, record(key)).unwrap());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(index.verify_integrity().unwrap());
    assert_eq!(global_depth(&index), 0);

    let mut values = Vec::new();
    for key in (0..1000u32).step_by(37) {
        values.clear();
        assert!(!index.get_value(&txn, key, &mut values).unwrap());
    }
}

#[test]
fn test_mixed_concurrent_workload() {
    let (index, _bpm, _temp) = create_index(64);
    let index = Arc::new(index);

    // Stable keys that stay present throughout.
    let txn = Transaction::new(0);
    for key in 0..100u32 {
        assert!(index.insert(&txn, key, record(key)).unwrap());
    }

    let writers: Vec<_> = (0..2u32)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let txn = Transaction::new(t as u64 + 1);
                let base = 10_000 + t * 1000;
                for key in base..base + 300 {
                    assert!(index.insert(&txn, key, record(key)).unwrap());
                    assert!(index.remove(&txn, key, record(key)).unwrap());
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2u32)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let txn = Transaction::new(t as u64 + 10);
                let mut values = Vec::new();
                for round in 0..300 {
                    let key = (t + round * 7) % 100;
                    values.clear();
                    assert!(index.get_value(&txn, key, &mut values).unwrap());
                    assert_eq!(values, vec![record(key)]);
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    assert!(index.verify_integrity().unwrap());
}
