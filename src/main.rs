use std::sync::Arc;

use emberdb::buffer::BufferPoolManager;
use emberdb::index::ExtendibleHashIndex;
use emberdb::storage::disk::DiskManager;
use emberdb::common::DEFAULT_BUFFER_POOL_SIZE;
use emberdb::{PageId, RecordId, SlotId, Transaction};

fn main() {
    println!("EmberDB - buffer pool and extendible hash index");
    println!("===============================================\n");

    let db_path = "ember_demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    println!("Opened database file: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(DEFAULT_BUFFER_POOL_SIZE, disk_manager));
    println!("Created buffer pool with {} frames\n", bpm.pool_size());

    let index = ExtendibleHashIndex::new(Arc::clone(&bpm)).expect("failed to create index");
    let txn = Transaction::new(0);

    // Index a batch of fake records.
    for key in 0..600u32 {
        let record = RecordId::new(PageId::new(1000 + key / 16), SlotId::new((key % 16) as u16));
        index.insert(&txn, key, record).expect("insert failed");
    }
    println!("Inserted 600 keys");
    println!(
        "Global depth after inserts: {}",
        index
            .get_global_depth()
            .expect("depth read failed")
            .expect("directory page unavailable")
    );

    // Point lookups.
    let mut values = Vec::new();
    for key in [0u32, 299, 599] {
        values.clear();
        let found = index
            .get_value(&txn, key, &mut values)
            .expect("lookup failed");
        println!("Lookup key {:>3}: found={} values={:?}", key, found, values);
    }

    // Remove everything; merges shrink the directory back down.
    for key in 0..600u32 {
        let record = RecordId::new(PageId::new(1000 + key / 16), SlotId::new((key % 16) as u16));
        index.remove(&txn, key, record).expect("remove failed");
    }
    println!("\nRemoved all 600 keys");
    println!(
        "Global depth after removes: {}",
        index
            .get_global_depth()
            .expect("depth read failed")
            .expect("directory page unavailable")
    );

    assert!(index.verify_integrity().expect("directory integrity"));
    bpm.flush_all_pages().expect("flush failed");
    println!("Flushed all pages");

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
