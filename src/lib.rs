//! EmberDB - the storage core of a disk-oriented database in Rust
//!
//! This crate implements the two hard pieces of a teaching storage engine:
//! a buffer pool that mediates between a fixed set of in-memory frames and
//! a backing file, and a concurrent extendible hash index whose directory
//! and buckets are themselves pages owned by that buffer pool.
//!
//! # Architecture
//!
//! The system is organized into layers, leaves first:
//!
//! - **Storage Layer** (`storage`): disk I/O and on-page layouts
//!   - `DiskManager`: blocking pager over a single database file
//!   - `DiskScheduler`: funnels page I/O through a background worker
//!   - `HashDirectoryPage` / `HashBucketPage`: byte overlays interpreting
//!     raw page buffers as extendible-hash structures
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: fetches pages from disk, caches them in frames,
//!     evicts with write-back
//!   - `LruReplacer`: least-recently-unpinned victim selection
//!   - `FrameHeader`: per-frame metadata, buffer and page latch
//!   - `ReadPageGuard` / `WritePageGuard`: RAII pin-and-latch handles
//!
//! - **Index** (`index`): the extendible hash table
//!   - `ExtendibleHashIndex`: point insert/remove/lookup with bucket
//!     split-on-full and merge-on-empty
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use emberdb::buffer::BufferPoolManager;
//! use emberdb::index::ExtendibleHashIndex;
//! use emberdb::storage::disk::DiskManager;
//! use emberdb::{PageId, RecordId, SlotId, Transaction};
//!
//! # fn main() -> emberdb::Result<()> {
//! let disk_manager = Arc::new(DiskManager::new("test.db")?);
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let index = ExtendibleHashIndex::new(Arc::clone(&bpm))?;
//! let txn = Transaction::new(0);
//!
//! index.insert(&txn, 42, RecordId::new(PageId::new(7), SlotId::new(3)))?;
//!
//! let mut values = Vec::new();
//! if index.get_value(&txn, 42, &mut values)? {
//!     println!("key 42 -> {:?}", values);
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{EmberError, FrameId, PageId, RecordId, Result, SlotId, Transaction};
