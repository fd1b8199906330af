use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{EmberError, PageId, RecordId, Result, Transaction};
use crate::storage::page::{
    HashBucketPage, HashBucketPageRef, HashDirectoryPage, HashDirectoryPageRef, BUCKET_ARRAY_SIZE,
    DIRECTORY_MAX_DEPTH,
};

use super::{DefaultKeyComparator, HashFunction, KeyComparator, SipHashFunction};

/// Outcome of the fast-path insert attempt.
enum FastInsert {
    /// The insert finished with this result.
    Done(bool),
    /// The target bucket is full; the slow path has to split it.
    BucketFull,
}

/// Outcome of the slow-path split attempt.
enum SplitInsert {
    /// The insert finished with this result.
    Done(bool),
    /// A split happened (or the race resolved itself); retry the insert.
    Retry,
}

/// A persistent extendible hash table: one directory page routing the low
/// bits of each key's hash to bucket pages, all owned by the buffer pool.
/// Buckets split when an insert finds them full and merge away when a
/// remove empties them.
///
/// Concurrency uses two latch levels, always acquired in the same order:
/// the table latch (shared for point operations, exclusive for directory
/// reshaping), then per-page latches via the pool's page guards, directory
/// before bucket. "Upgrading" the table latch means dropping the shared
/// lock, taking the exclusive one and re-validating, so operations that
/// lose that race simply retry.
pub struct ExtendibleHashIndex {
    directory_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    table_latch: RwLock<()>,
    comparator: Box<dyn KeyComparator>,
    hasher: Box<dyn HashFunction>,
}

impl ExtendibleHashIndex {
    /// Creates a new index with the default comparator and hash function.
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        Self::with_parts(
            bpm,
            Box::new(DefaultKeyComparator),
            Box::new(SipHashFunction::new()),
            DIRECTORY_MAX_DEPTH,
        )
    }

    /// Creates a new index with a caller-supplied comparator, hash function
    /// and directory depth cap.
    pub fn with_parts(
        bpm: Arc<BufferPoolManager>,
        comparator: Box<dyn KeyComparator>,
        hasher: Box<dyn HashFunction>,
        max_depth: u32,
    ) -> Result<Self> {
        let (bucket_page_id, bucket_frame) =
            bpm.new_page()?.ok_or(EmberError::PoolExhausted)?;
        {
            let mut data = bucket_frame.write_data();
            HashBucketPage::new(&mut data[..]).init();
        }
        bpm.unpin_page(bucket_page_id, true);

        let (directory_page_id, directory_frame) =
            bpm.new_page()?.ok_or(EmberError::PoolExhausted)?;
        {
            let mut data = directory_frame.write_data();
            HashDirectoryPage::new(&mut data[..]).init(directory_page_id, bucket_page_id, max_depth);
        }
        bpm.unpin_page(directory_page_id, true);

        Ok(Self {
            directory_page_id,
            bpm,
            table_latch: RwLock::new(()),
            comparator,
            hasher,
        })
    }

    /// Re-attaches to the directory page of an existing index.
    pub fn open(bpm: Arc<BufferPoolManager>, directory_page_id: PageId) -> Self {
        Self {
            directory_page_id,
            bpm,
            table_latch: RwLock::new(()),
            comparator: Box::new(DefaultKeyComparator),
            hasher: Box::new(SipHashFunction::new()),
        }
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    /// Low 32 bits of the caller-supplied hash; routing uses these only.
    fn hash(&self, key: u32) -> u32 {
        self.hasher.hash_of(key) as u32
    }

    fn route(&self, key: u32, dir: &HashDirectoryPageRef<'_>) -> (usize, PageId) {
        let bucket_idx = (self.hash(key) & dir.global_depth_mask()) as usize;
        (bucket_idx, dir.bucket_page_id(bucket_idx))
    }

    /// Collects every value stored under `key` into `result`.
    /// Returns whether anything was found; also false when no frame can be
    /// pinned for the lookup.
    pub fn get_value(
        &self,
        _txn: &Transaction,
        key: u32,
        result: &mut Vec<RecordId>,
    ) -> Result<bool> {
        let _table = self.table_latch.read();

        let Some(dir_guard) = self.bpm.read_page(self.directory_page_id)? else {
            return Ok(false);
        };
        let dir = HashDirectoryPageRef::new(dir_guard.data());
        let (_, bucket_page_id) = self.route(key, &dir);

        let Some(bucket_guard) = self.bpm.read_page(bucket_page_id)? else {
            return Ok(false);
        };
        let bucket = HashBucketPageRef::new(bucket_guard.data());
        Ok(bucket.get_value(key, self.comparator.as_ref(), result))
    }

    /// Inserts a key/value pair. Returns false if the exact pair is
    /// already present, the directory cannot grow any further, or no frame
    /// can be pinned to carry the operation out.
    pub fn insert(&self, _txn: &Transaction, key: u32, value: RecordId) -> Result<bool> {
        loop {
            match self.try_insert(key, value)? {
                FastInsert::Done(inserted) => return Ok(inserted),
                FastInsert::BucketFull => {}
            }
            match self.split_insert(key, value)? {
                SplitInsert::Done(inserted) => return Ok(inserted),
                SplitInsert::Retry => {}
            }
        }
    }

    /// Fast path: under the shared table latch, insert into the routed
    /// bucket unless it is full.
    fn try_insert(&self, key: u32, value: RecordId) -> Result<FastInsert> {
        let _table = self.table_latch.read();

        let Some(dir_guard) = self.bpm.read_page(self.directory_page_id)? else {
            return Ok(FastInsert::Done(false));
        };
        let dir = HashDirectoryPageRef::new(dir_guard.data());
        let (_, bucket_page_id) = self.route(key, &dir);

        let Some(mut bucket_guard) = self.bpm.write_page(bucket_page_id)? else {
            return Ok(FastInsert::Done(false));
        };
        {
            let bucket = HashBucketPageRef::new(bucket_guard.data());
            if bucket.is_full() {
                return Ok(FastInsert::BucketFull);
            }
        }

        let mut bucket = HashBucketPage::new(bucket_guard.data_mut());
        Ok(FastInsert::Done(bucket.insert(
            key,
            value,
            self.comparator.as_ref(),
        )))
    }

    /// Slow path: under the exclusive table latch, re-validate and split
    /// the routed bucket, repointing the directory slot family and
    /// redistributing the bucket's entries over the pair.
    fn split_insert(&self, key: u32, value: RecordId) -> Result<SplitInsert> {
        let _table = self.table_latch.write();

        let Some(mut dir_guard) = self.bpm.write_page(self.directory_page_id)? else {
            return Ok(SplitInsert::Done(false));
        };

        // State may have changed while the table latch was dropped.
        let (bucket_idx, bucket_page_id, local_depth, global_depth, dir_size, dir_max_size) = {
            let dir = HashDirectoryPageRef::new(dir_guard.data());
            let (bucket_idx, bucket_page_id) = self.route(key, &dir);
            (
                bucket_idx,
                bucket_page_id,
                dir.local_depth(bucket_idx),
                dir.global_depth(),
                dir.size(),
                dir.max_size(),
            )
        };

        let Some(mut bucket_guard) = self.bpm.write_page(bucket_page_id)? else {
            return Ok(SplitInsert::Done(false));
        };
        {
            let bucket = HashBucketPageRef::new(bucket_guard.data());

            let mut existing = Vec::new();
            if bucket.get_value(key, self.comparator.as_ref(), &mut existing)
                && existing.contains(&value)
            {
                return Ok(SplitInsert::Done(false));
            }

            if !bucket.is_full() {
                // Lost the race to a concurrent remove; the fast path will
                // succeed now.
                return Ok(SplitInsert::Retry);
            }
        }

        if dir_size >= dir_max_size {
            debug!("directory at capacity ({dir_size} slots), refusing to split");
            return Ok(SplitInsert::Done(false));
        }

        let Some((new_bucket_page_id, new_bucket_frame)) = self.bpm.new_page()? else {
            debug!("no free frame for a new bucket page, refusing the split");
            return Ok(SplitInsert::Done(false));
        };

        {
            let mut dir = HashDirectoryPage::new(dir_guard.data_mut());
            if local_depth == global_depth {
                let grew = dir.incr_global_depth();
                debug_assert!(grew);
            }

            // Every slot sharing the split bucket's low `local_depth` bits
            // gets one more depth bit; that new bit picks old or new page.
            let low_bits = bucket_idx as u32 & ((1u32 << local_depth) - 1);
            let family = 1u32 << (dir.global_depth() - local_depth);
            for i in 0..family {
                let slot = ((i << local_depth) | low_bits) as usize;
                dir.incr_local_depth(slot);
                if i & 1 == 0 {
                    dir.set_bucket_page_id(slot, bucket_page_id);
                } else {
                    dir.set_bucket_page_id(slot, new_bucket_page_id);
                }
            }
        }

        // Redistribute: move every entry that now routes to the new page.
        {
            let dir = HashDirectoryPageRef::new(dir_guard.data());
            let mut old_bucket = HashBucketPage::new(bucket_guard.data_mut());
            let mut new_data = new_bucket_frame.write_data();
            let mut new_bucket = HashBucketPage::new(&mut new_data[..]);
            new_bucket.init();

            for slot in 0..BUCKET_ARRAY_SIZE {
                if !old_bucket.is_readable(slot) {
                    continue;
                }
                let slot_key = old_bucket.key_at(slot);
                let slot_value = old_bucket.value_at(slot);
                let (_, target) = self.route(slot_key, &dir);
                if target == new_bucket_page_id {
                    old_bucket.remove_at(slot);
                    let moved = new_bucket.insert(slot_key, slot_value, self.comparator.as_ref());
                    debug_assert!(moved);
                }
            }
        }

        debug!(
            "split bucket page {bucket_page_id} (slot {bucket_idx}, local depth {local_depth}) \
             into page {new_bucket_page_id}"
        );
        self.bpm.unpin_page(new_bucket_page_id, true);

        Ok(SplitInsert::Retry)
    }

    /// Removes a key/value pair. Returns false if no such pair exists or
    /// no frame can be pinned to reach it. A successful removal is
    /// followed by a merge pass over the emptied bucket's routing chain.
    pub fn remove(&self, _txn: &Transaction, key: u32, value: RecordId) -> Result<bool> {
        {
            let _table = self.table_latch.read();

            let Some(dir_guard) = self.bpm.read_page(self.directory_page_id)? else {
                return Ok(false);
            };
            let dir = HashDirectoryPageRef::new(dir_guard.data());
            let (_, bucket_page_id) = self.route(key, &dir);

            let Some(mut bucket_guard) = self.bpm.write_page(bucket_page_id)? else {
                return Ok(false);
            };

            // Probe before touching the buffer so a miss leaves the page
            // clean.
            let has_pair = {
                let bucket = HashBucketPageRef::new(bucket_guard.data());
                let mut existing = Vec::new();
                bucket.get_value(key, self.comparator.as_ref(), &mut existing)
                    && existing.contains(&value)
            };
            if !has_pair {
                return Ok(false);
            }

            let removed = HashBucketPage::new(bucket_guard.data_mut()).remove(
                key,
                value,
                self.comparator.as_ref(),
            );
            debug_assert!(removed);
        }

        self.merge(key)?;
        Ok(true)
    }

    /// Folds empty buckets into their split images, shrinking the
    /// directory when possible. Runs to fixpoint starting from the removed
    /// key's routing, since a surviving merged bucket may itself be empty.
    /// The pass is opportunistic: if no frame can be pinned it stops and
    /// leaves the (consistent) directory for a later merge to tidy up.
    fn merge(&self, key: u32) -> Result<()> {
        let _table = self.table_latch.write();

        let Some(mut dir_guard) = self.bpm.write_page(self.directory_page_id)? else {
            debug!("no free frame for a merge pass, skipping");
            return Ok(());
        };

        loop {
            let (bucket_idx, bucket_page_id, local_depth, split_idx, split_page_id, global_depth) = {
                let dir = HashDirectoryPageRef::new(dir_guard.data());
                let (bucket_idx, bucket_page_id) = self.route(key, &dir);
                let local_depth = dir.local_depth(bucket_idx);
                if local_depth == 0 {
                    break;
                }
                let split_idx = dir.split_image_index(bucket_idx);
                (
                    bucket_idx,
                    bucket_page_id,
                    local_depth,
                    split_idx,
                    dir.bucket_page_id(split_idx),
                    dir.global_depth(),
                )
            };

            {
                let dir = HashDirectoryPageRef::new(dir_guard.data());
                if dir.local_depth(split_idx) != local_depth {
                    break;
                }
            }

            // Bucket latch order follows directory index order.
            let (first_id, second_id) = if bucket_idx < split_idx {
                (bucket_page_id, split_page_id)
            } else {
                (split_page_id, bucket_page_id)
            };
            let Some(first_guard) = self.bpm.read_page(first_id)? else {
                break;
            };
            let Some(second_guard) = self.bpm.read_page(second_id)? else {
                break;
            };
            let first_empty = HashBucketPageRef::new(first_guard.data()).is_empty();
            let second_empty = HashBucketPageRef::new(second_guard.data()).is_empty();
            drop(second_guard);
            drop(first_guard);

            let (bucket_empty, split_empty) = if bucket_idx < split_idx {
                (first_empty, second_empty)
            } else {
                (second_empty, first_empty)
            };
            if !bucket_empty && !split_empty {
                break;
            }

            // The non-empty side survives; its sibling is absorbed.
            let (survivor_idx, survivor_page_id, absorbed_page_id) = if bucket_empty {
                (split_idx, split_page_id, bucket_page_id)
            } else {
                (bucket_idx, bucket_page_id, split_page_id)
            };

            {
                let mut dir = HashDirectoryPage::new(dir_guard.data_mut());
                let merged_depth = local_depth - 1;
                let low_bits = survivor_idx as u32 & ((1u32 << merged_depth) - 1);
                let family = 1u32 << (global_depth - merged_depth);
                for i in 0..family {
                    let slot = ((i << merged_depth) | low_bits) as usize;
                    dir.decr_local_depth(slot);
                    dir.set_bucket_page_id(slot, survivor_page_id);
                }
                if dir.can_shrink() {
                    dir.decr_global_depth();
                }
            }

            debug!("merged bucket page {absorbed_page_id} into {survivor_page_id}");
            if !self.bpm.delete_page(absorbed_page_id)? {
                warn!("absorbed bucket page {absorbed_page_id} still pinned, leaking it");
            }
        }

        Ok(())
    }

    /// Current number of hash bits used for routing, or None when the
    /// directory page cannot be pinned.
    pub fn get_global_depth(&self) -> Result<Option<u32>> {
        let _table = self.table_latch.read();

        let Some(dir_guard) = self.bpm.read_page(self.directory_page_id)? else {
            return Ok(None);
        };
        Ok(Some(
            HashDirectoryPageRef::new(dir_guard.data()).global_depth(),
        ))
    }

    /// Checks the directory's structural invariants. Ok(true) means the
    /// invariants were checked and hold; Ok(false) means the directory
    /// page could not be pinned and nothing was checked; violations are
    /// reported as `EmberError::IndexCorrupted`.
    pub fn verify_integrity(&self) -> Result<bool> {
        let _table = self.table_latch.read();

        let Some(dir_guard) = self.bpm.read_page(self.directory_page_id)? else {
            return Ok(false);
        };
        HashDirectoryPageRef::new(dir_guard.data()).verify_integrity()?;
        Ok(true)
    }
}
