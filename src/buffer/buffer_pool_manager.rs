use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::{EmberError, FrameId, PageId, Result, INVALID_PAGE_ID};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping guarded by the pool's coarse latch.
struct PoolState {
    /// Maps resident page IDs to the frames holding them
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page; FIFO so recently freed frames are reused last
    free_list: VecDeque<FrameId>,
    /// Next page ID this instance will hand out
    next_page_id: u32,
}

/// Shared pool internals. Page guards hold an `Arc` to this so the unpin
/// they perform on drop outlives the `BufferPoolManager` handle itself.
pub(crate) struct PoolInner {
    num_instances: u32,
    instance_index: u32,
    frames: Vec<Arc<FrameHeader>>,
    state: Mutex<PoolState>,
    replacer: LruReplacer,
    disk: DiskScheduler,
}

impl PoolInner {
    /// Hands out the next page ID for this instance. IDs are striped across
    /// a parallel pool: `id % num_instances == instance_index` always holds.
    fn allocate_page_id(&self, state: &mut PoolState) -> PageId {
        let id = state.next_page_id;
        state.next_page_id += self.num_instances;
        assert_eq!(id % self.num_instances, self.instance_index);
        PageId::new(id)
    }

    /// Produces a frame ready to receive a page: free list first, then the
    /// replacer. The previous occupant (if any) is written back when dirty
    /// and dropped from the page table.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<Option<FrameId>> {
        let frame_id = match state.free_list.pop_front() {
            Some(frame_id) => frame_id,
            None => match self.replacer.victim() {
                Some(frame_id) => frame_id,
                None => return Ok(None),
            },
        };

        // The victim's pin count is 0, so no one holds its page latch and
        // the data accesses below cannot block.
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();
        if old_page_id != INVALID_PAGE_ID {
            if frame.is_dirty() {
                debug!("evicting dirty page {old_page_id} from frame {frame_id}");
                let data = frame.read_data();
                self.disk.write_page(old_page_id, &data[..])?;
                frame.set_dirty(false);
            }
            state.page_table.remove(&old_page_id);
        }

        Ok(Some(frame_id))
    }

    pub(crate) fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.unpin(frame_id);
                }
                true
            }
        }
    }
}

/// BufferPoolManager mediates between a fixed set of in-memory frames and
/// the backing store. Pages enter the pool through `new_page` and
/// `fetch_page`, both of which pin the returned frame; every pin must be
/// paired with exactly one `unpin_page` (or be held by a page guard, which
/// unpins on drop).
pub struct BufferPoolManager {
    pool_size: usize,
    inner: Arc<PoolInner>,
}

impl BufferPoolManager {
    /// Creates a standalone pool (a parallel pool of one).
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_instance(pool_size, 1, 0, disk_manager)
    }

    /// Creates one member of a parallel pool. Only page ID allocation is
    /// affected: instance `i` of `n` hands out IDs congruent to `i` mod `n`.
    pub fn with_instance(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "parallel pool must have at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index {instance_index} out of range for {num_instances} instances"
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let inner = Arc::new(PoolInner {
            num_instances,
            instance_index,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index,
            }),
            replacer: LruReplacer::new(pool_size),
            disk: DiskScheduler::new(disk_manager),
        });

        Self { pool_size, inner }
    }

    /// Allocates a fresh page, pinned once, its buffer zeroed.
    /// Returns None when every frame is pinned.
    pub fn new_page(&self) -> Result<Option<(PageId, Arc<FrameHeader>)>> {
        let mut state = self.inner.state.lock();

        if self.inner.frames.iter().all(|frame| frame.pin_count() > 0) {
            return Ok(None);
        }
        let Some(frame_id) = self.inner.acquire_frame(&mut state)? else {
            return Ok(None);
        };

        let page_id = self.inner.allocate_page_id(&mut state);
        let frame = &self.inner.frames[frame_id.as_usize()];
        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        self.inner.replacer.pin(frame_id);

        Ok(Some((page_id, Arc::clone(frame))))
    }

    /// Brings a page into the pool (reading it from disk on a miss) and
    /// pins it. Returns None when no frame can be freed up.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<Arc<FrameHeader>>> {
        if page_id == INVALID_PAGE_ID {
            return Err(EmberError::InvalidPageId(page_id));
        }

        let mut state = self.inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.inner.frames[frame_id.as_usize()];
            frame.pin();
            self.inner.replacer.pin(frame_id);
            return Ok(Some(Arc::clone(frame)));
        }

        let Some(frame_id) = self.inner.acquire_frame(&mut state)? else {
            return Ok(None);
        };

        let frame = &self.inner.frames[frame_id.as_usize()];
        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();
        {
            let mut data = frame.write_data();
            self.inner.disk.read_page(page_id, &mut data[..])?;
        }

        state.page_table.insert(page_id, frame_id);
        self.inner.replacer.pin(frame_id);

        Ok(Some(Arc::clone(frame)))
    }

    /// Drops one pin on a page, ORing `is_dirty` into its dirty flag.
    /// Returns false if the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.inner.unpin(page_id, is_dirty)
    }

    /// Writes a resident page back to disk regardless of its pin count and
    /// clears its dirty flag. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let frame = {
            let state = self.inner.state.lock();
            match state.page_table.get(&page_id) {
                Some(&frame_id) => Arc::clone(&self.inner.frames[frame_id.as_usize()]),
                None => return Ok(false),
            }
        };

        // The page latch is taken outside the pool latch: whoever holds the
        // page latch may itself be blocked on the pool latch.
        let data = frame.read_data();
        if frame.page_id() != page_id {
            // Evicted in the meantime; the eviction already wrote it back.
            return Ok(true);
        }
        self.inner.disk.write_page(page_id, &data[..])?;
        frame.set_dirty(false);
        Ok(true)
    }

    /// Writes back every dirty resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        for frame in &self.inner.frames {
            if !frame.is_dirty() {
                continue;
            }
            // Page latch outside the pool latch, as in `flush_page`.
            let data = frame.read_data();
            let page_id = frame.page_id();
            if page_id == INVALID_PAGE_ID || !frame.is_dirty() {
                continue;
            }
            self.inner.disk.write_page(page_id, &data[..])?;
            frame.set_dirty(false);
        }
        Ok(())
    }

    /// Evicts a page from the pool and tells the backing store to forget
    /// it. Returns true if the page was absent (vacuous success) or
    /// removed; false while anyone still holds a pin.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.inner.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };

        let frame = &self.inner.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        if frame.is_dirty() {
            let data = frame.read_data();
            self.inner.disk.write_page(page_id, &data[..])?;
        }

        state.page_table.remove(&page_id);
        self.inner.replacer.pin(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        self.inner.disk.disk_manager().deallocate_page(page_id);
        Ok(true)
    }

    /// Fetches a page and wraps it in a guard holding the per-page latch in
    /// shared mode; the pin is released when the guard drops.
    pub fn read_page(&self, page_id: PageId) -> Result<Option<ReadPageGuard>> {
        let Some(frame) = self.fetch_page(page_id)? else {
            return Ok(None);
        };
        // Safety: the guard keeps the frame Arc alive for its whole lifetime.
        Ok(Some(unsafe {
            ReadPageGuard::new(page_id, frame, Arc::clone(&self.inner))
        }))
    }

    /// Fetches a page and wraps it in a guard holding the per-page latch in
    /// exclusive mode; the pin (and dirty flag, if the buffer was touched)
    /// is released when the guard drops.
    pub fn write_page(&self, page_id: PageId) -> Result<Option<WritePageGuard>> {
        let Some(frame) = self.fetch_page(page_id)? else {
            return Ok(None);
        };
        // Safety: the guard keeps the frame Arc alive for its whole lifetime.
        Ok(Some(unsafe {
            WritePageGuard::new(page_id, frame, Arc::clone(&self.inner))
        }))
    }

    /// Current pin count of a resident page, None if not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|frame_id| self.inner.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.inner.disk.disk_manager()
    }
}
