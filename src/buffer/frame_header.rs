use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// FrameHeader manages a single buffer frame: the page buffer itself plus
/// the metadata the buffer pool needs to track it.
///
/// The `RwLock` around the buffer doubles as the per-page latch that index
/// code takes while reading or mutating a page's contents. Pin count and
/// the dirty flag are atomics so they can be read without the pool latch.
pub struct FrameHeader {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// Raw page ID held in this frame (`INVALID_PAGE_ID` when empty)
    page_id: AtomicU32,
    /// Number of callers currently using this frame
    pin_count: AtomicU32,
    /// Whether the buffer differs from the backing store
    is_dirty: AtomicBool,
    /// The page buffer, behind the per-page latch
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(INVALID_PAGE_ID.as_u32()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page ID stored in this frame.
    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_u32(), Ordering::Release);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&self) -> Option<u32> {
        let mut current = self.pin_count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return None;
            }
            match self.pin_count.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current - 1),
                Err(observed) => current = observed,
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Takes the per-page latch in shared mode and returns the buffer.
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Takes the per-page latch in exclusive mode and returns the buffer.
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Returns the frame to its empty state: no page, unpinned, clean,
    /// zeroed buffer.
    pub fn reset(&self) {
        self.page_id
            .store(INVALID_PAGE_ID.as_u32(), Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}
