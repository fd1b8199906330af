use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolInner;
use super::FrameHeader;

/// RAII guard for shared access to a pinned page.
///
/// Holds the per-page latch in read mode for its lifetime and releases the
/// pin on drop. The latch is always released before the unpin, so the
/// frame never becomes evictable while its latch is still held.
pub struct ReadPageGuard {
    page_id: PageId,
    /// Keeps the frame alive; the 'static data guard below borrows from it.
    _frame: Arc<FrameHeader>,
    pool: Arc<PoolInner>,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The data guard's lifetime is erased to 'static; the caller must pass
    /// the `Arc` of the exact frame the guard was taken from so the frame
    /// outlives the borrow.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, pool: Arc<PoolInner>) -> Self {
        let data_guard = frame.data.read();
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            _frame: frame,
            pool,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().expect("guard not yet dropped")[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Latch first, then pin.
        self.data_guard.take();
        self.pool.unpin(self.page_id, false);
    }
}

/// RAII guard for exclusive access to a pinned page.
///
/// Holds the per-page latch in write mode for its lifetime. If the buffer
/// was borrowed mutably, the page is unpinned dirty on drop.
pub struct WritePageGuard {
    page_id: PageId,
    _frame: Arc<FrameHeader>,
    pool: Arc<PoolInner>,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    is_dirty: bool,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, pool: Arc<PoolInner>) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            _frame: frame,
            pool,
            data_guard: Some(data_guard),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().expect("guard not yet dropped")[..]
    }

    /// Borrows the buffer mutably and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data_guard.as_mut().expect("guard not yet dropped")[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Latch first, then pin.
        self.data_guard.take();
        self.pool.unpin(self.page_id, self.is_dirty);
    }
}
