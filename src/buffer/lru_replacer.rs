use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::common::FrameId;

struct LruState {
    /// Eviction candidates; most recently unpinned at the front.
    queue: VecDeque<FrameId>,
    /// Membership set for the queue.
    members: HashSet<FrameId>,
}

/// LRU replacement policy over unpin events.
///
/// The replacer tracks frames whose pin count has dropped to zero. The
/// victim is the frame unpinned longest ago; pinning a frame withdraws its
/// candidacy. Recency is defined by unpin order, not by page accesses: the
/// buffer pool never re-promotes a frame while it stays unpinned.
pub struct LruReplacer {
    capacity: usize,
    state: Mutex<LruState>,
}

impl LruReplacer {
    /// Creates a replacer that can track up to `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LruState {
                queue: VecDeque::with_capacity(capacity),
                members: HashSet::with_capacity(capacity),
            }),
        }
    }

    /// Removes and returns the least recently unpinned frame, or None if
    /// there are no candidates.
    pub fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let frame_id = state.queue.pop_back()?;
        state.members.remove(&frame_id);
        Some(frame_id)
    }

    /// Withdraws a frame from the candidate list. No-op if it is not a
    /// candidate.
    pub fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if state.members.remove(&frame_id) {
            state.queue.retain(|candidate| *candidate != frame_id);
        }
    }

    /// Adds a frame as the most recent eviction candidate. No-op if it is
    /// already a candidate or the replacer is at capacity.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if state.members.contains(&frame_id) || state.queue.len() == self.capacity {
            return;
        }
        state.queue.push_front(frame_id);
        state.members.insert(frame_id);
    }

    /// Number of current eviction candidates.
    pub fn size(&self) -> usize {
        self.state.lock().queue.len()
    }
}
