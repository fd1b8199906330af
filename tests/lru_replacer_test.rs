//! Integration tests for the LRU replacer

use emberdb::buffer::LruReplacer;
use emberdb::FrameId;

#[test]
fn test_unpin_then_victim_in_lru_order() {
    let replacer = LruReplacer::new(3);

    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(2));
    replacer.unpin(FrameId::new(3));
    assert_eq!(replacer.size(), 3);

    // Least recently unpinned goes first.
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(3)));
    assert_eq!(replacer.victim(), None);

    // A frame pinned after unpinning is no longer a candidate.
    replacer.unpin(FrameId::new(4));
    replacer.pin(FrameId::new(4));
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_pin_removes_from_middle() {
    let replacer = LruReplacer::new(8);

    for i in 1..=5 {
        replacer.unpin(FrameId::new(i));
    }
    replacer.pin(FrameId::new(3));

    assert_eq!(replacer.size(), 4);
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(4)));
    assert_eq!(replacer.victim(), Some(FrameId::new(5)));
}

#[test]
fn test_double_unpin_does_not_refresh() {
    let replacer = LruReplacer::new(8);

    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(2));
    // Frame 1 is already a candidate; its position must not change.
    replacer.unpin(FrameId::new(1));

    assert_eq!(replacer.size(), 2);
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
}

#[test]
fn test_unpin_beyond_capacity_is_noop() {
    let replacer = LruReplacer::new(2);

    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(2));
    replacer.unpin(FrameId::new(3));
    assert_eq!(replacer.size(), 2);

    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    // Room again: frame 3 can now become a candidate.
    replacer.unpin(FrameId::new(3));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(3)));
}

#[test]
fn test_interleaved_pin_unpin() {
    let replacer = LruReplacer::new(4);

    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(2));
    replacer.pin(FrameId::new(1));
    replacer.unpin(FrameId::new(1));

    // Frame 1 was re-unpinned after frame 2, so 2 is now the LRU.
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.size(), 0);
}
