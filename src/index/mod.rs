pub mod hash_index;
pub mod key_comparator;
pub mod key_hasher;

pub use hash_index::ExtendibleHashIndex;
pub use key_comparator::{DefaultKeyComparator, KeyComparator};
pub use key_hasher::{HashFunction, SipHashFunction};
