use std::hash::Hasher;

use siphasher::sip::SipHasher13;

/// Deterministic 64-bit hash of an index key, supplied by the index's
/// caller. The extendible hash table uses only the low 32 bits; the
/// truncation is intentional.
pub trait HashFunction: Send + Sync {
    fn hash_of(&self, key: u32) -> u64;
}

/// SipHash-1-3 with fixed keys, so a key routes the same way across
/// process restarts.
pub struct SipHashFunction {
    k0: u64,
    k1: u64,
}

impl SipHashFunction {
    pub fn new() -> Self {
        Self {
            k0: 0x7465_6d62_6572_6462,
            k1: 0x6861_7368_696e_6721,
        }
    }
}

impl Default for SipHashFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl HashFunction for SipHashFunction {
    fn hash_of(&self, key: u32) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(self.k0, self.k1);
        hasher.write_u32(key);
        hasher.finish()
    }
}
