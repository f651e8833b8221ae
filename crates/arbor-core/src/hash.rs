//! Default hasher selection plus the key/fingerprint helpers built on it.

use core::hash::Hash;
use std::hash::Hasher;

use crate::node::Key;

#[cfg(feature = "std-hash")]
pub mod default {
    pub use std::collections::hash_map::DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::new()
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod default {
    pub use ahash::AHasher as DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::default()
    }
}

/// convenience: hash a single value with whichever default is active
#[inline]
pub fn hash_one<T: Hash>(v: &T) -> u64 {
    let mut h = default::new();
    v.hash(&mut h);
    h.finish()
}

/// Hashes an author-facing key (string, integer, tuple, ...) into the
/// fixed-width [`Key`] the keyed-children matcher works with.
#[inline]
pub fn key_of<T: Hash>(v: &T) -> Key {
    hash_one(v)
}
