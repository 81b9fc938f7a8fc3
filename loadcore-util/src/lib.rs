//! Miscellaneous utilities shared by the `loadcore` crates: a stable hash for
//! fingerprinting configs, and the small ordering-preserving shuffle used by
//! the unique-scope row pool.
#![deny(missing_docs, rustdoc::missing_crate_level_docs)]
use std::hash::Hash;

use ahash::RandomState;

pub mod shuffle;

/// Hash `value` with a process-stable (but not cross-process-stable) hasher.
///
/// Used to fingerprint normalized config structs for the provider registry.
/// `ahash`'s `RandomState` is seeded once per process, which is fine here:
/// fingerprints only ever need to be stable within one process.
pub fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    static STATE: std::sync::OnceLock<RandomState> = std::sync::OnceLock::new();
    let state = STATE.get_or_init(RandomState::new);
    state.hash_one(value)
}
