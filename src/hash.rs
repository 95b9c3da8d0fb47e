//! Deterministic hashing for values persisted alongside the posting store.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Hash with `FxHasher`, which is seedless and identical across runs.
pub fn stable_hash_with(f: impl FnOnce(&mut FxHasher)) -> u64 {
    let mut hasher = FxHasher::default();
    f(&mut hasher);
    hasher.finish()
}

/// Hash `value` under `seed`.
pub fn stable_hash_str(seed: u64, value: &str) -> u64 {
    stable_hash_with(|hasher| {
        seed.hash(hasher);
        value.hash(hasher);
    })
}
