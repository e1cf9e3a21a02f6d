//! Prelude module shared by the engine core.
//!
//! Re-exports the reference-counting and hashing types every subsystem uses,
//! so the rest of the codebase has one consistent import path.

pub use core::{
    any::Any,
    cell::{Cell, Ref, RefCell, RefMut},
    fmt,
    hash::{BuildHasherDefault, Hash, Hasher},
    mem,
};

pub use std::{
    collections::VecDeque,
    rc::{Rc, Weak},
};

// FxHashMap/FxHashSet - fast non-cryptographic hashing for engine-internal tables
pub use rustc_hash::{FxHashMap, FxHashSet, FxHasher};

// ═══════════════════════════════════════════════════════════════════════════════
// IndexMap - insertion-ordered maps with FxHasher
// ═══════════════════════════════════════════════════════════════════════════════

pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Create an empty IndexMap
#[inline]
pub fn index_map_new<K, V>() -> IndexMap<K, V>
where
    K: Hash + Eq,
{
    indexmap::IndexMap::with_hasher(Default::default())
}

/// Hash a sequence of UTF-16 code units with FxHasher.
///
/// 8-bit and 16-bit strings with the same content hash identically.
#[inline]
pub fn hash_units<I: IntoIterator<Item = u16>>(units: I) -> u32 {
    let mut hasher = FxHasher::default();
    for unit in units {
        hasher.write_u16(unit);
    }
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32
}
