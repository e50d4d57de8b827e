#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Bucket metadata: packed probe-sequence length and fingerprint.
pub mod bucket;

/// A HashMap implementation on top of the Robin-Hood table.
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers and storage
/// policies.
pub mod hash_map;

/// The raw Robin-Hood hash table.
///
/// [`HashTable`] takes precomputed hashes and equality predicates and
/// leaves hashing to its callers; [`HashMap`] and [`HashSet`] build on it.
pub mod hash_table;

/// A hash set implementation on top of the Robin-Hood table.
///
/// This module provides a `HashSet` that wraps the `HashTable` and provides
/// a standard set interface with configurable hashers and storage policies.
pub mod hash_set;

pub mod hasher;

pub mod storage;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Hasher builder used when none is specified.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// Hasher builder used when none is specified.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Placeholder hasher builder; without `std` or `foldhash` a hasher
        /// must be supplied explicitly.
        pub type DefaultHashBuilder = ();
    }
}

pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_map::StableHashMap;
pub use hash_set::HashSet;
pub use hash_set::StableHashSet;
pub use hash_table::HashTable;
pub use hasher::KeyHasher;
pub use storage::Flat;
pub use storage::Pooled;
