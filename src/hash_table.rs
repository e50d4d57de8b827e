use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::bucket::Bucket;
use crate::bucket::MAX_PSL;
use crate::bucket::Meta;
use crate::bucket::fingerprint_of;
use crate::storage::Flat;
use crate::storage::NodeStorage;
use crate::storage::StoragePolicy;

cfg_if::cfg_if! {
    if #[cfg(feature = "density-ninety-two")] {
        /// Maximum load factor new tables start with.
        pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.92;
    } else if #[cfg(feature = "density-eighty")] {
        /// Maximum load factor new tables start with.
        pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.8;
    } else {
        /// Maximum load factor new tables start with.
        pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.875;
    }
}

/// Smallest non-zero number of buckets a table allocates.
const MIN_BUCKETS: usize = 8;

/// Node indexes are stored in bucket metadata words.
const MAX_NODES: usize = Meta::MAX as usize;

/// Fractional bits of the fixed-point load factor.
const LOAD_FACTOR_SHIFT: u32 = 16;

/// `max_load_factor` in units of `2^-16`, never zero.
#[inline(always)]
fn load_factor_units(max_load_factor: f32) -> u128 {
    ((max_load_factor * (1u32 << LOAD_FACTOR_SHIFT) as f32) as u128).max(1)
}

#[inline(always)]
fn max_population(buckets: usize, max_load_factor: f32) -> usize {
    ((buckets as u128 * load_factor_units(max_load_factor)) >> LOAD_FACTOR_SHIFT) as usize
}

#[inline(always)]
fn max_population_inverse(required: usize, max_load_factor: f32) -> usize {
    ((required as u128) << LOAD_FACTOR_SHIFT)
        .div_ceil(load_factor_units(max_load_factor))
        .try_into()
        .expect("capacity overflow")
}

/// Smallest power-of-two bucket count able to hold `required` values.
fn buckets_for(required: usize, max_load_factor: f32) -> usize {
    if required == 0 {
        return 0;
    }

    let estimate = max_population_inverse(required, max_load_factor).max(MIN_BUCKETS);
    let mut buckets = estimate
        .checked_next_power_of_two()
        .expect("capacity overflow");
    while max_population(buckets, max_load_factor) < required {
        buckets = buckets.checked_mul(2).expect("capacity overflow");
    }
    buckets
}

fn check_load_factor(max_load_factor: f32) {
    assert!(
        max_load_factor > 0.0 && max_load_factor <= 1.0,
        "max load factor must be in (0, 1], got {max_load_factor}"
    );
}

/// Zero-initialized bucket metadata. All-zero memory is an array of empty
/// buckets.
struct BucketArray {
    ptr: NonNull<Bucket>,
    len: usize,
}

// SAFETY: `BucketArray` exclusively owns plain-old-data buckets.
unsafe impl Send for BucketArray {}
// SAFETY: Shared access is read-only.
unsafe impl Sync for BucketArray {}

impl BucketArray {
    const fn empty() -> Self {
        BucketArray {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    fn new(len: usize) -> Self {
        if len == 0 {
            return Self::empty();
        }

        let layout = Layout::array::<Bucket>(len).expect("allocation size overflow");
        // SAFETY: We have validated that `len` and therefore the layout size is
        // non-zero. A null return is routed to `handle_alloc_error`. Zeroed
        // memory is a valid `[Bucket]` where every bucket is empty.
        unsafe {
            let raw = alloc::alloc::alloc_zeroed(layout);
            if raw.is_null() {
                handle_alloc_error(layout);
            }

            BucketArray {
                ptr: NonNull::new_unchecked(raw.cast()),
                len,
            }
        }
    }

    #[inline(always)]
    fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    fn as_slice(&self) -> &[Bucket] {
        // SAFETY: `ptr` is either dangling with `len == 0` or points at `len`
        // initialized buckets.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline(always)]
    fn as_mut_slice(&mut self) -> &mut [Bucket] {
        // SAFETY: As in `as_slice`, and `&mut self` grants exclusive access.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn reset(&mut self) {
        self.as_mut_slice().fill(Bucket::EMPTY);
    }

    fn allocated_bytes(&self) -> usize {
        self.len * size_of::<Bucket>()
    }
}

impl Drop for BucketArray {
    fn drop(&mut self) {
        if self.len != 0 {
            // SAFETY: Non-empty arrays were allocated in `new` with this
            // layout.
            unsafe {
                alloc::alloc::dealloc(
                    self.ptr.as_ptr().cast(),
                    Layout::array::<Bucket>(self.len).unwrap_unchecked(),
                );
            }
        }
    }
}

/// Debug statistics for hash table analysis.
///
/// Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of elements currently in the table
    pub populated: usize,
    /// Maximum number of elements before resize
    pub capacity: usize,
    /// Number of buckets allocated
    pub bucket_capacity: usize,
    /// Configured maximum load factor
    pub max_load_factor: f32,
    /// Load factor (populated / bucket_capacity)
    pub load_factor: f64,
    /// Mean distance of an element from its home bucket
    pub mean_displacement: f64,
    /// Largest distance of an element from its home bucket
    pub max_displacement: usize,
    /// Whether element addresses survive unrelated insertions and removals
    pub pointer_stable: bool,
    /// Total heap memory in bytes used by buckets and node storage
    pub total_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% of {} buckets, max load factor {:.3})",
            self.populated,
            self.capacity,
            self.load_factor * 100.0,
            self.bucket_capacity,
            self.max_load_factor,
        );
        println!(
            "Displacement: mean {:.3}, max {}",
            self.mean_displacement, self.max_displacement
        );
        println!(
            "Storage: {} ({} bytes allocated)",
            if self.pointer_stable {
                "pooled, pointer-stable"
            } else {
                "flat"
            },
            self.total_bytes
        );
    }
}

/// A hash table using Robin-Hood open addressing with backward-shift
/// deletion.
///
/// `HashTable<V, P>` stores values of type `V` and provides fast insertion,
/// lookup, and removal operations. Like other raw tables, it requires you to
/// provide both the hash value and an equality predicate for each operation;
/// the hash is used as given, so it should already be well distributed in its
/// low and high bits.
///
/// Buckets hold a packed probe-sequence length and fingerprint plus an index
/// into node storage. The storage strategy `P` is fixed by the type:
///
/// - [`Flat`] (the default) keeps values contiguous. Removing a value moves
///   another one, so element addresses are not stable.
/// - [`Pooled`](crate::storage::Pooled) constructs values in chunks that are
///   never moved. A value keeps its address until it is removed, regardless
///   of growth or of other removals.
///
/// Iteration walks node storage directly and visits only live values.
///
/// ## Performance Characteristics
///
/// - **Memory**: one 8-byte bucket (16 with `large-buckets`) per slot, plus
///   the value and its 8-byte hash in node storage.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use robin_hash::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # #[derive(Debug, PartialEq)]
/// # struct Person {
/// #     id: u64,
/// #     name: String,
/// # }
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table = HashTable::with_capacity(100);
/// let hash = hash_id(123);
///
/// // Insert a person
/// match table.entry(hash, |p: &Person| p.id == 123) {
///     robin_hash::hash_table::Entry::Vacant(entry) => {
///         entry.insert(Person {
///             id: 123,
///             name: "Alice".to_string(),
///         });
///     }
///     robin_hash::hash_table::Entry::Occupied(_) => {
///         println!("Person already exists");
///     }
/// }
/// ```
pub struct HashTable<V, P: StoragePolicy = Flat> {
    buckets: BucketArray,
    nodes: P::Nodes<V>,
    max_pop: usize,
    max_load_factor: f32,
}

enum Probe {
    Found(usize),
    Vacant { pos: usize, psl: Meta },
}

impl<V, P: StoragePolicy> Debug for HashTable<V, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("buckets", &self.buckets.as_slice())
            .field("populated", &self.len())
            .field("capacity", &self.max_pop)
            .field("max_load_factor", &self.max_load_factor)
            .finish()
    }
}

impl<V, P> Clone for HashTable<V, P>
where
    V: Clone,
    P: StoragePolicy,
{
    fn clone(&self) -> Self {
        let mut table = Self::with_buckets(self.buckets.len(), self.max_load_factor);
        table.nodes.reserve(self.len());

        for position in 0..self.nodes.len() {
            let index = self.nodes.index_at(position);
            table.insert_unique(self.nodes.hash(index), self.nodes.get(index).clone());
        }

        debug_assert_eq!(table.len(), self.len());
        table
    }
}

impl<V, P: StoragePolicy> Default for HashTable<V, P> {
    fn default() -> Self {
        Self::with_buckets(0, DEFAULT_MAX_LOAD_FACTOR)
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with flat node storage. Does not allocate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::new();
    /// assert!(table.is_empty());
    /// assert_eq!(table.bucket_capacity(), 0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new hash table with flat node storage and the specified
    /// capacity.
    ///
    /// The actual capacity may be larger than requested since the number of
    /// buckets is always a power of two.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::hash_table::HashTable;
    /// #
    /// // Create a table that can hold at least 100 items without resizing
    /// let table: HashTable<String> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Flat)
    }

    /// Creates a table with flat node storage, room for `capacity` values
    /// and the given maximum load factor.
    ///
    /// # Panics
    ///
    /// Panics if `max_load_factor` is not in `(0, 1]`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::with_capacity_and_load_factor(100, 0.5);
    /// assert!(table.capacity() >= 100);
    /// assert_eq!(table.bucket_capacity(), 256);
    /// ```
    pub fn with_capacity_and_load_factor(capacity: usize, max_load_factor: f32) -> Self {
        Self::with_capacity_and_load_factor_in(capacity, max_load_factor, Flat)
    }
}

impl<V, P: StoragePolicy> HashTable<V, P> {
    /// Creates an empty table using the node storage selected by `policy`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::hash_table::HashTable;
    /// use robin_hash::storage::Pooled;
    ///
    /// let table: HashTable<u64, Pooled> = HashTable::new_in(Pooled);
    /// assert!(table.is_pointer_stable());
    /// ```
    pub fn new_in(policy: P) -> Self {
        Self::with_capacity_in(0, policy)
    }

    /// Creates a table with room for `capacity` values using the node storage
    /// selected by `policy`.
    pub fn with_capacity_in(capacity: usize, policy: P) -> Self {
        Self::with_capacity_and_load_factor_in(capacity, DEFAULT_MAX_LOAD_FACTOR, policy)
    }

    /// Creates a table with room for `capacity` values, the given maximum
    /// load factor, and the node storage selected by `policy`.
    ///
    /// # Panics
    ///
    /// Panics if `max_load_factor` is not in `(0, 1]`.
    pub fn with_capacity_and_load_factor_in(capacity: usize, max_load_factor: f32, _policy: P) -> Self {
        check_load_factor(max_load_factor);
        let mut table = Self::with_buckets(buckets_for(capacity, max_load_factor), max_load_factor);
        table.nodes.reserve(capacity);
        table
    }

    fn with_buckets(buckets: usize, max_load_factor: f32) -> Self {
        Self {
            buckets: BucketArray::new(buckets),
            nodes: <P::Nodes<V> as NodeStorage<V>>::new(),
            max_pop: max_population(buckets, max_load_factor),
            max_load_factor,
        }
    }

    /// Returns an iterator over all values in the table.
    ///
    /// Values are yielded in node-storage order, which is arbitrary but
    /// deterministic for a given sequence of operations. The iterator is
    /// double-ended, so `iter().rev()` walks the same values backwards.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table
    ///     .entry(hash_str("key1"), |s: &String| s == "key1")
    ///     .or_insert("key1".to_string());
    /// table
    ///     .entry(hash_str("key2"), |s: &String| s == "key2")
    ///     .or_insert("key2".to_string());
    ///
    /// let forward: Vec<&String> = table.iter().collect();
    /// let mut backward: Vec<&String> = table.iter().rev().collect();
    /// backward.reverse();
    /// assert_eq!(forward, backward);
    /// ```
    pub fn iter(&self) -> Iter<'_, V, P> {
        Iter {
            inner: self.nodes.iter(),
        }
    }

    /// Returns an iterator yielding mutable references to all values.
    ///
    /// Values must not be changed in a way that alters their hash or
    /// equality.
    pub fn iter_mut(&mut self) -> IterMut<'_, V, P> {
        IterMut {
            inner: self.nodes.iter_mut(),
        }
    }

    /// Returns an iterator that removes and yields all values from the table.
    ///
    /// The table is empty as soon as `drain` returns; values not consumed
    /// from the iterator are dropped with it. Bucket capacity is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table
    ///     .entry(hash_str("key1"), |s: &String| s == "key1")
    ///     .or_insert("key1".to_string());
    ///
    /// let values: Vec<String> = table.drain().collect();
    /// assert!(table.is_empty());
    /// assert_eq!(values.len(), 1);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, V, P> {
        let nodes = core::mem::replace(&mut self.nodes, <P::Nodes<V> as NodeStorage<V>>::new());
        self.buckets.reset();
        Drain {
            inner: nodes.into_values(),
            _table: PhantomData,
        }
    }

    /// Returns `true` if the table contains no elements.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of elements in the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// assert_eq!(table.len(), 0);
    ///
    /// table.entry(hash_u64(1), |&n: &u64| n == 1).or_insert(1);
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of elements the table can hold before it grows.
    ///
    /// This is `bucket_capacity() * max_load_factor()`, rounded down.
    pub fn capacity(&self) -> usize {
        self.max_pop
    }

    /// Returns the number of buckets. Always zero or a power of two.
    pub fn bucket_capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the maximum ratio of elements to buckets.
    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// Whether element addresses are stable across insertions and removals
    /// of other elements, as determined by the storage policy.
    pub fn is_pointer_stable(&self) -> bool {
        <P::Nodes<V> as NodeStorage<V>>::POINTER_STABLE
    }

    /// Changes the maximum load factor.
    ///
    /// Grows the table immediately if the current number of elements exceeds
    /// the new limit. Never shrinks.
    ///
    /// # Panics
    ///
    /// Panics if `max_load_factor` is not in `(0, 1]`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(7);
    /// assert_eq!(table.bucket_capacity(), 8);
    ///
    /// table.set_max_load_factor(0.5);
    /// assert_eq!(table.capacity(), 4);
    /// ```
    pub fn set_max_load_factor(&mut self, max_load_factor: f32) {
        check_load_factor(max_load_factor);
        self.max_load_factor = max_load_factor;
        self.max_pop = max_population(self.buckets.len(), max_load_factor);
        if self.len() > self.max_pop {
            self.rehash(buckets_for(self.len(), max_load_factor));
        }
    }

    /// Removes all elements from the table.
    ///
    /// This operation preserves the table's allocated capacity. All values
    /// are dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.entry(hash_u64(1), |&n: &u64| n == 1).or_insert(1);
    /// table.entry(hash_u64(2), |&n: &u64| n == 2).or_insert(2);
    /// assert_eq!(table.len(), 2);
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// ```
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.buckets.reset();
    }

    /// Shrinks the bucket array as much as possible while keeping the load
    /// factor invariant.
    ///
    /// An empty table releases its buckets entirely.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashTable;
    ///
    /// let mut table: HashTable<i32> = HashTable::with_capacity(1000);
    /// assert!(table.capacity() >= 1000);
    ///
    /// table.entry(42, |&v| v == 5).or_insert(5);
    /// table.entry(123, |&v| v == 10).or_insert(10);
    ///
    /// table.shrink_to_fit();
    /// assert!(table.capacity() < 1000);
    /// assert!(table.capacity() >= 2);
    /// assert_eq!(table.find(42, |&v| v == 5), Some(&5));
    /// ```
    pub fn shrink_to_fit(&mut self) {
        let target = buckets_for(self.len(), self.max_load_factor);
        if target < self.buckets.len() {
            self.rehash(target);
        }
    }

    /// Reserves capacity for at least `additional` more elements.
    ///
    /// Only bucket metadata is rebuilt; values stay where they are.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<i32> = HashTable::with_capacity(15);
    /// for i in 0..15 {
    ///     table.entry(i as u64, |&n: &i32| n == i).or_insert(i);
    /// }
    /// let original_capacity = table.capacity();
    ///
    /// table.reserve(50);
    /// assert!(table.capacity() >= original_capacity + 50);
    /// ```
    pub fn reserve(&mut self, additional: usize) {
        let required = self.len().saturating_add(additional);
        if required > self.max_pop {
            self.rehash(buckets_for(required, self.max_load_factor));
        }
        self.nodes.reserve(additional);
    }

    /// Returns a reference to the value matching `eq`, if any.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.entry(hash_u64(42), |&n: &u64| n == 42).or_insert(42);
    ///
    /// assert_eq!(table.find(hash_u64(42), |&n| n == 42), Some(&42));
    /// assert_eq!(table.find(hash_u64(7), |&n| n == 7), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        let pos = self.search(hash, eq)?;
        Some(self.nodes.get(self.bucket(pos).index()))
    }

    /// Returns a mutable reference to the value matching `eq`, if any.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table
    ///     .entry(hash_u64(42), |&(k, _): &(u64, u64)| k == 42)
    ///     .or_insert((42, 0));
    ///
    /// if let Some((_, v)) = table.find_mut(hash_u64(42), |&(k, _)| k == 42) {
    ///     *v = 100;
    /// }
    /// assert_eq!(table.find(hash_u64(42), |&(k, _)| k == 42), Some(&(42, 100)));
    /// ```
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        let pos = self.search(hash, eq)?;
        let index = self.bucket(pos).index();
        Some(self.nodes.get_mut(index))
    }

    /// Removes and returns the value matching `eq`.
    ///
    /// Later buckets of the probe run are shifted back over the freed one, so
    /// no tombstone is left behind.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.entry(hash_u64(42), |&n: &u64| n == 42).or_insert(42);
    ///
    /// let removed = table.remove(hash_u64(42), |&n| n == 42);
    /// assert_eq!(removed, Some(42));
    /// assert!(table.is_empty());
    ///
    /// // Removing non-existent value returns None
    /// let not_found = table.remove(hash_u64(99), |&n| n == 99);
    /// assert_eq!(not_found, None);
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        let pos = self.search(hash, eq)?;
        Some(self.remove_at(pos))
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hash::hash_table::Entry;
    /// # use robin_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// let hash = hash_str("hello");
    ///
    /// match table.entry(hash, |s: &String| s == "hello") {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert("hello".to_string());
    ///     }
    ///     Entry::Occupied(mut entry) => {
    ///         entry.get_mut().push('!');
    ///     }
    /// }
    ///
    /// assert!(matches!(
    ///     table.entry(hash, |s: &String| s == "hello"),
    ///     Entry::Occupied(_)
    /// ));
    /// ```
    #[inline]
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Entry<'_, V, P> {
        if self.buckets.len() == 0 {
            return Entry::Vacant(VacantEntry {
                table: self,
                hash,
                slot: None,
            });
        }

        match self.probe(hash, eq) {
            Probe::Found(bucket) => Entry::Occupied(OccupiedEntry {
                table: self,
                bucket,
            }),
            Probe::Vacant { pos, psl } => Entry::Vacant(VacantEntry {
                table: self,
                hash,
                slot: Some((pos, psl)),
            }),
        }
    }

    /// Inserts a value without checking whether an equal one is present.
    ///
    /// Inserting a duplicate is not unsafe, but lookups will only ever find
    /// one of the copies.
    pub fn insert_unique(&mut self, hash: u64, value: V) -> &mut V {
        if self.len() >= self.max_pop {
            self.grow();
        }
        let (pos, psl) = self.insertion_slot(hash);
        self.insert_at(pos, psl, hash, value)
    }

    /// Retains only the values for which `f` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// for i in 0..10u64 {
    ///     table.insert_unique(i, i);
    /// }
    ///
    /// table.retain(|v| *v % 2 == 0);
    /// assert_eq!(table.len(), 5);
    /// assert_eq!(table.find(3, |&v| v == 3), None);
    /// assert_eq!(table.find(4, |&v| v == 4), Some(&4));
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&mut V) -> bool) {
        let mut position = 0;
        while position < self.nodes.len() {
            let index = self.nodes.index_at(position);
            if f(self.nodes.get_mut(index)) {
                position += 1;
                continue;
            }

            // Both storage strategies move their last value into `position`.
            let pos = self.bucket_of(self.nodes.hash(index), index);
            self.remove_at(pos);
        }
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.buckets.len().wrapping_sub(1)
    }

    #[inline(always)]
    fn bucket(&self, pos: usize) -> Bucket {
        self.buckets.as_slice()[pos]
    }

    #[inline]
    fn search(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        if self.is_empty() {
            return None;
        }

        match self.probe(hash, eq) {
            Probe::Found(pos) => Some(pos),
            Probe::Vacant { .. } => None,
        }
    }

    /// Walk the probe run of `hash`.
    ///
    /// Stops at the matching bucket, or at the first bucket whose occupant
    /// is closer to its home than the probe is to `hash`'s home; a match
    /// cannot lie beyond that point, and it is where `hash` would be placed.
    /// Requires a non-empty bucket array.
    #[inline]
    fn probe(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Probe {
        debug_assert!(self.buckets.len() != 0);

        let buckets = self.buckets.as_slice();
        let mask = self.mask();
        let fingerprint = fingerprint_of(hash);
        let mut pos = hash as usize & mask;
        let mut psl: Meta = 1;

        loop {
            // SAFETY: `pos` is always masked by `buckets.len() - 1`, and the
            // bucket count is a power of two.
            let bucket = unsafe { *buckets.get_unchecked(pos) };
            if bucket.psl() < psl {
                return Probe::Vacant { pos, psl };
            }
            if bucket.fingerprint() == fingerprint && eq(self.nodes.get(bucket.index())) {
                return Probe::Found(pos);
            }

            psl += 1;
            pos = (pos + 1) & mask;
        }
    }

    /// Where a value known to be absent would be placed.
    fn insertion_slot(&self, hash: u64) -> (usize, Meta) {
        debug_assert!(self.buckets.len() != 0);

        let buckets = self.buckets.as_slice();
        let mask = self.mask();
        let mut pos = hash as usize & mask;
        let mut psl: Meta = 1;

        // SAFETY: `pos` is masked by `buckets.len() - 1`.
        while unsafe { buckets.get_unchecked(pos) }.psl() >= psl {
            psl += 1;
            pos = (pos + 1) & mask;
        }
        (pos, psl)
    }

    fn insert_at(&mut self, pos: usize, psl: Meta, hash: u64, value: V) -> &mut V {
        assert!(self.len() < MAX_NODES, "capacity overflow");
        assert!(psl <= MAX_PSL, "probe sequence length overflow");
        debug_assert!(self.len() < self.max_pop);

        let index = self.nodes.insert(hash, value);
        self.place(pos, Bucket::new(psl, fingerprint_of(hash), index));
        self.nodes.get_mut(index)
    }

    /// Robin-Hood placement starting at `pos`.
    ///
    /// Whenever the carried record is further from home than the resident,
    /// they swap and the evicted resident is carried on. Requires at least
    /// one empty bucket.
    fn place(&mut self, mut pos: usize, mut carried: Bucket) {
        let mask = self.mask();
        let buckets = self.buckets.as_mut_slice();

        loop {
            // SAFETY: `pos` is masked by `buckets.len() - 1`.
            let resident = unsafe { buckets.get_unchecked_mut(pos) };
            if resident.is_empty() {
                *resident = carried;
                return;
            }
            if resident.psl() < carried.psl() {
                core::mem::swap(resident, &mut carried);
            }

            carried = carried.pushed();
            pos = (pos + 1) & mask;
        }
    }

    /// Position of the bucket referencing node `index`.
    fn bucket_of(&self, hash: u64, index: usize) -> usize {
        let buckets = self.buckets.as_slice();
        let mask = self.mask();
        let mut pos = hash as usize & mask;

        for _ in 0..buckets.len() {
            let bucket = buckets[pos];
            if bucket.is_empty() {
                break;
            }
            if bucket.index() == index {
                return pos;
            }
            pos = (pos + 1) & mask;
        }
        unreachable!("node {index} has no bucket")
    }

    fn remove_at(&mut self, pos: usize) -> V {
        let index = self.bucket(pos).index();
        self.backward_shift(pos);

        let (value, relocated) = self.nodes.remove(index);
        if let Some(from) = relocated {
            let moved = self.bucket_of(self.nodes.hash(index), from);
            self.buckets.as_mut_slice()[moved].set_index(index);
        }
        value
    }

    /// Close the gap at `hole` by pulling each displaced successor one bucket
    /// closer to home.
    fn backward_shift(&mut self, mut hole: usize) {
        let mask = self.mask();
        let buckets = self.buckets.as_mut_slice();

        for _ in 0..buckets.len() {
            let next = (hole + 1) & mask;
            // SAFETY: `next` is masked by `buckets.len() - 1`.
            let bucket = unsafe { *buckets.get_unchecked(next) };
            if bucket.psl() <= 1 {
                break;
            }

            // SAFETY: `hole` is always a masked position.
            unsafe { *buckets.get_unchecked_mut(hole) = bucket.pulled() };
            hole = next;
        }

        buckets[hole] = Bucket::EMPTY;
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self) {
        let required = self.len().checked_add(1).expect("capacity overflow");
        let target = buckets_for(required, self.max_load_factor).max(self.buckets.len() * 2);
        self.rehash(target);
    }

    /// Rebuild bucket metadata for `buckets` buckets. Node storage is left
    /// untouched; each record is replayed from its home bucket.
    fn rehash(&mut self, buckets: usize) {
        debug_assert!(max_population(buckets, self.max_load_factor) >= self.len());

        let old = core::mem::replace(&mut self.buckets, BucketArray::new(buckets));
        self.max_pop = max_population(buckets, self.max_load_factor);
        if self.is_empty() {
            return;
        }

        let mask = self.mask();
        for &bucket in old.as_slice() {
            if bucket.is_empty() {
                continue;
            }
            let home = self.nodes.hash(bucket.index()) as usize & mask;
            self.place(home, Bucket::new(1, bucket.fingerprint(), bucket.index()));
        }
    }

    /// Computes a histogram of displacements for the current table state.
    ///
    /// Index `d` counts the elements sitting `d` buckets after their home
    /// bucket; the vector is as long as the largest displacement plus one.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> alloc::vec::Vec<usize> {
        let mut hist = alloc::vec::Vec::new();
        for bucket in self.buckets.as_slice() {
            if bucket.is_empty() {
                continue;
            }
            let displacement = bucket.psl() as usize - 1;
            if hist.len() <= displacement {
                hist.resize(displacement + 1, 0);
            }
            hist[displacement] += 1;
        }
        hist
    }

    /// Returns detailed performance and utilization statistics for debugging.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let hist = self.probe_histogram();
        let total_displacement: usize = hist.iter().enumerate().map(|(d, &c)| d * c).sum();

        DebugStats {
            populated: self.len(),
            capacity: self.max_pop,
            bucket_capacity: self.buckets.len(),
            max_load_factor: self.max_load_factor,
            load_factor: if self.buckets.len() == 0 {
                0.0
            } else {
                self.len() as f64 / self.buckets.len() as f64
            },
            mean_displacement: if self.is_empty() {
                0.0
            } else {
                total_displacement as f64 / self.len() as f64
            },
            max_displacement: hist.len().saturating_sub(1),
            pointer_stable: self.is_pointer_stable(),
            total_bytes: self.buckets.allocated_bytes() + self.nodes.allocated_bytes(),
        }
    }

    /// Pretty-prints the displacement histogram horizontally using stdout.
    ///
    /// Requires the `std` feature.
    #[cfg(all(any(test, feature = "stats"), feature = "std"))]
    pub fn print_probe_histogram(&self) {
        let hist = self.probe_histogram();
        let max = *hist.iter().max().unwrap_or(&0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.len());

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = ['▏', '▎', '▍', '▌', '▋', '▊', '▉'];
            if units % 8 > 0 {
                bar.push(partial[units % 8 - 1]);
            }
            bar
        };

        for (displacement, &count) in hist.iter().enumerate() {
            println!("{:>3} | {} ({})", displacement, make_bar(count), count);
        }
    }

    /// Checks every structural invariant of the table.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let buckets = self.buckets.as_slice();
        let mask = self.mask();

        assert!(self.len() <= self.max_pop, "{} > {}", self.len(), self.max_pop);
        assert!(
            self.len() as f64 <= buckets.len() as f64 * self.max_load_factor as f64,
            "load factor exceeded"
        );

        let mut seen = alloc::collections::BTreeSet::new();
        for (pos, &bucket) in buckets.iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }

            let hash = self.nodes.hash(bucket.index());
            let home = hash as usize & mask;
            let distance = pos.wrapping_sub(home) & mask;
            assert_eq!(bucket.psl() as usize, distance + 1, "bad psl at {pos}");
            assert_eq!(bucket.fingerprint(), fingerprint_of(hash), "bad fingerprint at {pos}");
            assert!(seen.insert(bucket.index()), "node {} referenced twice", bucket.index());

            if bucket.psl() > 1 {
                let previous = buckets[pos.wrapping_sub(1) & mask];
                assert!(
                    !previous.is_empty() && previous.psl() + 1 >= bucket.psl(),
                    "robin hood order broken at {pos}: {previous:?} before {bucket:?}"
                );
            }
        }
        assert_eq!(seen.len(), self.len(), "bucket count does not match node count");

        for position in 0..self.nodes.len() {
            assert!(seen.contains(&self.nodes.index_at(position)));
        }
    }
}

impl<V, P: StoragePolicy> IntoIterator for HashTable<V, P> {
    type Item = V;
    type IntoIter = IntoIter<V, P>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.nodes.into_values(),
        }
    }
}

impl<'a, V, P: StoragePolicy> IntoIterator for &'a HashTable<V, P> {
    type Item = &'a V;
    type IntoIter = Iter<'a, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, V, P: StoragePolicy> IntoIterator for &'a mut HashTable<V, P> {
    type Item = &'a mut V;
    type IntoIter = IterMut<'a, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A view into a single entry in the hash table, which may be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
///
/// # Examples
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use robin_hash::hash_table::Entry;
/// # use robin_hash::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # fn hash_str(s: &str) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     s.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table = HashTable::with_capacity(10);
/// let hash = hash_str("key");
///
/// match table.entry(hash, |s: &String| s == "key") {
///     Entry::Vacant(entry) => {
///         entry.insert("value".to_string());
///     }
///     Entry::Occupied(entry) => {
///         println!("Key already exists with value: {}", entry.get());
///     }
/// }
/// ```
pub enum Entry<'a, V, P: StoragePolicy = Flat> {
    /// A vacant entry - the key is not present in the table
    Vacant(VacantEntry<'a, V, P>),
    /// An occupied entry - the key is present in the table
    Occupied(OccupiedEntry<'a, V, P>),
}

impl<'a, V, P: StoragePolicy> Entry<'a, V, P> {
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value in the entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// let hash = hash_str("key");
    ///
    /// let value = table
    ///     .entry(hash, |s: &String| s == "key")
    ///     .or_insert("key".to_string());
    /// assert_eq!(value, "key");
    ///
    /// let existing = table
    ///     .entry(hash, |s: &String| s == "key")
    ///     .or_insert("other".to_string());
    /// assert_eq!(existing, "key");
    /// ```
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the value returned by `default` if the entry is vacant. The
    /// closure is not called for an occupied entry.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Calls `f` on the value of an occupied entry, then returns the entry.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Self {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Inserts `V::default()` if the entry is vacant.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the hash table.
///
/// Remembers where the probe stopped, so inserting does not walk the probe
/// run again unless the table has to grow first.
pub struct VacantEntry<'a, V, P: StoragePolicy = Flat> {
    table: &'a mut HashTable<V, P>,
    hash: u64,
    slot: Option<(usize, Meta)>,
}

impl<'a, V, P: StoragePolicy> VacantEntry<'a, V, P> {
    /// Inserts a value into the vacant entry and returns a mutable reference
    /// to it.
    ///
    /// Grows the table first if the insertion would push it past its
    /// maximum load factor.
    pub fn insert(self, value: V) -> &'a mut V {
        let VacantEntry { table, hash, slot } = self;
        let (pos, psl) = match slot {
            Some(slot) if table.len() < table.max_pop => slot,
            _ => {
                table.grow();
                table.insertion_slot(hash)
            }
        };
        table.insert_at(pos, psl, hash, value)
    }
}

/// A view into an occupied entry in the hash table.
pub struct OccupiedEntry<'a, V, P: StoragePolicy = Flat> {
    table: &'a mut HashTable<V, P>,
    bucket: usize,
}

impl<'a, V, P: StoragePolicy> OccupiedEntry<'a, V, P> {
    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        self.table.nodes.get(self.table.bucket(self.bucket).index())
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        let index = self.table.bucket(self.bucket).index();
        self.table.nodes.get_mut(index)
    }

    /// Converts the entry into a mutable reference to the value with the
    /// lifetime of the table borrow.
    pub fn into_mut(self) -> &'a mut V {
        let index = self.table.bucket(self.bucket).index();
        self.table.nodes.get_mut(index)
    }

    /// Removes the value from the table and returns it.
    pub fn remove(self) -> V {
        self.table.remove_at(self.bucket)
    }
}

/// An iterator over the values of a [`HashTable`].
///
/// This struct is created by the [`iter`] method on [`HashTable`].
///
/// [`iter`]: HashTable::iter
pub struct Iter<'a, V, P>
where
    V: 'a,
    P: StoragePolicy + 'a,
{
    inner: <P::Nodes<V> as NodeStorage<V>>::Iter<'a>,
}

/// A mutable iterator over the values of a [`HashTable`].
///
/// This struct is created by the [`iter_mut`] method on [`HashTable`].
///
/// [`iter_mut`]: HashTable::iter_mut
pub struct IterMut<'a, V, P>
where
    V: 'a,
    P: StoragePolicy + 'a,
{
    inner: <P::Nodes<V> as NodeStorage<V>>::IterMut<'a>,
}

/// A draining iterator over the values of a [`HashTable`].
///
/// This struct is created by the [`drain`] method on [`HashTable`].
///
/// [`drain`]: HashTable::drain
pub struct Drain<'a, V, P: StoragePolicy> {
    inner: <P::Nodes<V> as NodeStorage<V>>::IntoIter,
    _table: PhantomData<&'a mut HashTable<V, P>>,
}

/// An owning iterator over the values of a [`HashTable`].
pub struct IntoIter<V, P: StoragePolicy> {
    inner: <P::Nodes<V> as NodeStorage<V>>::IntoIter,
}

macro_rules! forward_table_iterator {
    ($name:ident, $item:ty, $($lt:lifetime)?) => {
        impl<$($lt,)? V, P> Iterator for $name<$($lt,)? V, P>
        where
            P: StoragePolicy $(+ $lt, V: $lt)?,
        {
            type Item = $item;

            #[inline]
            fn next(&mut self) -> Option<Self::Item> {
                self.inner.next()
            }

            #[inline]
            fn size_hint(&self) -> (usize, Option<usize>) {
                self.inner.size_hint()
            }
        }

        impl<$($lt,)? V, P> DoubleEndedIterator for $name<$($lt,)? V, P>
        where
            P: StoragePolicy $(+ $lt, V: $lt)?,
        {
            #[inline]
            fn next_back(&mut self) -> Option<Self::Item> {
                self.inner.next_back()
            }
        }

        impl<$($lt,)? V, P> ExactSizeIterator for $name<$($lt,)? V, P>
        where
            P: StoragePolicy $(+ $lt, V: $lt)?,
        {
        }

        impl<$($lt,)? V, P> FusedIterator for $name<$($lt,)? V, P>
        where
            P: StoragePolicy $(+ $lt, V: $lt)?,
        {
        }
    };
}

forward_table_iterator!(Iter, &'a V, 'a);
forward_table_iterator!(IterMut, &'a mut V, 'a);
forward_table_iterator!(Drain, V, 'a);
forward_table_iterator!(IntoIter, V,);

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::bucket::FINGERPRINT_BITS;
    use crate::storage::Pooled;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct Item {
        key: u64,
        value: i32,
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    /// A hash with the given home bucket (for tables of at least `home + 1`
    /// buckets) and fingerprint.
    fn crafted_hash(home: u64, fingerprint: u64) -> u64 {
        (fingerprint << (u64::BITS - FINGERPRINT_BITS)) | home
    }

    fn insert_item<P: StoragePolicy>(table: &mut HashTable<Item, P>, hash: u64, key: u64, value: i32) {
        match table.entry(hash, |v: &Item| v.key == key) {
            Entry::Vacant(v) => {
                v.insert(Item { key, value });
            }
            Entry::Occupied(_) => panic!("unexpected occupied entry for {key}: {table:#?}"),
        }
    }

    /// `(psl, key)` of the first `n` buckets, `(0, usize::MAX)` when empty.
    fn layout<P: StoragePolicy>(table: &HashTable<Item, P>, n: usize) -> Vec<(Meta, usize)> {
        table.buckets.as_slice()[..n]
            .iter()
            .map(|b| (b.psl(), if b.is_empty() { usize::MAX } else { table.nodes.get(b.index()).key as usize }))
            .collect()
    }

    /// Homes 0, 0, 1 and 0 in eight buckets. Key 3 displaces key 2.
    fn displaced_table() -> HashTable<Item> {
        let mut table: HashTable<Item> = HashTable::with_capacity(4);
        insert_item(&mut table, crafted_hash(0, 1), 0, 0);
        insert_item(&mut table, crafted_hash(0, 2), 1, 1);
        insert_item(&mut table, crafted_hash(1, 3), 2, 2);
        insert_item(&mut table, crafted_hash(0, 4), 3, 3);
        table
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            insert_item(&mut table, hash, k, (k as i32) * 2);
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: (k as i32) * 2
                }),
                "{:#?}",
                table
            );
            table.assert_invariants();
        }
        assert_eq!(table.len(), 32);
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.find(hash, |v| v.key == k).map(|v| v.value), Some((k as i32) * 2));
        }

        let miss_hash = hash_key(&state, 999);
        assert!(table.find(miss_hash, |v| v.key == 999).is_none());
    }

    #[test]
    fn empty_table_does_not_allocate() {
        let mut table: HashTable<Item> = HashTable::new();
        assert_eq!(table.bucket_capacity(), 0);
        assert_eq!(table.capacity(), 0);
        assert!(table.find(0, |_| true).is_none());
        assert!(table.remove(0, |_| true).is_none());
        assert_eq!(table.iter().count(), 0);

        insert_item(&mut table, 7, 7, 7);
        assert_eq!(table.bucket_capacity(), MIN_BUCKETS);
        table.assert_invariants();
    }

    #[test]
    fn occupied_entry_on_displaced_value() {
        let mut table = displaced_table();
        let before = layout(&table, 5);
        assert_eq!(before, vec![(1, 0), (2, 1), (3, 3), (3, 2), (0, usize::MAX)]);

        match table.entry(crafted_hash(1, 3), |v| v.key == 2) {
            Entry::Occupied(mut occ) => {
                assert_eq!(occ.get().value, 2);
                occ.get_mut().value = 11;
            }
            Entry::Vacant(_) => panic!("key 2 should be occupied"),
        }
        // Same hash, different key. Dropping the vacant entry leaves the
        // buckets alone.
        assert!(matches!(table.entry(crafted_hash(1, 3), |v| v.key == 99), Entry::Vacant(_)));

        assert_eq!(layout(&table, 5), before, "{table:#?}");
        assert_eq!(table.buckets.as_slice()[3].fingerprint(), 3);
        assert_eq!(table.find(crafted_hash(1, 3), |v| v.key == 2).map(|v| v.value), Some(11));
        assert_eq!(table.len(), 4);
        table.assert_invariants();
    }

    #[test]
    fn find_mut_reaches_displaced_values() {
        let mut table = displaced_table();
        let hashes = [crafted_hash(0, 1), crafted_hash(0, 2), crafted_hash(1, 3), crafted_hash(0, 4)];
        for (k, &hash) in hashes.iter().enumerate() {
            let k = k as u64;
            table.find_mut(hash, |v| v.key == k).expect("present").value += 10;
        }
        assert!(table.find_mut(crafted_hash(0, 5), |_| true).is_none());

        assert_eq!(layout(&table, 5), vec![(1, 0), (2, 1), (3, 3), (3, 2), (0, usize::MAX)]);
        let values: Vec<i32> = hashes
            .iter()
            .enumerate()
            .map(|(k, &hash)| table.find(hash, |v| v.key == k as u64).unwrap().value)
            .collect();
        assert_eq!(values, vec![10, 11, 12, 13]);
    }

    #[test]
    fn remove_items() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..8u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        assert_eq!(table.len(), 8);
        for k in [0u64, 3, 7] {
            let hash = hash_key(&state, k);
            let removed = table.remove(hash, |v| v.key == k).expect("should remove");
            assert_eq!(removed.key, k);
            table.assert_invariants();
        }
        assert_eq!(table.len(), 5);

        let hash = hash_key(&state, 1000);
        assert!(table.remove(hash, |v| v.key == 1000).is_none());
        for k in [1u64, 2, 4, 5, 6] {
            assert!(table.find(hash_key(&state, k), |v| v.key == k).is_some());
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..100000u64 {
            let hash = hash_key(&state, k);
            insert_item(&mut table, hash, k, k as i32);
            assert!(table.len() <= table.capacity());
        }

        assert_eq!(table.len(), 100000);
        table.assert_invariants();
        for k in 0..100000u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.find(hash, |v| v.key == k).map(|v| v.value), Some(k as i32));
        }
    }

    #[test]
    fn explicit_collision() {
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        let hash = 0;
        for k in 0..65u64 {
            insert_item(&mut table, hash, k, k as i32);
        }

        assert_eq!(table.len(), 65);
        table.assert_invariants();
        for k in 0..65u64 {
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: k as i32
                }),
                "{:#?}",
                table
            );
        }

        for k in (0..65u64).step_by(2) {
            assert!(table.remove(hash, |v| v.key == k).is_some());
            table.assert_invariants();
        }
        for k in 0..65u64 {
            assert_eq!(table.find(hash, |v| v.key == k).is_some(), k % 2 == 1);
        }
    }

    #[test]
    fn robin_hood_displacement_and_backward_shift() {
        let mut table: HashTable<Item> = HashTable::with_capacity(4);
        assert_eq!(table.bucket_capacity(), 8);

        insert_item(&mut table, crafted_hash(0, 1), 0, 0); // A
        insert_item(&mut table, crafted_hash(0, 2), 1, 1); // B
        insert_item(&mut table, crafted_hash(1, 3), 2, 2); // C
        insert_item(&mut table, crafted_hash(0, 4), 3, 3); // D steals C's bucket

        assert_eq!(
            layout(&table, 5),
            vec![(1, 0), (2, 1), (3, 3), (3, 2), (0, usize::MAX)],
            "{table:#?}"
        );
        table.assert_invariants();

        // Removing A pulls B, D and C one bucket back each.
        assert_eq!(table.remove(crafted_hash(0, 1), |v| v.key == 0).map(|v| v.key), Some(0));
        assert_eq!(layout(&table, 4), vec![(1, 1), (2, 3), (2, 2), (0, usize::MAX)], "{table:#?}");
        table.assert_invariants();

        // D was the last flat node and moved into A's old slot.
        assert_eq!(table.find(crafted_hash(0, 4), |v| v.key == 3).map(|v| v.value), Some(3));
        assert_eq!(table.find(crafted_hash(1, 3), |v| v.key == 2).map(|v| v.value), Some(2));
    }

    #[test]
    fn search_stops_at_richer_bucket() {
        let mut table: HashTable<Item> = HashTable::with_capacity(4);
        insert_item(&mut table, crafted_hash(0, 1), 0, 0);
        insert_item(&mut table, crafted_hash(2, 1), 1, 1);
        insert_item(&mut table, crafted_hash(0, 1), 2, 2);
        table.assert_invariants();

        // Bucket 1 holds key 2 two steps from home, bucket 2 holds key 1 at
        // home. A miss for home 1 compares against key 2 only.
        let calls = core::cell::Cell::new(0);
        let found = table.find(crafted_hash(1, 1), |_| {
            calls.set(calls.get() + 1);
            false
        });
        assert!(found.is_none());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn iter_and_drain() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 10..20u64 {
            insert_item(&mut table, hash_key(&state, k), k, (k as i32) + 1);
        }
        let collected: Vec<u64> = table.iter().map(|v| v.key).collect();
        assert_eq!(collected.len(), 10, "{:#?}", table);
        for k in 10..20u64 {
            assert!(collected.contains(&k));
        }

        let mut reversed: Vec<u64> = table.iter().rev().map(|v| v.key).collect();
        reversed.reverse();
        assert_eq!(reversed, collected);
        assert_eq!(table.iter().len(), 10);

        let buckets = table.bucket_capacity();
        let drained: Vec<Item> = table.drain().collect();
        assert_eq!(drained.len(), 10);
        assert_eq!(table.len(), 0);
        assert_eq!(table.bucket_capacity(), buckets);
        table.assert_invariants();

        for k in 10..20u64 {
            let hash = hash_key(&state, k);
            assert!(table.find(hash, |v| v.key == k).is_none());
        }

        insert_item(&mut table, hash_key(&state, 1), 1, 1);
        assert_eq!(table.len(), 1);
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct StringItem {
        key: String,
        value: i32,
    }

    fn hash_string_key(state: &HashState, key: &str) -> u64 {
        let mut h = state.build_hasher();
        h.write(key.as_bytes());
        h.finish()
    }

    #[test]
    fn fingerprint_filters_comparisons() {
        let mut table: HashTable<Item> = HashTable::with_capacity(8);
        for k in 0..4u64 {
            insert_item(&mut table, crafted_hash(0, k + 1), k, k as i32);
        }
        // Same home and fingerprint as key 2.
        insert_item(&mut table, crafted_hash(0, 3), 9, 9);
        assert_eq!(
            layout(&table, 6),
            vec![(1, 0), (2, 1), (3, 2), (4, 3), (5, 9), (0, usize::MAX)],
            "{table:#?}"
        );

        let calls = core::cell::Cell::new(0);
        let found = table.find(crafted_hash(0, 6), |_| {
            calls.set(calls.get() + 1);
            true
        });
        assert!(found.is_none());
        assert_eq!(calls.replace(0), 0);

        let found = table.find(crafted_hash(0, 2), |v| {
            calls.set(calls.get() + 1);
            v.key == 1
        });
        assert_eq!(found.map(|v| v.value), Some(1));
        assert_eq!(calls.replace(0), 1);

        let found = table.find(crafted_hash(0, 3), |v| {
            calls.set(calls.get() + 1);
            v.key == 9
        });
        assert_eq!(found.map(|v| v.value), Some(9));
        assert_eq!(calls.replace(0), 2);
        table.assert_invariants();
    }

    #[test]
    fn entry_or_insert_with() {
        let state = HashState::default();
        let mut table: HashTable<StringItem> = HashTable::with_capacity(0);
        let key = "unique_key";
        let hash = hash_string_key(&state, key);

        let value_ref = table
            .entry(hash, |v| v.key == key)
            .or_insert_with(|| StringItem {
                key: key.to_string(),
                value: 42,
            });
        assert_eq!(value_ref.value, 42);

        let existing_ref = table
            .entry(hash, |v| v.key == key)
            .or_insert_with(|| panic!("closure must not run for an occupied entry"));
        assert_eq!(existing_ref.value, 42);

        assert_eq!(table.len(), 1);
    }

    #[test]
    fn entry_and_modify_and_remove() {
        let state = HashState::default();
        let mut table: HashTable<StringItem> = HashTable::with_capacity(0);
        let hash = hash_string_key(&state, "k");

        table
            .entry(hash, |v| v.key == "k")
            .and_modify(|_| panic!("vacant entries are not modified"))
            .or_insert(StringItem {
                key: "k".to_string(),
                value: 1,
            });
        table
            .entry(hash, |v| v.key == "k")
            .and_modify(|v| v.value += 1)
            .or_insert_with(|| unreachable!());
        assert_eq!(table.find(hash, |v| v.key == "k").unwrap().value, 2);

        match table.entry(hash, |v| v.key == "k") {
            Entry::Occupied(entry) => assert_eq!(entry.remove().value, 2),
            Entry::Vacant(_) => unreachable!(),
        }
        assert!(table.is_empty());
        table.assert_invariants();
    }

    #[test]
    fn entry_into_mut_after_cascade() {
        let mut table: HashTable<Item> = HashTable::with_capacity(4);
        insert_item(&mut table, crafted_hash(0, 1), 0, 0);
        insert_item(&mut table, crafted_hash(0, 2), 1, 1);
        insert_item(&mut table, crafted_hash(1, 3), 2, 2);
        assert_eq!(layout(&table, 4), vec![(1, 0), (2, 1), (2, 2), (0, usize::MAX)]);

        // Key 3 takes bucket 2 and pushes key 2 to bucket 3.
        let inserted = table
            .entry(crafted_hash(0, 4), |v| v.key == 3)
            .or_insert(Item { key: 3, value: 3 });
        inserted.value = 30;
        assert_eq!(layout(&table, 5), vec![(1, 0), (2, 1), (3, 3), (3, 2), (0, usize::MAX)]);

        let value = match table.entry(crafted_hash(0, 4), |v| v.key == 3) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(_) => unreachable!("key 3 was just inserted"),
        };
        value.value += 1;

        let pushed = table.buckets.as_slice()[3];
        assert_eq!(table.nodes.get(pushed.index()), &Item { key: 2, value: 2 });
        assert_eq!(table.find(crafted_hash(0, 4), |v| v.key == 3).map(|v| v.value), Some(31));
        table.assert_invariants();
    }

    #[test]
    fn vacant_entry_grows_when_full() {
        let mut table: HashTable<u64> = HashTable::with_capacity(0);
        table.set_max_load_factor(0.5);
        for k in 0..4u64 {
            table.insert_unique(avalanche_hash(k), k);
        }
        assert_eq!(table.len(), table.capacity());

        let buckets = table.bucket_capacity();
        table.entry(avalanche_hash(99), |&v| v == 99).or_insert(99);
        assert_eq!(table.bucket_capacity(), buckets * 2);
        table.assert_invariants();
        for k in (0..4u64).chain([99]) {
            assert_eq!(table.find(avalanche_hash(k), |&v| v == k), Some(&k));
        }
    }

    fn avalanche_hash(k: u64) -> u64 {
        crate::hasher::avalanche(k)
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    #[cfg(feature = "std")]
    fn histogram_output() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(10000);
        for k in 0..table.capacity() as u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }

        table.print_probe_histogram();
        table.debug_stats().print();
    }

    #[test]
    fn debug_stats_track_displacement() {
        let mut table: HashTable<Item> = HashTable::with_capacity(4);
        insert_item(&mut table, crafted_hash(0, 1), 0, 0);
        insert_item(&mut table, crafted_hash(0, 2), 1, 1);
        insert_item(&mut table, crafted_hash(0, 3), 2, 2);

        assert_eq!(table.probe_histogram(), vec![1, 1, 1]);
        let stats = table.debug_stats();
        assert_eq!(stats.populated, 3);
        assert_eq!(stats.bucket_capacity, 8);
        assert_eq!(stats.max_displacement, 2);
        assert!((stats.mean_displacement - 1.0).abs() < f64::EPSILON);
        assert!(!stats.pointer_stable);
        assert!(stats.total_bytes >= 8 * size_of::<Bucket>());
    }

    #[test]
    fn test_clone() {
        let state = HashState::default();
        let mut original: HashTable<StringItem> = HashTable::with_capacity(10);
        for (i, k) in ["hello", "world", "test", "clone"].iter().enumerate() {
            original.insert_unique(
                hash_string_key(&state, k),
                StringItem {
                    key: k.to_string(),
                    value: i as i32,
                },
            );
        }

        let mut cloned = original.clone();
        assert_eq!(cloned.len(), original.len());
        assert_eq!(cloned.bucket_capacity(), original.bucket_capacity());
        cloned.assert_invariants();

        let hash = hash_string_key(&state, "hello");
        cloned.find_mut(hash, |v| v.key == "hello").unwrap().value = 100;
        assert_eq!(original.find(hash, |v| v.key == "hello").unwrap().value, 0);
        assert_eq!(cloned.find(hash, |v| v.key == "hello").unwrap().value, 100);
    }

    #[test]
    fn test_clone_empty_table() {
        let original: HashTable<Item> = HashTable::with_capacity(0);
        let cloned = original.clone();
        assert!(cloned.is_empty());
        assert_eq!(cloned.bucket_capacity(), 0);
    }

    #[test]
    fn test_shrink_to_fit_empty_table() {
        let mut table: HashTable<Item> = HashTable::with_capacity(100);
        assert!(table.bucket_capacity() > 0);
        table.shrink_to_fit();
        assert_eq!(table.bucket_capacity(), 0);
        assert_eq!(table.capacity(), 0);

        insert_item(&mut table, 1, 1, 1);
        assert_eq!(table.find(1, |v| v.key == 1).map(|v| v.value), Some(1));
    }

    #[test]
    fn test_shrink_to_fit_after_removals() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..1000u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        let large = table.bucket_capacity();
        for k in 0..990u64 {
            assert!(table.remove(hash_key(&state, k), |v| v.key == k).is_some());
        }

        // Removal never shrinks on its own.
        assert_eq!(table.bucket_capacity(), large);
        table.shrink_to_fit();
        assert!(table.bucket_capacity() < large);
        table.assert_invariants();
        for k in 990..1000u64 {
            assert!(table.find(hash_key(&state, k), |v| v.key == k).is_some());
        }
    }

    #[test]
    fn reserve_preserves_values() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..50u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32 * 3);
        }

        table.reserve(5000);
        assert!(table.capacity() >= 5050);
        table.assert_invariants();
        for k in 0..50u64 {
            assert_eq!(
                table.find(hash_key(&state, k), |v| v.key == k).map(|v| v.value),
                Some(k as i32 * 3)
            );
        }

        let buckets = table.bucket_capacity();
        for k in 50..5050u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32 * 3);
        }
        assert_eq!(table.bucket_capacity(), buckets, "reserve should prevent growth");
    }

    #[test]
    fn set_max_load_factor_grows_when_needed() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..100u64 {
            insert_item(&mut table, hash_key(&state, k), k, 0);
        }
        table.set_max_load_factor(0.25);
        assert!(table.bucket_capacity() >= 400);
        table.assert_invariants();

        table.set_max_load_factor(1.0);
        assert_eq!(table.capacity(), table.bucket_capacity());
        table.assert_invariants();
    }

    #[test]
    #[should_panic(expected = "max load factor")]
    fn invalid_load_factor_panics() {
        let mut table: HashTable<Item> = HashTable::new();
        table.set_max_load_factor(1.5);
    }

    #[test]
    fn full_table_at_unit_load_factor() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        table.set_max_load_factor(1.0);
        for k in 0..64u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        assert_eq!(table.len(), 64);
        assert_eq!(table.bucket_capacity(), 64);
        table.assert_invariants();

        assert!(table.find(hash_key(&state, 1000), |v| v.key == 1000).is_none());
        for k in 0..64u64 {
            assert!(table.remove(hash_key(&state, k), |v| v.key == k).is_some());
            table.assert_invariants();
        }
        assert!(table.is_empty());
    }

    #[test]
    fn retain_keeps_matching_values() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..200u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }

        table.retain(|v| v.key % 3 == 0);
        table.assert_invariants();
        assert_eq!(table.len(), 67);
        for k in 0..200u64 {
            assert_eq!(table.find(hash_key(&state, k), |v| v.key == k).is_some(), k % 3 == 0);
        }
    }

    fn churn<P: StoragePolicy>(mut table: HashTable<Item, P>) {
        let state = HashState::default();
        let mut rng = SmallRng::seed_from_u64(0x5EED);
        let mut live = alloc::collections::BTreeSet::new();

        for round in 0..20_000 {
            let k = rng.random_range(0..512u64);
            let hash = hash_key(&state, k);
            if live.contains(&k) {
                assert_eq!(table.remove(hash, |v| v.key == k).map(|v| v.key), Some(k));
                live.remove(&k);
            } else {
                insert_item(&mut table, hash, k, k as i32);
                live.insert(k);
            }

            if round % 1000 == 0 {
                table.assert_invariants();
                let stats = table.debug_stats();
                assert!(stats.mean_displacement < 8.0, "{stats:?}");
            }
        }

        table.assert_invariants();
        assert_eq!(table.len(), live.len());
        let mut keys: Vec<u64> = table.iter().map(|v| v.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, live.into_iter().collect::<Vec<_>>());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn churn_flat() {
        churn(HashTable::with_capacity(0));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn churn_pooled() {
        churn(HashTable::new_in(Pooled));
    }

    #[test]
    fn pooled_addresses_survive_growth_and_removal() {
        let state = HashState::default();
        let mut table: HashTable<Item, Pooled> = HashTable::new_in(Pooled);
        assert!(table.is_pointer_stable());

        for k in 0..100u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        let addresses: Vec<(u64, *const Item)> = (0..100u64)
            .map(|k| {
                let item = table.find(hash_key(&state, k), |v| v.key == k).unwrap();
                (k, item as *const Item)
            })
            .collect();

        for k in (0..100u64).filter(|k| k % 4 == 0) {
            table.remove(hash_key(&state, k), |v| v.key == k);
        }
        for k in 100..2000u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        table.assert_invariants();

        for (k, address) in addresses.into_iter().filter(|(k, _)| k % 4 != 0) {
            let item = table.find(hash_key(&state, k), |v| v.key == k).unwrap();
            assert_eq!(item as *const Item, address, "key {k} moved");
        }
    }

    #[test]
    fn flat_removal_relinks_moved_node() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..64u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }

        // Removing the first node moves the last one into its slot.
        assert!(table.remove(hash_key(&state, 0), |v| v.key == 0).is_some());
        assert_eq!(table.iter().next().map(|v| v.key), Some(63));
        table.assert_invariants();
        assert_eq!(
            table.find(hash_key(&state, 63), |v| v.key == 63).map(|v| v.value),
            Some(63)
        );
    }

    #[test]
    fn drops_every_value_once() {
        use alloc::rc::Rc;
        use core::cell::Cell;

        struct Counted(u64, Rc<Cell<usize>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.1.set(self.1.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut flat: HashTable<Counted> = HashTable::new();
        let mut pooled: HashTable<Counted, Pooled> = HashTable::new_in(Pooled);
        for k in 0..100u64 {
            flat.insert_unique(avalanche_hash(k), Counted(k, drops.clone()));
            pooled.insert_unique(avalanche_hash(k), Counted(k, drops.clone()));
        }

        drop(flat.remove(avalanche_hash(5), |c| c.0 == 5));
        drop(pooled.remove(avalanche_hash(5), |c| c.0 == 5));
        assert_eq!(drops.get(), 2);

        flat.retain(|c| c.0 < 50);
        pooled.clear();
        assert_eq!(drops.get(), 2 + 50 + 99);

        drop(flat);
        drop(pooled);
        assert_eq!(drops.get(), 200);
    }

    #[test]
    fn into_iter_yields_everything() {
        let mut table: HashTable<u64, Pooled> = HashTable::new_in(Pooled);
        for k in 0..100u64 {
            table.insert_unique(avalanche_hash(k), k);
        }
        let mut values: Vec<u64> = table.into_iter().collect();
        values.sort_unstable();
        assert_eq!(values, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn buckets_for_respects_load_factor() {
        assert_eq!(buckets_for(0, 0.875), 0);
        assert_eq!(buckets_for(1, 0.875), MIN_BUCKETS);
        assert_eq!(buckets_for(7, 0.875), 8);
        assert_eq!(buckets_for(8, 0.875), 16);
        assert_eq!(buckets_for(1000, 0.8), 2048);
        for required in 1..2000 {
            for lf in [0.1f32, 0.5, 0.8, 0.875, 0.92, 1.0] {
                let buckets = buckets_for(required, lf);
                assert!(buckets.is_power_of_two());
                assert!(max_population(buckets, lf) >= required);
            }
        }
    }

    #[test]
    fn load_factor_uses_fixed_point() {
        assert_eq!(load_factor_units(1.0), 1 << LOAD_FACTOR_SHIFT);
        assert_eq!(load_factor_units(0.5), 1 << (LOAD_FACTOR_SHIFT - 1));
        assert_eq!(load_factor_units(f32::MIN_POSITIVE), 1);

        assert_eq!(max_population(8, 1.0), 8);
        assert_eq!(max_population(8, 0.875), 7);
        assert_eq!(max_population(1024, 0.8), 819);
        assert_eq!(max_population(64, 0.92), 58);

        assert_eq!(max_population_inverse(7, 0.875), 8);
        assert_eq!(max_population_inverse(8, 0.875), 10);
        assert_eq!(max_population_inverse(4, 0.5), 8);

        let buckets = buckets_for(1, f32::MIN_POSITIVE);
        assert!(buckets.is_power_of_two());
        assert!(max_population(buckets, f32::MIN_POSITIVE) >= 1);
    }

    #[test]
    #[should_panic(expected = "has no bucket")]
    fn bucket_of_unknown_node_panics() {
        let mut table: HashTable<u64> = HashTable::with_capacity(4);
        for k in 0..4u64 {
            table.insert_unique(crafted_hash(k, 1), k);
        }
        table.bucket_of(crafted_hash(0, 1), 99);
    }

    #[test]
    #[should_panic(expected = "has no bucket")]
    fn bucket_of_unknown_node_in_full_table_panics() {
        let mut table: HashTable<u64> = HashTable::with_capacity_and_load_factor(8, 1.0);
        assert_eq!(table.bucket_capacity(), 8);
        for k in 0..8u64 {
            table.insert_unique(crafted_hash(k, 1), k);
        }
        assert_eq!(table.len(), table.bucket_capacity());
        table.bucket_of(crafted_hash(3, 1), 99);
    }
}
