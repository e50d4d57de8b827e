use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::ops::Index;

use crate::DefaultHashBuilder;
use crate::hash_table;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hasher::KeyHasher;
use crate::storage::Flat;
use crate::storage::Pooled;
use crate::storage::StoragePolicy;

/// A hash map backed by the Robin-Hood [`HashTable`].
///
/// `HashMap<K, V, S, P>` stores key-value pairs where keys implement
/// `Hash + Eq`. Keys are hashed through a [`KeyHasher`] wrapping the builder
/// `S`. Whether its output is mixed before use depends on the builder's
/// type (see [`KeyHasher::for_builder`]): the default builder, foldhash and
/// std's `RandomState` are used as is, anything else is mixed.
/// [`with_trusted_hasher`] skips the mix for any builder.
///
/// The storage policy `P` decides whether references into the map survive
/// unrelated removals. With the default [`Flat`] policy they do not; with
/// [`Pooled`] (see [`StableHashMap`]) an entry's address is fixed from
/// insertion until its own removal.
///
/// [`with_trusted_hasher`]: HashMap::with_trusted_hasher
///
/// # Performance Characteristics
///
/// - **Memory**: 8 bytes of bucket metadata per bucket, plus the size of
///   `(K, V)` plus a u64 for the cached hash
pub struct HashMap<K, V, S = DefaultHashBuilder, P: StoragePolicy = Flat> {
    table: HashTable<(K, V), P>,
    hasher: KeyHasher<S>,
}

/// A [`HashMap`] whose entries never move while they are live.
pub type StableHashMap<K, V, S = DefaultHashBuilder> = HashMap<K, V, S, Pooled>;

impl<K, V, S, P> Clone for HashMap<K, V, S, P>
where
    K: Clone,
    V: Clone,
    S: Clone,
    P: StoragePolicy,
{
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            hasher: self.hasher.clone(),
        }
    }
}

impl<K, V, S, P> Debug for HashMap<K, V, S, P>
where
    K: Debug,
    V: Debug,
    P: StoragePolicy,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

#[cfg(any(feature = "std", feature = "foldhash"))]
impl<K, V> HashMap<K, V> {
    /// Creates an empty map using the default hasher builder. Does not
    /// allocate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// map.insert("a", 1);
    /// assert_eq!(map[&"a"], 1);
    /// ```
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map with room for at least `capacity` entries, using
    /// the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let map: HashMap<i32, String> = HashMap::with_capacity(100);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Flat)
    }
}

#[cfg(any(feature = "std", feature = "foldhash"))]
impl<K, V, P: StoragePolicy> HashMap<K, V, DefaultHashBuilder, P> {
    /// Creates an empty map with the default hasher builder and the node
    /// storage selected by `policy`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::StableHashMap;
    /// use robin_hash::storage::Pooled;
    ///
    /// let mut map: StableHashMap<u32, &str> = StableHashMap::new_in(Pooled);
    /// let first: *const &str = map.emplace(1, "one");
    /// for i in 2..1000 {
    ///     map.insert(i, "many");
    /// }
    /// assert_eq!(map.get(&1).map(|v| v as *const &str), Some(first));
    /// ```
    pub fn new_in(policy: P) -> Self {
        Self::with_capacity_in(0, policy)
    }

    /// Creates an empty map with room for at least `capacity` entries, the
    /// default hasher builder, and the node storage selected by `policy`.
    pub fn with_capacity_in(capacity: usize, policy: P) -> Self {
        Self::with_capacity_and_key_hasher_in(
            capacity,
            KeyHasher::trusted(DefaultHashBuilder::default()),
            policy,
        )
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates a new hash map with the given hasher builder.
    ///
    /// Unless `S` is a builder known to produce well-distributed output, its
    /// hashes are passed through [`avalanche`](crate::hasher::avalanche)
    /// before use.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use robin_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _> = HashMap::with_hasher(SimpleHasher);
    /// assert!(map.is_empty());
    /// assert!(map.hasher().is_avalanching());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self
    where
        S: 'static,
    {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates a new hash map with a hasher builder known to produce
    /// well-distributed 64-bit hashes. Its output is used unmodified.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::hash::RandomState;
    ///
    /// use robin_hash::HashMap;
    ///
    /// let map: HashMap<i32, String, _> = HashMap::with_trusted_hasher(RandomState::new());
    /// assert!(!map.hasher().is_avalanching());
    /// ```
    pub fn with_trusted_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_key_hasher_in(0, KeyHasher::trusted(hash_builder), Flat)
    }

    /// Creates a new hash map with the specified capacity and hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use robin_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _> = HashMap::with_capacity_and_hasher(100, SimpleHasher);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self
    where
        S: 'static,
    {
        Self::with_capacity_and_key_hasher_in(capacity, KeyHasher::for_builder(hash_builder), Flat)
    }
}

impl<K, V, S, P: StoragePolicy> HashMap<K, V, S, P> {
    /// Creates an empty map from a fully configured [`KeyHasher`] and the
    /// node storage selected by `policy`.
    pub fn with_capacity_and_key_hasher_in(capacity: usize, hasher: KeyHasher<S>, policy: P) -> Self {
        Self {
            table: HashTable::with_capacity_in(capacity, policy),
            hasher,
        }
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of elements the map can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the number of buckets in the underlying table.
    pub fn bucket_capacity(&self) -> usize {
        self.table.bucket_capacity()
    }

    /// Returns the maximum ratio of entries to buckets.
    pub fn max_load_factor(&self) -> f32 {
        self.table.max_load_factor()
    }

    /// Changes the maximum load factor, growing if needed.
    ///
    /// # Panics
    ///
    /// Panics if `max_load_factor` is not in `(0, 1]`.
    pub fn set_max_load_factor(&mut self, max_load_factor: f32) {
        self.table.set_max_load_factor(max_load_factor);
    }

    /// Returns the map's hasher.
    pub fn hasher(&self) -> &KeyHasher<S> {
        &self.hasher
    }

    /// Clears the map, removing all key-value pairs. Keeps the allocated
    /// buckets.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Shrinks the bucket array as much as the load factor allows.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }

    /// Reserves capacity for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Retains only the entries for which `f` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map: HashMap<i32, i32> = (0..8).map(|i| (i, i * 10)).collect();
    /// map.retain(|&k, _| k % 2 == 0);
    /// assert_eq!(map.len(), 4);
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(|(k, v)| f(k, v));
    }

    /// An iterator visiting all key-value pairs.
    ///
    /// Iteration walks value storage directly, so it costs time proportional
    /// to `len()` rather than to the bucket count. `iter().rev()` visits the
    /// same pairs in reverse order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// map.insert(1, "a");
    /// map.insert(2, "b");
    ///
    /// let mut pairs: Vec<_> = map.iter().collect();
    /// pairs.sort();
    /// assert_eq!(pairs, vec![(&1, &"a"), (&2, &"b")]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V, P> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// An iterator visiting all key-value pairs, with mutable references to
    /// the values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V, P> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// An iterator visiting all keys.
    pub fn keys(&self) -> Keys<'_, K, V, P> {
        Keys {
            inner: self.table.iter(),
        }
    }

    /// An iterator visiting all values.
    pub fn values(&self) -> Values<'_, K, V, P> {
        Values {
            inner: self.table.iter(),
        }
    }

    /// An iterator visiting all values mutably.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// map.insert("a", 1);
    /// map.insert("b", 2);
    /// for v in map.values_mut() {
    ///     *v *= 10;
    /// }
    /// assert_eq!(map[&"a"], 10);
    /// assert_eq!(map[&"b"], 20);
    /// ```
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V, P> {
        ValuesMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Clears the map, returning all key-value pairs as an iterator.
    pub fn drain(&mut self) -> Drain<'_, K, V, P> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<K, V, S, P> HashMap<K, V, S, P>
where
    K: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
    /// Inserts a key-value pair into the map.
    ///
    /// If the key was present, its value is replaced and the old value is
    /// returned. The key itself is not updated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.entry(key) {
            Entry::Occupied(mut entry) => Some(entry.insert(value)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Inserts `value` under `key` unless the key is already present.
    ///
    /// Returns a reference to the stored value: the new one, or the existing
    /// one if the key was present (in which case `value` is dropped).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// assert_eq!(*map.emplace("a", 1), 1);
    /// assert_eq!(*map.emplace("a", 2), 1);
    /// ```
    pub fn emplace(&mut self, key: K, value: V) -> &mut V {
        self.try_emplace(key, value).0
    }

    /// Inserts `value` under `key`, overwriting the value of an existing
    /// entry, and returns a reference to the stored value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// map.emplace_or_replace("a", 1);
    /// *map.emplace_or_replace("a", 2) += 1;
    /// assert_eq!(map[&"a"], 3);
    /// ```
    pub fn emplace_or_replace(&mut self, key: K, value: V) -> &mut V {
        match self.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(value);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(value),
        }
    }

    /// Inserts `value` under `key` unless the key is already present.
    ///
    /// Returns a reference to the stored value and whether an insertion took
    /// place.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map = HashMap::with_capacity(0);
    /// let (value, inserted) = map.try_emplace("a", 1);
    /// assert_eq!((*value, inserted), (1, true));
    ///
    /// let (value, inserted) = map.try_emplace("a", 2);
    /// assert_eq!((*value, inserted), (1, false));
    /// ```
    pub fn try_emplace(&mut self, key: K, value: V) -> (&mut V, bool) {
        self.try_emplace_with(key, || value)
    }

    /// Like [`try_emplace`](HashMap::try_emplace), but only builds the value
    /// when the key is absent.
    pub fn try_emplace_with(&mut self, key: K, value: impl FnOnce() -> V) -> (&mut V, bool) {
        match self.entry(key) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(value()), true),
        }
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, as long as
    /// `Hash` and `Eq` on the borrowed form match those of the key type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// map.insert("apple".to_string(), 3);
    /// assert_eq!(map.get("apple"), Some(&3));
    /// assert_eq!(map.get("pear"), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the stored key and value corresponding to `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        self.table
            .find(hash, |(k, _)| k.borrow() == key)
            .map(|(k, v)| (k, v))
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        self.table
            .find_mut(hash, |(k, _)| k.borrow() == key)
            .map(|(_, v)| v)
    }

    /// Returns `true` if the map contains a value for the specified key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Removes a key from the map, returning its value if it was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and value if it
    /// was present.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        self.table.remove(hash, |(k, _)| k.borrow() == key)
    }

    /// Gets the given key's corresponding entry in the map for in-place
    /// manipulation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashMap;
    ///
    /// let mut letters = HashMap::new();
    /// for ch in "a short treatise on fungi".chars() {
    ///     *letters.entry(ch).or_insert(0) += 1;
    /// }
    /// assert_eq!(letters[&'s'], 2);
    /// assert_eq!(letters[&'t'], 3);
    /// assert_eq!(letters.get(&'y'), None);
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, P> {
        let hash = self.hasher.hash_one(&key);
        match self.table.entry(hash, |(k, _)| k == &key) {
            TableEntry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry }),
            TableEntry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }
}

impl<K, V, S, P> Default for HashMap<K, V, S, P>
where
    S: Default + 'static,
    P: StoragePolicy + Default,
{
    /// An empty map with `S::default()`, trusted or mixed as in
    /// [`KeyHasher::for_builder`].
    fn default() -> Self {
        Self::with_capacity_and_key_hasher_in(0, KeyHasher::for_builder(S::default()), P::default())
    }
}

impl<K, Q, V, S, P> Index<&Q> for HashMap<K, V, S, P>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
    P: StoragePolicy,
{
    type Output = V;

    /// Returns a reference to the value of a key that must be present.
    ///
    /// # Panics
    ///
    /// Panics if the key is not present in the map.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not found in map")
    }
}

impl<K, V, S, P> PartialEq for HashMap<K, V, S, P>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
    P: StoragePolicy,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|other_v| v == other_v))
    }
}

impl<K, V, S, P> Eq for HashMap<K, V, S, P>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
}

impl<K, V, S, P> Extend<(K, V)> for HashMap<K, V, S, P>
where
    K: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let iter = iter.into_iter();
        let additional = if self.is_empty() {
            iter.size_hint().0
        } else {
            iter.size_hint().0.div_ceil(2)
        };
        self.reserve(additional);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V, S, P> Extend<(&'a K, &'a V)> for HashMap<K, V, S, P>
where
    K: Hash + Eq + Copy,
    V: Copy,
    S: BuildHasher,
    P: StoragePolicy,
{
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        self.extend(iter.into_iter().map(|(&k, &v)| (k, v)));
    }
}

impl<K, V, S, P> FromIterator<(K, V)> for HashMap<K, V, S, P>
where
    K: Hash + Eq,
    S: BuildHasher + Default + 'static,
    P: StoragePolicy + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<K, V, S, P: StoragePolicy> IntoIterator for HashMap<K, V, S, P> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, V, S, P: StoragePolicy> IntoIterator for &'a HashMap<K, V, S, P> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S, P: StoragePolicy> IntoIterator for &'a mut HashMap<K, V, S, P> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashMap`].
///
/// [`entry`]: HashMap::entry
pub enum Entry<'a, K, V, P: StoragePolicy = Flat> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, K, V, P>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, K, V, P>),
}

impl<'a, K, V, P: StoragePolicy> Entry<'a, K, V, P> {
    /// Inserts a default value if the entry is vacant and returns a mutable
    /// reference.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts a value computed from a closure if the entry is vacant and
    /// returns a mutable reference.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Like [`or_insert_with`](Entry::or_insert_with), but the closure
    /// receives the key.
    pub fn or_insert_with_key<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce(&K) -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let value = default(entry.key());
                entry.insert(value)
            }
        }
    }

    /// Provides in-place mutable access to an occupied entry before any
    /// potential inserts.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns a reference to this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

impl<'a, K, V, P> Entry<'a, K, V, P>
where
    V: Default,
    P: StoragePolicy,
{
    /// Inserts the default value if the entry is vacant and returns a mutable
    /// reference.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the map.
pub struct VacantEntry<'a, K, V, P: StoragePolicy = Flat> {
    entry: hash_table::VacantEntry<'a, (K, V), P>,
    key: K,
}

impl<'a, K, V, P: StoragePolicy> VacantEntry<'a, K, V, P> {
    /// Gets a reference to the key that would be used when inserting a value.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Take ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the value into the map and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        &mut self.entry.insert((self.key, value)).1
    }
}

/// A view into an occupied entry in the map.
pub struct OccupiedEntry<'a, K, V, P: StoragePolicy = Flat> {
    entry: hash_table::OccupiedEntry<'a, (K, V), P>,
}

impl<'a, K, V, P: StoragePolicy> OccupiedEntry<'a, K, V, P> {
    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        &self.entry.get().0
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        &self.entry.get().1
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.entry.get_mut().1
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.entry.into_mut().1
    }

    /// Inserts a value into the entry and returns the old value.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(&mut self.entry.get_mut().1, value)
    }

    /// Removes the entry from the map and returns the value.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry from the map and returns the key and value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }
}

/// An iterator over the key-value pairs of a [`HashMap`].
pub struct Iter<'a, K, V, P = Flat>
where
    K: 'a,
    V: 'a,
    P: StoragePolicy + 'a,
{
    inner: hash_table::Iter<'a, (K, V), P>,
}

/// A mutable iterator over the key-value pairs of a [`HashMap`].
pub struct IterMut<'a, K, V, P = Flat>
where
    K: 'a,
    V: 'a,
    P: StoragePolicy + 'a,
{
    inner: hash_table::IterMut<'a, (K, V), P>,
}

/// An iterator over the keys of a [`HashMap`].
pub struct Keys<'a, K, V, P = Flat>
where
    K: 'a,
    V: 'a,
    P: StoragePolicy + 'a,
{
    inner: hash_table::Iter<'a, (K, V), P>,
}

/// An iterator over the values of a [`HashMap`].
pub struct Values<'a, K, V, P = Flat>
where
    K: 'a,
    V: 'a,
    P: StoragePolicy + 'a,
{
    inner: hash_table::Iter<'a, (K, V), P>,
}

/// A mutable iterator over the values of a [`HashMap`].
pub struct ValuesMut<'a, K, V, P = Flat>
where
    K: 'a,
    V: 'a,
    P: StoragePolicy + 'a,
{
    inner: hash_table::IterMut<'a, (K, V), P>,
}

/// A draining iterator over the key-value pairs of a [`HashMap`].
pub struct Drain<'a, K, V, P: StoragePolicy = Flat> {
    inner: hash_table::Drain<'a, (K, V), P>,
}

/// An owning iterator over the key-value pairs of a [`HashMap`].
pub struct IntoIter<K, V, P: StoragePolicy = Flat> {
    inner: hash_table::IntoIter<(K, V), P>,
}

macro_rules! map_iterator {
    ($name:ident, $item:ty, $($lt:lifetime)?, |$x:pat_param| $project:expr) => {
        impl<$($lt,)? K, V, P> Iterator for $name<$($lt,)? K, V, P>
        where
            P: StoragePolicy $(+ $lt, K: $lt, V: $lt)?,
        {
            type Item = $item;

            #[inline]
            fn next(&mut self) -> Option<Self::Item> {
                self.inner.next().map(|$x| $project)
            }

            #[inline]
            fn size_hint(&self) -> (usize, Option<usize>) {
                self.inner.size_hint()
            }
        }

        impl<$($lt,)? K, V, P> DoubleEndedIterator for $name<$($lt,)? K, V, P>
        where
            P: StoragePolicy $(+ $lt, K: $lt, V: $lt)?,
        {
            #[inline]
            fn next_back(&mut self) -> Option<Self::Item> {
                self.inner.next_back().map(|$x| $project)
            }
        }

        impl<$($lt,)? K, V, P> ExactSizeIterator for $name<$($lt,)? K, V, P>
        where
            P: StoragePolicy $(+ $lt, K: $lt, V: $lt)?,
        {
        }

        impl<$($lt,)? K, V, P> FusedIterator for $name<$($lt,)? K, V, P>
        where
            P: StoragePolicy $(+ $lt, K: $lt, V: $lt)?,
        {
        }
    };
}

map_iterator!(Iter, (&'a K, &'a V), 'a, |(k, v)| (k, v));
map_iterator!(IterMut, (&'a K, &'a mut V), 'a, |(k, v)| (&*k, v));
map_iterator!(Keys, &'a K, 'a, |(k, _)| k);
map_iterator!(Values, &'a V, 'a, |(_, v)| v);
map_iterator!(ValuesMut, &'a mut V, 'a, |(_, v)| v);
map_iterator!(Drain, (K, V), 'a, |kv| kv);
map_iterator!(IntoIter, (K, V), , |kv| kv);
