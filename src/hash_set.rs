use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;

use crate::DefaultHashBuilder;
use crate::hash_table;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hasher::KeyHasher;
use crate::storage::Flat;
use crate::storage::Pooled;
use crate::storage::StoragePolicy;

/// A hash set backed by the Robin-Hood [`HashTable`].
///
/// `HashSet<T, S, P>` stores values of type `T` where `T` implements
/// `Hash + Eq`. Hashing and storage policies behave as for
/// [`HashMap`](crate::HashMap): [`with_hasher`](HashSet::with_hasher) mixes
/// the output of builders not known to be well distributed, and [`Pooled`] storage (see [`StableHashSet`])
/// keeps every element at a fixed address until it is removed.
///
/// # Performance Characteristics
///
/// - **Memory**: 8 bytes of bucket metadata per bucket, plus the size of `T`
///   plus a u64 for the cached hash.
pub struct HashSet<T, S = DefaultHashBuilder, P: StoragePolicy = Flat> {
    table: HashTable<T, P>,
    hasher: KeyHasher<S>,
}

/// A [`HashSet`] whose elements never move while they are live.
pub type StableHashSet<T, S = DefaultHashBuilder> = HashSet<T, S, Pooled>;

impl<T, S, P> Clone for HashSet<T, S, P>
where
    T: Clone,
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

impl<T, S, P> PartialEq for HashSet<T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|v| other.contains(v))
    }
}

impl<T, S, P> Eq for HashSet<T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
}

impl<T, S, P> Debug for HashSet<T, S, P>
where
    T: Debug,
    P: StoragePolicy,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(any(feature = "std", feature = "foldhash"))]
impl<T> HashSet<T> {
    /// Creates an empty set using the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashSet;
    ///
    /// let mut set = HashSet::new();
    /// assert!(set.insert(1));
    /// assert!(!set.insert(1));
    /// ```
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty set with room for at least `capacity` elements,
    /// using the default hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Flat)
    }
}

#[cfg(any(feature = "std", feature = "foldhash"))]
impl<T, P: StoragePolicy> HashSet<T, DefaultHashBuilder, P> {
    /// Creates an empty set with the default hasher builder and the node
    /// storage selected by `policy`.
    pub fn new_in(policy: P) -> Self {
        Self::with_capacity_in(0, policy)
    }

    /// Creates an empty set with room for at least `capacity` elements, the
    /// default hasher builder, and the node storage selected by `policy`.
    pub fn with_capacity_in(capacity: usize, policy: P) -> Self {
        Self::with_capacity_and_key_hasher_in(
            capacity,
            KeyHasher::trusted(DefaultHashBuilder::default()),
            policy,
        )
    }
}

impl<T, S> HashSet<T, S> {
    /// Creates a new hash set with the given hasher builder. Its output is
    /// mixed before use unless the builder's type is trusted, as in
    /// [`KeyHasher::for_builder`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::hash::RandomState;
    ///
    /// use robin_hash::hash_set::HashSet;
    ///
    /// let set: HashSet<i32, _> = HashSet::with_hasher(RandomState::new());
    /// assert!(set.is_empty());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self
    where
        S: 'static,
    {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates a new hash set with a hasher builder whose output is used
    /// unmodified.
    pub fn with_trusted_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_key_hasher_in(0, KeyHasher::trusted(hash_builder), Flat)
    }

    /// Creates a new hash set with the specified capacity and hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::hash::RandomState;
    ///
    /// use robin_hash::hash_set::HashSet;
    ///
    /// let set: HashSet<i32, _> = HashSet::with_capacity_and_hasher(100, RandomState::new());
    /// assert!(set.capacity() >= 100);
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self
    where
        S: 'static,
    {
        Self::with_capacity_and_key_hasher_in(capacity, KeyHasher::for_builder(hash_builder), Flat)
    }
}

impl<T, S, P: StoragePolicy> HashSet<T, S, P> {
    /// Creates an empty set from a fully configured [`KeyHasher`] and the
    /// node storage selected by `policy`.
    pub fn with_capacity_and_key_hasher_in(capacity: usize, hasher: KeyHasher<S>, policy: P) -> Self {
        Self {
            table: HashTable::with_capacity_in(capacity, policy),
            hasher,
        }
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of elements the set can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the number of buckets in the underlying table.
    pub fn bucket_capacity(&self) -> usize {
        self.table.bucket_capacity()
    }

    /// Returns the maximum ratio of elements to buckets.
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

    /// Returns the set's hasher.
    pub fn hasher(&self) -> &KeyHasher<S> {
        &self.hasher
    }

    /// Clears the set, removing all values. Keeps the allocated buckets.
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

    /// Retains only the elements for which `f` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = (1..=6).collect();
    /// set.retain(|&x| x % 2 == 0);
    /// assert_eq!(set.len(), 3);
    /// assert!(set.contains(&4));
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.table.retain(|v| f(v));
    }

    /// An iterator visiting all elements. `iter().rev()` visits them in
    /// reverse order.
    pub fn iter(&self) -> Iter<'_, T, P> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Clears the set, returning all elements as an iterator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = [1, 2, 3].into_iter().collect();
    /// let mut drained: Vec<i32> = set.drain().collect();
    /// drained.sort();
    /// assert_eq!(drained, vec![1, 2, 3]);
    /// assert!(set.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, T, P> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<T, S, P> HashSet<T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
    /// Adds a value to the set.
    ///
    /// Returns whether the value was newly inserted. An equal value already
    /// in the set is kept and `value` is dropped.
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hasher.hash_one(&value);
        match self.table.entry(hash, |v| v == &value) {
            TableEntry::Occupied(_) => false,
            TableEntry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Adds a value to the set, replacing the existing equal value, if any.
    /// Returns the replaced value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashSet;
    ///
    /// let mut set = HashSet::new();
    /// assert_eq!(set.replace(String::from("a")), None);
    /// assert_eq!(set.replace(String::from("a")), Some(String::from("a")));
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn replace(&mut self, value: T) -> Option<T> {
        let hash = self.hasher.hash_one(&value);
        match self.table.entry(hash, |v| v == &value) {
            TableEntry::Occupied(mut entry) => Some(core::mem::replace(entry.get_mut(), value)),
            TableEntry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Returns `true` if the set contains a value.
    ///
    /// The value may be any borrowed form of the set's value type.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(value).is_some()
    }

    /// Returns a reference to the stored value equal to `value`, if any.
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(value);
        self.table.find(hash, |v| v.borrow() == value)
    }

    /// Removes a value from the set. Returns whether it was present.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(value).is_some()
    }

    /// Removes and returns the stored value equal to `value`, if any.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashSet;
    ///
    /// let mut set: HashSet<String> = HashSet::new();
    /// set.insert("apple".to_string());
    /// assert_eq!(set.take("apple"), Some("apple".to_string()));
    /// assert_eq!(set.take("apple"), None);
    /// ```
    pub fn take<Q>(&mut self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(value);
        self.table.remove(hash, |v| v.borrow() == value)
    }

    /// Returns `true` if `self` has no elements in common with `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashSet;
    ///
    /// let a: HashSet<i32> = [1, 2].into_iter().collect();
    /// let b: HashSet<i32> = [3, 4].into_iter().collect();
    /// assert!(a.is_disjoint(&b));
    /// ```
    pub fn is_disjoint(&self, other: &Self) -> bool {
        if self.len() <= other.len() {
            self.iter().all(|v| !other.contains(v))
        } else {
            other.iter().all(|v| !self.contains(v))
        }
    }

    /// Returns `true` if `other` contains at least all the elements in
    /// `self`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().all(|v| other.contains(v))
    }

    /// Returns `true` if `self` contains at least all the elements in
    /// `other`.
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }

    /// Visits the values in `self` or `other`, without duplicates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashSet;
    ///
    /// let a: HashSet<i32> = [1, 2, 3].into_iter().collect();
    /// let b: HashSet<i32> = [2, 3, 4].into_iter().collect();
    ///
    /// let mut union: Vec<i32> = a.union(&b).copied().collect();
    /// union.sort();
    /// assert_eq!(union, vec![1, 2, 3, 4]);
    /// ```
    pub fn union<'a>(&'a self, other: &'a Self) -> Union<'a, T, S, P> {
        let (larger, smaller) = if self.len() >= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        Union {
            iter: larger.iter(),
            rest: smaller.difference(larger),
        }
    }

    /// Visits the values in both `self` and `other`.
    pub fn intersection<'a>(&'a self, other: &'a Self) -> Intersection<'a, T, S, P> {
        let (smaller, larger) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        Intersection {
            iter: smaller.iter(),
            other: larger,
        }
    }

    /// Visits the values in `self` that are not in `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_hash::HashSet;
    ///
    /// let a: HashSet<i32> = [1, 2, 3].into_iter().collect();
    /// let b: HashSet<i32> = [2, 3, 4].into_iter().collect();
    ///
    /// let diff: Vec<i32> = a.difference(&b).copied().collect();
    /// assert_eq!(diff, vec![1]);
    /// ```
    pub fn difference<'a>(&'a self, other: &'a Self) -> Difference<'a, T, S, P> {
        Difference {
            iter: self.iter(),
            other,
        }
    }

    /// Visits the values in exactly one of `self` and `other`.
    pub fn symmetric_difference<'a>(&'a self, other: &'a Self) -> SymmetricDifference<'a, T, S, P> {
        SymmetricDifference {
            iter: self.difference(other).chain(other.difference(self)),
        }
    }
}

impl<T, S, P> Default for HashSet<T, S, P>
where
    S: Default + 'static,
    P: StoragePolicy + Default,
{
    /// An empty set with `S::default()`, trusted or mixed as in
    /// [`KeyHasher::for_builder`].
    fn default() -> Self {
        Self::with_capacity_and_key_hasher_in(0, KeyHasher::for_builder(S::default()), P::default())
    }
}

impl<T, S, P> FromIterator<T> for HashSet<T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher + Default + 'static,
    P: StoragePolicy + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::default();
        set.extend(iter);
        set
    }
}

impl<T, S, P> Extend<T> for HashSet<T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for value in iter {
            self.insert(value);
        }
    }
}

impl<'a, T, S, P> Extend<&'a T> for HashSet<T, S, P>
where
    T: Hash + Eq + Copy + 'a,
    S: BuildHasher,
    P: StoragePolicy,
{
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl<T, S, P: StoragePolicy> IntoIterator for HashSet<T, S, P> {
    type Item = T;
    type IntoIter = IntoIter<T, P>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, T, S, P: StoragePolicy> IntoIterator for &'a HashSet<T, S, P> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the elements of a [`HashSet`].
pub struct Iter<'a, T, P = Flat>
where
    T: 'a,
    P: StoragePolicy + 'a,
{
    inner: hash_table::Iter<'a, T, P>,
}

/// A draining iterator over the elements of a [`HashSet`].
pub struct Drain<'a, T, P: StoragePolicy = Flat> {
    inner: hash_table::Drain<'a, T, P>,
}

/// An owning iterator over the elements of a [`HashSet`].
pub struct IntoIter<T, P: StoragePolicy = Flat> {
    inner: hash_table::IntoIter<T, P>,
}

macro_rules! set_iterator {
    ($name:ident, $item:ty, $($lt:lifetime)?) => {
        impl<$($lt,)? T, P> Iterator for $name<$($lt,)? T, P>
        where
            P: StoragePolicy $(+ $lt, T: $lt)?,
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

        impl<$($lt,)? T, P> DoubleEndedIterator for $name<$($lt,)? T, P>
        where
            P: StoragePolicy $(+ $lt, T: $lt)?,
        {
            #[inline]
            fn next_back(&mut self) -> Option<Self::Item> {
                self.inner.next_back()
            }
        }

        impl<$($lt,)? T, P> ExactSizeIterator for $name<$($lt,)? T, P>
        where
            P: StoragePolicy $(+ $lt, T: $lt)?,
        {
        }

        impl<$($lt,)? T, P> FusedIterator for $name<$($lt,)? T, P>
        where
            P: StoragePolicy $(+ $lt, T: $lt)?,
        {
        }
    };
}

set_iterator!(Iter, &'a T, 'a);
set_iterator!(Drain, T, 'a);
set_iterator!(IntoIter, T,);

/// An iterator over the union of two sets.
pub struct Union<'a, T, S, P: StoragePolicy = Flat> {
    iter: Iter<'a, T, P>,
    rest: Difference<'a, T, S, P>,
}

impl<'a, T, S, P> Iterator for Union<'a, T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().or_else(|| self.rest.next())
    }
}

impl<T, S, P> FusedIterator for Union<'_, T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
}

/// An iterator over the intersection of two sets.
pub struct Intersection<'a, T, S, P: StoragePolicy = Flat> {
    iter: Iter<'a, T, P>,
    other: &'a HashSet<T, S, P>,
}

impl<'a, T, S, P> Iterator for Intersection<'a, T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let v = self.iter.next()?;
            if self.other.contains(v) {
                return Some(v);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.iter.size_hint().1)
    }
}

impl<T, S, P> FusedIterator for Intersection<'_, T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
}

/// An iterator over the difference of two sets.
pub struct Difference<'a, T, S, P: StoragePolicy = Flat> {
    iter: Iter<'a, T, P>,
    other: &'a HashSet<T, S, P>,
}

impl<'a, T, S, P> Iterator for Difference<'a, T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let v = self.iter.next()?;
            if !self.other.contains(v) {
                return Some(v);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.iter.size_hint().1)
    }
}

impl<T, S, P> FusedIterator for Difference<'_, T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
}

/// An iterator over the symmetric difference of two sets.
pub struct SymmetricDifference<'a, T, S, P: StoragePolicy = Flat> {
    iter: core::iter::Chain<Difference<'a, T, S, P>, Difference<'a, T, S, P>>,
}

impl<'a, T, S, P> Iterator for SymmetricDifference<'a, T, S, P>
where
    T: Hash + Eq,
    S: BuildHasher,
    P: StoragePolicy,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}
