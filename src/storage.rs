//! Node storage strategies.
//!
//! Buckets only hold metadata and an index; the values themselves live in a
//! [`NodeStorage`]. Storage is always dense from the iterator's point of
//! view, so walking a table never has to skip empty buckets.
//!
//! Two strategies are provided, selected through a [`StoragePolicy`] type
//! parameter on the table:
//!
//! - [`Flat`]: values sit contiguously in a `Vec`. Removal moves the last
//!   value into the hole, so references and raw pointers into the table do
//!   not survive a removal or an insertion that reallocates.
//! - [`Pooled`]: values are constructed in fixed chunks that are never
//!   moved or reallocated, and a removed slot is returned to a free list. The
//!   address of a live value never changes until it is removed.

use alloc::alloc::handle_alloc_error;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

/// Storage for the values of a table.
///
/// Every value is addressed by an index handed out by [`insert`]. Each value
/// also carries the full hash it was inserted with, which lets the table
/// rebuild its buckets without calling back into user hashing code.
///
/// [`insert`]: NodeStorage::insert
pub trait NodeStorage<T> {
    /// Iterator over shared references, in storage order.
    type Iter<'a>: DoubleEndedIterator<Item = &'a T> + ExactSizeIterator + FusedIterator
    where
        Self: 'a,
        T: 'a;

    /// Iterator over mutable references, in storage order.
    type IterMut<'a>: DoubleEndedIterator<Item = &'a mut T> + ExactSizeIterator + FusedIterator
    where
        Self: 'a,
        T: 'a;

    /// Owning iterator, in storage order.
    type IntoIter: DoubleEndedIterator<Item = T> + ExactSizeIterator + FusedIterator;

    /// Whether live values keep their address across insertions and removals
    /// of other values.
    const POINTER_STABLE: bool;

    /// Empty storage. Must not allocate.
    fn new() -> Self;

    /// Number of live values.
    fn len(&self) -> usize;

    /// Returns `true` if no values are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make room for at least `additional` more values.
    fn reserve(&mut self, additional: usize);

    /// Store a value and return its index.
    fn insert(&mut self, hash: u64, value: T) -> usize;

    /// Hash the value at `index` was inserted with.
    fn hash(&self, index: usize) -> u64;

    /// Value at `index`. `index` must refer to a live value.
    fn get(&self, index: usize) -> &T;

    /// Value at `index`. `index` must refer to a live value.
    fn get_mut(&mut self, index: usize) -> &mut T;

    /// Index of the value at `position` in iteration order.
    fn index_at(&self, position: usize) -> usize;

    /// Remove the value at `index`.
    ///
    /// Returns the value and, if another value had to move into `index` to
    /// keep the storage dense, the index that value was previously stored at.
    fn remove(&mut self, index: usize) -> (T, Option<usize>);

    /// Drop every value, keeping allocations where possible.
    fn clear(&mut self);

    /// Iterate values in storage order.
    fn iter(&self) -> Self::Iter<'_>;

    /// Iterate values mutably in storage order.
    fn iter_mut(&mut self) -> Self::IterMut<'_>;

    /// Consume the storage, yielding values in storage order.
    fn into_values(self) -> Self::IntoIter;

    /// Bytes of heap memory held.
    fn allocated_bytes(&self) -> usize;
}

/// Selects the node storage a table uses.
///
/// The choice is part of the table's type and fixed for its lifetime.
pub trait StoragePolicy {
    /// Storage used for values of type `T`.
    type Nodes<T>: NodeStorage<T>;
}

/// Contiguous, compacting storage. See the [module docs](self).
#[derive(Debug, Clone, Copy, Default)]
pub struct Flat;

/// Chunked, pointer-stable storage. See the [module docs](self).
#[derive(Debug, Clone, Copy, Default)]
pub struct Pooled;

impl StoragePolicy for Flat {
    type Nodes<T> = FlatNodes<T>;
}

impl StoragePolicy for Pooled {
    type Nodes<T> = PooledNodes<T>;
}

#[derive(Clone)]
struct FlatSlot<T> {
    hash: u64,
    value: T,
}

/// Values stored contiguously; removal swaps the last value into the hole.
#[derive(Clone)]
pub struct FlatNodes<T> {
    slots: Vec<FlatSlot<T>>,
}

impl<T> NodeStorage<T> for FlatNodes<T> {
    type Iter<'a>
        = FlatIter<'a, T>
    where
        Self: 'a,
        T: 'a;
    type IterMut<'a>
        = FlatIterMut<'a, T>
    where
        Self: 'a,
        T: 'a;
    type IntoIter = FlatIntoIter<T>;

    const POINTER_STABLE: bool = false;

    fn new() -> Self {
        Self { slots: Vec::new() }
    }

    #[inline]
    fn len(&self) -> usize {
        self.slots.len()
    }

    fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }

    #[inline]
    fn insert(&mut self, hash: u64, value: T) -> usize {
        self.slots.push(FlatSlot { hash, value });
        self.slots.len() - 1
    }

    #[inline]
    fn hash(&self, index: usize) -> u64 {
        self.slots[index].hash
    }

    #[inline]
    fn get(&self, index: usize) -> &T {
        &self.slots[index].value
    }

    #[inline]
    fn get_mut(&mut self, index: usize) -> &mut T {
        &mut self.slots[index].value
    }

    #[inline]
    fn index_at(&self, position: usize) -> usize {
        position
    }

    #[inline]
    fn remove(&mut self, index: usize) -> (T, Option<usize>) {
        let last = self.slots.len() - 1;
        let slot = self.slots.swap_remove(index);
        (slot.value, (index != last).then_some(last))
    }

    fn clear(&mut self) {
        self.slots.clear();
    }

    fn iter(&self) -> FlatIter<'_, T> {
        FlatIter {
            inner: self.slots.iter(),
        }
    }

    fn iter_mut(&mut self) -> FlatIterMut<'_, T> {
        FlatIterMut {
            inner: self.slots.iter_mut(),
        }
    }

    fn into_values(self) -> FlatIntoIter<T> {
        FlatIntoIter {
            inner: self.slots.into_iter(),
        }
    }

    fn allocated_bytes(&self) -> usize {
        self.slots.capacity() * size_of::<FlatSlot<T>>()
    }
}

/// Iterator over [`FlatNodes`].
pub struct FlatIter<'a, T> {
    inner: core::slice::Iter<'a, FlatSlot<T>>,
}

/// Mutable iterator over [`FlatNodes`].
pub struct FlatIterMut<'a, T> {
    inner: core::slice::IterMut<'a, FlatSlot<T>>,
}

/// Owning iterator over [`FlatNodes`].
pub struct FlatIntoIter<T> {
    inner: alloc::vec::IntoIter<FlatSlot<T>>,
}

macro_rules! forward_slot_iterator {
    ($name:ident, $item:ty, $($lt:lifetime)?, |$slot:ident| $project:expr) => {
        impl<$($lt,)? T> Iterator for $name<$($lt,)? T> {
            type Item = $item;

            #[inline]
            fn next(&mut self) -> Option<Self::Item> {
                self.inner.next().map(|$slot| $project)
            }

            #[inline]
            fn size_hint(&self) -> (usize, Option<usize>) {
                self.inner.size_hint()
            }
        }

        impl<$($lt,)? T> DoubleEndedIterator for $name<$($lt,)? T> {
            #[inline]
            fn next_back(&mut self) -> Option<Self::Item> {
                self.inner.next_back().map(|$slot| $project)
            }
        }

        impl<$($lt,)? T> ExactSizeIterator for $name<$($lt,)? T> {}

        impl<$($lt,)? T> FusedIterator for $name<$($lt,)? T> {}
    };
}

forward_slot_iterator!(FlatIter, &'a T, 'a, |slot| &slot.value);
forward_slot_iterator!(FlatIterMut, &'a mut T, 'a, |slot| &mut slot.value);
forward_slot_iterator!(FlatIntoIter, T, , |slot| slot.value);

/// Slots in the first chunk; each following chunk doubles.
const FIRST_CHUNK_SLOTS: usize = 32;
const FIRST_CHUNK_BITS: u32 = FIRST_CHUNK_SLOTS.trailing_zeros();

/// Marks the end of the free list.
const NO_SLOT: usize = usize::MAX;

struct PoolSlot<T> {
    value: MaybeUninit<T>,
    hash: u64,
    /// Position in `dense` while the slot is live, next free slot otherwise.
    link: usize,
}

struct Chunk<T> {
    ptr: NonNull<PoolSlot<T>>,
    len: usize,
}

impl<T> Chunk<T> {
    fn layout(len: usize) -> Layout {
        Layout::array::<PoolSlot<T>>(len).expect("allocation size overflow")
    }

    fn allocate(len: usize) -> Self {
        let layout = Self::layout(len);
        // SAFETY: `PoolSlot` always contains a `u64`, so the layout size is
        // non-zero. Allocation failure is routed to `handle_alloc_error`.
        let ptr = unsafe {
            let raw = alloc::alloc::alloc(layout);
            if raw.is_null() {
                handle_alloc_error(layout);
            }
            NonNull::new_unchecked(raw.cast())
        };
        Chunk { ptr, len }
    }
}

/// Split a pool handle into its chunk and the offset within that chunk.
#[inline(always)]
fn locate(handle: usize) -> (usize, usize) {
    let biased = handle + FIRST_CHUNK_SLOTS;
    let chunk = (usize::BITS - 1 - biased.leading_zeros() - FIRST_CHUNK_BITS) as usize;
    (chunk, biased - (FIRST_CHUNK_SLOTS << chunk))
}

/// Raw pointer to the slot behind `handle`.
///
/// # Safety
///
/// `handle` must be lower than the total number of slots in `chunks`.
#[inline(always)]
unsafe fn slot_ptr<T>(chunks: &[Chunk<T>], handle: usize) -> *mut PoolSlot<T> {
    let (chunk, offset) = locate(handle);
    // SAFETY: Caller guarantees `handle` falls inside an allocated chunk, so
    // `chunk` indexes `chunks` and `offset < chunks[chunk].len`.
    unsafe {
        let chunk = chunks.get_unchecked(chunk);
        debug_assert!(offset < chunk.len);
        chunk.ptr.as_ptr().add(offset)
    }
}

/// Values constructed in chunks that never move.
///
/// Indexes handed out by [`construct`] are stable handles: they stay valid,
/// and keep pointing at the same memory, until passed to [`destroy`]. Freed
/// handles are reused through an intrusive free list. A dense list of live
/// handles gives gap-free iteration.
///
/// [`construct`]: PooledNodes::construct
/// [`destroy`]: PooledNodes::destroy
pub struct PooledNodes<T> {
    chunks: Vec<Chunk<T>>,
    /// Live handles in iteration order.
    dense: Vec<usize>,
    free_head: usize,
    /// Handles at or above this have never been constructed.
    high_water: usize,
    _phantom: PhantomData<T>,
}

// SAFETY: `PooledNodes` owns its `T`s exclusively; the raw chunk pointers are
// never shared outside of borrows of `self`.
unsafe impl<T: Send> Send for PooledNodes<T> {}
// SAFETY: Shared access only hands out `&T`.
unsafe impl<T: Sync> Sync for PooledNodes<T> {}

impl<T> PooledNodes<T> {
    fn slot_count(&self) -> usize {
        self.chunks.iter().map(|c| c.len).sum()
    }

    fn grow_chunks(&mut self) {
        let len = FIRST_CHUNK_SLOTS << self.chunks.len();
        self.chunks.push(Chunk::allocate(len));
    }

    #[inline(always)]
    fn slot(&self, handle: usize) -> *mut PoolSlot<T> {
        assert!(handle < self.high_water, "invalid pool handle");
        // SAFETY: Every handle below `high_water` lies in an allocated chunk.
        unsafe { slot_ptr(&self.chunks, handle) }
    }

    /// Construct `value` in a free slot and return its handle.
    pub fn construct(&mut self, hash: u64, value: T) -> usize {
        let handle = if self.free_head != NO_SLOT {
            let handle = self.free_head;
            // SAFETY: Handles on the free list were constructed before, so
            // their `link` field is initialized.
            self.free_head = unsafe { (*self.slot(handle)).link };
            handle
        } else {
            if self.high_water == self.slot_count() {
                self.grow_chunks();
            }
            self.high_water += 1;
            self.high_water - 1
        };

        let slot = self.slot(handle);
        // SAFETY: `slot` is in bounds and currently holds no live value, so
        // overwriting it leaks nothing.
        unsafe {
            slot.write(PoolSlot {
                value: MaybeUninit::new(value),
                hash,
                link: self.dense.len(),
            });
        }
        self.dense.push(handle);
        handle
    }

    /// Move the value out of `handle` and return the slot to the free list.
    pub fn destroy(&mut self, handle: usize) -> T {
        let slot = self.slot(handle);
        // SAFETY: Only live handles reach `destroy`; their value is
        // initialized and is read exactly once here before the slot is
        // linked into the free list.
        unsafe {
            let value = (*slot).value.assume_init_read();
            let position = (*slot).link;
            debug_assert_eq!(self.dense[position], handle);

            self.dense.swap_remove(position);
            if let Some(&moved) = self.dense.get(position) {
                (*self.slot(moved)).link = position;
            }

            (*slot).link = self.free_head;
            self.free_head = handle;
            value
        }
    }

    fn drop_values(&mut self) {
        if !core::mem::needs_drop::<T>() {
            return;
        }
        for &handle in &self.dense {
            // SAFETY: Every handle in `dense` is live and dropped once; the
            // caller resets `dense` afterwards.
            unsafe { (*slot_ptr(&self.chunks, handle)).value.assume_init_drop() };
        }
    }
}

impl<T> Drop for PooledNodes<T> {
    fn drop(&mut self) {
        self.drop_values();
        for chunk in &self.chunks {
            // SAFETY: Each chunk was allocated in `Chunk::allocate` with this
            // exact layout and is freed exactly once.
            unsafe { alloc::alloc::dealloc(chunk.ptr.as_ptr().cast(), Chunk::<T>::layout(chunk.len)) };
        }
    }
}

impl<T> NodeStorage<T> for PooledNodes<T> {
    type Iter<'a>
        = PooledIter<'a, T>
    where
        Self: 'a,
        T: 'a;
    type IterMut<'a>
        = PooledIterMut<'a, T>
    where
        Self: 'a,
        T: 'a;
    type IntoIter = alloc::vec::IntoIter<T>;

    const POINTER_STABLE: bool = true;

    fn new() -> Self {
        Self {
            chunks: Vec::new(),
            dense: Vec::new(),
            free_head: NO_SLOT,
            high_water: 0,
            _phantom: PhantomData,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.dense.len()
    }

    fn reserve(&mut self, additional: usize) {
        self.dense.reserve(additional);
        let required = self.dense.len().saturating_add(additional);
        while self.slot_count() < required {
            self.grow_chunks();
        }
    }

    #[inline]
    fn insert(&mut self, hash: u64, value: T) -> usize {
        self.construct(hash, value)
    }

    #[inline]
    fn hash(&self, index: usize) -> u64 {
        // SAFETY: `slot` bounds-checks the handle; `hash` is written on
        // construction.
        unsafe { (*self.slot(index)).hash }
    }

    #[inline]
    fn get(&self, index: usize) -> &T {
        // SAFETY: The table only passes handles of live values.
        unsafe { (*self.slot(index)).value.assume_init_ref() }
    }

    #[inline]
    fn get_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: The table only passes handles of live values, and `&mut
        // self` guarantees exclusive access.
        unsafe { (*self.slot(index)).value.assume_init_mut() }
    }

    #[inline]
    fn index_at(&self, position: usize) -> usize {
        self.dense[position]
    }

    #[inline]
    fn remove(&mut self, index: usize) -> (T, Option<usize>) {
        (self.destroy(index), None)
    }

    fn clear(&mut self) {
        self.drop_values();
        self.dense.clear();
        self.free_head = NO_SLOT;
        self.high_water = 0;
    }

    fn iter(&self) -> PooledIter<'_, T> {
        PooledIter {
            handles: self.dense.iter(),
            chunks: &self.chunks,
        }
    }

    fn iter_mut(&mut self) -> PooledIterMut<'_, T> {
        PooledIterMut {
            handles: self.dense.iter(),
            chunks: &self.chunks,
            _phantom: PhantomData,
        }
    }

    fn into_values(mut self) -> alloc::vec::IntoIter<T> {
        let dense = core::mem::take(&mut self.dense);
        dense
            .into_iter()
            .map(|handle| {
                // SAFETY: `dense` has been emptied, so `Drop` will not touch
                // these values again; each is read exactly once.
                unsafe { (*slot_ptr(&self.chunks, handle)).value.assume_init_read() }
            })
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn allocated_bytes(&self) -> usize {
        self.slot_count() * size_of::<PoolSlot<T>>()
            + self.dense.capacity() * size_of::<usize>()
            + self.chunks.capacity() * size_of::<Chunk<T>>()
    }
}

/// Iterator over [`PooledNodes`].
pub struct PooledIter<'a, T> {
    handles: core::slice::Iter<'a, usize>,
    chunks: &'a [Chunk<T>],
}

/// Mutable iterator over [`PooledNodes`].
pub struct PooledIterMut<'a, T> {
    handles: core::slice::Iter<'a, usize>,
    chunks: &'a [Chunk<T>],
    _phantom: PhantomData<&'a mut T>,
}

impl<'a, T> Iterator for PooledIter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let &handle = self.handles.next()?;
        // SAFETY: `dense` only lists live handles.
        Some(unsafe { (*slot_ptr(self.chunks, handle)).value.assume_init_ref() })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.handles.size_hint()
    }
}

impl<T> DoubleEndedIterator for PooledIter<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        let &handle = self.handles.next_back()?;
        // SAFETY: `dense` only lists live handles.
        Some(unsafe { (*slot_ptr(self.chunks, handle)).value.assume_init_ref() })
    }
}

impl<'a, T> Iterator for PooledIterMut<'a, T> {
    type Item = &'a mut T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let &handle = self.handles.next()?;
        // SAFETY: `dense` lists each live handle once, so every yielded
        // reference points at a distinct slot. The iterator was created from
        // `&mut PooledNodes`, which guarantees exclusive access for `'a`.
        Some(unsafe { (*slot_ptr(self.chunks, handle)).value.assume_init_mut() })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.handles.size_hint()
    }
}

impl<T> DoubleEndedIterator for PooledIterMut<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        let &handle = self.handles.next_back()?;
        // SAFETY: See `next`.
        Some(unsafe { (*slot_ptr(self.chunks, handle)).value.assume_init_mut() })
    }
}

impl<T> ExactSizeIterator for PooledIter<'_, T> {}
impl<T> FusedIterator for PooledIter<'_, T> {}
impl<T> ExactSizeIterator for PooledIterMut<'_, T> {}
impl<T> FusedIterator for PooledIterMut<'_, T> {}
