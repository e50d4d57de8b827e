//! Hash wrapper applied by [`HashMap`](crate::HashMap) and
//! [`HashSet`](crate::HashSet) before handing hashes to the table.
//!
//! The table takes its home index from the low bits of a hash and its
//! fingerprint from the top bits, so a hash function that leaves either end
//! poorly distributed (identity hashes of integers, for instance) turns into
//! long probe runs. Builders that are not known to produce well-mixed output
//! get an extra avalanche step.

use core::any::TypeId;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

const AVALANCHE_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

/// Spread the entropy of `hash` over all 64 bits.
///
/// The full 128-bit product with an odd constant carries low bits upward;
/// xor-folding the high half back down makes the low bits depend on the
/// whole input.
///
/// # Examples
///
/// ```rust
/// use robin_hash::hasher::avalanche;
///
/// // Consecutive integers land far apart in both the low and high bits.
/// let a = avalanche(1);
/// let b = avalanche(2);
/// assert_ne!(a & 0xFF, b & 0xFF);
/// assert_ne!(a >> 56, b >> 56);
/// ```
#[inline(always)]
pub const fn avalanche(hash: u64) -> u64 {
    let product = (hash as u128).wrapping_mul(AVALANCHE_MULTIPLIER as u128);
    (product as u64) ^ ((product >> 64) as u64)
}

fn is_trusted_builder<S: 'static>() -> bool {
    let id = TypeId::of::<S>();
    if id == TypeId::of::<crate::DefaultHashBuilder>() {
        return true;
    }

    #[cfg(feature = "foldhash")]
    if id == TypeId::of::<foldhash::fast::RandomState>()
        || id == TypeId::of::<foldhash::fast::FixedState>()
        || id == TypeId::of::<foldhash::quality::RandomState>()
        || id == TypeId::of::<foldhash::quality::FixedState>()
    {
        return true;
    }

    #[cfg(feature = "std")]
    if id == TypeId::of::<std::hash::RandomState>() {
        return true;
    }

    false
}

/// A [`BuildHasher`] paired with the decision of whether its output must be
/// mixed before use.
///
/// Lookups through the wrapper accept any borrowed form `Q` of the key, so
/// heterogeneous lookups (`&str` against `String` keys) never build an owned
/// key.
///
/// # Examples
///
/// ```rust
/// use core::hash::BuildHasher;
/// use std::hash::RandomState;
///
/// use robin_hash::hasher::KeyHasher;
///
/// let state = RandomState::new();
/// let mixed = KeyHasher::new(state.clone());
/// let trusted = KeyHasher::trusted(state.clone());
///
/// assert!(mixed.is_avalanching());
/// assert!(!trusted.is_avalanching());
/// assert_eq!(trusted.hash_one("key"), state.hash_one("key"));
/// assert_eq!(mixed.hash_one("key"), robin_hash::hasher::avalanche(state.hash_one("key")));
/// ```
#[derive(Clone)]
pub struct KeyHasher<S> {
    build_hasher: S,
    avalanche: bool,
}

impl<S> Debug for KeyHasher<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyHasher")
            .field("avalanche", &self.avalanche)
            .finish_non_exhaustive()
    }
}

impl<S> KeyHasher<S> {
    /// Wrap a builder whose output quality is unknown. Hashes are mixed.
    pub const fn new(build_hasher: S) -> Self {
        Self {
            build_hasher,
            avalanche: true,
        }
    }

    /// Wrap a builder known to produce well-distributed 64-bit output.
    /// Hashes are used unmodified.
    pub const fn trusted(build_hasher: S) -> Self {
        Self {
            build_hasher,
            avalanche: false,
        }
    }

    /// Wrap a builder, trusting it only if its type is one of the builders
    /// known to produce well-distributed output: the crate's
    /// [`DefaultHashBuilder`](crate::DefaultHashBuilder), foldhash's states
    /// and std's `RandomState`. Anything else is mixed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use core::hash::BuildHasherDefault;
    /// use std::collections::hash_map::DefaultHasher;
    ///
    /// use robin_hash::DefaultHashBuilder;
    /// use robin_hash::hasher::KeyHasher;
    ///
    /// assert!(!KeyHasher::for_builder(DefaultHashBuilder::default()).is_avalanching());
    /// assert!(KeyHasher::for_builder(BuildHasherDefault::<DefaultHasher>::default()).is_avalanching());
    /// ```
    pub fn for_builder(build_hasher: S) -> Self
    where
        S: 'static,
    {
        Self {
            avalanche: !is_trusted_builder::<S>(),
            build_hasher,
        }
    }

    /// Whether hashes go through [`avalanche`] before use.
    pub const fn is_avalanching(&self) -> bool {
        self.avalanche
    }

    /// The wrapped builder.
    pub const fn build_hasher(&self) -> &S {
        &self.build_hasher
    }
}

impl<S: BuildHasher> KeyHasher<S> {
    /// Hash a key, or any borrowed form of one.
    #[inline]
    pub fn hash_one<Q: Hash + ?Sized>(&self, key: &Q) -> u64 {
        let hash = self.build_hasher.hash_one(key);
        if self.avalanche {
            avalanche(hash)
        } else {
            hash
        }
    }
}

#[cfg(test)]
mod tests {
    use core::hash::BuildHasherDefault;
    use core::hash::Hasher;

    use super::*;

    /// Hashes a `u64` to itself, the worst case for a masked home index.
    #[derive(Default)]
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | b as u64;
            }
        }

        fn write_u64(&mut self, i: u64) {
            self.0 = i;
        }
    }

    type Identity = BuildHasherDefault<IdentityHasher>;

    #[test]
    fn trusted_passes_through() {
        let hasher = KeyHasher::trusted(Identity::default());
        assert_eq!(hasher.hash_one(&1234u64), 1234);
    }

    #[test]
    fn untrusted_is_mixed() {
        let hasher = KeyHasher::new(Identity::default());
        assert_eq!(hasher.hash_one(&1234u64), avalanche(1234));
    }

    #[test]
    fn avalanche_spreads_sequential_keys() {
        // Sequential identity hashes masked to 8 buckets would all collide on
        // multiples of 8; mixed, they must spread across the buckets.
        let mut seen = [0usize; 8];
        for k in 0..64u64 {
            seen[(avalanche(k * 8) & 7) as usize] += 1;
        }
        assert!(seen.iter().filter(|&&c| c > 0).count() >= 6, "{seen:?}");
    }

    #[test]
    fn avalanche_fills_fingerprint_bits() {
        let distinct: alloc::collections::BTreeSet<u64> =
            (0..256u64).map(|k| avalanche(k) >> 56).collect();
        assert!(distinct.len() > 128, "{}", distinct.len());
    }

    #[test]
    fn for_builder_decides_trust_from_type() {
        assert!(!KeyHasher::for_builder(crate::DefaultHashBuilder::default()).is_avalanching());
        assert!(KeyHasher::for_builder(Identity::default()).is_avalanching());
    }

    #[cfg(feature = "foldhash")]
    #[test]
    fn for_builder_trusts_foldhash_states() {
        assert!(!KeyHasher::for_builder(foldhash::fast::FixedState::with_seed(7)).is_avalanching());
        assert!(!KeyHasher::for_builder(foldhash::fast::RandomState::default()).is_avalanching());
        assert!(
            !KeyHasher::for_builder(foldhash::quality::FixedState::with_seed(7)).is_avalanching()
        );
        assert!(
            !KeyHasher::for_builder(foldhash::quality::RandomState::default()).is_avalanching()
        );
    }

    #[cfg(feature = "std")]
    #[test]
    fn for_builder_trusts_std_random_state() {
        let hasher = KeyHasher::for_builder(std::hash::RandomState::new());
        assert!(!hasher.is_avalanching());
        assert_eq!(hasher.hash_one(&5u64), hasher.build_hasher().hash_one(5u64));
    }

    #[test]
    fn borrowed_lookup_hashes_like_owned() {
        let hasher = KeyHasher::new(Identity::default());
        let owned = alloc::string::String::from("abc");
        assert_eq!(hasher.hash_one(&owned), hasher.hash_one("abc"));
    }
}
