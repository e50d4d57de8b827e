//! Packed per-bucket metadata.
//!
//! Every bucket is a single `(meta, index)` record. `meta` carries the
//! biased probe-sequence length in its high bits and a fingerprint taken from
//! the top of the hash in its low bits, so a lookup can reject most
//! mismatches without touching node storage. A `meta` of zero is the empty
//! sentinel: occupied buckets always store a PSL of at least one.

use core::fmt::Debug;

cfg_if::cfg_if! {
    if #[cfg(feature = "large-buckets")] {
        /// Integer type used for bucket metadata and node indexes.
        pub type Meta = u64;

        /// Number of low-order metadata bits holding the fingerprint.
        pub const FINGERPRINT_BITS: u32 = 16;
    } else {
        /// Integer type used for bucket metadata and node indexes.
        pub type Meta = u32;

        /// Number of low-order metadata bits holding the fingerprint.
        pub const FINGERPRINT_BITS: u32 = 8;
    }
}

/// Mask selecting the fingerprint bits of a metadata word.
pub const FINGERPRINT_MASK: Meta = (1 << FINGERPRINT_BITS) - 1;

/// Largest biased probe-sequence length a metadata word can represent.
pub const MAX_PSL: Meta = Meta::MAX >> FINGERPRINT_BITS;

/// Metadata value of an empty bucket.
pub const EMPTY: Meta = 0;

/// Pack a biased PSL and a fingerprint into one metadata word.
///
/// `psl` must already be biased, i.e. `1` for an entry sitting at its home
/// index.
#[inline(always)]
pub const fn pack(psl: Meta, fingerprint: Meta) -> Meta {
    debug_assert!(psl != 0 && psl <= MAX_PSL);
    (psl << FINGERPRINT_BITS) | (fingerprint & FINGERPRINT_MASK)
}

/// Inverse of [`pack`].
#[inline(always)]
pub const fn unpack(meta: Meta) -> (Meta, Meta) {
    (meta >> FINGERPRINT_BITS, meta & FINGERPRINT_MASK)
}

/// Fingerprint of a hash: its top `FINGERPRINT_BITS` bits.
///
/// Home indexes are taken from the low bits, so the two never overlap for
/// any table smaller than `2^(64 - FINGERPRINT_BITS)` buckets.
#[inline(always)]
pub const fn fingerprint_of(hash: u64) -> Meta {
    (hash >> (u64::BITS - FINGERPRINT_BITS)) as Meta
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub(crate) struct Bucket {
    meta: Meta,
    index: Meta,
}

impl Bucket {
    pub(crate) const EMPTY: Bucket = Bucket {
        meta: EMPTY,
        index: 0,
    };

    #[inline(always)]
    pub(crate) fn new(psl: Meta, fingerprint: Meta, index: usize) -> Self {
        debug_assert!(index <= Meta::MAX as usize);
        Bucket {
            meta: pack(psl, fingerprint),
            index: index as Meta,
        }
    }

    #[inline(always)]
    pub(crate) fn is_empty(self) -> bool {
        self.meta == EMPTY
    }

    /// Biased probe-sequence length; zero for an empty bucket.
    #[inline(always)]
    pub(crate) fn psl(self) -> Meta {
        unpack(self.meta).0
    }

    #[inline(always)]
    pub(crate) fn fingerprint(self) -> Meta {
        unpack(self.meta).1
    }

    #[inline(always)]
    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    #[inline(always)]
    pub(crate) fn set_index(&mut self, index: usize) {
        debug_assert!(index <= Meta::MAX as usize);
        self.index = index as Meta;
    }

    /// The same record one bucket further from home.
    #[inline(always)]
    pub(crate) fn pushed(self) -> Self {
        let psl = self.psl();
        assert!(psl < MAX_PSL, "probe sequence length overflow");
        Bucket {
            meta: pack(psl + 1, self.fingerprint()),
            index: self.index,
        }
    }

    /// The same record one bucket closer to home.
    #[inline(always)]
    pub(crate) fn pulled(self) -> Self {
        debug_assert!(self.psl() > 1);
        Bucket {
            meta: pack(self.psl() - 1, self.fingerprint()),
            index: self.index,
        }
    }
}

impl Debug for Bucket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            return f.write_str("..");
        }
        let (psl, fingerprint) = unpack(self.meta);
        write!(f, "{psl}:{fingerprint:02x}->{}", self.index)
    }
}
