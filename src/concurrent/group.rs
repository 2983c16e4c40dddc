use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::foa::group::{overflow_bit, reduced_hash, SLOTS_MASK};
use crate::foa::swar::{compress_mask, match_byte_word, match_zero_word};
use crate::sync::RwSpinlock;

/// Metadata block of a concurrent group.
///
/// The 16 metadata bytes live in two atomic words; byte `n` occupies bits
/// `8 * (n % 8)..` of word `n / 8`, so slots 0..=7 share word 0, slots
/// 8..=14 and the overflow byte share word 1. Matching loads a snapshot of
/// the words and runs the portable word-at-a-time comparison over it;
/// callers re-check occupancy under the group lock before trusting a hit.
pub(crate) struct AtomicGroup {
    words: [AtomicU64; 2],
}

#[inline]
const fn word_of(n: usize) -> usize {
    n / 8
}

#[inline]
const fn shift_of(n: usize) -> u32 {
    (n % 8) as u32 * 8
}

// byte 15 of the block
const OVERFLOW_SHIFT: u32 = 56;
const SENTINEL_SHIFT: u32 = shift_of(14);

impl AtomicGroup {
    pub(crate) fn new() -> Self {
        AtomicGroup { words: [AtomicU64::new(0), AtomicU64::new(0)] }
    }

    #[inline]
    fn snapshot(&self) -> (u64, u64) {
        (self.words[0].load(Ordering::Acquire), self.words[1].load(Ordering::Acquire))
    }

    /// Publishes the fragment of `hash` into slot `n`. The slot byte must
    /// be zero and the caller must hold the group's exclusive lock.
    #[inline]
    pub(crate) fn set(&self, n: usize, hash: u64) {
        debug_assert!(n < 15);
        let bits = (reduced_hash(hash) as u64) << shift_of(n);
        self.words[word_of(n)].fetch_or(bits, Ordering::Release);
    }

    pub(crate) fn set_sentinel(&self) {
        self.words[1].fetch_or(1 << SENTINEL_SHIFT, Ordering::Release);
    }

    #[inline]
    pub(crate) fn reset(&self, n: usize) {
        debug_assert!(n < 15);
        let bits = !(0xffu64 << shift_of(n));
        self.words[word_of(n)].fetch_and(bits, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_occupied(&self, n: usize) -> bool {
        debug_assert!(n < 15);
        let word = self.words[word_of(n)].load(Ordering::Acquire);
        (word >> shift_of(n)) as u8 != 0
    }

    /// 15-bit mask of slots whose fragment may equal the fragment of
    /// `hash`, over a point-in-time snapshot. False positives (shared
    /// fragments, or a slot mutating after the load) are resolved by the
    /// occupancy re-check and key comparison under the group lock.
    #[inline]
    pub(crate) fn match_fragment(&self, hash: u64) -> u32 {
        let (w0, w1) = self.snapshot();
        let fragment = reduced_hash(hash);
        (compress_mask(match_byte_word(w0, fragment))
            | (compress_mask(match_byte_word(w1, fragment)) << 8))
            & SLOTS_MASK
    }

    /// 15-bit mask of free slots in a snapshot; the sentinel is never
    /// reported.
    #[inline]
    pub(crate) fn match_available(&self) -> u32 {
        let (w0, w1) = self.snapshot();
        (compress_mask(match_zero_word(w0)) | (compress_mask(match_zero_word(w1)) << 8))
            & SLOTS_MASK
    }

    /// 15-bit mask of occupied slots with the sentinel stripped.
    #[inline]
    pub(crate) fn match_really_occupied(&self) -> u32 {
        let (w0, w1) = self.snapshot();
        let mut mask = !(compress_mask(match_zero_word(w0))
            | (compress_mask(match_zero_word(w1)) << 8))
            & SLOTS_MASK;
        if (w1 >> SENTINEL_SHIFT) as u8 == 1 {
            mask &= !(1 << 14);
        }
        mask
    }

    #[inline]
    pub(crate) fn mark_overflow(&self, hash: u64) {
        let bits = (overflow_bit(hash) as u64) << OVERFLOW_SHIFT;
        self.words[1].fetch_or(bits, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn is_not_overflowed(&self, hash: u64) -> bool {
        let byte = (self.words[1].load(Ordering::Acquire) >> OVERFLOW_SHIFT) as u8;
        byte & overflow_bit(hash) == 0
    }

    /// Wipes the whole block. Only valid under exclusive table access.
    pub(crate) fn clear(&self) {
        self.words[0].store(0, Ordering::Release);
        self.words[1].store(0, Ordering::Release);
    }
}

/// A group's metadata together with its access state: the per-group
/// read/write spinlock and the insertion counter consulted by the
/// optimistic insertion protocol.
pub(crate) struct ConcurrentGroup {
    pub(crate) meta: AtomicGroup,
    pub(crate) lock: RwSpinlock,
    pub(crate) insert_counter: AtomicU32,
}

impl ConcurrentGroup {
    pub(crate) fn new() -> Self {
        ConcurrentGroup {
            meta: AtomicGroup::new(),
            lock: RwSpinlock::new(),
            insert_counter: AtomicU32::new(0),
        }
    }
}
