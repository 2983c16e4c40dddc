//! Fast open addressing.
//!
//! Elements live in groups of 15 slots. Each group carries one metadata
//! byte per slot (empty, sentinel, or a 7-bit fragment of the element's
//! hash with the top bit set) plus an overflow byte, a small bitmap over
//! `hash % 8` recording whether an insertion was ever displaced past the
//! group. Lookup matches the fragment against all 15 bytes at once and
//! only touches elements on a match; a clear overflow bit proves the probe
//! sequence can stop early on a miss.

cfg_if::cfg_if! {
    // One 128-bit compare covers a whole group's metadata, so the SSE2
    // intrinsics are picked whenever the target guarantees them (Miri
    // cannot interpret vendor intrinsics and takes the portable path).
    // Wider vectors would not pay for themselves: a group is exactly one
    // probe step, and most probes stop at the first.
    if #[cfg(all(
        target_feature = "sse2",
        any(target_arch = "x86", target_arch = "x86_64"),
        not(miri)
    ))] {
        mod sse2;
        use sse2 as imp;
    } else {
        use swar as imp;
    }
}

pub(crate) mod bitmask;
pub(crate) mod group;
// Always compiled: the concurrent variant matches over atomic word
// snapshots and reuses the word-at-a-time helpers regardless of SSE2.
pub(crate) mod swar;
pub(crate) mod table;

pub mod map;
pub mod node_map;
pub mod node_set;
pub mod set;

pub use map::Map;
pub use node_map::NodeMap;
pub use node_set::NodeSet;
pub use set::Set;
