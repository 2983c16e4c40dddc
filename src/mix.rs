//! Post-mixing for hash values.
//!
//! Open addressing derives both the group index and the in-group fragment
//! from the hash, so it needs every bit of the output to be close to
//! uniform. Strong hashers (SipHash and friends) already are; cheap
//! multiply hashers such as Fx are not, and get a final avalanche here.
//! The choice is made at the type level: wrap a weak `BuildHasher` in
//! [`Mix`], or use it bare when its output is already avalanched.

use std::hash::{BuildHasher, Hash, Hasher};

/// Final avalanche applied after a weak hasher.
pub trait MixPolicy {
    fn mix(hash: u64) -> u64;
}

/// xor-multiply-xor avalanche.
pub struct XmxMix;

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        impl MixPolicy for XmxMix {
            #[inline]
            fn mix(hash: u64) -> u64 {
                let mut z = hash;
                z ^= z >> 23;
                z = z.wrapping_mul(0xff51_afd7_ed55_8ccd);
                z ^= z >> 23;
                z
            }
        }
    } else {
        impl MixPolicy for XmxMix {
            #[inline]
            fn mix(hash: u64) -> u64 {
                // 32-bit targets produce usize-wide hashes; mix in that width.
                let mut x = hash as u32;
                x ^= x >> 18;
                x = x.wrapping_mul(0x56b5_aaad);
                x ^= x >> 16;
                x as u64
            }
        }
    }
}

/// Identity pass-through for hashers that already avalanche.
pub struct NoMix;

impl MixPolicy for NoMix {
    #[inline]
    fn mix(hash: u64) -> u64 {
        hash
    }
}

/// `BuildHasher` adaptor that post-mixes the wrapped hasher's output.
#[derive(Clone, Default)]
pub struct Mix<S>(S);

impl<S> Mix<S> {
    #[inline]
    pub fn new(inner: S) -> Self {
        Mix(inner)
    }
}

impl<S: BuildHasher> BuildHasher for Mix<S> {
    type Hasher = MixHasher<S::Hasher>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        MixHasher(self.0.build_hasher())
    }
}

pub struct MixHasher<H>(H);

impl<H: Hasher> Hasher for MixHasher<H> {
    #[inline]
    fn finish(&self) -> u64 {
        XmxMix::mix(self.0.finish())
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.0.write(bytes)
    }

    #[inline]
    fn write_u8(&mut self, i: u8) {
        self.0.write_u8(i)
    }

    #[inline]
    fn write_u32(&mut self, i: u32) {
        self.0.write_u32(i)
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.0.write_u64(i)
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        self.0.write_usize(i)
    }
}

// Fx is fast but distributes poorly in its low and high bits, which is
// exactly what the mixer is for. Most keys tend to be small, so Fx + mix
// still beats SipHash by a wide margin.
pub type DefaultHashBuilder = Mix<fxhash::FxBuildHasher>;

#[inline]
pub(crate) fn make_hash<K: Hash + ?Sized>(hash_builder: &impl BuildHasher, val: &K) -> u64 {
    let mut state = hash_builder.build_hasher();
    val.hash(&mut state);
    state.finish()
}
