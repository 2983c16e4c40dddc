//! Versioned byte-level container serialization.
//!
//! The stream is a `u32` format version, a `u64` element count, then each
//! value in iteration order. Reading rebuilds the container through
//! ordinary insertion into an empty instance, so a round trip reproduces
//! membership for any pair of containers with equal hashing and equality,
//! regardless of their internal layout at write time.

use std::hash::{BuildHasher, Hash};

use bytes::{Buf, BufMut};

use crate::fca::{MultiMap, MultiSet};
use crate::foa::{Map, NodeMap, NodeSet, Set};
use crate::{Error, Result};

/// Version tag leading every serialized container.
pub const FORMAT_VERSION: u32 = 1;

/// A value that can write itself into and restore itself from a byte
/// stream.
pub trait Persist: Sized {
    fn persist_into(&self, buf: &mut impl BufMut);
    fn restore_from(buf: &mut impl Buf) -> Result<Self>;
}

macro_rules! persist_fixed {
    ($ty:ty, $put:ident, $get:ident) => {
        impl Persist for $ty {
            #[inline]
            fn persist_into(&self, buf: &mut impl BufMut) {
                buf.$put(*self);
            }

            #[inline]
            fn restore_from(buf: &mut impl Buf) -> Result<Self> {
                if buf.remaining() < std::mem::size_of::<$ty>() {
                    return Err(Error::Truncated);
                }
                Ok(buf.$get())
            }
        }
    };
}

persist_fixed!(u8, put_u8, get_u8);
persist_fixed!(u16, put_u16_le, get_u16_le);
persist_fixed!(u32, put_u32_le, get_u32_le);
persist_fixed!(u64, put_u64_le, get_u64_le);
persist_fixed!(i8, put_i8, get_i8);
persist_fixed!(i16, put_i16_le, get_i16_le);
persist_fixed!(i32, put_i32_le, get_i32_le);
persist_fixed!(i64, put_i64_le, get_i64_le);
persist_fixed!(f32, put_f32_le, get_f32_le);
persist_fixed!(f64, put_f64_le, get_f64_le);

impl Persist for bool {
    #[inline]
    fn persist_into(&self, buf: &mut impl BufMut) {
        buf.put_u8(*self as u8);
    }

    #[inline]
    fn restore_from(buf: &mut impl Buf) -> Result<Self> {
        Ok(u8::restore_from(buf)? != 0)
    }
}

impl Persist for Vec<u8> {
    fn persist_into(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.len() as u64);
        buf.put_slice(self);
    }

    fn restore_from(buf: &mut impl Buf) -> Result<Self> {
        let len = u64::restore_from(buf)?;
        let len: usize = len.try_into().map_err(|_| Error::LengthOverflow(len))?;
        if buf.remaining() < len {
            return Err(Error::Truncated);
        }
        let mut bytes = vec![0u8; len];
        buf.copy_to_slice(&mut bytes);
        Ok(bytes)
    }
}

impl Persist for String {
    fn persist_into(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.len() as u64);
        buf.put_slice(self.as_bytes());
    }

    fn restore_from(buf: &mut impl Buf) -> Result<Self> {
        let bytes = Vec::<u8>::restore_from(buf)?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }
}

fn write_header(buf: &mut impl BufMut, len: usize) {
    buf.put_u32_le(FORMAT_VERSION);
    buf.put_u64_le(len as u64);
}

fn read_header(buf: &mut impl Buf) -> Result<u64> {
    let version = u32::restore_from(buf)?;
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    u64::restore_from(buf)
}

impl<K, V, S> Map<K, V, S>
where
    K: Persist + Eq + Hash,
    V: Persist,
    S: BuildHasher,
{
    /// Writes the map as (version, size, entries in iteration order).
    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        write_header(buf, self.len());
        for (k, v) in self.iter() {
            k.persist_into(buf);
            v.persist_into(buf);
        }
    }

    /// Rebuilds a map serialized by [`Map::serialize_into`].
    pub fn deserialize_from(buf: &mut impl Buf) -> Result<Self>
    where
        S: Default,
    {
        let count = read_header(buf)?;
        let mut map = Map::with_hasher(S::default());
        for _ in 0..count {
            let k = K::restore_from(buf)?;
            let v = V::restore_from(buf)?;
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<T, S> Set<T, S>
where
    T: Persist + Eq + Hash,
    S: BuildHasher,
{
    /// Writes the set as (version, size, values in iteration order).
    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        write_header(buf, self.len());
        for v in self.iter() {
            v.persist_into(buf);
        }
    }

    pub fn deserialize_from(buf: &mut impl Buf) -> Result<Self>
    where
        S: Default,
    {
        let count = read_header(buf)?;
        let mut set = Set::with_hasher(S::default());
        for _ in 0..count {
            set.insert(T::restore_from(buf)?);
        }
        Ok(set)
    }
}

impl<K, V, S> NodeMap<K, V, S>
where
    K: Persist + Eq + Hash,
    V: Persist,
    S: BuildHasher,
{
    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        write_header(buf, self.len());
        for (k, v) in self.iter() {
            k.persist_into(buf);
            v.persist_into(buf);
        }
    }

    pub fn deserialize_from(buf: &mut impl Buf) -> Result<Self>
    where
        S: Default,
    {
        let count = read_header(buf)?;
        let mut map = NodeMap::with_hasher(S::default());
        for _ in 0..count {
            let k = K::restore_from(buf)?;
            let v = V::restore_from(buf)?;
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<T, S> NodeSet<T, S>
where
    T: Persist + Eq + Hash,
    S: BuildHasher,
{
    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        write_header(buf, self.len());
        for v in self.iter() {
            v.persist_into(buf);
        }
    }

    pub fn deserialize_from(buf: &mut impl Buf) -> Result<Self>
    where
        S: Default,
    {
        let count = read_header(buf)?;
        let mut set = NodeSet::with_hasher(S::default());
        for _ in 0..count {
            set.insert(T::restore_from(buf)?);
        }
        Ok(set)
    }
}

impl<K, V, S> MultiMap<K, V, S>
where
    K: Persist + Eq + Hash,
    V: Persist,
    S: BuildHasher,
{
    /// Writes all entries, duplicates included, in iteration order.
    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        write_header(buf, self.len());
        for (k, v) in self.iter() {
            k.persist_into(buf);
            v.persist_into(buf);
        }
    }

    pub fn deserialize_from(buf: &mut impl Buf) -> Result<Self>
    where
        S: Default,
    {
        let count = read_header(buf)?;
        let mut map = MultiMap::with_hasher(S::default());
        for _ in 0..count {
            let k = K::restore_from(buf)?;
            let v = V::restore_from(buf)?;
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<T, S> MultiSet<T, S>
where
    T: Persist + Eq + Hash,
    S: BuildHasher,
{
    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        write_header(buf, self.len());
        for v in self.iter() {
            v.persist_into(buf);
        }
    }

    pub fn deserialize_from(buf: &mut impl Buf) -> Result<Self>
    where
        S: Default,
    {
        let count = read_header(buf)?;
        let mut set = MultiSet::with_hasher(S::default());
        for _ in 0..count {
            set.insert(T::restore_from(buf)?);
        }
        Ok(set)
    }
}
