// SPDX-License-Identifier: GPL-2.0-or-later

//! The universal sample object model.
//!
//! A `Sample` is immutable once built, reference-counted, and returned to
//! a type-indexed pool when the last reference drops. `Arc<Sample>` gives
//! us exactly the contract the original hand-rolled refcount did --
//! non-negative atomic count, `holdReference`/`freeReference` as the only
//! ways to share or release -- without re-implementing atomics by hand, so
//! `hold_reference`/`free_reference` below are thin wrappers around
//! `Arc::clone`/`drop`.

mod id;
mod pool;
pub mod tag;

pub use id::SampleId;
pub use pool::{SamplePool, SampleRef};
pub use tag::{CalFile, Converter, NumericKind, SampleTag, Variable};

use crate::time::Time;
use std::fmt;
use std::sync::Arc;

/// Reserved ids used by the sync-record assembly.
pub const SYNC_HEADER_ID: u32 = 0;
pub const SYNC_RECORD_ID: u32 = 1;
/// Reserved id for the archive header sample.
pub const ARCHIVE_HEADER_ID: u32 = 2;

/// Element type of a sample's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    Byte,
    UByte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    Float32,
    Float64,
    Unknown,
}

impl SampleType {
    /// Size in bytes of one payload element. `Unknown`/`Byte` are 1 so raw
    /// byte streams (scanner output before scanf parsing) can still report
    /// a "length" in the same unit as everything else.
    pub fn element_size(self) -> usize {
        match self {
            Self::Byte | Self::UByte | Self::Unknown => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Byte => "byte",
            Self::UByte => "ubyte",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// An immutable, pool-backed sample. Always held behind `Arc` (see
/// [`SampleRef`]); never constructed directly -- go through
/// [`SamplePool::allocate`].
pub struct Sample {
    pub(crate) timetag: Time,
    pub(crate) id: SampleId,
    pub(crate) typ: SampleType,
    pub(crate) len: usize,
    pub(crate) payload: Vec<u8>,
    pub(crate) pool: Arc<SamplePool>,
}

impl Sample {
    pub fn timetag(&self) -> Time {
        self.timetag
    }

    pub fn id(&self) -> SampleId {
        self.id
    }

    pub fn sample_type(&self) -> SampleType {
        self.typ
    }

    /// Payload length, in elements of `sample_type()`.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw payload bytes (`len() * sample_type().element_size()` long).
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.len * self.typ.element_size()]
    }

    pub fn as_f32(&self) -> Vec<f32> {
        chunks_to_vec(self.data(), f32::from_ne_bytes)
    }

    pub fn as_f64(&self) -> Vec<f64> {
        chunks_to_vec(self.data(), f64::from_ne_bytes)
    }

    pub fn as_i32(&self) -> Vec<i32> {
        chunks_to_vec(self.data(), i32::from_ne_bytes)
    }

    pub fn as_u32(&self) -> Vec<u32> {
        chunks_to_vec(self.data(), u32::from_ne_bytes)
    }

    /// Total size counted against a sorter's heap accounting: header plus
    /// payload bytes (the original's `slen`).
    pub fn byte_length(&self) -> usize {
        const HEADER_LEN: usize = 16; // timetag(8) + id(4) + type(2) + len(2), per the archive wire layout
        HEADER_LEN + self.data().len()
    }

    /// Share this sample with another subscriber. Named to match the
    /// original's lifecycle vocabulary; callers must call `free_reference`
    /// (or just drop the returned handle) exactly once for each hold.
    pub fn hold_reference(self: &SampleRef) -> SampleRef {
        Arc::clone(self)
    }

    /// Release a reference obtained from `hold_reference`. Implemented as
    /// a plain drop -- spelled out because `receive()` failure paths in
    /// the sorter must remember that the caller, not the sorter, owns
    /// this release.
    pub fn free_reference(handle: SampleRef) {
        drop(handle);
    }
}

impl Drop for Sample {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.payload);
        self.pool.release(self.typ, buf);
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("timetag", &self.timetag)
            .field("id", &self.id)
            .field("type", &self.typ)
            .field("len", &self.len)
            .finish()
    }
}

fn chunks_to_vec<T, const N: usize>(data: &[u8], from_ne: impl Fn([u8; N]) -> T) -> Vec<T> {
    data.chunks_exact(N)
        .map(|c| {
            let mut a = [0u8; N];
            a.copy_from_slice(c);
            from_ne(a)
        })
        .collect()
}
