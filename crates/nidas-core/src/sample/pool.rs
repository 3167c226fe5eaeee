// SPDX-License-Identifier: GPL-2.0-or-later

//! Type-indexed sample pool.
//!
//! Free lists are keyed by `(SampleType, capacity bucket)`, capacity
//! bucket being the allocation rounded up to a power of two. Each thread
//! keeps its own free list for the common case of a sensor thread
//! repeatedly allocating and releasing same-sized samples; a pool-wide,
//! mutex-protected list is the fallback for cross-thread releases (a
//! sample built on a sensor thread and released by the sorter thread
//! after `distribute`) -- lock-free per-thread free-lists with a
//! global fallback.

use super::{Sample, SampleId, SampleType};
use crate::time::Time;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

pub type SampleRef = Arc<Sample>;

const MIN_BUCKET: usize = 16;
/// Per-thread free-list entries kept per bucket before spilling to the
/// global pool, bounding per-thread memory when one thread allocates in
/// bursts and never frees.
const THREAD_LOCAL_CAP: usize = 64;

type Bucket = (SampleType, usize);

thread_local! {
    static LOCAL: RefCell<HashMap<Bucket, Vec<Vec<u8>>>> = RefCell::new(HashMap::new());
}

fn next_pow2(n: usize) -> usize {
    n.max(MIN_BUCKET).next_power_of_two()
}

/// Shared pool of reusable payload buffers.
///
/// Cheap to construct; typically one per process, handed to every
/// `DSMSensor` and pipeline stage as an `Arc<SamplePool>`.
#[derive(Default)]
pub struct SamplePool {
    global: Mutex<HashMap<Bucket, Vec<Vec<u8>>>>,
}

impl SamplePool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            global: Mutex::new(HashMap::new()),
        })
    }

    /// Allocate a builder for a sample of the given type and payload
    /// length (in elements). The backing buffer comes from the free list
    /// for this bucket if one is available, otherwise freshly allocated.
    pub fn allocate(self: &Arc<Self>, typ: SampleType, len: usize) -> SampleBuilder {
        let cap_bytes = next_pow2(len * typ.element_size().max(1));
        let bucket = (typ, cap_bytes);

        let mut buf = LOCAL.with(|local| local.borrow_mut().get_mut(&bucket).and_then(Vec::pop));
        if buf.is_none() {
            buf = self.global.lock().get_mut(&bucket).and_then(Vec::pop);
        }
        let mut buf = buf.unwrap_or_else(|| Vec::with_capacity(cap_bytes));
        buf.resize(cap_bytes, 0);

        SampleBuilder {
            pool: Arc::clone(self),
            timetag: Time::ZERO,
            id: SampleId(0),
            typ,
            len,
            payload: buf,
        }
    }

    /// Return a released buffer to this pool's free lists; capacity
    /// returns to its pre-allocation bucket size.
    pub(crate) fn release(&self, typ: SampleType, buf: Vec<u8>) {
        if buf.is_empty() {
            return; // already taken (e.g. sample constructed outside the pool in tests)
        }
        let bucket = (typ, buf.capacity());
        let spilled = LOCAL.with(|local| {
            let mut local = local.borrow_mut();
            let entry = local.entry(bucket).or_default();
            if entry.len() < THREAD_LOCAL_CAP {
                entry.push(buf);
                None
            } else {
                Some(buf)
            }
        });
        if let Some(buf) = spilled {
            self.global.lock().entry(bucket).or_default().push(buf);
        }
    }

    /// Number of free buffers currently held for a bucket, summed across
    /// the calling thread's local list and the global fallback. Used by
    /// tests verifying property 1 (ref-count safety) and by the
    /// `calcStatistics` style counters.
    #[cfg(test)]
    pub(crate) fn free_count(&self, typ: SampleType, len: usize) -> usize {
        let bucket = (typ, next_pow2(len * typ.element_size().max(1)));
        let local = LOCAL.with(|local| local.borrow().get(&bucket).map_or(0, Vec::len));
        let global = self.global.lock().get(&bucket).map_or(0, Vec::len);
        local + global
    }
}

/// Exclusive handle to an in-progress sample. The producer fills the
/// payload through this type; once `freeze()`d it becomes an immutable,
/// shared [`SampleRef`].
pub struct SampleBuilder {
    pool: Arc<SamplePool>,
    timetag: Time,
    id: SampleId,
    typ: SampleType,
    len: usize,
    payload: Vec<u8>,
}

impl SampleBuilder {
    pub fn set_timetag(&mut self, t: Time) -> &mut Self {
        self.timetag = t;
        self
    }

    pub fn set_id(&mut self, id: SampleId) -> &mut Self {
        self.id = id;
        self
    }

    /// Payload bytes available to write into, sized to the bucket
    /// capacity (may be larger than `len() * element_size()`).
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    pub fn capacity(&self) -> usize {
        self.payload.capacity()
    }

    /// Set the logical payload length, in elements. Must not exceed the
    /// capacity this builder was allocated with.
    pub fn set_len(&mut self, len: usize) -> &mut Self {
        debug_assert!(len * self.typ.element_size() <= self.payload.capacity());
        self.len = len;
        self
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> &mut Self {
        self.payload[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Grow the backing buffer in place, e.g. for the message scanner's
    /// 1.5x overflow policy. Existing bytes are preserved.
    pub fn grow_to(&mut self, new_cap: usize) {
        let new_cap = next_pow2(new_cap);
        if new_cap > self.payload.capacity() {
            self.payload.resize(new_cap, 0);
        }
    }

    pub fn freeze(self) -> SampleRef {
        Arc::new(Sample {
            timetag: self.timetag,
            id: self.id,
            typ: self.typ,
            len: self.len,
            payload: self.payload,
            pool: self.pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        let pool = SamplePool::new();
        let b = pool.allocate(SampleType::Byte, 100);
        assert_eq!(b.capacity(), 128);
    }

    #[test]
    fn released_buffer_returns_to_pool_free_count() {
        let pool = SamplePool::new();
        assert_eq!(pool.free_count(SampleType::Float64, 4), 0);
        let mut b = pool.allocate(SampleType::Float64, 4);
        b.set_len(4);
        let s = b.freeze();
        assert_eq!(pool.free_count(SampleType::Float64, 4), 0);
        drop(s);
        assert_eq!(pool.free_count(SampleType::Float64, 4), 1);
    }

    #[test]
    fn reused_buffer_comes_from_free_list() {
        let pool = SamplePool::new();
        let b1 = pool.allocate(SampleType::Int32, 8);
        let ptr1 = b1.payload.as_ptr();
        drop(b1.freeze());
        let b2 = pool.allocate(SampleType::Int32, 8);
        assert_eq!(b2.payload.as_ptr(), ptr1);
    }

    #[test]
    fn reference_count_round_trip_returns_capacity() {
        let pool = SamplePool::new();
        let mut b = pool.allocate(SampleType::UByte, 10);
        b.set_len(10);
        let s = b.freeze();
        let s2 = Sample::hold_reference(&s);
        assert_eq!(Arc::strong_count(&s), 2);
        Sample::free_reference(s2);
        assert_eq!(Arc::strong_count(&s), 1);
        assert_eq!(pool.free_count(SampleType::UByte, 10), 0);
        drop(s);
        assert_eq!(pool.free_count(SampleType::UByte, 10), 1);
    }
}
