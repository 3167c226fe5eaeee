// SPDX-License-Identifier: GPL-2.0-or-later

//! Time-ordered sample sorter.
//!
//! One producer thread per sensor calls [`SampleSorter::receive`]; one
//! consumer thread per sorter runs [`SampleSorter::run`], pulling samples
//! once they've aged past the configured window and handing them to a
//! [`SampleSink`]. A single mutex plus two condition variables
//! (`not_empty`, `not_full`) coordinate all producers and the consumer,
//! matching the original's scheduling model.

use crate::sample::SampleRef;
use crate::time::Time;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// How the sorter behaves when its byte budget (`heapMax`) is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Real-time mode: reject the incoming sample and count it.
    Drop,
    /// Replay mode: block the producer until bytes fall below `heapMax / 2`.
    Block,
}

#[derive(Debug, Clone)]
pub struct SorterConfig {
    pub sorter_length_usec: i64,
    pub heap_max: usize,
    pub late_sample_cache_size: usize,
    pub policy: OverflowPolicy,
    /// How far into the future a sample's timetag may be before it's
    /// rejected as bogus (the real-time guard, default 2s).
    pub real_time_future_guard_usec: i64,
}

impl Default for SorterConfig {
    fn default() -> Self {
        SorterConfig {
            sorter_length_usec: crate::time::USECS_PER_SEC,
            heap_max: 10 * 1024 * 1024,
            late_sample_cache_size: 1,
            policy: OverflowPolicy::Drop,
            real_time_future_guard_usec: 2 * crate::time::USECS_PER_SEC,
        }
    }
}

/// Destination for samples that have aged out of the sorter.
pub trait SampleSink: Send + Sync {
    fn distribute(&self, sample: SampleRef);
}

impl<F: Fn(SampleRef) + Send + Sync> SampleSink for F {
    fn distribute(&self, sample: SampleRef) {
        self(sample);
    }
}

#[derive(Default)]
struct Inner {
    // Ordered by (timetag, insertion sequence) so same-timetag samples
    // preserve arrival order; a BTreeMap gives O(log n) insert plus cheap
    // range extraction of everything below a cut time.
    samples: BTreeMap<(Time, u64), SampleRef>,
    bytes: usize,
    last_cut: Time,
    flush_requested: bool,
    flushed: bool,
    interrupted: bool,
}

/// Statistics counters observability hooks read.
#[derive(Debug, Default)]
pub struct SorterStats {
    pub discarded_samples: AtomicU64,
    pub real_time_future_samples: AtomicU64,
    pub bad_earlier_times: AtomicU64,
    pub max_sorter_length_usec: AtomicI64,
}

pub struct SampleSorter {
    config: Mutex<SorterConfig>,
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    flush_cv: Condvar,
    seq: AtomicU64,
    pub stats: SorterStats,
    heap_max: AtomicU64,
    running: AtomicBool,
}

impl SampleSorter {
    pub fn new(config: SorterConfig) -> Arc<Self> {
        let heap_max = config.heap_max as u64;
        Arc::new(SampleSorter {
            config: Mutex::new(config),
            inner: Mutex::new(Inner::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            flush_cv: Condvar::new(),
            seq: AtomicU64::new(0),
            stats: SorterStats::default(),
            heap_max: AtomicU64::new(heap_max),
            running: AtomicBool::new(true),
        })
    }

    /// Submit a sample for ordering. Returns `false` if it was rejected
    /// (dropped for heap pressure or a too-far-future timetag); the
    /// caller owns the sample's reference in that case and must release
    /// it via `free_reference`.
    pub fn receive(&self, sample: SampleRef) -> bool {
        let now = Time::now();
        let guard_usec = self.config.lock().real_time_future_guard_usec;
        if sample.timetag() > now.checked_add_usecs(guard_usec) {
            self.stats.real_time_future_samples.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let slen = sample.byte_length();
        let policy = self.config.lock().policy;
        let mut inner = self.inner.lock();

        match policy {
            OverflowPolicy::Drop => {
                if inner.bytes + slen > self.heap_max.load(Ordering::Relaxed) as usize {
                    self.stats.discarded_samples.fetch_add(1, Ordering::Relaxed);
                    self.not_empty.notify_one();
                    return false;
                }
            }
            OverflowPolicy::Block => {
                while !inner.interrupted
                    && inner.bytes as u64 + slen as u64 > self.heap_max.load(Ordering::Relaxed)
                {
                    self.not_full.wait(&mut inner);
                }
                if inner.interrupted {
                    return false;
                }
            }
        }

        if sample.timetag() < inner.last_cut {
            self.stats.bad_earlier_times.fetch_add(1, Ordering::Relaxed);
        }

        let key = (sample.timetag(), self.seq.fetch_add(1, Ordering::Relaxed));
        inner.bytes += slen;
        inner.samples.insert(key, sample);
        self.not_empty.notify_one();
        true
    }

    /// Request that every buffered sample be delivered immediately,
    /// regardless of how recently it arrived. Blocks until the consumer
    /// thread has drained the sorter.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.flush_requested = true;
        inner.flushed = false;
        self.not_empty.notify_one();
        while !inner.flushed {
            self.flush_cv.wait(&mut inner);
        }
    }

    /// Stop the consumer loop and release any producer blocked on a full
    /// heap. Idempotent.
    pub fn interrupt(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut inner = self.inner.lock();
        inner.interrupted = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.flush_cv.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// The consumer loop: run on its own thread, one per sorter. Pulls
    /// aged samples and hands them to `sink` in timetag order, applying
    /// the late-sample-cache tolerance.
    pub fn run(self: &Arc<Self>, sink: Arc<dyn SampleSink>) {
        loop {
            let extracted = {
                let mut inner = self.inner.lock();
                loop {
                    if inner.interrupted {
                        return;
                    }
                    if inner.flush_requested {
                        break;
                    }
                    if !inner.samples.is_empty() {
                        let late_n = self.config.lock().late_sample_cache_size.max(1);
                        if inner.samples.len() >= late_n {
                            break;
                        }
                    }
                    self.not_empty.wait(&mut inner);
                }

                if inner.interrupted {
                    return;
                }

                let flushing = inner.flush_requested;
                let cut = if flushing {
                    Time::from_usecs(i64::MAX)
                } else {
                    let late_n = self.config.lock().late_sample_cache_size.max(1);
                    let sorter_len = self.config.lock().sorter_length_usec;
                    let t_latest = inner
                        .samples
                        .keys()
                        .rev()
                        .nth(late_n - 1)
                        .map(|(t, _)| *t)
                        .unwrap_or(Time::from_usecs(i64::MIN));
                    t_latest.checked_sub_usecs(sorter_len)
                };

                let tail = inner.samples.split_off(&(cut, 0));
                let extracted = std::mem::replace(&mut inner.samples, tail);
                let extracted_bytes: usize = extracted.values().map(|s| s.byte_length()).sum();

                if extracted.is_empty() {
                    if !flushing
                        && inner.bytes as u64 >= self.heap_max.load(Ordering::Relaxed)
                    {
                        let grown = (self.heap_max.load(Ordering::Relaxed) as f64 * 1.5) as u64;
                        self.heap_max.store(grown, Ordering::Relaxed);
                        log::warn!(
                            "sorter heap exhausted with nothing to age out, growing heapMax to {grown}"
                        );
                    }
                } else {
                    inner.bytes -= extracted_bytes;
                    inner.last_cut = cut;
                    self.not_full.notify_all();
                }

                if flushing {
                    inner.flush_requested = false;
                    inner.flushed = true;
                    self.flush_cv.notify_all();
                }

                extracted
            };

            for (_, sample) in extracted {
                sink.distribute(crate::sample::Sample::hold_reference(&sample));
                crate::sample::Sample::free_reference(sample);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SamplePool, SampleType};
    use std::sync::mpsc;
    use std::thread;

    fn sample(pool: &Arc<SamplePool>, tt: i64) -> SampleRef {
        let mut b = pool.allocate(SampleType::Byte, 1);
        b.set_timetag(Time::from_usecs(tt));
        b.set_len(1);
        b.freeze()
    }

    #[test]
    fn late_cache_reorders_within_tolerance() {
        let pool = SamplePool::new();
        let sorter = SampleSorter::new(SorterConfig {
            sorter_length_usec: 500,
            late_sample_cache_size: 1,
            heap_max: 1 << 20,
            policy: OverflowPolicy::Drop,
            real_time_future_guard_usec: i64::MAX / 2,
        });

        let (tx, rx) = mpsc::channel();
        struct Sink(mpsc::Sender<i64>);
        impl SampleSink for Sink {
            fn distribute(&self, sample: SampleRef) {
                self.0.send(sample.timetag().usecs()).unwrap();
            }
        }
        let sink = Arc::new(Sink(tx));

        for tt in [100, 200, 300, 1100, 250] {
            sorter.receive(sample(&pool, tt));
        }

        let runner = Arc::clone(&sorter);
        let sink2 = Arc::clone(&sink);
        let handle = thread::spawn(move || runner.run(sink2));

        sorter.flush();
        sorter.interrupt();
        handle.join().unwrap();

        let mut got = Vec::new();
        while let Ok(tt) = rx.try_recv() {
            got.push(tt);
        }
        assert_eq!(got, vec![100, 200, 250, 300, 1100]);
        assert_eq!(sorter.stats.bad_earlier_times.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn drop_policy_counts_discards_without_blocking() {
        let pool = SamplePool::new();
        let sorter = SampleSorter::new(SorterConfig {
            sorter_length_usec: 1,
            late_sample_cache_size: 0,
            heap_max: 1, // everything overflows
            policy: OverflowPolicy::Drop,
            real_time_future_guard_usec: i64::MAX / 2,
        });
        let accepted = sorter.receive(sample(&pool, 1));
        assert!(!accepted);
        assert_eq!(sorter.stats.discarded_samples.load(Ordering::Relaxed), 1);
    }
}
