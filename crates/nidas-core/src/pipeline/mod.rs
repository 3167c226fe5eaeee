// SPDX-License-Identifier: GPL-2.0-or-later

//! Two-stage sorter chain wiring raw sensor output through per-sensor
//! `process()` into a processed-sample stream.
//!
//! ```text
//! Sensor -> RawSorter -> process() -> ProcessedSorter -> clients
//! ```
//!
//! Both stages are independently configured (`sorterLength`, `heapMax`,
//! late-cache size); flush is two-phase, processed stage first, then raw.

use crate::sample::SampleRef;
use crate::sorter::{SampleSink, SampleSorter, SorterConfig};
use std::sync::Arc;

/// Converts one sensor's raw samples into zero or more processed
/// samples (`DSMSensor.process`). Implementors own any
/// per-sensor state a conversion needs (e.g. a wind despiker's last
/// value).
pub trait SensorProcessor: Send + Sync {
    fn process(&self, raw: SampleRef) -> Vec<SampleRef>;
}

impl<F: Fn(SampleRef) -> Vec<SampleRef> + Send + Sync> SensorProcessor for F {
    fn process(&self, raw: SampleRef) -> Vec<SampleRef> {
        self(raw)
    }
}

/// Routes aged-out raw samples to the sensor's `process()` and feeds the
/// result into the processed sorter. One instance per registered sensor.
struct RawToProcessed {
    processor: Arc<dyn SensorProcessor>,
    processed: Arc<SampleSorter>,
}

impl SampleSink for RawToProcessed {
    fn distribute(&self, sample: SampleRef) {
        for out in self.processor.process(sample) {
            if !self.processed.receive(out) {
                log::warn!("processed sorter rejected a sample from process()");
            }
        }
    }
}

/// The full pipeline: one raw sorter, one processed sorter, and the
/// per-sensor processors wired between them.
pub struct SamplePipeline {
    pub raw: Arc<SampleSorter>,
    pub processed: Arc<SampleSorter>,
}

impl SamplePipeline {
    pub fn new(raw_config: SorterConfig, processed_config: SorterConfig) -> Self {
        SamplePipeline {
            raw: SampleSorter::new(raw_config),
            processed: SampleSorter::new(processed_config),
        }
    }

    /// Start the raw sorter's consumer thread, routing every sample that
    /// ages out through `processor` into the processed sorter. Returns
    /// the thread handle; callers typically detach it and rely on
    /// `interrupt`/`flush` for lifecycle control.
    pub fn spawn_raw_consumer(
        &self,
        processor: Arc<dyn SensorProcessor>,
    ) -> std::thread::JoinHandle<()> {
        let raw = Arc::clone(&self.raw);
        let sink = Arc::new(RawToProcessed {
            processor,
            processed: Arc::clone(&self.processed),
        });
        std::thread::spawn(move || raw.run(sink))
    }

    /// Start the processed sorter's consumer thread, handing aged
    /// samples to `sink` (an archive writer, sync-record builder, or
    /// network sender).
    pub fn spawn_processed_consumer(
        &self,
        sink: Arc<dyn SampleSink>,
    ) -> std::thread::JoinHandle<()> {
        let processed = Arc::clone(&self.processed);
        std::thread::spawn(move || processed.run(sink))
    }

    /// Flush both stages: processed first, then raw.
    pub fn flush(&self) {
        self.processed.flush();
        self.raw.flush();
    }

    pub fn interrupt(&self) {
        self.raw.interrupt();
        self.processed.interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SamplePool, SampleType};
    use crate::sorter::OverflowPolicy;
    use crate::time::Time;
    use std::sync::mpsc;

    #[test]
    fn raw_samples_flow_through_process_into_processed_stage() {
        let pool = SamplePool::new();
        let cfg = SorterConfig {
            sorter_length_usec: 1,
            heap_max: 1 << 20,
            late_sample_cache_size: 0,
            policy: OverflowPolicy::Drop,
            real_time_future_guard_usec: i64::MAX / 2,
        };
        let pipeline = SamplePipeline::new(cfg.clone(), cfg);

        let (tx, rx) = mpsc::channel();
        struct Sink(mpsc::Sender<i32>);
        impl SampleSink for Sink {
            fn distribute(&self, sample: SampleRef) {
                self.0.send(sample.as_i32()[0]).unwrap();
            }
        }

        let doubling = Arc::new(move |raw: SampleRef| -> Vec<SampleRef> {
            let v = raw.as_i32()[0] * 2;
            let pool = SamplePool::new();
            let mut b = pool.allocate(SampleType::Int32, 1);
            b.set_timetag(raw.timetag());
            b.write_bytes(0, &v.to_ne_bytes());
            b.set_len(1);
            vec![b.freeze()]
        });

        let _raw_thread = pipeline.spawn_raw_consumer(doubling);
        let _proc_thread = pipeline.spawn_processed_consumer(Arc::new(Sink(tx)));

        let mut b = pool.allocate(SampleType::Int32, 1);
        b.set_timetag(Time::from_usecs(100));
        b.write_bytes(0, &21i32.to_ne_bytes());
        b.set_len(1);
        pipeline.raw.receive(b.freeze());

        pipeline.flush();
        pipeline.interrupt();

        assert_eq!(rx.recv().unwrap(), 42);
    }
}
