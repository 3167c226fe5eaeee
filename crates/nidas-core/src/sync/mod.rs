// SPDX-License-Identifier: GPL-2.0-or-later

//! One-second-wide sync-record assembly and reader.
//!
//! [`SyncRecordSource`] builds a dense, self-describing matrix of every
//! processed sample in one second; [`SyncRecordReader`] parses the
//! header it emits and inverts the matrix back into per-variable,
//! per-second vectors.

mod header;
mod reader;

pub use header::{HeaderTag, HeaderVariable};
pub use reader::{SyncRecordReader, VariableSlot};

use crate::sample::{SampleId, SamplePool, SampleRef, SampleTag, SampleType, SYNC_RECORD_ID};
use crate::time::{Time, USECS_PER_SEC};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-tag layout computed at connect time.
#[derive(Debug, Clone)]
struct TagLayout {
    /// Offset, in f64 slots, of this tag's row within the record.
    offset: usize,
    /// `1 + ceil(rate) * data_width`.
    stride: usize,
    rate: f64,
    data_width: usize,
    usec_per_sample: i64,
    /// Set the first time this tag is seen within the current second.
    offset_usec: Option<i64>,
}

/// Observability counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStats {
    pub unknown_sample_type: u64,
    pub unrecognized_samples: u64,
    pub bad_earlier_times: u64,
    pub bad_later_times: u64,
}

/// Builds one-second-wide sync records from a stream of processed
/// samples.
pub struct SyncRecordSource {
    pool: Arc<SamplePool>,
    layouts: HashMap<u32, TagLayout>,
    record_len: usize,
    sync_time: Option<Time>,
    record: Vec<f64>,
    pub stats: SyncStats,
}

impl SyncRecordSource {
    /// Connect the given tags, allocating one row per tag in id order.
    pub fn connect(pool: Arc<SamplePool>, tags: &[SampleTag]) -> Self {
        let mut layouts = HashMap::new();
        let mut offset = 0usize;
        for tag in tags {
            let data_width = tag.data_width().max(1);
            let slots = tag.rate.ceil().max(1.0) as usize;
            let stride = 1 + slots * data_width;
            let usec_per_sample = (USECS_PER_SEC as f64 / tag.rate.max(1e-9)) as i64;
            layouts.insert(
                tag.id.raw(),
                TagLayout {
                    offset,
                    stride,
                    rate: tag.rate,
                    data_width,
                    usec_per_sample,
                    offset_usec: None,
                },
            );
            offset += stride;
        }
        let record_len = offset;
        SyncRecordSource {
            pool,
            layouts,
            record_len,
            sync_time: None,
            record: vec![f64::NAN; record_len],
            stats: SyncStats::default(),
        }
    }

    /// Feed one processed sample; returns a completed sync record
    /// sample whenever a new second begins.
    pub fn receive(&mut self, sample: &SampleRef) -> Option<SampleRef> {
        let tt = sample.timetag();
        let mut emitted = None;

        let sync_time = match self.sync_time {
            None => {
                self.sync_time = Some(tt.floor(USECS_PER_SEC));
                self.sync_time.unwrap()
            }
            Some(t) => t,
        };

        if tt.usecs() >= (sync_time + USECS_PER_SEC).usecs() {
            emitted = Some(self.emit_record(sync_time));
            let jumped = tt - sync_time > 2 * USECS_PER_SEC;
            self.sync_time = Some(if jumped {
                tt.floor(USECS_PER_SEC)
            } else {
                sync_time + USECS_PER_SEC
            });
            self.record = vec![f64::NAN; self.record_len];
            for layout in self.layouts.values_mut() {
                layout.offset_usec = None;
            }
        }
        let sync_time = self.sync_time.unwrap();

        let id = sample.id().raw();
        let Some(layout) = self.layouts.get_mut(&id) else {
            self.stats.unrecognized_samples += 1;
            return emitted;
        };
        if matches!(sample.sample_type(), SampleType::Unknown) {
            self.stats.unknown_sample_type += 1;
            return emitted;
        }

        if tt < sync_time {
            self.stats.bad_earlier_times += 1;
            return emitted;
        }
        if tt.usecs() >= (sync_time + 2 * USECS_PER_SEC).usecs() {
            self.stats.bad_later_times += 1;
            return emitted;
        }

        let var_offset_usec = *layout.offset_usec.get_or_insert((tt - sync_time).max(0));
        let max_slot = (layout.stride - 1) / layout.data_width.max(1);
        let time_index = if layout.usec_per_sample > 0 {
            let raw = (tt - sync_time - var_offset_usec) as f64 / layout.usec_per_sample as f64
                + 0.5;
            (raw as i64).clamp(0, max_slot.saturating_sub(1) as i64) as usize
        } else {
            0
        };

        let data = sample.as_f64();
        let base = layout.offset;
        self.record[base] = var_offset_usec as f64;
        let cell0 = base + 1 + layout.data_width * time_index;
        for (i, v) in data.iter().take(layout.data_width).enumerate() {
            self.record[cell0 + i] = *v;
        }

        emitted
    }

    fn emit_record(&self, sync_time: Time) -> SampleRef {
        let mut b = self.pool.allocate(SampleType::Float64, self.record_len);
        b.set_timetag(sync_time);
        b.set_id(SampleId(SYNC_RECORD_ID));
        let bytes: Vec<u8> = self.record.iter().flat_map(|v| v.to_ne_bytes()).collect();
        b.write_bytes(0, &bytes);
        b.set_len(self.record_len);
        b.freeze()
    }

    /// Force emission of the in-progress record (e.g. at stream end).
    pub fn flush(&mut self) -> Option<SampleRef> {
        self.sync_time.map(|t| self.emit_record(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{NumericKind, Variable};

    fn tag(id: u32, rate: f64, n_vars: usize) -> SampleTag {
        let mut t = SampleTag::new(SampleId(id), rate);
        for i in 0..n_vars {
            t.variables.push(Variable {
                name: format!("v{i}"),
                long_name: String::new(),
                units: String::new(),
                length: 1,
                kind: NumericKind::Continuous,
                converter: None,
            });
        }
        t
    }

    fn f64_sample(pool: &Arc<SamplePool>, id: u32, tt: i64, values: &[f64]) -> SampleRef {
        let mut b = pool.allocate(SampleType::Float64, values.len());
        b.set_timetag(Time::from_usecs(tt));
        b.set_id(SampleId(id));
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        b.write_bytes(0, &bytes);
        b.set_len(values.len());
        b.freeze()
    }

    #[test]
    fn sync_record_emitted_on_second_boundary_with_two_tags() {
        let pool = SamplePool::new();
        let tag_a = tag(100, 10.0, 1);
        let tag_b = tag(200, 1.0, 2);
        let mut src = SyncRecordSource::connect(Arc::clone(&pool), &[tag_a, tag_b]);

        for i in 0..10 {
            src.receive(&f64_sample(&pool, 100, i * 100_000, &[i as f64]));
        }
        let rec = src
            .receive(&f64_sample(&pool, 200, 0, &[42.0, 43.0]))
            .or_else(|| {
                // push into next second to force emission
                src.receive(&f64_sample(&pool, 100, 1_000_000, &[99.0]))
            })
            .unwrap();

        let vals = rec.as_f64();
        // Tag A offset 0: [offset_usec, 0..9]
        assert_eq!(&vals[1..11], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        // Tag B row starts right after A's 11-slot row.
        assert_eq!(&vals[12..14], &[42.0, 43.0]);
    }
}
