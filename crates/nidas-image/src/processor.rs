// SPDX-License-Identifier: GPL-2.0-or-later

//! Wires the slice decoder and histogram into the pipeline's
//! `process()` contract, grounded on `TwoD_Processing::createSamples`.
//!
//! Raw samples are 4104 bytes: a 2-byte type tag, a 2-byte true-airspeed
//! word, then the 4096-byte image block. Every second
//! boundary the two histograms are emitted as float samples -- `1dcID`
//! sized `n_diodes`, `2dcID` sized `2 * n_diodes` -- and the histograms
//! are cleared for the next second, exactly as `createSamples` does.

use super::config::TwoDConfig;
use super::decoder::ImageDecoder;
use super::histogram::Histogram;
use nidas_core::pipeline::SensorProcessor;
use nidas_core::sample::{SamplePool, SampleRef, SampleType};
use nidas_core::time::{Time, USECS_PER_SEC};
use parking_lot::Mutex;
use std::sync::Arc;

const HEADER_BYTES: usize = 4;

struct State {
    decoder: ImageDecoder,
    hist: Histogram,
    /// End of the current histogram period; `None` until the first
    /// sample primes it (spec: "if `_histoEndTime == 0` ... return").
    histo_end: Option<Time>,
}

/// A 2D optical-array-probe processor: one instance per probe, wired as
/// that probe's [`SensorProcessor`].
pub struct TwoDProcessor {
    pool: Arc<SamplePool>,
    config: TwoDConfig,
    state: Mutex<State>,
}

impl TwoDProcessor {
    pub fn new(pool: Arc<SamplePool>, config: TwoDConfig) -> nidas_core::error::Result<Self> {
        config.validate()?;
        let n_diodes = config.model.n_diodes();
        let hist = Histogram::new(n_diodes, config.area_reject_ratio, config.resolution_micron);
        let decoder = ImageDecoder::new(config.model);
        Ok(TwoDProcessor {
            pool,
            config,
            state: Mutex::new(State {
                decoder,
                hist,
                histo_end: None,
            }),
        })
    }

    fn emit_histograms(&self, state: &mut State, period_start: Time) -> Vec<SampleRef> {
        let mut out = Vec::with_capacity(2);

        if let Some(id) = self.config.id_1d {
            let mut values: Vec<f32> = state.hist.size_dist_1d()[1..]
                .iter()
                .map(|&c| c as f32)
                .collect();
            values.push(0.0);
            values.push(state.hist.dead_time_ms() as f32);

            let mut b = self.pool.allocate(SampleType::Float32, values.len());
            b.set_timetag(period_start);
            b.set_id(id);
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
            b.write_bytes(0, &bytes);
            b.set_len(values.len());
            out.push(b.freeze());
        }

        if let Some(id) = self.config.id_2d {
            let mut values: Vec<f32> = state.hist.size_dist_2d()[1..]
                .iter()
                .map(|&c| c as f32)
                .collect();
            values.push(0.0); // bin 0 is unused, matching the 1D histogram's layout
            values.push(state.hist.dead_time_ms() as f32);

            let mut b = self.pool.allocate(SampleType::Float32, values.len());
            b.set_timetag(period_start);
            b.set_id(id);
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
            b.write_bytes(0, &bytes);
            b.set_len(values.len());
            out.push(b.freeze());
        }

        state.hist.clear();
        out
    }
}

impl SensorProcessor for TwoDProcessor {
    fn process(&self, raw: SampleRef) -> Vec<SampleRef> {
        if raw.data().len() <= HEADER_BYTES {
            return Vec::new();
        }
        let image = &raw.data()[HEADER_BYTES..];
        let tt = raw.timetag();

        let mut state = self.state.lock();

        let histo_end = match state.histo_end {
            None => {
                state.histo_end = Some(tt.ceil_exclusive(USECS_PER_SEC));
                state.decoder.process_block(image, &mut state.hist);
                return Vec::new();
            }
            Some(t) => t,
        };

        if tt < histo_end {
            state.decoder.process_block(image, &mut state.hist);
            return Vec::new();
        }

        let period_start = histo_end - USECS_PER_SEC;
        let out = self.emit_histograms(&mut state, period_start);

        let mut next_end = histo_end + USECS_PER_SEC;
        if next_end <= tt {
            next_end = tt.ceil_exclusive(USECS_PER_SEC);
        }
        state.histo_end = Some(next_end);
        state.decoder.process_block(image, &mut state.hist);

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeModel;
    use nidas_core::sample::{SampleId, SamplePool};

    fn image_sample(pool: &Arc<SamplePool>, tt_usec: i64, image: &[u8]) -> SampleRef {
        let mut full = vec![0u8; HEADER_BYTES];
        full.extend_from_slice(image);
        let mut b = pool.allocate(SampleType::UByte, full.len());
        b.set_timetag(Time::from_usecs(tt_usec));
        b.set_id(SampleId(500));
        b.write_bytes(0, &full);
        b.set_len(full.len());
        b.freeze()
    }

    fn sync64() -> Vec<u8> {
        vec![0xAA, 0xAA, 0x00, 0, 0, 0, 0, 0]
    }

    fn data64(set_bits: &[usize]) -> Vec<u8> {
        let mut bytes = vec![0xFFu8; 8];
        for &bit in set_bits {
            bytes[bit / 8] &= !(1 << (7 - (bit % 8)));
        }
        bytes
    }

    #[test]
    fn first_sample_primes_the_histogram_period_without_emitting() {
        let pool = SamplePool::new();
        let proc = TwoDProcessor::new(
            Arc::clone(&pool),
            TwoDConfig {
                model: ProbeModel::Diodes64,
                resolution_micron: 25,
                area_reject_ratio: 0.1,
                id_1d: Some(SampleId(501)),
                id_2d: Some(SampleId(502)),
            },
        )
        .unwrap();

        let mut image = sync64();
        image.extend(data64(&[5, 6, 7, 8, 9, 10, 11, 12, 13, 14]));
        let s = image_sample(&pool, 0, &image);
        let out = proc.process(s);
        assert!(out.is_empty());
    }

    #[test]
    fn second_boundary_emits_both_histograms() {
        let pool = SamplePool::new();
        let proc = TwoDProcessor::new(
            Arc::clone(&pool),
            TwoDConfig {
                model: ProbeModel::Diodes64,
                resolution_micron: 25,
                area_reject_ratio: 0.1,
                id_1d: Some(SampleId(501)),
                id_2d: Some(SampleId(502)),
            },
        )
        .unwrap();

        let mut image = sync64();
        image.extend(data64(&[5, 6, 7, 8, 9, 10, 11, 12, 13, 14]));
        image.extend(data64(&[5, 6, 7, 8, 9, 10, 11, 12, 13, 14]));
        image.extend(sync64());
        let s1 = image_sample(&pool, 0, &image);
        assert!(proc.process(s1).is_empty());

        let s2 = image_sample(&pool, USECS_PER_SEC + 1, &sync64());
        let out = proc.process(s2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id(), SampleId(501));
        assert_eq!(out[1].id(), SampleId(502));
    }
}
