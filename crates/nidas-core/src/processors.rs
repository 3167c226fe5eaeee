// SPDX-License-Identifier: GPL-2.0-or-later

//! Example `process()` rules: a sonic wind processor and a WXT weather
//! station's derived-variable processor, grounded on
//! `ATIK_Sonic.cc`/`WxtSensor.cc`.
//!
//! Two of the original's behaviors are left exactly as undefined as
//! the original itself leaves them: shadow-flow correction is a
//! documented no-op, and a WXT whose speed and direction arrive in
//! separate samples only emits U/V once both are known and neither has
//! gone stale past `pair_timeout`.

use crate::pipeline::SensorProcessor;
use crate::sample::{SampleId, SamplePool, SamplePool as Pool, SampleRef, SampleType};
use crate::time::Time;
use parking_lot::Mutex;
use std::sync::Arc;

/// Rejects a sample whose horizontal wind magnitude jumped by more than
/// `threshold` since the last accepted sample, replacing it with the
/// prior value instead of passing the spike through (despiking).
/// Shadow-flow correction is left a documented no-op: the raw u/v/w
/// pass through unmodified otherwise.
pub struct SonicProcessor {
    pool: Arc<SamplePool>,
    out_id: SampleId,
    threshold: f64,
    last: Mutex<Option<[f64; 3]>>,
}

impl SonicProcessor {
    pub fn new(pool: Arc<SamplePool>, out_id: SampleId, threshold: f64) -> Self {
        SonicProcessor {
            pool,
            out_id,
            threshold,
            last: Mutex::new(None),
        }
    }

    fn emit(&self, tt: Time, uvw: [f64; 3]) -> SampleRef {
        let mut b = self.pool.allocate(SampleType::Float64, 3);
        b.set_timetag(tt);
        b.set_id(self.out_id);
        let bytes: Vec<u8> = uvw.iter().flat_map(|v| v.to_ne_bytes()).collect();
        b.write_bytes(0, &bytes);
        b.set_len(3);
        b.freeze()
    }
}

impl SensorProcessor for SonicProcessor {
    fn process(&self, raw: SampleRef) -> Vec<SampleRef> {
        let data = raw.as_f64();
        if data.len() < 3 {
            return Vec::new();
        }
        let uvw = [data[0], data[1], data[2]];
        let mut last = self.last.lock();

        let accepted = match *last {
            None => uvw,
            Some(prev) => {
                let mag_now = (uvw[0] * uvw[0] + uvw[1] * uvw[1]).sqrt();
                let mag_prev = (prev[0] * prev[0] + prev[1] * prev[1]).sqrt();
                if (mag_now - mag_prev).abs() > self.threshold {
                    prev
                } else {
                    uvw
                }
            }
        };
        *last = Some(accepted);
        vec![self.emit(raw.timetag(), accepted)]
    }
}

/// Derives U/V wind components from a WXT-style weather station that
/// may report speed and direction in separate samples -- the original
/// leaves this case undefined; `speed_id`/`dir_id` identify which incoming sample
/// carries which scalar; a sample carrying both (length 2, `[speed,
/// dir]`) on either id is treated as a complete pair. `pair_timeout`
/// bounds how long a lone component is carried forward before the pair
/// is considered stale and no U/V sample is emitted.
pub struct WxtProcessor {
    pool: Arc<Pool>,
    speed_id: SampleId,
    dir_id: SampleId,
    out_id: SampleId,
    pair_timeout_usec: i64,
    state: Mutex<WxtState>,
}

#[derive(Default)]
struct WxtState {
    speed: Option<(f64, Time)>,
    dir: Option<(f64, Time)>,
}

impl WxtProcessor {
    pub fn new(
        pool: Arc<Pool>,
        speed_id: SampleId,
        dir_id: SampleId,
        out_id: SampleId,
        pair_timeout_usec: i64,
    ) -> Self {
        WxtProcessor {
            pool,
            speed_id,
            dir_id,
            out_id,
            pair_timeout_usec,
            state: Mutex::new(WxtState::default()),
        }
    }

    fn derive_uv(speed: f64, dir_deg: f64) -> (f64, f64) {
        let rad = dir_deg.to_radians();
        // Meteorological convention: direction is where the wind comes
        // FROM, so U/V point the opposite way.
        let u = -speed * rad.sin();
        let v = -speed * rad.cos();
        (u, v)
    }

    fn emit(&self, tt: Time, u: f64, v: f64) -> SampleRef {
        let mut b = self.pool.allocate(SampleType::Float64, 2);
        b.set_timetag(tt);
        b.set_id(self.out_id);
        let bytes: Vec<u8> = [u, v].iter().flat_map(|x| x.to_ne_bytes()).collect();
        b.write_bytes(0, &bytes);
        b.set_len(2);
        b.freeze()
    }
}

impl SensorProcessor for WxtProcessor {
    fn process(&self, raw: SampleRef) -> Vec<SampleRef> {
        let data = raw.as_f64();
        let tt = raw.timetag();
        let mut state = self.state.lock();

        if data.len() >= 2 && (raw.id() == self.speed_id || raw.id() == self.dir_id) {
            let (u, v) = Self::derive_uv(data[0], data[1]);
            return vec![self.emit(tt, u, v)];
        }

        if raw.id() == self.speed_id && !data.is_empty() {
            state.speed = Some((data[0], tt));
        } else if raw.id() == self.dir_id && !data.is_empty() {
            state.dir = Some((data[0], tt));
        } else {
            return Vec::new();
        }

        let fresh = |pair: Option<(f64, Time)>| {
            pair.filter(|(_, t)| (tt - *t).abs() <= self.pair_timeout_usec)
        };
        match (fresh(state.speed), fresh(state.dir)) {
            (Some((speed, _)), Some((dir, _))) => {
                let (u, v) = Self::derive_uv(speed, dir);
                vec![self.emit(tt, u, v)]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SamplePool;

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
    fn sonic_despike_replaces_large_jump_with_prior_value() {
        let pool = SamplePool::new();
        let proc = SonicProcessor::new(Arc::clone(&pool), SampleId(900), 5.0);
        let s1 = f64_sample(&pool, 1, 0, &[1.0, 0.0, 0.0]);
        let out1 = proc.process(s1);
        assert_eq!(out1[0].as_f64(), vec![1.0, 0.0, 0.0]);

        let spike = f64_sample(&pool, 1, 1000, &[100.0, 0.0, 0.0]);
        let out2 = proc.process(spike);
        assert_eq!(out2[0].as_f64(), vec![1.0, 0.0, 0.0]); // spike rejected, prior kept
    }

    #[test]
    fn wxt_emits_uv_only_once_both_components_known() {
        let pool = SamplePool::new();
        let proc = WxtProcessor::new(
            Arc::clone(&pool),
            SampleId(10),
            SampleId(11),
            SampleId(900),
            1_000_000,
        );
        let speed_only = f64_sample(&pool, 10, 0, &[5.0]);
        assert!(proc.process(speed_only).is_empty());

        let dir_only = f64_sample(&pool, 11, 100, &[180.0]);
        let out = proc.process(dir_only);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn wxt_drops_pair_after_timeout() {
        let pool = SamplePool::new();
        let proc = WxtProcessor::new(
            Arc::clone(&pool),
            SampleId(10),
            SampleId(11),
            SampleId(900),
            1000,
        );
        proc.process(f64_sample(&pool, 10, 0, &[5.0]));
        let out = proc.process(f64_sample(&pool, 11, 10_000, &[180.0]));
        assert!(out.is_empty());
    }
}
