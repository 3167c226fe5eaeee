// SPDX-License-Identifier: GPL-2.0-or-later

//! Per-second size-distribution histograms and observability counters,
//! grounded on `TwoD_Processing`'s `_size_dist_{1,2}D`/`_rejected*_Cntr`/
//! `_overLoadSliceCount`/`_misAligned`/`_suspectSlices` fields.

use super::particle::Particle;

/// Accumulates one second's worth of particle statistics for a single
/// probe. Reset by [`Histogram::clear`] after each second's samples are
/// built, matching `TwoD_Processing`'s "createSamples"/"clearData".
#[derive(Debug)]
pub struct Histogram {
    n_diodes: usize,
    area_reject_ratio: f32,
    resolution_micron: u32,

    size_dist_1d: Vec<u32>,
    size_dist_2d: Vec<u32>,

    pub total_records: u64,
    pub total_particles: u64,
    pub rejected_1d: u64,
    pub rejected_2d: u64,
    pub overload_slice_count: u64,
    pub oversize_2d: u64,
    pub misaligned: u64,
    pub suspect_slices: u64,
    pub total_pixels_shadowed: u64,
    dead_time_ms: f64,
}

impl Histogram {
    pub fn new(n_diodes: usize, area_reject_ratio: f32, resolution_micron: u32) -> Self {
        Histogram {
            n_diodes,
            area_reject_ratio,
            resolution_micron,
            size_dist_1d: vec![0; n_diodes],
            size_dist_2d: vec![0; n_diodes * 2],
            total_records: 0,
            total_particles: 0,
            rejected_1d: 0,
            rejected_2d: 0,
            overload_slice_count: 0,
            oversize_2d: 0,
            misaligned: 0,
            suspect_slices: 0,
            total_pixels_shadowed: 0,
            dead_time_ms: 0.0,
        }
    }

    pub fn size_dist_1d(&self) -> &[u32] {
        &self.size_dist_1d
    }

    pub fn size_dist_2d(&self) -> &[u32] {
        &self.size_dist_2d
    }

    pub fn note_record(&mut self) {
        self.total_records += 1;
    }

    pub fn note_overload_slice(&mut self) {
        self.overload_slice_count += 1;
    }

    pub fn note_suspect_slice(&mut self) {
        self.suspect_slices += 1;
    }

    pub fn note_misaligned(&mut self) {
        self.misaligned += 1;
    }

    /// Apply the accept/reject tests to a completed particle and fold
    /// it into both histograms.
    pub fn count_particle(&mut self, p: &Particle) {
        self.total_particles += 1;

        if p.accept_1d(self.area_reject_ratio) {
            let h = (p.height as usize).min(self.size_dist_1d.len() - 1);
            self.size_dist_1d[h] += 1;
            self.total_pixels_shadowed += u64::from(p.area);
        } else {
            self.rejected_1d += 1;
        }

        if p.accept_2d(self.area_reject_ratio) {
            let n = p.width.max(p.height) as usize;
            if n < self.size_dist_2d.len() {
                self.size_dist_2d[n] += 1;
            } else {
                self.oversize_2d += 1;
            }
        } else {
            self.rejected_2d += 1;
        }
    }

    /// Dead time this second, in milliseconds. Probe-specific clocking
    /// logic (not present in the base class this decoder is grounded
    /// on) is responsible for incrementing it; it stays zero here.
    pub fn dead_time_ms(&self) -> f64 {
        self.dead_time_ms
    }

    /// Total area shadowed this second, scaled by diode area
    /// (`resolution_micron^2`), matching the original's optional third
    /// 1D-histogram extra value.
    pub fn area_shadowed_mm2(&self) -> f64 {
        self.total_pixels_shadowed as f64 * (1.0e-3 * f64::from(self.resolution_micron)).powi(2)
    }

    /// Reset histograms and per-second counters; lifetime counters
    /// (`total_records`, `total_particles`, ...) are *not* reset here --
    /// call [`Histogram::clear_period_only`] if only the histogram
    /// arrays (not the observability counters) should roll over.
    pub fn clear(&mut self) {
        self.size_dist_1d.iter_mut().for_each(|c| *c = 0);
        self.size_dist_2d.iter_mut().for_each(|c| *c = 0);
        self.total_pixels_shadowed = 0;
        self.dead_time_ms = 0.0;
    }

    pub fn n_diodes(&self) -> usize {
        self.n_diodes
    }
}
