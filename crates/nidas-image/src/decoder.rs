// SPDX-License-Identifier: GPL-2.0-or-later

//! Slice-by-slice scan of one probe's raw image data into particles,
//! grounded on `TwoD_Processing::processParticleSlice` plus the
//! sync/overload word detection in `extract2d.cc`'s
//! `countParticles`/`computeDiodeCount`.
//!
//! A particle can span multiple 4096-byte image blocks, so the decoder
//! is long-lived per probe: [`ImageDecoder::process_block`] is called
//! once per incoming raw sample and folds completed particles into the
//! caller's [`Histogram`]; an in-progress particle survives the call
//! and is finished by a later block's sync word.

use super::config::ProbeModel;
use super::histogram::Histogram;
use super::particle::Particle;

/// Bit mask for the depth-of-field reject flag, read from the third
/// byte of a 64-diode sync word (`TwoD_Processing::Particle::dofReject`,
/// "last bit of sync word"). 32-diode probes have no DOF flag bit in
/// their single-byte sync word; it is always treated as accepted.
const DOF_REJECT_MASK: u8 = 0x01;

pub struct ImageDecoder {
    model: ProbeModel,
    /// Bytes left over at the end of the last block because they were
    /// shorter than one slice (`TwoD_Processing::saveBuffer`/
    /// `setupBuffer`'s mis-aligned-data carry).
    leftover: Vec<u8>,
    current: Particle,
    in_particle: bool,
}

impl ImageDecoder {
    pub fn new(model: ProbeModel) -> Self {
        ImageDecoder {
            model,
            leftover: Vec::new(),
            current: Particle::new(),
            in_particle: false,
        }
    }

    /// Process one image block's worth of raw bytes (the sample payload
    /// after stripping the type-tag/TAS-word header), folding completed
    /// particles into `hist`.
    pub fn process_block(&mut self, data: &[u8], hist: &mut Histogram) {
        hist.note_record();

        let slice_len = self.model.bytes_per_slice();
        let mut buf;
        let data = if self.leftover.is_empty() {
            data
        } else {
            buf = std::mem::take(&mut self.leftover);
            buf.extend_from_slice(data);
            buf.as_slice()
        };

        let mut offset = 0;
        while offset + slice_len <= data.len() {
            let slice = &data[offset..offset + slice_len];
            offset += slice_len;

            if self.model.is_overload_word(slice) {
                self.finish_particle(hist);
                hist.note_overload_slice();
                continue;
            }
            if self.model.is_sync_word(slice) {
                self.finish_particle(hist);
                self.current.dof_reject = matches!(self.model, ProbeModel::Diodes64)
                    && slice.len() > 2
                    && slice[2] & DOF_REJECT_MASK != 0;
                self.in_particle = true;
                continue;
            }
            if self.in_particle {
                self.current.process_slice(slice);
            } else {
                // Data before the first sync word of the stream: the
                // probe is mid-particle from before we started
                // listening, or the stream is misaligned.
                hist.note_suspect_slice();
            }
        }

        if offset < data.len() {
            self.leftover = data[offset..].to_vec();
            hist.note_misaligned();
        }
    }

    fn finish_particle(&mut self, hist: &mut Histogram) {
        if self.in_particle && self.current.width > 0 {
            hist.count_particle(&self.current);
        }
        self.current.reset();
        self.in_particle = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync64(dof: bool) -> Vec<u8> {
        vec![0xAA, 0xAA, if dof { 0x01 } else { 0x00 }, 0, 0, 0, 0, 0]
    }

    fn data_slice64(set_bits: &[usize]) -> Vec<u8> {
        let mut bytes = vec![0xFFu8; 8];
        for &bit in set_bits {
            bytes[bit / 8] &= !(1 << (7 - (bit % 8)));
        }
        bytes
    }

    #[test]
    fn particle_across_two_blocks_completes_on_next_sync_word() {
        let mut dec = ImageDecoder::new(ProbeModel::Diodes64);
        let mut hist = Histogram::new(64, 0.1, 25);

        let mut block1 = sync64(false);
        block1.extend(data_slice64(&[5, 6, 7, 8, 9, 10, 11, 12, 13, 14]));
        dec.process_block(&block1, &mut hist);
        assert_eq!(hist.total_particles, 0); // still in progress

        let mut block2 = data_slice64(&[5, 6, 7, 8, 9, 10, 11, 12, 13, 14]);
        block2.extend(data_slice64(&[5, 6, 7, 8, 9, 10, 11, 12, 13, 14]));
        block2.extend(sync64(false)); // closes the particle: 3 data slices total
        dec.process_block(&block2, &mut hist);

        assert_eq!(hist.total_particles, 1);
        assert_eq!(hist.size_dist_1d()[10], 1);
        assert_eq!(hist.size_dist_2d()[10], 1);
    }

    #[test]
    fn dof_reject_flag_in_sync_word_marks_particle_rejected() {
        let mut dec = ImageDecoder::new(ProbeModel::Diodes64);
        let mut hist = Histogram::new(64, 0.1, 25);

        let mut block = sync64(true);
        block.extend(data_slice64(&[0, 63]));
        block.extend(sync64(false));
        dec.process_block(&block, &mut hist);

        assert_eq!(hist.total_particles, 1);
        assert_eq!(hist.rejected_1d, 1);
        assert_eq!(hist.rejected_2d, 1);
        assert_eq!(hist.size_dist_1d().iter().sum::<u32>(), 0);
    }

    #[test]
    fn overload_word_ends_particle_without_counting_it_as_data() {
        let mut dec = ImageDecoder::new(ProbeModel::Diodes64);
        let mut hist = Histogram::new(64, 0.1, 25);

        let mut block = sync64(false);
        block.extend(data_slice64(&[5, 6, 7, 8, 9, 10, 11, 12, 13, 14]));
        block.extend(vec![0x55, 0x55, 0xAA, 0, 0, 0, 0, 0]); // overload
        dec.process_block(&block, &mut hist);

        assert_eq!(hist.overload_slice_count, 1);
        assert_eq!(hist.total_particles, 1);
    }

    #[test]
    fn mis_aligned_trailing_bytes_carry_to_next_block() {
        let mut dec = ImageDecoder::new(ProbeModel::Diodes64);
        let mut hist = Histogram::new(64, 0.1, 25);

        let mut block = sync64(false);
        block.extend(vec![1, 2, 3]); // 3 stray bytes, shorter than one slice
        dec.process_block(&block, &mut hist);
        assert_eq!(hist.misaligned, 1);
        assert_eq!(dec.leftover.len(), 3);
    }
}
