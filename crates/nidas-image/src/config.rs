// SPDX-License-Identifier: GPL-2.0-or-later

//! Probe configuration: diode count, sync/overload words, and the
//! area-reject ratio used by the acceptance tests.

use nidas_core::error::{NidasError, Result};
use nidas_core::sample::SampleId;

/// Number of diodes in the probe's photodiode array. Traditional 2D
/// probes have 32, the Fast2DC variant this decoder targets has 64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeModel {
    Diodes32,
    Diodes64,
}

impl ProbeModel {
    pub fn n_diodes(self) -> usize {
        match self {
            ProbeModel::Diodes32 => 32,
            ProbeModel::Diodes64 => 64,
        }
    }

    pub fn bytes_per_slice(self) -> usize {
        self.n_diodes() / 8
    }

    /// Raw slice bytes the probe uses to mark the start of a new
    /// particle. 64-diode probes sync on `0xAA 0xAA 0xAA`; 32-diode
    /// probes sync on a single `0x55` byte.
    fn sync_word(self) -> &'static [u8] {
        match self {
            ProbeModel::Diodes64 => &[0xAA, 0xAA, 0xAA],
            ProbeModel::Diodes32 => &[0x55],
        }
    }

    /// Raw bytes marking a probe overload slice (electronics saturated
    /// mid-particle): `0x55 0x55 0xAA` on both probe models.
    fn overload_word(self) -> &'static [u8] {
        &[0x55, 0x55, 0xAA]
    }

    pub(crate) fn is_sync_word(self, slice: &[u8]) -> bool {
        let w = self.sync_word();
        slice.len() >= w.len() && &slice[..w.len()] == w
    }

    pub(crate) fn is_overload_word(self, slice: &[u8]) -> bool {
        let w = self.overload_word();
        slice.len() >= w.len() && &slice[..w.len()] == w
    }
}

/// Configuration for one 2D probe's decoder/histogram pipeline stage.
#[derive(Debug, Clone)]
pub struct TwoDConfig {
    pub model: ProbeModel,
    /// Probe resolution in micrometers (diode diameter); used for the
    /// area-shadowed-per-second derived value.
    pub resolution_micron: u32,
    /// Minimum area/bounding-box ratio a particle must exceed to be
    /// accepted (matches `TwoD_Processing`'s `areaRejectRatio`).
    pub area_reject_ratio: f32,
    /// Output id for the 1D (entire-in) histogram sample. `None`
    /// suppresses that output, matching the original's `_1dcID != 0` gate.
    pub id_1d: Option<SampleId>,
    /// Output id for the 2D (centre-in) histogram sample.
    pub id_2d: Option<SampleId>,
}

impl TwoDConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id_1d.is_none() && self.id_2d.is_none() {
            return Err(NidasError::InvalidParameter(
                "2D probe config must enable at least one histogram output".into(),
            ));
        }
        if self.area_reject_ratio < 0.0 {
            return Err(NidasError::InvalidParameter(
                "areaRejectRatio must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
