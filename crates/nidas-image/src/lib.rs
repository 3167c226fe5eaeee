// SPDX-License-Identifier: GPL-2.0-or-later

//! # nidas-image
//!
//! 2D optical-array-probe image decoder: slice-by-slice
//! particle reconstruction, accept/reject tests, and per-second
//! size-distribution histograms.
//!
//! ## Modules
//!
//! - [`particle`] - the per-particle accumulator and its accept/reject tests
//! - [`decoder`] - the sync/overload-word scan that folds raw image bytes into particles
//! - [`histogram`] - per-second size-distribution histograms and observability counters
//! - [`config`] - probe model (32/64 diode) and per-probe configuration
//! - [`processor`] - wires the above into the pipeline's `process()` contract

pub mod config;
pub mod decoder;
pub mod histogram;
pub mod particle;
pub mod processor;

pub use config::{ProbeModel, TwoDConfig};
pub use decoder::ImageDecoder;
pub use histogram::Histogram;
pub use particle::Particle;
pub use processor::TwoDProcessor;
