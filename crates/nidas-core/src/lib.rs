// SPDX-License-Identifier: GPL-2.0-or-later

//! # nidas-core
//!
//! Real-time sample acquisition, sorting, and archival pipeline for
//! airborne/field data systems.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nidas_core::sample::{SamplePool, SampleType};
//! use nidas_core::sorter::{OverflowPolicy, SorterConfig, SampleSorter};
//!
//! let pool = SamplePool::new();
//! let sorter = SampleSorter::new(SorterConfig {
//!     sorter_length_usec: 1_000_000,
//!     heap_max: 1 << 24,
//!     late_sample_cache_size: 4,
//!     policy: OverflowPolicy::Block,
//!     real_time_future_guard_usec: 2_000_000,
//! });
//! let mut b = pool.allocate(SampleType::Float32, 1);
//! b.set_len(1);
//! sorter.receive(b.freeze());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |  DSMSensor (serial / socket / analog)                        |
//! |    -> MessageScanner (BOM/EOM framing)                       |
//! +--------------------------------------------------------------+
//! |  SensorHandler: one poll loop multiplexing every open sensor  |
//! +--------------------------------------------------------------+
//! |  SamplePipeline: raw SampleSorter -> process() -> processed   |
//! +--------------------------------------------------------------+
//! |  SyncRecordSource | archive write/read | network distribution |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Modules
//!
//! - [`sample`] - the `Sample` object model, ids, tags, cal files, and the pool
//! - [`scanner`] - message framing (BOM/EOM separator state machines)
//! - [`sorter`] - time-ordered multiset with overflow and late-sample handling
//! - [`handler`] - the multiplexed event loop owning every open sensor
//! - [`pipeline`] - the two-stage raw/processed sorter chain
//! - [`sensor`] - the `DSMSensor` capability trait and a scanner-backed impl
//! - [`processors`] - example `process()` rules (sonic despiker, WXT derived wind)
//! - [`sync`] - one-second sync record assembly, its header format, and its reader
//! - [`io`] - socket/stream transports used by remote sensors and distribution
//! - [`time`] - the microsecond timetag type shared by every other module
//! - [`error`] - the crate's error type
//! - [`logging`] - compile-time configurable logging macros

pub mod error;
pub mod handler;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod processors;
pub mod sample;
pub mod scanner;
pub mod sensor;
pub mod sorter;
pub mod sync;
pub mod time;

pub use error::{NidasError, Result};
pub use sample::{Sample, SampleId, SamplePool, SampleRef, SampleTag, SampleType};
pub use time::Time;

/// nidas-core version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
