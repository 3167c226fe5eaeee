// SPDX-License-Identifier: GPL-2.0-or-later

//! Time-templated rotating archive files and the archive wire format
//! for the NIDAS real-time data acquisition pipeline.
//!
//! ```bash
//! # Record the processed sample stream to a rotating, daily archive
//! dsm-record --template '/data/proj/X_%Y%m%d.dat' --length-secs 86400
//!
//! # Replay a time range back through the sync-record reader
//! dsm-replay --template '/data/proj/X_%Y%m%d.dat' --start 2023-01-01T00:00:00Z --end 2023-01-02T00:00:00Z
//! ```

pub mod fileset;
pub mod format;
pub mod reader;
pub mod writer;

pub use fileset::{FileSetConfig, FileSetWriter};
pub use format::ArchiveHeaderFields;
pub use reader::ArchiveReader;
pub use writer::{ArchiveWriter, ArchiveWriterConfig};
