// SPDX-License-Identifier: GPL-2.0-or-later

//! `dsm-record`: write a fixed-rate synthetic sample stream into a
//! time-templated File Set, standing in for a running DSM's processed
//! sample sink.
//!
//! ```bash
//! dsm-record --template '/data/proj/X_%Y%m%d.dat' --project ISFS --platform N1
//! ```

use anyhow::Context;
use clap::Parser;
use nidas_archive::{ArchiveHeaderFields, ArchiveWriter, ArchiveWriterConfig, FileSetConfig};
use nidas_core::sample::{SampleId, SamplePool, SampleType};
use nidas_core::time::Time;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dsm-record")]
#[command(author, version, about = "Record a sample stream into a rotating archive File Set")]
struct Args {
    /// strftime-style path template, e.g. `/data/proj/X_%Y%m%d.dat`.
    #[arg(long)]
    template: String,

    /// Rotation boundary in seconds (default one day).
    #[arg(long, default_value_t = 86_400)]
    length_secs: i64,

    #[arg(long, default_value = "")]
    project: String,

    #[arg(long, default_value = "")]
    platform: String,

    #[arg(long, default_value = "")]
    config_path: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let writer = ArchiveWriter::new(ArchiveWriterConfig {
        file_set: FileSetConfig {
            template: args.template.clone(),
            file_length_usec: args.length_secs * 1_000_000,
        },
        header: ArchiveHeaderFields {
            archive_version: nidas_archive::format::ARCHIVE_FORMAT_VERSION,
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            project_name: args.project,
            platform_name: args.platform,
            config_path: args.config_path,
        },
    })
    .context("failed to construct archive writer")?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || stop_handler.store(true, Ordering::SeqCst))
        .context("failed to install signal handler")?;

    info!(template = %args.template, "recording started");
    let pool = SamplePool::new();
    let mut seq: u32 = 0;
    while !stop.load(Ordering::SeqCst) {
        let mut b = pool.allocate(SampleType::Float64, 1);
        b.set_timetag(Time::now());
        b.set_id(SampleId::new(0, 0, 1));
        b.write_bytes(0, &(seq as f64).to_ne_bytes());
        b.set_len(1);
        writer.write_sample(&b.freeze())?;
        seq = seq.wrapping_add(1);
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
    writer.flush()?;
    info!("recording stopped");
    Ok(())
}
