// SPDX-License-Identifier: GPL-2.0-or-later

//! `dsm-replay`: read a time range back out of a File Set and print
//! each sample's timetag and id. A minimal
//! stand-in for a full resampling replay tool.
//!
//! ```bash
//! dsm-replay --template '/data/proj/X_%Y%m%d.dat' --start 2023-01-01T00:00:00Z --end 2023-01-02T00:00:00Z
//! ```

use anyhow::Context;
use clap::Parser;
use nidas_archive::{ArchiveReader, FileSetConfig};
use nidas_core::sample::SamplePool;
use nidas_core::time::Time;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dsm-replay")]
#[command(author, version, about = "Replay samples out of a rotating archive File Set")]
struct Args {
    #[arg(long)]
    template: String,

    /// RFC 3339 start time, e.g. `2023-01-01T00:00:00Z`.
    #[arg(long)]
    start: String,

    /// RFC 3339 end time.
    #[arg(long)]
    end: String,
}

fn parse_rfc3339(s: &str) -> anyhow::Result<Time> {
    let dt = chrono::DateTime::parse_from_rfc3339(s).context("invalid RFC 3339 timestamp")?;
    Ok(Time::from_usecs(dt.timestamp_micros()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let start = parse_rfc3339(&args.start)?;
    let end = parse_rfc3339(&args.end)?;

    let config = FileSetConfig {
        template: args.template,
        file_length_usec: 86_400_000_000,
    };
    let pool = SamplePool::new();
    let reader = ArchiveReader::open(&config, pool, start, end)?;

    let mut count = 0u64;
    for sample in reader {
        let sample = sample?;
        println!("{} id={} len={}", sample.timetag(), sample.id(), sample.len());
        count += 1;
    }
    info!(count, "replay complete");
    Ok(())
}
