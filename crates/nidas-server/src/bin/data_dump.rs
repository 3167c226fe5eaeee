// SPDX-License-Identifier: GPL-2.0-or-later

//! `data_dump`: print samples out of an archive File Set, optionally
//! filtered to one DSM/id pair.
//!
//! Only the subset of the original's mode flags that make sense without
//! a live XML configuration are implemented: `-A` (dump every sample as
//! timetag/id/length) and `-H` (list the distinct ids seen, with a
//! sample count each). The others (`-F` filtered-format, `-L` labelled,
//! `-S` stats-only, `-I` id-table-from-config, `-n` dry-run) all need a
//! parsed sensor catalog this crate deliberately does not own -- XML
//! configuration parsing is an external collaborator, not this crate's job.
//!
//! ```bash
//! data_dump -i 1,200 -A --template '/data/proj/X_%Y%m%d.dat' --start 2023-01-01T00:00:00Z --end 2023-01-02T00:00:00Z
//! ```

use anyhow::Context;
use clap::{Parser, ValueEnum};
use nidas_archive::{ArchiveReader, FileSetConfig};
use nidas_core::sample::{SampleId, SamplePool};
use nidas_core::time::Time;
use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    /// Dump every sample.
    All,
    /// Histogram of ids seen, with a per-id sample count.
    Histogram,
}

#[derive(Parser, Debug)]
#[command(name = "data_dump")]
#[command(author, version, about = "Dump samples out of a NIDAS archive File Set")]
struct Args {
    /// strftime-style archive path template, e.g. `/data/proj/X_%Y%m%d.dat`.
    #[arg(long)]
    template: String,

    /// RFC 3339 start time.
    #[arg(long)]
    start: String,

    /// RFC 3339 end time.
    #[arg(long)]
    end: String,

    /// `dsm,id` or `dsm,id,sensor` filter; unfiltered if omitted.
    #[arg(short = 'i', long)]
    ids: Option<String>,

    #[arg(value_enum, default_value_t = Mode::All)]
    mode: Mode,
}

struct IdFilter {
    dsm: u16,
    short_id: Option<u16>,
}

impl IdFilter {
    fn parse(s: &str) -> anyhow::Result<Self> {
        let mut parts = s.split(',');
        let dsm: u16 = parts
            .next()
            .context("missing dsm in -i filter")?
            .parse()
            .context("dsm is not a number")?;
        let short_id = match parts.next() {
            Some(id) => Some(id.parse().context("id is not a number")?),
            None => None,
        };
        Ok(IdFilter { dsm, short_id })
    }

    fn matches(&self, id: SampleId) -> bool {
        id.dsm() == self.dsm && self.short_id.map_or(true, |s| id.short_id() == s)
    }
}

fn parse_rfc3339(s: &str) -> anyhow::Result<Time> {
    let dt = chrono::DateTime::parse_from_rfc3339(s).context("invalid RFC 3339 timestamp")?;
    Ok(Time::from_usecs(dt.timestamp_micros()))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let start = parse_rfc3339(&args.start)?;
    let end = parse_rfc3339(&args.end)?;
    let filter = args.ids.as_deref().map(IdFilter::parse).transpose()?;

    let config = FileSetConfig {
        template: args.template,
        file_length_usec: 86_400_000_000,
    };
    let pool = SamplePool::new();
    let reader = ArchiveReader::open(&config, pool, start, end)?;

    match args.mode {
        Mode::All => {
            for sample in reader {
                let sample = sample?;
                if filter.as_ref().is_some_and(|f| !f.matches(sample.id())) {
                    continue;
                }
                println!(
                    "{} {} {} len={}",
                    sample.timetag(),
                    sample.id(),
                    sample.sample_type(),
                    sample.len()
                );
            }
        }
        Mode::Histogram => {
            let mut counts: BTreeMap<u32, u64> = BTreeMap::new();
            for sample in reader {
                let sample = sample?;
                if filter.as_ref().is_some_and(|f| !f.matches(sample.id())) {
                    continue;
                }
                *counts.entry(sample.id().raw()).or_default() += 1;
            }
            for (id, count) in counts {
                println!("{} {}", SampleId(id), count);
            }
        }
    }
    Ok(())
}
