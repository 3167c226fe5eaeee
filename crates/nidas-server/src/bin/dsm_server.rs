// SPDX-License-Identifier: GPL-2.0-or-later

//! `dsm-server`: accept client connections and fan the processed sample
//! stream read from stdin (archive wire format) out to every connected
//! client.
//!
//! ```bash
//! dsm-record --template '/data/proj/X_%Y%m%d.dat' ... | dsm-server --port 30000
//! ```

use anyhow::Context;
use clap::Parser;
use nidas_server::{AcceptLoop, SampleDistributor, ServerConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dsm-server")]
#[command(author, version, about = "Fan a processed sample stream out to connected clients")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = 30000)]
    port: u16,

    /// Configuration file (JSON format), overriding the other flags.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "")]
    project: String,

    #[arg(long, default_value = "")]
    platform: String,

    #[arg(long, default_value_t = 64)]
    max_clients: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = if let Some(path) = &args.config {
        info!(?path, "loading config");
        ServerConfig::from_file(path)?
    } else {
        ServerConfig {
            bind_address: args.bind.parse().context("invalid bind address")?,
            port: args.port,
            project_name: args.project,
            platform_name: args.platform,
            max_clients: args.max_clients,
            ..Default::default()
        }
    };

    let distributor = Arc::new(SampleDistributor::new(config.client_queue_capacity));
    let accept_loop = AcceptLoop::bind(&config, Arc::clone(&distributor))?;
    info!(addr = %accept_loop.local_addr()?, "dsm-server listening");

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || stop_handler.store(true, Ordering::SeqCst))
        .context("failed to install signal handler")?;

    // Ingest the processed sample stream from stdin and fan it out;
    // this thread is left detached -- there's no clean way to
    // interrupt a blocking stdin read, so it simply dies with the
    // process on shutdown.
    let feed_distributor = Arc::clone(&distributor);
    std::thread::spawn(move || {
        let pool = nidas_core::sample::SamplePool::new();
        let mut stdin = std::io::stdin().lock();
        loop {
            match nidas_archive::format::read_sample(&mut stdin, &pool) {
                Ok(Some(sample)) => feed_distributor.distribute(sample),
                Ok(None) => {
                    info!("stdin closed, no more samples to distribute");
                    break;
                }
                Err(e) => {
                    warn!("error reading sample from stdin: {e}");
                    break;
                }
            }
        }
    });

    accept_loop.run(&stop)?;
    info!("dsm-server stopped");
    Ok(())
}
