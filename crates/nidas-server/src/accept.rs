// SPDX-License-Identifier: GPL-2.0-or-later

//! Connection-accept loop and per-connection worker threads, one
//! thread per accepted socket.
//!
//! The loop itself never touches a client socket directly: each
//! accepted connection is handed to its own worker thread, which
//! registers with the [`SampleDistributor`], streams the processed
//! sample stream out in archive wire format, and unregisters on
//! disconnect. A single slow or wedged client can only ever stall its
//! own worker thread.

use crate::config::ServerConfig;
use crate::distributor::SampleDistributor;
use nidas_archive::format::{self, ArchiveHeaderFields};
use nidas_core::error::{NidasError, Result};
use nidas_core::time::Time;
use std::io::{BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct AcceptLoop {
    listener: TcpListener,
    distributor: Arc<SampleDistributor>,
    header: ArchiveHeaderFields,
    max_clients: usize,
}

impl AcceptLoop {
    pub fn bind(config: &ServerConfig, distributor: Arc<SampleDistributor>) -> Result<Self> {
        config.validate()?;
        let addr = SocketAddr::new(config.bind_address, config.port);
        let listener = TcpListener::bind(addr).map_err(NidasError::Io)?;
        listener.set_nonblocking(true).map_err(NidasError::Io)?;
        Ok(AcceptLoop {
            listener,
            distributor,
            header: ArchiveHeaderFields {
                archive_version: format::ARCHIVE_FORMAT_VERSION,
                software_version: env!("CARGO_PKG_VERSION").to_string(),
                project_name: config.project_name.clone(),
                platform_name: config.platform_name.clone(),
                config_path: String::new(),
            },
            max_clients: config.max_clients,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(NidasError::Io)
    }

    /// Accept connections until `stop` is set. Returns once the listener
    /// has been told to shut down; worker threads it spawned are
    /// detached and finish on their own as clients disconnect.
    pub fn run(&self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.distributor.client_count() >= self.max_clients {
                        log::warn!("rejecting {peer}: max_clients reached");
                        continue;
                    }
                    log::info!("client connected: {peer}");
                    let distributor = Arc::clone(&self.distributor);
                    let header = self.header.clone();
                    std::thread::spawn(move || serve_client(stream, peer, distributor, header));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => return Err(NidasError::Io(e)),
            }
        }
        Ok(())
    }
}

fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    distributor: Arc<SampleDistributor>,
    header: ArchiveHeaderFields,
) {
    let (id, rx) = distributor.register();
    if let Err(e) = stream_to_client(stream, &rx, &header) {
        log::warn!("client {peer} disconnected: {e}");
    }
    distributor.unregister(id);
    log::info!("client {peer} removed ({} remaining)", distributor.client_count());
}

fn stream_to_client(
    stream: TcpStream,
    rx: &std::sync::mpsc::Receiver<nidas_core::sample::SampleRef>,
    header: &ArchiveHeaderFields,
) -> Result<()> {
    let pool = nidas_core::sample::SamplePool::new();
    let mut w = BufWriter::new(stream);
    let header_sample = format::build_header_sample(&pool, header, Time::now());
    format::write_sample(&mut w, &header_sample)?;
    w.flush().map_err(NidasError::Io)?;

    while let Ok(sample) = rx.recv() {
        format::write_sample(&mut w, &sample)?;
        w.flush().map_err(NidasError::Io)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nidas_core::sample::{SamplePool, SampleType};
    use std::net::TcpStream as ClientStream;

    #[test]
    fn client_receives_header_then_distributed_samples() {
        let config = ServerConfig {
            bind_address: "127.0.0.1".parse().unwrap(),
            port: 0,
            ..Default::default()
        };
        let distributor = Arc::new(SampleDistributor::new(4));
        let accept_loop = AcceptLoop::bind(&config, Arc::clone(&distributor)).unwrap();
        let addr = accept_loop.local_addr().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let handle = std::thread::spawn(move || accept_loop.run(&stop2));

        let mut client = ClientStream::connect(addr).unwrap();
        // wait for this client to register before publishing
        while distributor.client_count() == 0 {
            std::thread::sleep(Duration::from_millis(10));
        }

        let pool = SamplePool::new();
        let mut b = pool.allocate(SampleType::Int32, 1);
        b.set_timetag(Time::from_usecs(1));
        b.write_bytes(0, &42i32.to_ne_bytes());
        b.set_len(1);
        distributor.distribute(b.freeze());

        let pool2 = SamplePool::new();
        let header = format::read_sample(&mut client, &pool2).unwrap().unwrap();
        assert_eq!(
            header.id().raw(),
            nidas_core::sample::ARCHIVE_HEADER_ID
        );
        let sample = format::read_sample(&mut client, &pool2).unwrap().unwrap();
        assert_eq!(sample.as_i32(), vec![42]);

        stop.store(true, Ordering::Relaxed);
        drop(client);
        let _ = handle.join();
    }
}
