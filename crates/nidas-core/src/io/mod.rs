// SPDX-License-Identifier: GPL-2.0-or-later

//! Socket / IO channel transports.
//!
//! TCP, Unix-domain, UDP, and multicast are first-class. The connect
//! side of a client channel never blocks the requester: [`connect_background`]
//! spawns a dedicated, self-joining thread that retries with the
//! back-off schedule below and reports success/failure through a
//! callback, the way the teacher's transport layer keeps connection
//! setup off its I/O thread.

use crate::error::{NidasError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

/// Back-off applied by the background connector between attempts:
/// 30s after an unknown-host failure, 10s after anything else.
const RETRY_AFTER_UNKNOWN_HOST: Duration = Duration::from_secs(30);
const RETRY_AFTER_OTHER: Duration = Duration::from_secs(10);

/// A byte-stream transport, uniform across TCP/Unix-domain connections.
pub trait IoChannel: Read + Write + Send {
    fn close(&mut self) -> io::Result<()>;
    fn peer_description(&self) -> String;
}

impl IoChannel for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(std::net::Shutdown::Both)
    }
    fn peer_description(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<tcp>".into())
    }
}

impl IoChannel for UnixStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(std::net::Shutdown::Both)
    }
    fn peer_description(&self) -> String {
        "<unix-domain>".into()
    }
}

/// One attempt's outcome, classifying how long to wait before retrying.
enum AttemptError {
    UnknownHost,
    Other,
}

fn classify(e: &io::Error) -> AttemptError {
    match e.kind() {
        io::ErrorKind::AddrNotAvailable => AttemptError::UnknownHost,
        _ => AttemptError::Other,
    }
}

/// Connect to `addr` in the background, retrying indefinitely with the
/// back-off schedule above until `on_connect` is called with the
/// established stream, or `should_stop` reports true. Returns the
/// spawned thread's handle; the thread self-joins (detaches) once it
/// either connects or is told to stop.
pub fn connect_background<F>(
    addr: SocketAddr,
    should_stop: impl Fn() -> bool + Send + 'static,
    on_connect: F,
) -> thread::JoinHandle<()>
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    thread::spawn(move || {
        let mut on_connect = Some(on_connect);
        while !should_stop() {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    if let Some(cb) = on_connect.take() {
                        cb(stream);
                    }
                    return;
                }
                Err(e) => {
                    let wait = match classify(&e) {
                        AttemptError::UnknownHost => RETRY_AFTER_UNKNOWN_HOST,
                        AttemptError::Other => RETRY_AFTER_OTHER,
                    };
                    log::warn!("background connect to {addr} failed ({e}), retrying in {wait:?}");
                    thread::sleep(wait);
                }
            }
        }
    })
}

/// Retryable connect errors worth surfacing to a caller that wants to
/// observe outcomes synchronously (used by tests and by callers that
/// don't need the background thread).
pub fn classify_io_error(e: &io::Error) -> NidasError {
    match classify(e) {
        AttemptError::UnknownHost => NidasError::UnknownHost(e.to_string()),
        AttemptError::Other => NidasError::Io(io::Error::new(e.kind(), e.to_string())),
    }
}

/// Bind a UDP socket and join it to a multicast group. `iface`
/// selects the local interface to join on; `0.0.0.0` lets the OS pick.
pub fn join_multicast(group: std::net::Ipv4Addr, port: u16, iface: std::net::Ipv4Addr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(NidasError::Io)?;
    socket.set_reuse_address(true).map_err(NidasError::Io)?;
    let bind_addr: SocketAddr = (std::net::Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&bind_addr.into()).map_err(NidasError::Io)?;
    socket
        .join_multicast_v4(&group, &iface)
        .map_err(NidasError::Io)?;
    Ok(socket.into())
}

/// Open a plain (non-multicast) UDP socket bound to `bind_addr`.
pub fn udp_socket(bind_addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(bind_addr).map_err(NidasError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn background_connect_succeeds_once_listener_is_up() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(Mutex::new(None));
        let connected2 = Arc::clone(&connected);
        let stop2 = Arc::clone(&stop);

        let handle = connect_background(
            addr,
            move || stop2.load(Ordering::Relaxed),
            move |stream| {
                *connected2.lock().unwrap() = Some(stream);
            },
        );

        let (_accepted, _peer) = listener.accept().unwrap();
        handle.join().unwrap();
        assert!(connected.lock().unwrap().is_some());
    }
}
