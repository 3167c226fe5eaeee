// SPDX-License-Identifier: GPL-2.0-or-later

//! Server side of the remote-serial tap: accepts a connection per spec
//! §6, reads the LF-terminated device name, answers the handshake, then
//! relays raw bytes both ways until either end closes.

use crate::error::ServerError;
use nidas_core::sensor::IoDevice;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Serial parameters reported to a connecting client, read off
/// `RemoteSerial::openConnection`'s handshake in `rserial.cc`.
#[derive(Debug, Clone)]
pub struct DeviceParams {
    pub baud: u32,
    pub parity: char,
    pub databits: u32,
    pub stopbits: u32,
    pub message_separator: String,
    pub separator_at_eom: bool,
    pub message_length: u32,
    pub prompted: bool,
}

impl DeviceParams {
    fn write_handshake<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(w, "OK")?;
        writeln!(w, "{} {} {} {}", self.baud, self.parity, self.databits, self.stopbits)?;
        writeln!(w, "{}", self.message_separator)?;
        writeln!(w, "{}", u8::from(self.separator_at_eom))?;
        writeln!(w, "{}", self.message_length)?;
        writeln!(w, "{}", self.prompted)?;
        w.flush()
    }
}

type SharedDevice = Arc<Mutex<dyn IoDevice>>;

/// A TCP listener dedicated to the remote-serial tap, with one
/// pre-registered device per name.
pub struct TapServer {
    listener: TcpListener,
    devices: Arc<HashMap<String, (DeviceParams, SharedDevice)>>,
}

impl TapServer {
    pub fn bind(addr: SocketAddr, devices: HashMap<String, (DeviceParams, SharedDevice)>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(TapServer {
            listener,
            devices: Arc::new(devices),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `stop` is set, spawning one worker
    /// thread per connection.
    pub fn run(&self, stop: &AtomicBool) -> std::io::Result<()> {
        while !stop.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    log::info!("tap connection from {peer}");
                    let devices = Arc::clone(&self.devices);
                    std::thread::spawn(move || {
                        if let Err(e) = serve_tap(stream, &devices) {
                            log::warn!("tap session with {peer} ended: {e}");
                        }
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(200));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn serve_tap(
    stream: TcpStream,
    devices: &HashMap<String, (DeviceParams, SharedDevice)>,
) -> Result<(), ServerError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut name_line = String::new();
    reader.read_line(&mut name_line)?;
    let name = name_line.trim_end_matches(['\n', '\r']);

    let mut writer = stream.try_clone()?;
    let (params, device) = devices
        .get(name)
        .ok_or_else(|| ServerError::UnknownDevice(name.to_string()))?;
    params.write_handshake(&mut writer)?;

    relay(reader.into_inner(), Arc::clone(device))?;
    Ok(())
}

fn relay(socket: TcpStream, device: SharedDevice) -> std::io::Result<()> {
    let mut read_side = socket.try_clone()?;
    let mut write_side = socket;
    let reader_device = Arc::clone(&device);

    let to_client = std::thread::spawn(move || -> std::io::Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            let n = reader_device
                .lock()
                .read(&mut buf)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            if n == 0 {
                break;
            }
            write_side.write_all(&buf[..n])?;
        }
        Ok(())
    });

    let mut buf = [0u8; 4096];
    loop {
        let n = read_side.read(&mut buf)?;
        if n == 0 {
            break;
        }
        device
            .lock()
            .write(&buf[..n])
            .map_err(|e| std::io::Error::other(e.to_string()))?;
    }

    let _ = to_client.join();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nidas_core::error::Result as NResult;
    use std::io::{BufRead, BufReader};
    use std::net::TcpStream as ClientStream;

    struct LoopbackDevice {
        inbound: std::sync::mpsc::Receiver<u8>,
        echoed: Arc<Mutex<Vec<u8>>>,
    }

    impl IoDevice for LoopbackDevice {
        fn open(&mut self, _flags: nidas_core::sensor::OpenFlags) -> NResult<()> {
            Ok(())
        }
        fn read(&mut self, buf: &mut [u8]) -> NResult<usize> {
            match self.inbound.recv() {
                Ok(b) => {
                    buf[0] = b;
                    Ok(1)
                }
                Err(_) => Ok(0),
            }
        }
        fn write(&mut self, buf: &[u8]) -> NResult<usize> {
            self.echoed.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn close(&mut self) -> NResult<()> {
            Ok(())
        }
    }

    #[test]
    fn unknown_device_name_drops_the_connection() {
        let server = TapServer::bind("127.0.0.1:0".parse().unwrap(), HashMap::new()).unwrap();
        let addr = server.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let handle = std::thread::spawn(move || server.run(&stop2));

        let mut client = ClientStream::connect(addr).unwrap();
        client.write_all(b"nonexistent\n").unwrap();
        let mut reader = BufReader::new(client);
        let mut line = String::new();
        let n = reader.read_line(&mut line).unwrap();
        assert_eq!(n, 0); // connection closed, no handshake sent

        stop.store(true, Ordering::Relaxed);
        let _ = handle.join();
    }

    #[test]
    fn device_bytes_are_relayed_to_the_client() {
        let (tx, rx) = std::sync::mpsc::channel();
        let echoed = Arc::new(Mutex::new(Vec::new()));
        let device: SharedDevice = Arc::new(Mutex::new(LoopbackDevice {
            inbound: rx,
            echoed: Arc::clone(&echoed),
        }));

        let mut devices = HashMap::new();
        devices.insert(
            "sonic0".to_string(),
            (
                DeviceParams {
                    baud: 9600,
                    parity: 'N',
                    databits: 8,
                    stopbits: 1,
                    message_separator: "\\n".into(),
                    separator_at_eom: true,
                    message_length: 0,
                    prompted: false,
                },
                device,
            ),
        );

        let server = TapServer::bind("127.0.0.1:0".parse().unwrap(), devices).unwrap();
        let addr = server.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let handle = std::thread::spawn(move || server.run(&stop2));

        let mut client = ClientStream::connect(addr).unwrap();
        client.write_all(b"sonic0\n").unwrap();

        let mut reader = BufReader::new(client.try_clone().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line.trim_end(), "OK");
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line.trim_end(), "9600 N 8 1");

        tx.send(b'X').unwrap();
        let mut byte = [0u8; 1];
        use std::io::Read as _;
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], b'X');

        client.write_all(b"Y").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(echoed.lock().as_slice(), b"Y");

        drop(tx);
        stop.store(true, Ordering::Relaxed);
        drop(client);
        let _ = handle.join();
    }
}
