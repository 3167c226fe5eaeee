// SPDX-License-Identifier: GPL-2.0-or-later

//! `rserial`: connect to a DSM's remote-serial tap and relay stdin/stdout
//! against the named device, grounded on `RemoteSerial` in
//! `nidas/apps/rserial.cc`.
//!
//! ```bash
//! rserial dsm0:30002 sonic0
//! # ESC a switches display to ASCII, ESC h to hex, ESC ESC sends a
//! # literal escape byte to the device.
//! ```

use anyhow::Context;
use clap::Parser;
use nidas_server::tap::client::format_display;
use nidas_server::tap::{EscapeFilter, OutputMode};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "rserial")]
#[command(author, version, about = "Tap a DSM's remote-serial connection")]
struct Args {
    /// `host:port` of the DSM's remote-serial tap listener.
    addr: String,

    /// Device name as configured on the DSM.
    device: String,
}

fn mode_to_tag(mode: OutputMode) -> u8 {
    match mode {
        OutputMode::Ascii => 0,
        OutputMode::Hex => 1,
        OutputMode::Both => 2,
    }
}

fn tag_to_mode(tag: u8) -> OutputMode {
    match tag {
        1 => OutputMode::Hex,
        2 => OutputMode::Both,
        _ => OutputMode::Ascii,
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let socket = TcpStream::connect(&args.addr)
        .with_context(|| format!("connecting to {}", args.addr))?;
    eprintln!("connected to {}", args.addr);

    let mut writer = socket.try_clone()?;
    writeln!(writer, "{}", args.device)?;
    eprintln!("sent device name {:?}", args.device);

    let mut reader = BufReader::new(socket);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim_end() != "OK" {
        anyhow::bail!("server rejected device {:?}: {}", args.device, line.trim_end());
    }

    let mut params_line = String::new();
    reader.read_line(&mut params_line)?;
    let mut separator = String::new();
    reader.read_line(&mut separator)?;
    let mut eom_line = String::new();
    reader.read_line(&mut eom_line)?;
    let mut length_line = String::new();
    reader.read_line(&mut length_line)?;
    let mut prompted_line = String::new();
    reader.read_line(&mut prompted_line)?;
    eprintln!(
        "parameters: {} separator={:?} separator_at_eom={} length={} prompted={}",
        params_line.trim_end(),
        separator.trim_end(),
        eom_line.trim_end(),
        length_line.trim_end(),
        prompted_line.trim_end(),
    );

    // Shared between the reader thread (which displays bytes coming
    // back from the device) and the stdin loop below (the only place
    // that can change it, via `ESC a`/`ESC h`).
    let mode_tag = Arc::new(AtomicU8::new(mode_to_tag(OutputMode::Ascii)));
    let reader_mode_tag = Arc::clone(&mode_tag);

    let reader_thread = std::thread::spawn(move || -> anyhow::Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            let mode = tag_to_mode(reader_mode_tag.load(Ordering::Relaxed));
            let mut out = String::new();
            for &c in &buf[..n] {
                out.push_str(&format_display(mode, c));
            }
            print!("{out}");
            std::io::stdout().flush().ok();
        }
        Ok(())
    });

    let mut filter = EscapeFilter::new();
    let mut mode = OutputMode::Ascii;
    let mut buf = [0u8; 4096];
    let stdin = std::io::stdin();
    loop {
        let n = stdin.lock().read(&mut buf)?;
        if n == 0 {
            break;
        }
        let out = filter.filter(&buf[..n], &mut mode);
        mode_tag.store(mode_to_tag(mode), Ordering::Relaxed);
        if !out.is_empty() {
            writer.write_all(&out)?;
        }
    }

    let _ = reader_thread.join();
    Ok(())
}
