// SPDX-License-Identifier: GPL-2.0-or-later

//! Remote-serial tap: a TCP listener that relays a sensor's
//! raw byte stream to a connected client and the client's bytes back
//! out to the device, grounded on `nidas/apps/rserial.cc`'s client/server
//! handshake.
//!
//! The handshake is server-initiated: after the client sends the device
//! name, the server answers `OK` followed by five lines describing the
//! device's serial parameters (baud/parity/databits/stopbits, message
//! separator, separator-at-EOM, message length, prompted), then both
//! sides relay raw bytes until either end closes. `rserial.cc` is a
//! *client*: the `ESC a`/`ESC h`/`ESC ESC` escape handling it documents
//! is the client's local keystroke interpretation (switch its own
//! display mode, or forward a literal escape byte) -- the server never
//! parses it, so [`server::TapServer`] is a plain bidirectional relay
//! and the escape state machine lives in [`client`].

pub mod client;
pub mod server;

pub use client::{EscapeFilter, OutputMode, ESC};
pub use server::{DeviceParams, TapServer};
