// SPDX-License-Identifier: GPL-2.0-or-later

//! # nidas-server
//!
//! Service/server control and the remote-serial tap: the
//! connection-accept loop that fans a processed sample stream
//! out to clients, and the TCP tap that relays a single sensor's raw
//! byte stream to/from a remote terminal.
//!
//! ## Modules
//!
//! - [`config`] - the distribution service's configuration
//! - [`distributor`] - per-client sample queues, wired as a `SampleSink`
//! - [`accept`] - the connection-accept loop and per-connection worker threads
//! - [`tap`] - remote-serial tap server and client halves
//! - [`error`] - errors specific to this crate's protocols

pub mod accept;
pub mod config;
pub mod distributor;
pub mod error;
pub mod tap;

pub use accept::AcceptLoop;
pub use config::ServerConfig;
pub use distributor::SampleDistributor;
pub use error::ServerError;
