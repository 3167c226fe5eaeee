// SPDX-License-Identifier: GPL-2.0-or-later

//! Configuration for the sample-distribution service, loaded from a
//! JSON file or built directly
//! from CLI flags the way `dsm-record`/`dsm-replay` build their configs.

use nidas_core::error::{NidasError, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

/// Knobs for [`crate::accept::AcceptLoop`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 30000, the nidas convention for
    /// a processed-sample data server).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on simultaneously connected clients.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Per-client outbound queue depth before the slowest client starts
    /// dropping samples rather than stalling the rest (the sorter's
    /// drop/block choice, applied per connection rather than globally).
    #[serde(default = "default_queue_capacity")]
    pub client_queue_capacity: usize,

    #[serde(default)]
    pub project_name: String,

    #[serde(default)]
    pub platform_name: String,
}

fn default_bind_address() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    30000
}

fn default_max_clients() -> usize {
    64
}

fn default_queue_capacity() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: default_bind_address(),
            port: default_port(),
            max_clients: default_max_clients(),
            client_queue_capacity: default_queue_capacity(),
            project_name: String::new(),
            platform_name: String::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(NidasError::Io)?;
        serde_json::from_str(&content).map_err(|e| NidasError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(NidasError::InvalidParameter("port cannot be 0".into()));
        }
        if self.max_clients == 0 {
            return Err(NidasError::InvalidParameter(
                "max_clients cannot be 0".into(),
            ));
        }
        if self.client_queue_capacity == 0 {
            return Err(NidasError::InvalidParameter(
                "client_queue_capacity cannot be 0".into(),
            ));
        }
        Ok(())
    }
}
