// SPDX-License-Identifier: GPL-2.0-or-later

//! Errors specific to the service/server layer. Transport and pipeline failures
//! are still reported as [`nidas_core::error::NidasError`]; this enum
//! only covers the tap handshake, which has no equivalent in the core
//! crate.

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unknown device {0:?}")]
    UnknownDevice(String),

    #[error("malformed tap handshake: {0}")]
    BadHandshake(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
