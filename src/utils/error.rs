// =============================================================================
// HomeHQtt - Error Types
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   Error type for startup and the per-exchange forwarding path.
//
// =============================================================================

use std::io;

use homehqtt_iot::BusError;
use thiserror::Error;

use crate::proxy::tee::TeeError;

/// HomeHQtt global error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    BadConfig(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error(transparent)]
    Tee(#[from] TeeError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// HomeHQtt global result type
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::BadConfig(err.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(err.to_string())
    }
}
