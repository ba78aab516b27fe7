// =============================================================================
// HomeHQtt - Library Crate
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   Intercepting HTTPS proxy that sits between a HomeHQ gateway and its
//   cloud server, relays every exchange unchanged, and republishes posted
//   device measurements to an MQTT broker.
//
// =============================================================================

pub mod clap;
pub mod config;
pub mod proxy;
pub mod utils;

pub use config::Config;
pub use utils::error::{Error, Result};

// Re-export workspace crates
pub use homehqtt_iot as iot;
