//! # Gateway Module
//!
//! The HomeHQ "Low Cost Gateway" (LCGW) and the child devices attached to it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{Device, Parameters};

/// Gateway represents the properties of the HomeHQ "Low Cost Gateway".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    pub gateway_id: String,
    /// The gateway's own parameters, reported with its own id as device id
    pub parameters: Parameters,
    pub devices: BTreeMap<String, Device>,

    /// Command name → number of times seen
    pub requests: BTreeMap<String, u64>,
    /// Result code → number of responses carrying it
    pub results: BTreeMap<String, u64>,
    pub last_result: Option<DateTime<Utc>>,
}

impl Gateway {
    pub fn new(gateway_id: &str) -> Self {
        Gateway {
            gateway_id: gateway_id.to_string(),
            parameters: Parameters::new(),
            devices: BTreeMap::new(),
            requests: BTreeMap::new(),
            results: BTreeMap::new(),
            last_result: None,
        }
    }

    pub fn count_request(&mut self, command: &str) {
        *self.requests.entry(command.to_string()).or_insert(0) += 1;
    }

    pub fn count_result(&mut self, result_code: &str) {
        *self.results.entry(result_code.to_string()).or_insert(0) += 1;
    }

    /// Parameter map a measurement for `device_id` lands in.
    ///
    /// The gateway's own id selects its own map; any other id selects that
    /// child device, creating it on first sighting.
    pub fn parameters_for(&mut self, device_id: &str) -> &mut Parameters {
        if device_id == self.gateway_id {
            return &mut self.parameters;
        }
        &mut self
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| {
                debug!("🆕 New device {} on gateway {}", device_id, self.gateway_id);
                Device::default()
            })
            .parameters
    }
}

// =============================================================================
// Tests
// =============================================================================
