//! # Device Module
//!
//! Child sensors and actuators reporting through a gateway, and the parameter
//! map both gateways and devices keep their last-known values in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Last-known parameter values keyed by parameter name.
///
/// Sorted so that a serialized snapshot only depends on its content.
pub type Parameters = BTreeMap<String, String>;

/// Outcome of recording one reported parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterChange {
    /// First sighting of this parameter name
    Added { name: String, value: String },
    /// Same value as already recorded
    Unchanged,
    /// Value differs from the recorded one
    Changed { name: String, from: String, to: String },
}

impl ParameterChange {
    pub fn is_change(&self) -> bool {
        matches!(self, ParameterChange::Changed { .. })
    }
}

/// Record `value` for `name`, returning what happened.
///
/// Keys are only ever added or overwritten, never removed.
pub fn record_parameter(params: &mut Parameters, device_id: &str, name: &str, value: &str) -> ParameterChange {
    match params.get_mut(name) {
        Some(current) if current == value => ParameterChange::Unchanged,
        Some(current) => {
            info!("changing {} from {} to {} for device {}", name, current, value, device_id);
            let from = std::mem::replace(current, value.to_string());
            ParameterChange::Changed {
                name: name.to_string(),
                from,
                to: value.to_string(),
            }
        }
        None => {
            params.insert(name.to_string(), value.to_string());
            ParameterChange::Added {
                name: name.to_string(),
                value: value.to_string(),
            }
        }
    }
}

/// Device tracks the properties and measurements for an individual device
/// managed by a gateway.
///
/// Parameters seen in the wild include `doorStatus`, `motionStatus`,
/// `ias.tamper`, `ias.trouble`, `batteryLow`, `batteryLevel`,
/// `batteryVoltage`, `lqi` and `rssi`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub parameters: Parameters,
}

// =============================================================================
// Tests
// =============================================================================
