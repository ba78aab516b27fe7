//! # Device-State Store
//!
//! Concurrently shared model of every gateway seen in intercepted traffic.
//!
//! All mutation goes through [`DeviceStore::track_request`] and
//! [`DeviceStore::track_response`], each of which holds the single store lock
//! for its whole update, so readers never observe a half-applied payload.
//! Gateways and devices are created on first sighting and live until the
//! process exits.
//!
//! Telemetry posts enqueue one parameter snapshot per measurement on the
//! [`Outbox`] while the lock is still held. Network I/O happens on the
//! publisher task, after the lock is released, and snapshots for a device are
//! published in the order they were taken.

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use crate::device::{record_parameter, ParameterChange};
use crate::gateway::Gateway;
use crate::protocol::{Payload, Request, Response};
use crate::publish::{Outbox, Publication};

/// Snapshot of the whole store, keyed by gateway identifier
pub type GatewayMap = BTreeMap<String, Gateway>;

/// What a single update did to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackReport {
    /// Parameter transitions, excluding unchanged repeats
    pub changes: Vec<ParameterChange>,
    /// Number of snapshots handed to the outbox
    pub published: usize,
}

/// Lock-guarded gateway → device → parameter model
pub struct DeviceStore {
    gateways: Mutex<GatewayMap>,
    outbox: Outbox,
}

impl DeviceStore {
    pub fn new(outbox: Outbox) -> Self {
        DeviceStore {
            gateways: Mutex::new(GatewayMap::new()),
            outbox,
        }
    }

    /// Apply a decoded payload
    pub async fn track(&self, payload: &Payload) -> TrackReport {
        match payload {
            Payload::Request(request) => self.track_request(request).await,
            Payload::Response(response) => {
                self.track_response(response).await;
                TrackReport::default()
            }
        }
    }

    /// Apply a gateway → server payload.
    ///
    /// Counts the command; for telemetry posts, records every measured
    /// parameter and enqueues the full parameter map of each measured target.
    #[instrument(level = "debug", skip(self, request), fields(gateway_id = %request.gateway_id, command = %request.command))]
    pub async fn track_request(&self, request: &Request) -> TrackReport {
        let mut report = TrackReport::default();
        let mut gateways = self.gateways.lock().await;
        let gw = entry(&mut gateways, &request.gateway_id);

        gw.count_request(&request.command);

        if !request.is_post_measurements() {
            return report;
        }

        for measurement in &request.measurements {
            let params = gw.parameters_for(&measurement.device_id);

            for parameter in &measurement.parameters {
                let change = record_parameter(params, &measurement.device_id, &parameter.name, &parameter.value);
                if change != ParameterChange::Unchanged {
                    report.changes.push(change);
                }
            }

            match serde_json::to_vec(&*params) {
                Ok(payload) => {
                    self.outbox.enqueue(Publication {
                        device_id: measurement.device_id.clone(),
                        payload,
                    });
                    report.published += 1;
                }
                Err(e) => error!("could not encode parameters for {}: {}", measurement.device_id, e),
            }
        }

        debug!(
            "📊 Tracked {} measurements, {} parameter updates",
            request.measurements.len(),
            report.changes.len()
        );
        report
    }

    /// Apply a server → gateway payload.
    ///
    /// The embedded command's device id names the gateway. Counts the command
    /// when it has a name, counts the result code and stamps the time.
    #[instrument(level = "debug", skip(self, response), fields(gateway_id = %response.command.device_id, result = %response.result_code))]
    pub async fn track_response(&self, response: &Response) {
        let mut gateways = self.gateways.lock().await;
        let gw = entry(&mut gateways, &response.command.device_id);

        if !response.command.name.is_empty() {
            gw.count_request(&response.command.name);
        }
        gw.count_result(&response.result_code);
        gw.last_result = Some(Utc::now());
    }

    /// Deep copy of every gateway, taken under the lock
    pub async fn snapshot(&self) -> GatewayMap {
        self.gateways.lock().await.clone()
    }

    pub async fn gateway(&self, gateway_id: &str) -> Option<Gateway> {
        self.gateways.lock().await.get(gateway_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.gateways.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.gateways.lock().await.is_empty()
    }
}

/// Gateway for `gateway_id`, created with empty state on first sighting
fn entry<'a>(gateways: &'a mut GatewayMap, gateway_id: &str) -> &'a mut Gateway {
    gateways.entry(gateway_id.to_string()).or_insert_with(|| {
        info!("🆕 New gateway {}", gateway_id);
        Gateway::new(gateway_id)
    })
}

// =============================================================================
// Tests
// =============================================================================
