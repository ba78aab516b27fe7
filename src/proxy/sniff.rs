// =============================================================================
// HomeHQtt - Sniffer
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   Inspects the teed copy of each body off the forwarding path. Decode
//   failures are logged and never reach the gateway.
//
// =============================================================================

use std::sync::Arc;

use bytes::Bytes;
use homehqtt_iot::{classify, DeviceStore, Direction, SniffError, TrackReport};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn, Instrument};

/// Bounded set of background sniff tasks
#[derive(Clone)]
pub struct SniffPool {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    store: Arc<DeviceStore>,
}

impl SniffPool {
    pub fn new(store: Arc<DeviceStore>, max_in_flight: usize) -> Self {
        SniffPool {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            store,
        }
    }

    /// Spawn a sniff of `body`. Returns false when the pool is full and the
    /// copy was dropped.
    pub fn sniff(&self, direction: Direction, content_type: String, body: Bytes) -> bool {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("⚠️ {}: sniff pool full, dropping {} byte copy", direction.tag(), body.len());
                return false;
            }
        };

        let store = Arc::clone(&self.store);
        self.tracker.spawn(
            async move {
                sniff(&store, direction, &content_type, &body).await;
                drop(permit);
            }
            .in_current_span(),
        );
        true
    }

    /// Number of sniff tasks not yet finished
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    /// Wait for every spawned sniff to finish
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Classify one captured body and apply it to the store.
///
/// Returns `None` when the body is not a telemetry payload.
pub async fn sniff(store: &DeviceStore, direction: Direction, content_type: &str, body: &[u8]) -> Option<TrackReport> {
    match classify(direction, content_type, body) {
        Ok(payload) => {
            let report = store.track(&payload).await;
            debug!(
                "{}: {} change(s), {} publication(s)",
                direction.tag(),
                report.changes.len(),
                report.published
            );
            Some(report)
        }
        Err(e @ SniffError::NotJson { .. }) => {
            info!("{}: {} {}", direction.tag(), e, String::from_utf8_lossy(body));
            None
        }
        Err(e @ SniffError::Decode { .. }) => {
            warn!("{}: {} {}", direction.tag(), e, String::from_utf8_lossy(body));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homehqtt_iot::{Outbox, Publication};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn store() -> (Arc<DeviceStore>, UnboundedReceiver<Publication>) {
        let (outbox, rx) = Outbox::channel();
        (Arc::new(DeviceStore::new(outbox)), rx)
    }

    const MEASUREMENTS: &[u8] = br#"{
        "command": "postMeasurements",
        "gatewayId": "gw-1",
        "measurements": [
            {"deviceId": "dev-a", "parameters": [{"name": "temp", "value": "21.5"}]}
        ]
    }"#;

    #[test_log::test(tokio::test)]
    async fn test_sniff_measurements() {
        let (store, mut rx) = store();

        let report = sniff(&store, Direction::Request, "application/json; charset=utf-8", MEASUREMENTS)
            .await
            .unwrap();
        assert_eq!(report.published, 1);

        let publication = rx.try_recv().unwrap();
        assert_eq!(publication.device_id, "dev-a");
        let gateway = store.gateway("gw-1").await.unwrap();
        assert_eq!(gateway.devices["dev-a"].parameters["temp"], "21.5");
    }

    #[test_log::test(tokio::test)]
    async fn test_sniff_not_json() {
        let (store, mut rx) = store();
        assert!(sniff(&store, Direction::Request, "text/plain", MEASUREMENTS).await.is_none());
        assert!(sniff(&store, Direction::Response, "", b"{}").await.is_none());
        assert!(store.is_empty().await);
        assert!(rx.try_recv().is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_sniff_bad_json() {
        let (store, _rx) = store();
        assert!(sniff(&store, Direction::Request, "application/json", b"{\"command\":")
            .await
            .is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_pool_drain() {
        let (store, mut rx) = store();
        let pool = SniffPool::new(Arc::clone(&store), 8);

        assert!(pool.sniff(
            Direction::Request,
            "application/json".to_string(),
            Bytes::from_static(MEASUREMENTS)
        ));
        pool.drain().await;

        assert_eq!(pool.in_flight(), 0);
        assert_eq!(store.len().await, 1);
        assert!(rx.try_recv().is_ok());

        // The pool accepts work again after a drain
        assert!(pool.sniff(Direction::Response, "text/html".to_string(), Bytes::new()));
        pool.drain().await;
    }

    #[tokio::test]
    async fn test_pool_full_drops_copy() {
        let (store, _rx) = store();
        let pool = SniffPool::new(store, 0);
        assert!(!pool.sniff(
            Direction::Request,
            "application/json".to_string(),
            Bytes::from_static(MEASUREMENTS)
        ));
        assert_eq!(pool.in_flight(), 0);
    }
}
