//! # Publish Module
//!
//! Pushes parameter snapshots to the message bus.
//!
//! [`Publisher::publish`] is the retry loop: the first attempt reuses the live
//! session, every later attempt disconnects, waits a fixed backoff and
//! reconnects. After the last attempt the message is dropped.
//!
//! Snapshots are handed over through an [`Outbox`], a FIFO drained by a single
//! worker task, so publishes leave in the order the store produced them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::broker::{BusError, MessageBus, MqttSettings};

/// Topic level separator
pub const TOPIC_SEPARATOR: char = '/';

/// Retry behaviour of the publish loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<&MqttSettings> for RetryPolicy {
    fn from(settings: &MqttSettings) -> Self {
        RetryPolicy {
            max_attempts: settings.retries,
            backoff: settings.retry_backoff(),
        }
    }
}

/// Build `<root>[/<suffix>]*`
pub fn build_topic<S: AsRef<str>>(root: &str, suffixes: &[S]) -> String {
    let mut topic = root.to_string();
    for suffix in suffixes {
        topic.push(TOPIC_SEPARATOR);
        topic.push_str(suffix.as_ref());
    }
    topic
}

// =============================================================================
// Publisher
// =============================================================================

/// Retained publishing under a configured root topic
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn MessageBus>,
    root_topic: String,
    retry: RetryPolicy,
}

impl Publisher {
    pub fn new(bus: Arc<dyn MessageBus>, root_topic: impl Into<String>, retry: RetryPolicy) -> Self {
        Publisher {
            bus,
            root_topic: root_topic.into(),
            retry,
        }
    }

    pub fn root_topic(&self) -> &str {
        &self.root_topic
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Publish `payload` under the root topic extended by `suffixes`.
    ///
    /// Fire-and-forget: failures are logged, never returned.
    #[instrument(level = "debug", skip(self, payload), fields(len = payload.len()))]
    pub async fn publish<S: AsRef<str> + std::fmt::Debug>(&self, payload: &[u8], suffixes: &[S]) {
        let topic = build_topic(&self.root_topic, suffixes);

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                info!("publish retrying, attempt {}", attempt + 1);
                if let Err(e) = self.bus.disconnect().await {
                    debug!("disconnect before retry failed: {}", e);
                }
                tokio::time::sleep(self.retry.backoff).await;
            }

            match self.bus.connect().await {
                Ok(()) | Err(BusError::AlreadyConnected) => {}
                Err(e) => {
                    warn!("connect to broker failed: {}", e);
                    continue;
                }
            }

            match self.bus.publish(&topic, payload, true).await {
                Ok(()) => {
                    debug!("✅ Published to {}", topic);
                    return;
                }
                Err(e) => warn!("publish to {} failed: {}", topic, e),
            }
        }

        error!(
            "❌ Dropping message for {} after {} attempts",
            topic, self.retry.max_attempts
        );
    }
}

// =============================================================================
// Outbox
// =============================================================================

/// A parameter snapshot waiting to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Device the snapshot belongs to, used as topic suffix
    pub device_id: String,
    /// Serialized parameter map
    pub payload: Vec<u8>,
}

/// Sending half of the publish queue.
///
/// Enqueueing never blocks; the queue is unbounded.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Publication>,
}

impl Outbox {
    /// Create an outbox and the receiver a worker drains
    pub fn channel() -> (Outbox, mpsc::UnboundedReceiver<Publication>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox { tx }, rx)
    }

    pub fn enqueue(&self, publication: Publication) {
        if let Err(e) = self.tx.send(publication) {
            warn!("outbox closed, dropping snapshot for {}", e.0.device_id);
        }
    }
}

/// Start the worker that drains `rx` through `publisher`.
///
/// The worker ends once every [`Outbox`] handle is dropped and the queue is
/// empty.
pub fn spawn_publisher(publisher: Publisher, mut rx: mpsc::UnboundedReceiver<Publication>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("📡 Publisher started for topic {}", publisher.root_topic());
        while let Some(publication) = rx.recv().await {
            publisher
                .publish(&publication.payload, &[publication.device_id.as_str()])
                .await;
        }
        info!("🛑 Publisher stopped");
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockMessageBus;
    use mockall::Sequence;
    use std::sync::Mutex;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn test_build_topic() {
        assert_eq!(build_topic::<&str>("home/hq", &[]), "home/hq");
        assert_eq!(build_topic("home/hq", &["door-7"]), "home/hq/door-7");
        assert_eq!(build_topic("home", &["gw-1", "door-7"]), "home/gw-1/door-7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_first_attempt_reuses_session() {
        let mut bus = MockMessageBus::new();
        bus.expect_connect().times(1).returning(|| Err(BusError::AlreadyConnected));
        bus.expect_disconnect().never();
        bus.expect_publish()
            .withf(|topic, payload, retain| topic == "home/door-7" && payload == b"{}" && *retain)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let publisher = Publisher::new(Arc::new(bus), "home", policy());
        let start = tokio::time::Instant::now();
        publisher.publish(b"{}", &["door-7"]).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_publish_gives_up_when_broker_unreachable() {
        let mut bus = MockMessageBus::new();
        bus.expect_connect()
            .times(5)
            .returning(|| Err(BusError::Connection("connection refused".into())));
        bus.expect_disconnect().times(4).returning(|| Ok(()));
        bus.expect_publish().never();

        let publisher = Publisher::new(Arc::new(bus), "home", policy());
        let start = tokio::time::Instant::now();
        publisher.publish(b"{}", &["door-7"]).await;

        // four backoffs between five attempts
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_reconnects_after_failure() {
        let mut seq = Sequence::new();
        let mut bus = MockMessageBus::new();
        bus.expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(BusError::AlreadyConnected));
        bus.expect_publish()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(BusError::Client("broken pipe".into())));
        bus.expect_disconnect().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        bus.expect_connect().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        bus.expect_publish()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let publisher = Publisher::new(Arc::new(bus), "home", policy());
        let start = tokio::time::Instant::now();
        publisher.publish(b"{}", &["door-7"]).await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_outbox_preserves_order() {
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();

        let mut bus = MockMessageBus::new();
        bus.expect_connect().returning(|| Err(BusError::AlreadyConnected));
        bus.expect_publish().returning(move |topic, payload, _| {
            sink.lock().unwrap().push((topic.to_string(), payload.to_vec()));
            Ok(())
        });

        let (outbox, rx) = Outbox::channel();
        let worker = spawn_publisher(Publisher::new(Arc::new(bus), "home", policy()), rx);

        for i in 0..10 {
            outbox.enqueue(Publication {
                device_id: format!("dev-{}", i % 2),
                payload: i.to_string().into_bytes(),
            });
        }
        drop(outbox);
        worker.await.unwrap();

        let published = published.lock().unwrap();
        assert_eq!(published.len(), 10);
        for (i, (topic, payload)) in published.iter().enumerate() {
            assert_eq!(topic, &format!("home/dev-{}", i % 2));
            assert_eq!(payload, &i.to_string().into_bytes());
        }
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let settings = MqttSettings {
            retries: 3,
            retry_backoff_ms: 250,
            ..MqttSettings::default()
        };
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, Duration::from_millis(250));
    }
}
