//! # Broker Module
//!
//! The message-bus capability the publish pipeline consumes, and its MQTT
//! implementation on top of `rumqttc`.
//!
//! `rumqttc` keeps a connection alive implicitly while its event loop is
//! polled. [`MqttBus`] turns that into explicit connect / publish /
//! disconnect primitives: connect performs the CONNECT/CONNACK handshake and
//! then hands the event loop to a driver task that flags the session as lost
//! on the first connection error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

// =============================================================================
// Bus Capability
// =============================================================================

/// Message-bus error types
#[derive(Error, Debug)]
pub enum BusError {
    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection refused by broker: {0}")]
    Refused(String),

    #[error("no CONNACK within {0:?}")]
    Timeout(Duration),

    #[error("client error: {0}")]
    Client(String),
}

/// Connect / publish / disconnect primitives of a message bus
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Establish a session. Returns [`BusError::AlreadyConnected`] when one is live.
    async fn connect(&self) -> Result<(), BusError>;

    /// Publish `payload` on `topic`
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BusError>;

    /// Tear down the current session, if any
    async fn disconnect(&self) -> Result<(), BusError>;
}

// =============================================================================
// MQTT Configuration
// =============================================================================

/// MQTT client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    /// Client identifier presented to the broker
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Time allowed for the CONNACK to arrive
    pub connect_timeout_secs: u64,
    /// Publish attempts per message, reconnecting between attempts
    pub retries: u32,
    /// Pause between a disconnect and the next reconnect
    pub retry_backoff_ms: u64,
    /// Capacity of the request channel between client and event loop
    pub request_channel_capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        MqttSettings {
            client_id: "homehqtt".to_string(),
            keep_alive_secs: 30,
            connect_timeout_secs: 5,
            retries: 5,
            retry_backoff_ms: 1000,
            request_channel_capacity: 16,
        }
    }
}

impl MqttSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

// =============================================================================
// MQTT Implementation
// =============================================================================

struct MqttSession {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

/// [`MessageBus`] backed by a `rumqttc` client
pub struct MqttBus {
    options: MqttOptions,
    connect_timeout: Duration,
    channel_capacity: usize,
    session: Mutex<Option<MqttSession>>,
}

impl MqttBus {
    /// Create a bus for the broker at `host:port`. No connection is made yet.
    pub fn new(host: &str, port: u16, settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(settings.client_id.clone(), host, port);
        options.set_keep_alive(settings.keep_alive());
        options.set_clean_session(true);

        MqttBus {
            options,
            connect_timeout: settings.connect_timeout(),
            channel_capacity: settings.request_channel_capacity.max(1),
            session: Mutex::new(None),
        }
    }

    /// Poll `eventloop` until the broker acknowledges the connection
    async fn handshake(eventloop: &mut EventLoop) -> Result<(), BusError> {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        code => Err(BusError::Refused(format!("{:?}", code))),
                    };
                }
                Ok(_) => continue,
                Err(e) => return Err(BusError::Connection(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    #[instrument(level = "debug", skip(self))]
    async fn connect(&self) -> Result<(), BusError> {
        let mut session = self.session.lock().await;

        if let Some(current) = session.take() {
            if current.connected.load(Ordering::Acquire) {
                *session = Some(current);
                return Err(BusError::AlreadyConnected);
            }
            current.driver.abort();
        }

        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), self.channel_capacity);
        tokio::time::timeout(self.connect_timeout, Self::handshake(&mut eventloop))
            .await
            .map_err(|_| BusError::Timeout(self.connect_timeout))??;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();
        let driver = tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    warn!("mqttclient: {}", e);
                    flag.store(false, Ordering::Release);
                    break;
                }
            }
        });

        let (host, port) = self.options.broker_address();
        info!("🔌 Connected to MQTT broker {}:{}", host, port);
        *session = Some(MqttSession { client, connected, driver });
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BusError> {
        let session = self.session.lock().await;
        let current = match session.as_ref() {
            Some(current) if current.connected.load(Ordering::Acquire) => current,
            _ => return Err(BusError::NotConnected),
        };

        current
            .client
            .publish(topic, QoS::AtMostOnce, retain, payload.to_vec())
            .await
            .map_err(|e| BusError::Client(e.to_string()))?;

        debug!("📤 Published {} bytes to {}", payload.len(), topic);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        let Some(mut current) = self.session.lock().await.take() else {
            return Ok(());
        };

        let result = current
            .client
            .disconnect()
            .await
            .map_err(|e| BusError::Client(e.to_string()));

        // Give the driver a moment to flush the DISCONNECT packet
        if tokio::time::timeout(Duration::from_secs(1), &mut current.driver).await.is_err() {
            current.driver.abort();
        }
        result
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_settings_default() {
        let settings = MqttSettings::default();
        assert_eq!(settings.client_id, "homehqtt");
        assert_eq!(settings.keep_alive(), Duration::from_secs(30));
        assert_eq!(settings.connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.retries, 5);
        assert_eq!(settings.retry_backoff(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_publish_without_session() {
        let bus = MqttBus::new("127.0.0.1", 1883, &MqttSettings::default());
        let err = bus.publish("home/gw", b"{}", true).await.unwrap_err();
        assert!(matches!(err, BusError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_without_session() {
        let bus = MqttBus::new("127.0.0.1", 1883, &MqttSettings::default());
        assert!(bus.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop a listener to get a port nothing is listening on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let bus = MqttBus::new("127.0.0.1", port, &MqttSettings::default());

        let err = bus.connect().await.unwrap_err();
        assert!(matches!(err, BusError::Connection(_) | BusError::Timeout(_)));
        assert!(matches!(bus.publish("t", b"x", true).await, Err(BusError::NotConnected)));
    }
}
