//! # HomeHQtt IoT Module - Gateway Telemetry Tracking
//!
//! **Project:** HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
//! **Module:** homehqtt-iot - Payload classification, device state, MQTT publishing
//! **Author:** HomeHQtt Development Team
//! **Date:** 2026-10-17
//! **Version:** 0.1.0
//! **License:** Apache 2.0 / MIT
//!
//! ## Description
//!
//! Everything the intercepting proxy does with a captured body once it has
//! been copied off the forwarding path:
//!
//! - [`protocol`] decodes it into a typed [`Request`] or [`Response`]
//! - [`store`] applies it to the shared gateway/device model
//! - [`publish`] pushes changed parameter snapshots to the bus, in order,
//!   with reconnect-and-retry
//! - [`broker`] is the bus capability, implemented for MQTT
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use homehqtt_iot::{
//!     classify, spawn_publisher, Direction, DeviceStore, MqttBus, MqttSettings, Outbox,
//!     Publisher, RetryPolicy,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = MqttSettings::default();
//!     let bus = Arc::new(MqttBus::new("127.0.0.1", 1883, &settings));
//!     let (outbox, rx) = Outbox::channel();
//!     let worker = spawn_publisher(Publisher::new(bus, "home/hq", RetryPolicy::from(&settings)), rx);
//!
//!     let store = DeviceStore::new(outbox);
//!     let body = br#"{"command":"postMeasurements","gatewayId":"gw","measurements":[]}"#;
//!     if let Ok(payload) = classify(Direction::Request, "application/json", body) {
//!         store.track(&payload).await;
//!     }
//!
//!     drop(store);
//!     worker.await.ok();
//! }
//! ```

pub mod broker;
pub mod device;
pub mod gateway;
pub mod protocol;
pub mod publish;
pub mod store;

pub use broker::{BusError, MessageBus, MqttBus, MqttSettings};
pub use device::{Device, ParameterChange, Parameters};
pub use gateway::Gateway;
pub use protocol::{classify, Direction, Payload, Request, Response, SniffError};
pub use publish::{build_topic, spawn_publisher, Outbox, Publication, Publisher, RetryPolicy};
pub use store::{DeviceStore, GatewayMap, TrackReport};
