// =============================================================================
// HomeHQtt - Configuration Module
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   Layered configuration: built-in defaults, an optional TOML file,
//   HOMEHQTT_* environment variables, then command-line flags.
//
// =============================================================================

pub mod proxy;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use homehqtt_iot::MqttSettings;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::clap::Args;
use crate::{Error, Result};

/// Network schemes accepted in the broker URL
const BROKER_SCHEMES: [&str; 4] = ["tcp", "tcp4", "tcp6", "mqtt"];

const DEFAULT_BROKER_PORT: u16 = 1883;

/// Configuration structure for HomeHQtt
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// TLS certificate presented to the gateway
    pub cert: PathBuf,
    /// TLS private key for `cert`
    pub key: PathBuf,
    /// URL of the MQTT broker, e.g. `tcp://127.0.0.1:1883`
    pub broker: String,
    /// Root MQTT topic measurements are published under
    pub topic: String,

    pub address: IpAddr,
    pub port: u16,
    /// Origin every intercepted request is forwarded to
    pub upstream: String,

    /// Log filter directive
    pub log: String,
    pub request_timeout_secs: u64,
    /// Upper bound on concurrently running sniff tasks
    pub max_in_flight_sniffs: usize,

    pub mqtt: MqttSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cert: PathBuf::from("cert.pem"),
            key: PathBuf::from("key.pem"),
            broker: "tcp://127.0.0.1:1883".to_string(),
            topic: String::new(),
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8443,
            upstream: "https://origin.presencepro.com:8443".to_string(),
            log: "info".to_string(),
            request_timeout_secs: 120,
            max_in_flight_sniffs: 1024,
            mqtt: MqttSettings::default(),
        }
    }
}

/// Host and port of the MQTT broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub network: String,
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    /// Host to dial. `tcp4` and `tcp6` resolve the name and keep the first
    /// address of that family; other networks dial the host as given.
    pub async fn dial_host(&self) -> Result<String> {
        let want_v4 = match self.network.as_str() {
            "tcp4" => true,
            "tcp6" => false,
            _ => return Ok(self.host.clone()),
        };

        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .map(|addr| addr.ip())
            .find(|ip| ip.is_ipv4() == want_v4)
            .map(|ip| ip.to_string())
            .ok_or_else(|| {
                Error::BadConfig(format!("broker {} has no {} address", self.host, self.network))
            })
    }
}

impl Config {
    /// Load configuration for the given command line
    pub fn load(args: &Args) -> Result<Config> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = &args.config {
            if !path.is_file() {
                return Err(Error::BadConfig(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: Config = figment
            .merge(Env::prefixed("HOMEHQTT_").split("__"))
            .merge(Serialized::defaults(args.overrides()))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the proxy cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(Error::BadConfig("topic must be specified".to_string()));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(Error::BadConfig("mqtt.client_id must not be empty".to_string()));
        }
        if self.mqtt.retries == 0 {
            return Err(Error::BadConfig("mqtt.retries must be at least 1".to_string()));
        }
        if self.max_in_flight_sniffs == 0 {
            warn!("max_in_flight_sniffs is 0, telemetry will not be inspected");
        }
        self.broker_endpoint()?;
        Ok(())
    }

    /// Split the broker URL into network, host and port
    pub fn broker_endpoint(&self) -> Result<BrokerEndpoint> {
        let url = Url::parse(&self.broker)
            .map_err(|e| Error::BadConfig(format!("invalid broker URL {:?}: {}", self.broker, e)))?;

        if !BROKER_SCHEMES.contains(&url.scheme()) {
            return Err(Error::BadConfig(format!(
                "unsupported broker network {:?}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::BadConfig(format!("broker URL {:?} has no host", self.broker)))?;

        Ok(BrokerEndpoint {
            network: url.scheme().to_string(),
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port: url.port().unwrap_or(DEFAULT_BROKER_PORT),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert
    }

    pub fn key_path(&self) -> &Path {
        &self.key
    }
}
