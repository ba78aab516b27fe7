// =============================================================================
// HomeHQtt - Clap Module
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   Command-line interface. Flags override the configuration file and
//   environment.
//
// =============================================================================

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

/// Returns the current version of the crate with extra info if supplied
///
/// Set the environment variable `HOMEHQTT_VERSION_EXTRA` at build time to any
/// UTF-8 string to include it in parenthesis after the SemVer version. A common
/// value are git commit hashes.
///
/// # Examples
/// ```
/// use homehqtt::clap::version;
///
/// let v = version();
/// assert!(v.contains(env!("CARGO_PKG_VERSION")));
/// ```
pub fn version() -> String {
    let cargo_pkg_version = env!("CARGO_PKG_VERSION");

    match option_env!("HOMEHQTT_VERSION_EXTRA") {
        Some(x) => format!("{} ({})", cargo_pkg_version, x),
        None => cargo_pkg_version.to_owned(),
    }
}

/// HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
///
/// Acts as an HTTPS proxy in front of the HomeHQ cloud server and forwards
/// any posted device measurements to an MQTT broker.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[clap(about, version, name = "homehqtt")]
pub struct Args {
    /// Path to configuration file
    #[clap(short, long, env = "HOMEHQTT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to TLS cert for mitm proxy
    #[clap(long)]
    pub cert: Option<PathBuf>,

    /// Path to TLS private key for mitm proxy
    #[clap(long)]
    pub key: Option<PathBuf>,

    /// URL of the MQTT broker
    #[clap(long)]
    pub broker: Option<String>,

    /// MQTT topic to post measurements
    #[clap(long)]
    pub topic: Option<String>,

    /// Log filter override (trace, debug, info, warn, error or a directive list)
    #[clap(short, long)]
    pub log_level: Option<String>,
}

/// Configuration keys set on the command line
#[derive(Debug, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    cert: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    broker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log: Option<String>,
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            cert: self.cert.clone(),
            key: self.key.clone(),
            broker: self.broker.clone(),
            topic: self.topic.clone(),
            log: self.log_level.clone(),
        }
    }
}

/// Parse command line arguments into structured data
pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(version().starts_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "homehqtt",
            "--cert",
            "/tls/cert.pem",
            "--broker",
            "tcp://10.0.0.2:1883",
            "--topic",
            "home/hq",
            "-l",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.cert, Some(PathBuf::from("/tls/cert.pem")));
        assert_eq!(args.broker.as_deref(), Some("tcp://10.0.0.2:1883"));
        assert_eq!(args.topic.as_deref(), Some("home/hq"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.key, None);
    }

    #[test]
    fn test_overrides_skip_unset() {
        let args = Args {
            topic: Some("home".to_string()),
            ..Args::default()
        };
        let value = serde_json::to_value(args.overrides()).unwrap();
        assert_eq!(value, serde_json::json!({"topic": "home"}));
    }
}
