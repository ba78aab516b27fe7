// =============================================================================
// HomeHQtt - TLS Module
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   Server-side TLS for the intercepting listener. The gateway is pointed at
//   this proxy and is presented a certificate it already trusts.
//
// =============================================================================

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use axum_server::tls_rustls::RustlsConfig;
use rustls::ServerConfig;
use tracing::info;

use crate::{Error, Result};

/// Build the listener's TLS configuration from PEM files.
///
/// Only HTTP/1.1 is offered over ALPN.
pub fn load_rustls_config(cert: &Path, key: &Path) -> Result<RustlsConfig> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(open(cert)?))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("{}: {}", cert.display(), e)))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!("no certificate found in {}", cert.display())));
    }

    let private_key = rustls_pemfile::private_key(&mut BufReader::new(open(key)?))
        .map_err(|e| Error::Tls(format!("{}: {}", key.display(), e)))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", key.display())))?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, private_key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    info!("🔐 Loaded TLS certificate {}", cert.display());
    Ok(RustlsConfig::from_config(Arc::new(config)))
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::Tls(format!("cannot open {}: {}", path.display(), e)))
}
