// =============================================================================
// HomeHQtt - Main Entry Point
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   Loads configuration, connects to the MQTT broker, and serves the
//   intercepting proxy over TLS until Ctrl+C or SIGTERM.
//
// Runtime Requirements:
//   • A certificate/key pair the gateway trusts for the server's hostname
//   • DNS for that hostname pointed at this process
//   • A reachable MQTT broker
//
// =============================================================================

use std::{sync::Arc, time::Duration};

use axum_server::Handle;
use homehqtt::{
    clap,
    config::proxy::Upstream,
    iot::{spawn_publisher, DeviceStore, MessageBus, MqttBus, Outbox, Publisher, RetryPolicy},
    proxy::{router, tls::load_rustls_config, with_connection_timeouts, ProxyService},
    Config, Result,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Time in-flight exchanges get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Upper bound on flushing queued publications at shutdown
const PUBLISHER_FLUSH: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let args = clap::parse();

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("It looks like your config is invalid. The following error occurred: {e}");
            std::process::exit(1);
        }
    };

    let registry = tracing_subscriber::Registry::default();
    let fmt_layer = tracing_subscriber::fmt::Layer::new();
    let filter_layer = match EnvFilter::try_new(&config.log) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid log filter {:?}: {e}", config.log);
            EnvFilter::new("warn")
        }
    };
    if let Err(e) = tracing::subscriber::set_global_default(registry.with(filter_layer).with(fmt_layer)) {
        eprintln!("Failed to install tracing subscriber: {e}");
    }

    info!("🚀 Starting HomeHQtt {}", clap::version());

    if let Err(e) = run(config).await {
        error!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let endpoint = config.broker_endpoint()?;
    let host = endpoint.dial_host().await?;
    let bus = Arc::new(MqttBus::new(&host, endpoint.port, &config.mqtt));
    bus.connect().await?;
    info!("✅ Connected to MQTT broker {}", config.broker);

    let (outbox, rx) = Outbox::channel();
    let publisher = Publisher::new(
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        config.topic.clone(),
        RetryPolicy::from(&config.mqtt),
    );
    let worker = spawn_publisher(publisher, rx);

    let store = Arc::new(DeviceStore::new(outbox));
    let upstream = Upstream::new(&config.upstream, config.request_timeout())?;
    info!("🔁 Forwarding to {}", upstream.origin());

    let proxy = Arc::new(ProxyService::new(upstream, store, config.max_in_flight_sniffs));
    let tls = load_rustls_config(config.cert_path(), config.key_path())?;
    let app = router(Arc::clone(&proxy), config.request_timeout());

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    let addr = config.socket_addr();
    info!("🚀 HomeHQtt listening on: {}", addr);
    with_connection_timeouts(axum_server::bind_rustls(addr, tls), config.request_timeout())
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    info!("🛑 Listener closed, flushing");
    proxy.sniffers().drain().await;
    drop(proxy);

    if tokio::time::timeout(PUBLISHER_FLUSH, worker).await.is_err() {
        warn!("⚠️ Publisher did not finish within {:?}", PUBLISHER_FLUSH);
    }
    if let Err(e) = bus.disconnect().await {
        warn!("⚠️ MQTT disconnect: {}", e);
    }

    info!("👋 HomeHQtt stopped");
    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let sig: &str;

    tokio::select! {
        _ = ctrl_c => { sig = "Ctrl+C"; },
        _ = terminate => { sig = "SIGTERM"; },
    }

    warn!("Received {}, shutting down...", sig);
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
