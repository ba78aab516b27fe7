// =============================================================================
// HomeHQtt - Proxy Front End
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   Terminates the gateway's HTTPS connection, relays every exchange to the
//   fixed upstream origin, and hands a copy of each body to the sniffer.
//
//   Per exchange: rewrite destination, tee request body, forward, copy
//   response headers, tee response body, return response. A failure in any
//   step answers that one exchange with 503.
//
// =============================================================================

pub mod sniff;
pub mod tee;
pub mod tls;

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::any,
    BoxError, Router,
};
use axum_server::Server;
use homehqtt_iot::{DeviceStore, Direction, GatewayMap};
use hyper_util::rt::TokioTimer;
use serde::Serialize;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::config::proxy::{response_headers, Upstream};
use crate::utils::header_str;
use crate::Result;

pub use sniff::SniffPool;
pub use tee::{tee, TeeError};

/// Forwarding front end shared by every connection
pub struct ProxyService {
    upstream: Upstream,
    sniffers: SniffPool,
}

impl ProxyService {
    pub fn new(upstream: Upstream, store: Arc<DeviceStore>, max_in_flight_sniffs: usize) -> Self {
        ProxyService {
            upstream,
            sniffers: SniffPool::new(store, max_in_flight_sniffs),
        }
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        self.sniffers.store()
    }

    pub fn sniffers(&self) -> &SniffPool {
        &self.sniffers
    }

    /// Relay one exchange, answering 503 if it cannot be completed
    pub async fn handle(&self, req: Request) -> Response {
        match self.exchange(req).await {
            Ok(response) => response,
            Err(e) => {
                error!("❌ Exchange failed: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
        }
    }

    /// Relay one exchange
    #[instrument(level = "debug", skip_all)]
    pub async fn exchange(&self, req: Request) -> Result<Response> {
        let (parts, body) = req.into_parts();

        let url = self.upstream.rewrite(&parts.uri);
        debug!("➡️ {} {}", parts.method, url);

        let (forward_body, sniff_body) = tee(body.into_data_stream()).await?;
        self.sniffers
            .sniff(Direction::Request, content_type(&parts.headers), sniff_body);

        let upstream = self
            .upstream
            .forward(parts.method, url, &parts.headers, forward_body)
            .await?;

        let status = upstream.status();
        let headers = response_headers(upstream.headers());

        let (reply_body, sniff_body) = tee(upstream.bytes_stream()).await?;
        self.sniffers
            .sniff(Direction::Response, content_type(&headers), sniff_body);

        let mut response = Response::new(Body::from(reply_body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn content_type(headers: &HeaderMap) -> String {
    header_str(headers, header::CONTENT_TYPE)
}

/// Read-only view of the store
#[derive(Debug, Serialize)]
pub struct Diagnostics {
    pub devices: GatewayMap,
    /// Background sniff tasks still running
    #[serde(rename = "numGoRoutines")]
    pub in_flight: usize,
}

/// Build the listener's router: `/debug` is served locally, every other
/// path is relayed upstream.
///
/// An exchange still running after `timeout` is answered with 503, the same
/// status an upstream failure gets.
pub fn router(proxy: Arc<ProxyService>, timeout: Duration) -> Router {
    Router::new()
        .route("/debug", any(debug_snapshot))
        .fallback(mitm)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(exchange_timed_out))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(proxy)
}

/// Bound how long an inbound connection may take to deliver request headers,
/// including while it sits idle between keep-alive requests.
pub fn with_connection_timeouts<A>(mut server: Server<A>, timeout: Duration) -> Server<A> {
    server
        .http_builder()
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeout)
        .keep_alive(true);
    server
}

async fn exchange_timed_out(err: BoxError) -> (StatusCode, String) {
    warn!("⏱️ Exchange aborted: {}", err);
    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
}

async fn mitm(State(proxy): State<Arc<ProxyService>>, req: Request) -> Response {
    let span = info_span!(
        "exchange",
        id = %Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    proxy.handle(req).instrument(span).await
}

async fn debug_snapshot(State(proxy): State<Arc<ProxyService>>) -> Json<Diagnostics> {
    Json(Diagnostics {
        devices: proxy.store().snapshot().await,
        in_flight: proxy.sniffers().in_flight(),
    })
}
