// =============================================================================
// HomeHQtt - Upstream Module
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   The one fixed origin every intercepted exchange is forwarded to, and the
//   HTTP client used to reach it.
//
// =============================================================================

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName, Method, Uri};
use bytes::Bytes;
use reqwest::{redirect, Client, Url};
use tracing::{debug, instrument};

use crate::{Error, Result};

/// Headers that only describe a single hop and are never relayed
pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// ## Examples:
/// - Default origin:
/// ```toml
/// upstream = "https://origin.presencepro.com:8443"
/// ```
/// - A local test server:
/// ```toml
/// upstream = "http://127.0.0.1:9000"
/// ```
/// Only the scheme, host and port are used. The inbound request's path is
/// kept; its query string is not forwarded.
///
/// The origin's certificate is not verified.
#[derive(Clone, Debug)]
pub struct Upstream {
    origin: Url,
    client: Client,
}

impl Upstream {
    pub fn new(origin: &str, timeout: Duration) -> Result<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| Error::BadConfig(format!("invalid upstream {:?}: {}", origin, e)))?;
        if !matches!(origin.scheme(), "http" | "https") || origin.host_str().is_none() {
            return Err(Error::BadConfig(format!(
                "upstream must be an http(s) origin, got {}",
                origin
            )));
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(redirect::Policy::none())
            .http1_only()
            .timeout(timeout)
            .build()?;

        Ok(Upstream { origin, client })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Destination for an inbound request: the fixed origin plus the inbound path
    pub fn rewrite(&self, uri: &Uri) -> Url {
        let mut url = self.origin.clone();
        url.set_path(uri.path());
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Blocking round trip of `body` to `url`
    #[instrument(level = "debug", skip(self, headers, body), fields(%url, len = body.len()))]
    pub async fn forward(&self, method: Method, url: Url, headers: &HeaderMap, body: Bytes) -> Result<reqwest::Response> {
        let response = self
            .client
            .request(method, url)
            .headers(request_headers(headers))
            .body(body)
            .send()
            .await?;

        debug!("⬅️ Upstream answered {}", response.status());
        Ok(response)
    }
}

/// Inbound headers to relay upstream.
///
/// `host` and `content-length` are dropped as well; the client derives both
/// from the rewritten URL and the buffered body.
pub fn request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || *name == header::HOST || *name == header::CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Upstream response headers to copy back to the caller
pub fn response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn upstream() -> Upstream {
        Upstream::new("https://origin.presencepro.com:8443", Duration::from_secs(120)).unwrap()
    }

    #[test]
    fn test_rewrite_keeps_only_path() {
        let uri: Uri = "https://192.168.1.20:8443/deviceio/ml?serial=abc".parse().unwrap();
        let url = upstream().rewrite(&uri);
        assert_eq!(url.as_str(), "https://origin.presencepro.com:8443/deviceio/ml");
    }

    #[test]
    fn test_rewrite_origin_form() {
        let uri: Uri = "/espapi/rest/device".parse().unwrap();
        assert_eq!(
            upstream().rewrite(&uri).as_str(),
            "https://origin.presencepro.com:8443/espapi/rest/device"
        );
    }

    #[test]
    fn test_invalid_upstream() {
        assert!(matches!(
            Upstream::new("not a url", Duration::from_secs(1)),
            Err(Error::BadConfig(_))
        ));
        assert!(matches!(
            Upstream::new("ftp://origin.presencepro.com", Duration::from_secs(1)),
            Err(Error::BadConfig(_))
        ));
    }

    #[test]
    fn test_request_headers_filtered() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("origin.presencepro.com:8443"));
        headers.insert("content-length", HeaderValue::from_static("12"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.append("x-custom", HeaderValue::from_static("a"));
        headers.append("x-custom", HeaderValue::from_static("b"));

        let out = request_headers(&headers);
        assert!(out.get("host").is_none());
        assert!(out.get("content-length").is_none());
        assert!(out.get("connection").is_none());
        assert_eq!(out.get("content-type").unwrap(), "application/json");
        assert_eq!(out.get_all("x-custom").iter().count(), 2);
    }

    #[test]
    fn test_response_headers_filtered() {
        let mut headers = HeaderMap::new();
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("content-length", HeaderValue::from_static("2"));

        let out = response_headers(&headers);
        assert!(out.get("transfer-encoding").is_none());
        assert_eq!(out.get("content-type").unwrap(), "application/json");
        assert_eq!(out.get("content-length").unwrap(), "2");
    }
}
