pub mod error;

use axum::http::{header::AsHeaderName, HeaderMap};

/// Header value as a string, empty when absent or not valid UTF-8
pub fn header_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
