// =============================================================================
// HomeHQtt - Tee Splitter
// =============================================================================
//
// Project: HomeHQtt - MQTT adapter for the Origin HomeHQ gateway
// Author: HomeHQtt Development Team
// Date: 2026-10-17
// Version: 0.1.0
// License: Apache 2.0 / MIT
//
// Description:
//   Duplicates a body stream into two complete, independent buffers: one is
//   forwarded untouched, the other is handed to the sniffer.
//
// =============================================================================

use std::error::Error as StdError;

use bytes::{Bytes, BytesMut};
use futures_util::{pin_mut, Stream, StreamExt};
use thiserror::Error;
use tracing::trace;

/// Failure to read a body to its end
#[derive(Debug, Error)]
#[error("body read error: {source}")]
pub struct TeeError {
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

/// Read `source` to its end and return two copies of its content.
///
/// The source is consumed and dropped. Either both buffers hold the full
/// content or an error is returned; a partial read is never exposed.
pub async fn tee<S, B, E>(source: S) -> Result<(Bytes, Bytes), TeeError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    pin_mut!(source);

    let mut buf = BytesMut::new();
    while let Some(chunk) = source.next().await {
        let chunk = chunk.map_err(|e| TeeError { source: e.into() })?;
        buf.extend_from_slice(chunk.as_ref());
    }

    trace!("teed {} bytes", buf.len());
    let first = buf.freeze();
    let second = first.clone();
    Ok((first, second))
}
