//! Streaming relay: re-frame backend chunks as server-sent events.
//!
//! Each [`BackendChunk`] becomes exactly one [`RelayFrame`], in receipt
//! order. Frames are produced lazily inside a generator, so the next one
//! is not built until the transport has consumed the previous — the
//! client's pace is the only buffer.

use crate::backend::BackendChunk;
use crate::error::{GatewayError, Result};

use futures::stream::Stream;
use futures::StreamExt;

/// Event name applied when a chunk carries no `type` discriminator.
pub const DEFAULT_EVENT: &str = "completion";

/// The wire-level unit sent to the client: one `event:`/`data:` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFrame {
    pub event: String,
    pub data: String,
}

impl RelayFrame {
    /// Encode as a raw SSE record.
    #[must_use]
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

/// Turn a chunk into its frame: parse the JSON payload, read `type`
/// (defaulting to `"completion"`), re-encode the payload as the data line.
///
/// # Errors
/// Returns `GatewayError::MalformedChunk` when the payload is not a JSON
/// object; the relay treats this as fatal for the stream.
pub fn frame_chunk(chunk: &BackendChunk) -> Result<RelayFrame> {
    let value: serde_json::Value = serde_json::from_slice(&chunk.bytes)
        .map_err(|e| GatewayError::malformed_chunk(format!("Unparseable chunk payload: {e}")))?;

    let event = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or(DEFAULT_EVENT)
        .to_string();

    let data = serde_json::to_string(&value)?;

    Ok(RelayFrame { event, data })
}

/// Relay a finite chunk stream as a frame stream: one frame per chunk,
/// order preserved, forward-only, not restartable.
///
/// A malformed chunk or an upstream error terminates the stream with an
/// `Err` item; frames already yielded stand. Dropping the returned stream
/// drops `chunks` with it, which propagates cancellation down to the
/// backend connection.
pub fn relay<S>(chunks: S) -> impl Stream<Item = Result<RelayFrame>> + Send + 'static
where
    S: Stream<Item = Result<BackendChunk>> + Send + 'static,
{
    async_stream::stream! {
        tokio::pin!(chunks);

        while let Some(item) = chunks.next().await {
            match item.and_then(|chunk| frame_chunk(&chunk)) {
                Ok(frame) => yield Ok(frame),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    }
}
