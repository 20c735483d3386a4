//! Backend invoker: the one component that performs network I/O against
//! the Bedrock Runtime inference service.
//!
//! Two call modes mirror the two Bedrock invoke endpoints: a single
//! blocking round trip (`invoke`) and an incremental chunk stream
//! (`invoke-with-response-stream`). No retries, no caching; failures
//! propagate to the caller unchanged.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::logging::SharedLogger;
use crate::translate::NormalizedRequest;

use base64::Engine;
use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;

/// One unit of the backend's incremental output: the raw bytes of a
/// single JSON object, envelope already stripped.
#[derive(Debug, Clone)]
pub struct BackendChunk {
    pub bytes: Bytes,
}

/// Invoke the model with a single blocking call, returning the raw
/// response body.
///
/// # Errors
/// Returns `GatewayError::Backend` on transport failure or a non-2xx
/// backend status; the failure is surfaced unchanged, never retried.
pub async fn invoke_blocking(
    client: &reqwest::Client,
    config: &GatewayConfig,
    req: &NormalizedRequest,
    logger: &SharedLogger,
) -> Result<String> {
    let credential = config.resolve_credential()?;
    let url = format!(
        "{}/model/{}/invoke",
        config.effective_base_url(),
        req.model_id
    );

    logger.info("backend", format!("POST {url}"));

    let response = client
        .post(&url)
        .bearer_auth(&credential)
        .header("accept", "application/json")
        .header("content-type", "application/json")
        .json(&req.body_value())
        .send()
        .await
        .map_err(|e| GatewayError::backend(None, format!("Request failed: {e}")))?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| GatewayError::backend(Some(status), format!("Failed to read body: {e}")))?;

    if status >= 400 {
        logger.warn(
            "backend",
            format!("Invoke failed status={} body={}", status, truncate(&body, 300)),
        );
        return Err(GatewayError::backend(
            Some(status),
            format!("Backend returned status {status}: {}", truncate(&body, 500)),
        ));
    }

    logger.debug(
        "backend",
        format!("Invoke ok status={status} body_len={}", body.len()),
    );

    Ok(body)
}

/// Invoke the model with the response-stream endpoint, yielding one
/// [`BackendChunk`] per backend event as it arrives.
///
/// The stream is finite and forward-only. A transport error mid-stream
/// surfaces as a terminal `Err` item rather than a silent end; dropping
/// the stream drops the underlying connection.
///
/// # Errors
/// Returns `GatewayError::Backend` if the call cannot be opened or the
/// backend answers with a non-2xx status.
pub async fn invoke_streaming(
    client: &reqwest::Client,
    config: &GatewayConfig,
    req: &NormalizedRequest,
    logger: &SharedLogger,
) -> Result<impl Stream<Item = Result<BackendChunk>> + Send + 'static> {
    let credential = config.resolve_credential()?;
    let url = format!(
        "{}/model/{}/invoke-with-response-stream",
        config.effective_base_url(),
        req.model_id
    );

    logger.info("backend", format!("POST {url} (streaming)"));

    let response = client
        .post(&url)
        .bearer_auth(&credential)
        .header("accept", "application/json")
        .header("content-type", "application/json")
        .json(&req.body_value())
        .send()
        .await
        .map_err(|e| GatewayError::backend(None, format!("Streaming request failed: {e}")))?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        logger.warn(
            "backend",
            format!("Stream open failed status={} body={}", status, truncate(&body, 300)),
        );
        return Err(GatewayError::backend(
            Some(status),
            format!("Backend returned status {status}: {}", truncate(&body, 500)),
        ));
    }

    Ok(chunk_stream(response.bytes_stream(), logger.clone()))
}

/// Split a backend byte stream into per-event chunks, one complete line
/// per chunk. Chunks are yielded lazily, so the consumer's pace bounds
/// how far ahead we read.
fn chunk_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    logger: SharedLogger,
) -> impl Stream<Item = Result<BackendChunk>> + Send + 'static {
    async_stream::stream! {
        let mut buffer = String::new();

        tokio::pin!(byte_stream);

        while let Some(piece) = byte_stream.next().await {
            let piece = match piece {
                Ok(p) => p,
                Err(e) => {
                    logger.error("backend", format!("Byte stream error: {e}"));
                    yield Err(GatewayError::backend(
                        None,
                        format!("Stream failed mid-flight: {e}"),
                    ));
                    return;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&piece));

            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].trim().to_string();
                buffer = buffer[newline_pos + 1..].to_string();

                if line.is_empty() {
                    continue;
                }

                match decode_chunk_line(&line) {
                    Ok(chunk) => yield Ok(chunk),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        // A final event without a trailing newline still counts.
        let rest = buffer.trim();
        if !rest.is_empty() {
            match decode_chunk_line(rest) {
                Ok(chunk) => yield Ok(chunk),
                Err(e) => yield Err(e),
            }
        }

        logger.debug("backend", "Stream closed by backend");
    }
}

/// Decode one wire line into a chunk. Bedrock frames each event as
/// `{"chunk":{"bytes":"<base64>"}}`; a bare JSON object line is accepted
/// as the chunk payload itself.
fn decode_chunk_line(line: &str) -> Result<BackendChunk> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| GatewayError::malformed_chunk(format!("Unparseable event line: {e}")))?;

    if let Some(encoded) = value
        .get("chunk")
        .and_then(|c| c.get("bytes"))
        .and_then(|b| b.as_str())
    {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                GatewayError::malformed_chunk(format!("Invalid base64 in chunk envelope: {e}"))
            })?;
        return Ok(BackendChunk {
            bytes: Bytes::from(decoded),
        });
    }

    Ok(BackendChunk {
        bytes: Bytes::from(line.to_string()),
    })
}

/// Cut long diagnostic bodies down to roughly `max` bytes, backing off
/// to the nearest char boundary so multi-byte text never splits.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    &s[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_enveloped_chunk() {
        let payload = r#"{"type":"content_block_delta","x":1}"#;
        let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
        let line = format!(r#"{{"chunk":{{"bytes":"{encoded}"}}}}"#);

        let chunk = decode_chunk_line(&line).unwrap();
        assert_eq!(chunk.bytes, Bytes::from(payload));
    }

    #[test]
    fn test_decode_bare_json_line() {
        let line = r#"{"type":"completion","completion":"hi"}"#;
        let chunk = decode_chunk_line(line).unwrap();
        assert_eq!(chunk.bytes, Bytes::from(line));
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        let err = decode_chunk_line("not json at all").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedChunk { .. }));
    }

    #[test]
    fn test_decode_bad_base64_is_malformed() {
        let line = r#"{"chunk":{"bytes":"!!!not-base64!!!"}}"#;
        let err = decode_chunk_line(line).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedChunk { .. }));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // 600 bytes of 3-byte chars; byte 500 falls mid-character.
        let body = "€".repeat(200);
        let cut = truncate(&body, 500);
        assert_eq!(cut.len(), 498);
        assert!(cut.chars().all(|c| c == '€'));

        let ascii = "x".repeat(600);
        assert_eq!(truncate(&ascii, 500).len(), 500);

        let short = "short";
        assert_eq!(truncate(short, 500), "short");
    }
}
