//! Streaming decoders (Bytes -> JSON Value).
//!
//! Two framings are supported:
//! - canonical SSE: blank-line-separated blocks with a `data:` payload prefix
//!   and a case-insensitive `[DONE]` terminator; non-JSON payloads are
//!   silently dropped,
//! - raw line-delimited text: every non-empty line is a frame; JSON lines are
//!   parsed, anything else is surfaced as a JSON string.
//!
//! Both decoders treat a read timeout on an open stream as graceful
//! completion once at least one byte arrived; a failure before any byte is a
//! real error and is propagated.

use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;

use crate::BoxStream;

/// Wire framing of a streamed response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// `data:`-prefixed, blank-line-separated Server-Sent Events.
    Sse,
    /// Unframed newline-delimited text.
    RawLines,
}

pub trait Decoder: Send + Sync {
    fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value>;
}

pub fn create_decoder(format: StreamFormat) -> Box<dyn Decoder> {
    match format {
        StreamFormat::Sse => Box::new(SseDecoder::default()),
        StreamFormat::RawLines => Box::new(RawLineDecoder),
    }
}

/// Case-insensitive check for the SSE terminator, with or without prefix.
fn is_done_signal(frame: &str) -> bool {
    let t = frame.trim();
    let payload = t
        .strip_prefix("data: ")
        .or_else(|| t.strip_prefix("data:"))
        .map(str::trim_start)
        .unwrap_or(t);
    payload.eq_ignore_ascii_case("[DONE]")
}

/// Shared unfold state: pending input, the text buffer, and whether any bytes
/// have been received (drives the graceful-timeout rule).
struct DecodeState {
    input: BoxStream<'static, Bytes>,
    buf: String,
    received_any: bool,
}

#[derive(Clone, Copy)]
pub struct SseDecoder {
    delimiter: &'static str,
    prefix: &'static str,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            delimiter: "\n\n",
            prefix: "data: ",
        }
    }
}

impl SseDecoder {
    fn parse_payload(&self, raw: &str) -> Option<Value> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || is_done_signal(trimmed) {
            return None;
        }
        // Ignore SSE comment lines
        if trimmed.starts_with(':') {
            return None;
        }
        let payload = if let Some(rest) = trimmed.strip_prefix(self.prefix) {
            rest
        } else if let Some(rest) = trimmed.strip_prefix("data:") {
            rest.trim_start()
        } else {
            trimmed
        };
        // Non-JSON payloads (heartbeats, tokens) are silently ignored.
        serde_json::from_str(payload).ok()
    }
}

impl Decoder for SseDecoder {
    fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
        let delimiter = self.delimiter;
        let decoder = *self;
        let state = DecodeState {
            input,
            buf: String::new(),
            received_any: false,
        };

        // Incrementally buffer bytes and emit full frames split by delimiter.
        let stream = stream::unfold(state, move |mut state| {
            async move {
                loop {
                    // If we have a full frame in buffer, emit it.
                    if let Some(idx) = state.buf.find(delimiter) {
                        let frame = state.buf[..idx].to_string();
                        state.buf = state.buf[idx + delimiter.len()..].to_string();

                        if is_done_signal(&frame) {
                            return None;
                        }
                        if let Some(v) = decoder.parse_payload(&frame) {
                            return Some((Ok(v), state));
                        }
                        // Skip non-JSON frames; keep looping.
                        continue;
                    }

                    match state.input.next().await {
                        Some(Ok(bytes)) => {
                            state.received_any = true;
                            state.buf.push_str(&String::from_utf8_lossy(&bytes));
                            continue;
                        }
                        Some(Err(e)) => {
                            // Connection timed out mid-stream with data already
                            // delivered: graceful completion, not a failure.
                            if state.received_any && e.is_read_timeout() {
                                let rest = std::mem::take(&mut state.buf);
                                return drain_remainder(&decoder, &rest).map(|v| (Ok(v), state));
                            }
                            return Some((Err(e), state));
                        }
                        None => {
                            // EOF: try to parse whatever is left once.
                            let rest = std::mem::take(&mut state.buf);
                            return drain_remainder(&decoder, &rest).map(|v| (Ok(v), state));
                        }
                    }
                }
            }
        });

        Box::pin(stream)
    }
}

fn drain_remainder(decoder: &SseDecoder, buf: &str) -> Option<Value> {
    if is_done_signal(buf) {
        return None;
    }
    decoder.parse_payload(buf)
}

/// Newline-delimited decoder for providers that stream unframed text.
pub struct RawLineDecoder;

impl RawLineDecoder {
    fn parse_line(line: &str) -> Option<Value> {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_done_signal(trimmed) {
            return None;
        }
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(v) = serde_json::from_str(trimmed) {
                return Some(v);
            }
        }
        Some(Value::String(line.to_string()))
    }
}

impl Decoder for RawLineDecoder {
    fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
        let state = DecodeState {
            input,
            buf: String::new(),
            received_any: false,
        };

        let stream = stream::unfold(state, move |mut state| async move {
            loop {
                if let Some(idx) = state.buf.find('\n') {
                    let line = state.buf[..idx].to_string();
                    state.buf = state.buf[idx + 1..].to_string();
                    if let Some(v) = Self::parse_line(&line) {
                        return Some((Ok(v), state));
                    }
                    continue;
                }

                match state.input.next().await {
                    Some(Ok(bytes)) => {
                        state.received_any = true;
                        state.buf.push_str(&String::from_utf8_lossy(&bytes));
                        continue;
                    }
                    Some(Err(e)) => {
                        if state.received_any && e.is_read_timeout() {
                            return Self::parse_line(&std::mem::take(&mut state.buf))
                                .map(|v| (Ok(v), state));
                        }
                        return Some((Err(e), state));
                    }
                    None => {
                        return Self::parse_line(&std::mem::take(&mut state.buf))
                            .map(|v| (Ok(v), state));
                    }
                }
            }
        });

        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn byte_stream(chunks: Vec<&'static str>) -> BoxStream<'static, Bytes> {
        Box::pin(futures::stream::iter(
            chunks.into_iter().map(|s| Ok(Bytes::from(s))),
        ))
    }

    async fn collect(mut stream: BoxStream<'static, Value>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn sse_emits_three_frames_then_stops_on_done() {
        let chunks = vec![
            "data: {\"n\":1}\n\n",
            "data: {\"n\":2}\n\ndata: {\"n\":3}\n\n",
            "data: [DONE]\n\n",
            "data: {\"n\":4}\n\n", // must never be reached
        ];
        let frames = collect(SseDecoder::default().decode_stream(byte_stream(chunks))).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["n"], 1);
        assert_eq!(frames[2]["n"], 3);
    }

    #[tokio::test]
    async fn sse_done_is_case_insensitive() {
        let chunks = vec!["data: {\"n\":1}\n\ndata: [done]\n\ndata: {\"n\":2}\n\n"];
        let frames = collect(SseDecoder::default().decode_stream(byte_stream(chunks))).await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn sse_ignores_non_json_payloads_and_comments() {
        let chunks = vec![
            ": keep-alive\n\n",
            "data: heartbeat\n\n",
            "data: {\"ok\":true}\n\n",
        ];
        let frames = collect(SseDecoder::default().decode_stream(byte_stream(chunks))).await;
        assert_eq!(frames, vec![serde_json::json!({"ok": true})]);
    }

    #[tokio::test]
    async fn sse_frame_split_across_chunks() {
        let chunks = vec!["data: {\"te", "xt\":\"hi\"}", "\n\n"];
        let frames = collect(SseDecoder::default().decode_stream(byte_stream(chunks))).await;
        assert_eq!(frames[0]["text"], "hi");
    }

    #[tokio::test]
    async fn sse_parses_trailing_frame_at_eof() {
        let chunks = vec!["data: {\"n\":1}\n\ndata: {\"n\":2}"];
        let frames = collect(SseDecoder::default().decode_stream(byte_stream(chunks))).await;
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test]
    async fn raw_lines_mix_json_and_text() {
        let chunks = vec!["hello wor", "ld\n{\"n\":1}\npartial tail"];
        let frames = collect(RawLineDecoder.decode_stream(byte_stream(chunks))).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Value::String("hello world".into()));
        assert_eq!(frames[1]["n"], 1);
        assert_eq!(frames[2], Value::String("partial tail".into()));
    }

    #[tokio::test]
    async fn error_before_any_byte_is_propagated() {
        let err_stream: BoxStream<'static, Bytes> =
            Box::pin(futures::stream::iter(vec![Err(crate::Error::Transport(
                crate::transport::TransportError::Other("boom".into()),
            ))]));
        let mut stream = SseDecoder::default().decode_stream(err_stream);
        let first = stream.next().await.unwrap();
        assert!(first.is_err());
    }
}
