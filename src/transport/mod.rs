//! Streaming HTTP transport shared by all provider adapters.
//!
//! One pooled `reqwest` client serves every outbound call; decoding of the
//! response body into a frame stream is delegated to [`decode`] based on the
//! profile's framing. All I/O runs on the tokio runtime — delivery of frames
//! may happen on any worker thread, never assume thread affinity.

pub mod decode;

use std::env;
use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Proxy;
use serde_json::Value;
use tracing::debug;

use crate::{BoxStream, Result};
use decode::{create_decoder, StreamFormat};

/// Longest error-body excerpt carried on a status error.
const MAX_BODY_SNIPPET: usize = 400;

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Minimal production-friendly defaults (env-overridable).
        let timeout_secs = env::var("AI_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(
                env::var("AI_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .cookie_store(true);

        if let Ok(proxy_url) = env::var("AI_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self { client })
    }

    /// POST a JSON body and decode the response into a frame stream.
    ///
    /// Non-2xx responses become [`TransportError::Status`] with a bounded
    /// body snippet. A read timeout after the first received byte is treated
    /// by the decoders as graceful end-of-stream.
    pub async fn post_stream(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
        format: StreamFormat,
    ) -> Result<BoxStream<'static, Value>> {
        let mut req = self.client.post(url).json(body);
        for (name, value) in headers {
            req = req.header(name, value);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;
        let resp = Self::check_status(resp).await?;

        debug!(url, ?format, "opened response stream");
        let byte_stream: BoxStream<'static, Bytes> = Box::pin(
            resp.bytes_stream()
                .map_err(|e| crate::Error::Transport(TransportError::Http(e))),
        );
        Ok(create_decoder(format).decode_stream(byte_stream))
    }

    /// POST a JSON body and return the parsed JSON response (batched calls).
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<Value> {
        let mut req = self.client.post(url).json(body);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;
        let resp = Self::check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))
    }

    /// POST a multipart form and return the raw response text. Used by the
    /// web endpoints that speak `f.req`-style envelopes instead of JSON.
    pub async fn post_form(
        &self,
        url: &str,
        headers: &[(String, String)],
        fields: &[(String, String)],
    ) -> Result<String> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
        }
        let mut req = self.client.post(url).multipart(form);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;
        let resp = Self::check_status(resp).await?;
        resp.text()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))
    }

    /// GET a URL as text (token mining, warm-up pages).
    pub async fn get_text(&self, url: &str, headers: &[(String, String)]) -> Result<String> {
        let mut req = self.client.get(url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;
        let resp = Self::check_status(resp).await?;
        resp.text()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))
    }

    /// GET a URL as JSON.
    pub async fn get_json(&self, url: &str, headers: &[(String, String)]) -> Result<Value> {
        let mut req = self.client.get(url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;
        let resp = Self::check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(crate::Error::Transport(TransportError::Status {
            status: status.as_u16(),
            snippet: truncate_snippet(&body),
        }))
    }
}

/// Bound an error body to [`MAX_BODY_SNIPPET`] characters for reporting.
pub(crate) fn truncate_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_BODY_SNIPPET {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_BODY_SNIPPET).collect();
        format!("{cut}...")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {snippet}")]
    Status { status: u16, snippet: String },

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            TransportError::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_is_bounded_to_400_chars() {
        let long = "x".repeat(1000);
        let snippet = truncate_snippet(&long);
        assert_eq!(snippet.chars().count(), 403); // 400 + "..."
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn short_snippet_is_untouched() {
        assert_eq!(truncate_snippet("  bad request \n"), "bad request");
    }
}
