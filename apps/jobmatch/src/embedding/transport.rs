//! HTTP transport for the OpenAI-compatible `/embeddings` endpoint.
//!
//! The client never talks to reqwest directly; it goes through
//! [`EmbeddingTransport`] so batching and retry can be exercised without a
//! network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::retry::Transient;

/// Longest response body kept in error messages.
const BODY_SNIPPET_CHARS: usize = 400;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Rate limiting, a 5xx, or a network failure. Worth retrying.
    #[error(
        "transient failure (status {}): {}",
        .status.map_or("n/a".to_string(), |s| s.to_string()),
        snippet(.body)
    )]
    Transient { status: Option<u16>, body: String },

    /// Authentication failure or malformed request. Never retried.
    #[error("request rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// A 2xx whose body is not the expected vector array.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Transient for TransportError {
    fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient { .. })
    }
}

#[async_trait]
pub trait EmbeddingTransport: Send + Sync {
    /// Embeds one batch. Returns one vector per input, in input order.
    async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    Transient,
    Rejected,
}

pub(crate) fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Transient
    } else {
        StatusClass::Rejected
    }
}

pub(crate) fn snippet(body: &str) -> String {
    match body.char_indices().nth(BODY_SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Parses a successful response body, restoring submission order by `index`.
fn parse_embeddings(body: &str) -> Result<Vec<Vec<f32>>, TransportError> {
    let mut parsed: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::Malformed(format!("{e}; body: {}", snippet(body))))?;
    parsed.data.sort_by_key(|d| d.index);
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct OpenAiTransport {
    client: Client,
    endpoint: String,
    dimensions: Option<usize>,
}

impl OpenAiTransport {
    pub fn new(
        api_key: &str,
        base_url: &str,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "embedding API key is empty");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingTransport for OpenAiTransport {
    async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, TransportError> {
        let request = EmbeddingRequest {
            model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::Transient {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| TransportError::Transient {
            status: Some(status.as_u16()),
            body: format!("failed to read response body: {e}"),
        })?;

        match classify_status(status) {
            StatusClass::Success => {
                debug!("Embedding API returned {} for {} inputs", status, inputs.len());
                parse_embeddings(&body)
            }
            StatusClass::Transient => Err(TransportError::Transient {
                status: Some(status.as_u16()),
                body,
            }),
            StatusClass::Rejected => Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            }),
        }
    }
}
