//! Batching embedding client.
//!
//! Texts are truncated, split into fixed-size batches, and sent one batch at a
//! time. Each batch is retried on transient failures per the configured
//! [`RetryPolicy`]; any other failure aborts the whole call.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::embedding::transport::{EmbeddingTransport, TransportError};
use crate::embedding::EmbeddingError;
use crate::retry::{retry, RetryError, RetryPolicy};

/// Appended to any input cut at `max_input_chars`.
pub const TRUNCATION_MARKER: &str = " ... (truncated)";

/// Cuts `text` to at most `max_chars` characters, appending [`TRUNCATION_MARKER`] when cut.
pub fn truncate_input(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Clone)]
pub struct EmbeddingClient {
    transport: Arc<dyn EmbeddingTransport>,
    model: String,
    batch_size: usize,
    max_input_chars: usize,
    batch_pause: Duration,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(transport: Arc<dyn EmbeddingTransport>, config: &EmbeddingConfig) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            max_input_chars: config.max_input_chars,
            batch_pause: config.batch_pause,
            retry: config.retry.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embeds `texts`, returning exactly one vector per text in the same order.
    /// Every returned vector has the same dimensionality.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared: Vec<String> = texts
            .iter()
            .map(|t| truncate_input(t, self.max_input_chars))
            .collect();
        let total_batches = prepared.len().div_ceil(self.batch_size);
        info!(
            "Embedding {} texts in {} batch(es) of up to {} with model {}",
            prepared.len(),
            total_batches,
            self.batch_size,
            self.model
        );

        let mut vectors = Vec::with_capacity(prepared.len());
        for (batch_idx, batch) in prepared.chunks(self.batch_size).enumerate() {
            if batch_idx > 0 && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
            let embedded = self.embed_batch(batch_idx, batch).await?;
            debug!("Batch {}/{} embedded ({} vectors)", batch_idx + 1, total_batches, embedded.len());
            vectors.extend(embedded);
        }

        check_uniform_dimension(&vectors)?;
        Ok(vectors)
    }

    /// Embeds a single text as a one-element batch.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            got: 0,
        })
    }

    async fn embed_batch(&self, batch_idx: usize, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let label = format!("Embedding batch {}", batch_idx + 1);
        let result = retry(&self.retry, &label, |_| async move {
            let vectors = self.transport.embed(&self.model, batch).await?;
            if vectors.len() != batch.len() {
                return Err(TransportError::Malformed(format!(
                    "received {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }
            Ok(vectors)
        })
        .await;

        result.map_err(|e| match e {
            RetryError::Aborted { error, .. } => EmbeddingError::from_transport(error),
            RetryError::Exhausted { attempts, last } => EmbeddingError::exhausted(attempts, last),
        })
    }
}

fn check_uniform_dimension(vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let expected = first.len();
    match vectors.iter().position(|v| v.len() != expected) {
        Some(index) => Err(EmbeddingError::DimensionMismatch {
            expected,
            got: vectors[index].len(),
            index,
        }),
        None => Ok(()),
    }
}
