//! Embedding client: the single point of entry for all embedding API calls.
//!
//! Job texts and the resume text go through the same [`EmbeddingClient`], so
//! both sides of the comparison share a model and a dimensionality.

use thiserror::Error;

pub mod client;
pub mod stage;
pub mod transport;

pub use client::{truncate_input, EmbeddingClient};
pub use stage::EmbedStage;
pub use transport::{OpenAiTransport, TransportError};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding API rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Embedding API still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: String,
        /// Body of the last failed response, when the service answered at all.
        body: Option<String>,
    },

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Expected {expected} embeddings, received {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("Embedding at position {index} has {got} dimensions, expected {expected}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        index: usize,
    },
}

impl EmbeddingError {
    pub(crate) fn from_transport(error: TransportError) -> Self {
        match error {
            TransportError::Rejected { status, body } => EmbeddingError::Rejected { status, body },
            TransportError::Malformed(msg) => EmbeddingError::MalformedResponse(msg),
            // Only reachable if a transient error is surfaced without retrying.
            transient @ TransportError::Transient { .. } => EmbeddingError::exhausted(1, transient),
        }
    }

    pub(crate) fn exhausted(attempts: u32, last: TransportError) -> Self {
        let message = last.to_string();
        let body = match last {
            TransportError::Transient {
                status: Some(_),
                body,
            } => Some(body),
            _ => None,
        };
        EmbeddingError::RetriesExhausted {
            attempts,
            last: message,
            body,
        }
    }

    /// Raw body of the rejecting response, for payload debugging.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            EmbeddingError::Rejected { body, .. } => Some(body),
            EmbeddingError::RetriesExhausted { body, .. } => body.as_deref(),
            _ => None,
        }
    }
}
