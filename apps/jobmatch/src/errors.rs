use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::EmbeddingError;

/// How the orchestrator classifies a failed stage.
/// Each kind maps onto its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A credential or upstream file was missing; the stage never ran.
    Precondition,
    /// The stage ran and returned an error.
    Error,
    /// The stage exceeded its time limit.
    Timeout,
}

impl FailureKind {
    pub fn exit_code(self) -> u8 {
        match self {
            FailureKind::Error => 1,
            FailureKind::Precondition => 2,
            FailureKind::Timeout => 124,
        }
    }
}

/// Stage-level error type.
/// Record-level problems never surface here; stages absorb and count them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("{service} request failed (status {}): {message}", .status.map_or("n/a".to_string(), |s| s.to_string()))]
    Service {
        service: &'static str,
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV error on {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn json(path: &Path, source: serde_json::Error) -> Self {
        PipelineError::Json {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn csv(path: &Path, source: csv::Error) -> Self {
        PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::Precondition(_) => FailureKind::Precondition,
            _ => FailureKind::Error,
        }
    }

    /// Raw response body of the failing service call, when one was captured.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            PipelineError::Service { body, .. } => body.as_deref(),
            PipelineError::Embedding(e) => e.response_body(),
            _ => None,
        }
    }
}
