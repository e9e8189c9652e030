//! Pipeline: resumable, checkpointed execution of the four matching stages.
//!
//! Flow: acquire → clean → embed → rank. Each stage reads its upstream files,
//! writes its own outputs atomically, and is recorded in a checkpoint.
//!
//! Stages are trait objects so the orchestrator can be driven by fakes in tests.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{FailureKind, PipelineError};

pub mod checkpoint;
pub mod orchestrator;

pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use orchestrator::{Orchestrator, PipelineOptions};

// ────────────────────────────────────────────────────────────────────────────
// Stage identity
// ────────────────────────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Acquire,
    Clean,
    Embed,
    Rank,
}

impl StageKind {
    #[cfg(test)]
    pub const ALL: [StageKind; 4] = [
        StageKind::Acquire,
        StageKind::Clean,
        StageKind::Embed,
        StageKind::Rank,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Acquire => "acquire",
            StageKind::Clean => "clean",
            StageKind::Embed => "embed",
            StageKind::Rank => "rank",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stage trait
// ────────────────────────────────────────────────────────────────────────────

/// Summary returned by a stage that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub records_written: usize,
    /// Malformed input records that were skipped rather than failing the stage.
    pub records_skipped: usize,
}

impl StageReport {
    pub fn new(records_written: usize, records_skipped: usize) -> Self {
        Self {
            records_written,
            records_skipped,
        }
    }
}

/// One unit of pipeline work. Implementations must only write their declared
/// outputs, and only once the work has succeeded.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Files whose joint presence marks this stage as complete.
    fn outputs(&self) -> Vec<PathBuf>;

    /// Cheap checks (credentials, upstream files) made before running.
    fn check_preconditions(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn run(&self) -> Result<StageReport, PipelineError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Stage state machine: Pending → {Skipped | Running → {Succeeded | Failed}}
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The operator asked for the stage to be skipped.
    Requested,
    /// The stage's outputs and checkpoint show it already completed.
    CheckpointPresent,
    /// The acquisition stage already used its per-invocation run allowance.
    RunCapReached,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::Requested => "skipped on request",
            SkipReason::CheckpointPresent => "outputs already present",
            SkipReason::RunCapReached => "run cap reached",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Raw service response body, when the failure came from a remote call.
    pub response_body: Option<String>,
}

impl StageFailure {
    pub fn from_error(error: &PipelineError) -> Self {
        Self {
            kind: error.failure_kind(),
            message: error.to_string(),
            response_body: error.response_body().map(str::to_string),
        }
    }

    pub fn timeout(limit: std::time::Duration) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("timed out after {}s", limit.as_secs_f64()),
            response_body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Skipped(SkipReason),
    Succeeded(StageReport),
    Failed(StageFailure),
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageState::Skipped(_) | StageState::Succeeded(_) | StageState::Failed(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageState::Pending => "PENDING",
            StageState::Running => "RUNNING",
            StageState::Skipped(_) => "SKIPPED",
            StageState::Succeeded(_) => "SUCCEEDED",
            StageState::Failed(f) => match f.kind {
                FailureKind::Precondition => "FAILED-PRECONDITION",
                FailureKind::Timeout => "FAILED-TIMEOUT",
                FailureKind::Error => "FAILED",
            },
        }
    }
}
