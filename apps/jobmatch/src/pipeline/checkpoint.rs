//! Checkpoint records: one JSON file per stage under the checkpoint directory.
//!
//! A stage counts as complete when all of its declared outputs exist and its
//! latest record (if there is one) says it succeeded. Outputs left over from
//! an earlier run with no record still count, so hand-placed files are honoured.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::pipeline::StageKind;
use crate::storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: StageKind,
    pub status: CheckpointStatus,
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub detail: Option<String>,
}

impl Checkpoint {
    pub fn new(stage: StageKind, status: CheckpointStatus, run_id: Uuid, detail: Option<String>) -> Self {
        Self {
            stage,
            status,
            timestamp: Utc::now(),
            run_id,
            detail,
        }
    }
}

/// Narrow interface through which the orchestrator reads and writes resumption state.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, stage: StageKind) -> Result<Option<Checkpoint>, PipelineError>;

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), PipelineError>;

    fn artifacts_present(&self, outputs: &[PathBuf]) -> bool {
        outputs.iter().all(|p| p.is_file())
    }

    /// Whether a stage with these outputs may be skipped as already done.
    fn is_complete(&self, stage: StageKind, outputs: &[PathBuf]) -> Result<bool, PipelineError> {
        if outputs.is_empty() || !self.artifacts_present(outputs) {
            return Ok(false);
        }
        Ok(self
            .load(stage)?
            .map_or(true, |c| c.status == CheckpointStatus::Succeeded))
    }
}

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, stage: StageKind) -> PathBuf {
        self.dir.join(format!("{stage}.json"))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, stage: StageKind) -> Result<Option<Checkpoint>, PipelineError> {
        let path = self.path_for(stage);
        if !path.is_file() {
            return Ok(None);
        }
        storage::read_json(&path).map(Some)
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), PipelineError> {
        storage::write_json_pretty(&self.path_for(checkpoint.stage), checkpoint)
    }
}
