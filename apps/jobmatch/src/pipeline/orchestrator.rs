//! Stage orchestrator: runs stages strictly in order, one at a time.
//!
//! Per stage: skip check → precondition check → run under timeout →
//! checkpoint → fail-fast or continue.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pipeline::checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};
use crate::pipeline::{SkipReason, Stage, StageFailure, StageKind, StageState};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Stages the operator asked to skip outright.
    pub skip: BTreeSet<StageKind>,
    /// Stages to run even when their checkpoint is complete.
    pub force: BTreeSet<StageKind>,
    pub skip_if_complete: bool,
    pub continue_on_error: bool,
    pub stage_timeout: Option<Duration>,
    /// How many times the acquisition stage may run in one invocation.
    pub max_acquire_runs: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            skip: BTreeSet::new(),
            force: BTreeSet::new(),
            skip_if_complete: true,
            continue_on_error: false,
            stage_timeout: None,
            max_acquire_runs: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: StageKind,
    pub state: StageState,
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub stages: Vec<StageRecord>,
    /// The stage whose failure stopped the pipeline, if fail-fast triggered.
    pub halted_at: Option<StageKind>,
}

impl PipelineReport {
    #[cfg(test)]
    pub fn state_of(&self, stage: StageKind) -> Option<&StageState> {
        self.stages.iter().find(|r| r.stage == stage).map(|r| &r.state)
    }

    pub fn first_failure(&self) -> Option<(StageKind, &StageFailure)> {
        self.stages.iter().find_map(|r| match &r.state {
            StageState::Failed(f) => Some((r.stage, f)),
            _ => None,
        })
    }

    pub fn exit_code(&self) -> u8 {
        self.first_failure().map_or(0, |(_, f)| f.kind.exit_code())
    }

    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Pipeline run {}", self.run_id);
        for record in &self.stages {
            let elapsed = record
                .elapsed
                .map(|d| format!(" ({:.1}s)", d.as_secs_f64()))
                .unwrap_or_default();
            let detail = match &record.state {
                StageState::Skipped(reason) => format!(": {reason}"),
                StageState::Succeeded(r) => format!(
                    ": {} written, {} skipped",
                    r.records_written, r.records_skipped
                ),
                StageState::Failed(f) => format!(": {}", f.message),
                StageState::Pending | StageState::Running => String::new(),
            };
            let _ = writeln!(
                out,
                "  {:<8} {:<20}{}{}",
                record.stage,
                record.state.label(),
                detail,
                elapsed
            );
        }
        if let Some(stage) = self.halted_at {
            let _ = writeln!(out, "Stopped after stage '{stage}' failed.");
        }
        out
    }
}

pub struct Orchestrator {
    stages: Vec<Box<dyn Stage>>,
    checkpoints: Arc<dyn CheckpointStore>,
    options: PipelineOptions,
}

impl Orchestrator {
    pub fn new(
        stages: Vec<Box<dyn Stage>>,
        checkpoints: Arc<dyn CheckpointStore>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            stages,
            checkpoints,
            options,
        }
    }

    pub async fn run(&self) -> PipelineReport {
        let run_id = Uuid::new_v4();
        info!("Starting pipeline run {run_id} with {} stage(s)", self.stages.len());

        let mut records: Vec<StageRecord> = self
            .stages
            .iter()
            .map(|s| StageRecord {
                stage: s.kind(),
                state: StageState::Pending,
                elapsed: None,
            })
            .collect();
        let mut acquire_runs = 0u32;
        let mut halted_at = None;

        for (stage, record) in self.stages.iter().zip(records.iter_mut()) {
            let kind = stage.kind();

            if let Some(reason) = self.skip_reason(stage.as_ref(), acquire_runs) {
                info!("Skipping stage {kind}: {reason}");
                record.state = StageState::Skipped(reason);
                continue;
            }

            if kind == StageKind::Acquire {
                acquire_runs += 1;
            }
            self.execute(stage.as_ref(), run_id, record).await;
            debug_assert!(record.state.is_terminal());

            if matches!(record.state, StageState::Failed(_)) && !self.options.continue_on_error {
                error!("Stopping pipeline: stage {kind} failed");
                halted_at = Some(kind);
                break;
            }
        }

        PipelineReport {
            run_id,
            stages: records,
            halted_at,
        }
    }

    fn skip_reason(&self, stage: &dyn Stage, acquire_runs: u32) -> Option<SkipReason> {
        let kind = stage.kind();
        if self.options.skip.contains(&kind) {
            return Some(SkipReason::Requested);
        }
        if self.options.skip_if_complete && !self.options.force.contains(&kind) {
            match self.checkpoints.is_complete(kind, &stage.outputs()) {
                Ok(true) => return Some(SkipReason::CheckpointPresent),
                Ok(false) => {}
                Err(e) => warn!("Could not read checkpoint for stage {kind}, running it: {e}"),
            }
        }
        if kind == StageKind::Acquire && acquire_runs >= self.options.max_acquire_runs {
            warn!(
                "Refusing to run stage {kind} more than {} time(s) in one invocation",
                self.options.max_acquire_runs
            );
            return Some(SkipReason::RunCapReached);
        }
        None
    }

    async fn execute(&self, stage: &dyn Stage, run_id: Uuid, record: &mut StageRecord) {
        let kind = stage.kind();

        if let Err(e) = stage.check_preconditions() {
            error!("Stage {kind} not run: {e}");
            record.state = StageState::Failed(StageFailure::from_error(&e));
            return;
        }

        info!("Running stage {kind}");
        record.state = StageState::Running;
        let started = Instant::now();

        let result = match self.options.stage_timeout {
            Some(limit) => match tokio::time::timeout(limit, stage.run()).await {
                Ok(outcome) => outcome.map_err(|e| StageFailure::from_error(&e)),
                Err(_) => Err(StageFailure::timeout(limit)),
            },
            None => stage.run().await.map_err(|e| StageFailure::from_error(&e)),
        };
        record.elapsed = Some(started.elapsed());

        let checkpoint = match &result {
            Ok(report) => Checkpoint::new(
                kind,
                CheckpointStatus::Succeeded,
                run_id,
                Some(format!(
                    "{} written, {} skipped",
                    report.records_written, report.records_skipped
                )),
            ),
            Err(failure) => Checkpoint::new(
                kind,
                CheckpointStatus::Failed,
                run_id,
                Some(failure.message.clone()),
            ),
        };
        if let Err(e) = self.checkpoints.save(&checkpoint) {
            warn!("Could not record checkpoint for stage {kind}: {e}");
        }

        record.state = match result {
            Ok(report) => {
                info!(
                    "Stage {kind} succeeded: {} written, {} skipped",
                    report.records_written, report.records_skipped
                );
                StageState::Succeeded(report)
            }
            Err(failure) => {
                error!("Stage {kind} failed: {}", failure.message);
                if let Some(body) = &failure.response_body {
                    error!("Stage {kind} response body: {body}");
                }
                StageState::Failed(failure)
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FailureKind, PipelineError};
    use crate::pipeline::checkpoint::memory::MemoryCheckpointStore;
    use crate::pipeline::StageReport;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        Fail,
        Hang,
    }

    struct FakeStage {
        kind: StageKind,
        behaviour: Behaviour,
        missing_precondition: bool,
        log: Arc<Mutex<Vec<StageKind>>>,
    }

    #[async_trait]
    impl Stage for FakeStage {
        fn kind(&self) -> StageKind {
            self.kind
        }

        fn outputs(&self) -> Vec<PathBuf> {
            vec![PathBuf::from(format!("/work/{}.out", self.kind))]
        }

        fn check_preconditions(&self) -> Result<(), PipelineError> {
            if self.missing_precondition {
                Err(PipelineError::Precondition(format!("{} credential missing", self.kind)))
            } else {
                Ok(())
            }
        }

        async fn run(&self) -> Result<StageReport, PipelineError> {
            self.log.lock().unwrap().push(self.kind);
            match self.behaviour {
                Behaviour::Succeed => Ok(StageReport::new(3, 1)),
                Behaviour::Fail => Err(PipelineError::InvalidData("boom".to_string())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(StageReport::default())
                }
            }
        }
    }

    struct Harness {
        log: Arc<Mutex<Vec<StageKind>>>,
        stages: Vec<Box<dyn Stage>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                log: Arc::new(Mutex::new(Vec::new())),
                stages: Vec::new(),
            }
        }

        fn stage(mut self, kind: StageKind, behaviour: Behaviour) -> Self {
            self.stages.push(Box::new(FakeStage {
                kind,
                behaviour,
                missing_precondition: false,
                log: self.log.clone(),
            }));
            self
        }

        fn stage_missing_precondition(mut self, kind: StageKind) -> Self {
            self.stages.push(Box::new(FakeStage {
                kind,
                behaviour: Behaviour::Succeed,
                missing_precondition: true,
                log: self.log.clone(),
            }));
            self
        }

        fn all_succeeding() -> Self {
            StageKind::ALL
                .iter()
                .fold(Self::new(), |h, &k| h.stage(k, Behaviour::Succeed))
        }

        async fn run(
            self,
            store: Arc<MemoryCheckpointStore>,
            options: PipelineOptions,
        ) -> (PipelineReport, Vec<StageKind>) {
            let orchestrator = Orchestrator::new(self.stages, store, options);
            let report = orchestrator.run().await;
            let log = self.log.lock().unwrap().clone();
            (report, log)
        }
    }

    fn out(kind: StageKind) -> PathBuf {
        PathBuf::from(format!("/work/{kind}.out"))
    }

    #[tokio::test]
    async fn test_all_stages_run_in_declared_order() {
        let store = Arc::new(MemoryCheckpointStore::default());
        let (report, log) = Harness::all_succeeding()
            .run(store.clone(), PipelineOptions::default())
            .await;

        assert_eq!(log, StageKind::ALL.to_vec());
        assert_eq!(report.exit_code(), 0);
        assert!(report.halted_at.is_none());
        for kind in StageKind::ALL {
            assert_eq!(store.record(kind).unwrap().status, CheckpointStatus::Succeeded);
        }
    }

    #[tokio::test]
    async fn test_requested_skip_is_honoured() {
        let store = Arc::new(MemoryCheckpointStore::default());
        let options = PipelineOptions {
            skip: [StageKind::Acquire, StageKind::Embed].into_iter().collect(),
            ..PipelineOptions::default()
        };
        let (report, log) = Harness::all_succeeding().run(store, options).await;

        assert_eq!(log, vec![StageKind::Clean, StageKind::Rank]);
        assert_eq!(
            report.state_of(StageKind::Embed),
            Some(&StageState::Skipped(SkipReason::Requested))
        );
    }

    #[tokio::test]
    async fn test_complete_stage_is_skipped_unless_forced() {
        let store = Arc::new(MemoryCheckpointStore::with_artifacts([
            out(StageKind::Acquire),
            out(StageKind::Clean),
        ]));
        let (report, log) = Harness::all_succeeding()
            .run(store.clone(), PipelineOptions::default())
            .await;
        assert_eq!(log, vec![StageKind::Embed, StageKind::Rank]);
        assert_eq!(
            report.state_of(StageKind::Clean),
            Some(&StageState::Skipped(SkipReason::CheckpointPresent))
        );

        let options = PipelineOptions {
            force: [StageKind::Clean].into_iter().collect(),
            ..PipelineOptions::default()
        };
        let (_, log) = Harness::all_succeeding().run(store, options).await;
        // Embed and Rank now have succeeded records but no outputs, so they rerun too.
        assert_eq!(log, vec![StageKind::Clean, StageKind::Embed, StageKind::Rank]);
    }

    #[tokio::test]
    async fn test_skip_if_complete_disabled_runs_everything() {
        let store = Arc::new(MemoryCheckpointStore::with_artifacts(
            StageKind::ALL.iter().map(|&k| out(k)),
        ));
        let options = PipelineOptions {
            skip_if_complete: false,
            ..PipelineOptions::default()
        };
        let (_, log) = Harness::all_succeeding().run(store, options).await;
        assert_eq!(log, StageKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_fail_fast_halts_and_leaves_rest_pending() {
        let store = Arc::new(MemoryCheckpointStore::default());
        let (report, log) = Harness::new()
            .stage(StageKind::Acquire, Behaviour::Succeed)
            .stage(StageKind::Clean, Behaviour::Fail)
            .stage(StageKind::Embed, Behaviour::Succeed)
            .stage(StageKind::Rank, Behaviour::Succeed)
            .run(store.clone(), PipelineOptions::default())
            .await;

        assert_eq!(log, vec![StageKind::Acquire, StageKind::Clean]);
        assert_eq!(report.halted_at, Some(StageKind::Clean));
        assert_eq!(report.state_of(StageKind::Embed), Some(&StageState::Pending));
        assert_eq!(report.state_of(StageKind::Rank), Some(&StageState::Pending));
        assert_eq!(report.exit_code(), 1);
        assert_eq!(store.record(StageKind::Clean).unwrap().status, CheckpointStatus::Failed);
        assert!(report.render_summary().contains("Stopped after stage 'clean' failed."));
    }

    #[tokio::test]
    async fn test_continue_on_error_runs_later_stages() {
        let store = Arc::new(MemoryCheckpointStore::default());
        let options = PipelineOptions {
            continue_on_error: true,
            ..PipelineOptions::default()
        };
        let (report, log) = Harness::new()
            .stage(StageKind::Acquire, Behaviour::Fail)
            .stage(StageKind::Clean, Behaviour::Succeed)
            .stage(StageKind::Embed, Behaviour::Fail)
            .stage(StageKind::Rank, Behaviour::Succeed)
            .run(store, options)
            .await;

        assert_eq!(log, StageKind::ALL.to_vec());
        assert!(report.halted_at.is_none());
        assert_eq!(report.first_failure().unwrap().0, StageKind::Acquire);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_missing_precondition_does_not_run_stage() {
        let store = Arc::new(MemoryCheckpointStore::default());
        let (report, log) = Harness::new()
            .stage(StageKind::Clean, Behaviour::Succeed)
            .stage_missing_precondition(StageKind::Embed)
            .stage(StageKind::Rank, Behaviour::Succeed)
            .run(store.clone(), PipelineOptions::default())
            .await;

        assert_eq!(log, vec![StageKind::Clean]);
        let (stage, failure) = report.first_failure().unwrap();
        assert_eq!(stage, StageKind::Embed);
        assert_eq!(failure.kind, FailureKind::Precondition);
        assert_eq!(report.exit_code(), 2);
        assert!(store.record(StageKind::Embed).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_has_its_own_exit_code() {
        let store = Arc::new(MemoryCheckpointStore::default());
        let options = PipelineOptions {
            stage_timeout: Some(Duration::from_secs(5)),
            ..PipelineOptions::default()
        };
        let (report, _) = Harness::new()
            .stage(StageKind::Embed, Behaviour::Hang)
            .stage(StageKind::Rank, Behaviour::Succeed)
            .run(store, options)
            .await;

        let (_, failure) = report.first_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(report.exit_code(), 124);
        assert_eq!(report.state_of(StageKind::Rank), Some(&StageState::Pending));
    }

    #[tokio::test]
    async fn test_acquisition_cap_limits_runs() {
        let store = Arc::new(MemoryCheckpointStore::default());
        let (report, log) = Harness::new()
            .stage(StageKind::Acquire, Behaviour::Succeed)
            .stage(StageKind::Acquire, Behaviour::Succeed)
            .run(store, PipelineOptions::default())
            .await;

        assert_eq!(log, vec![StageKind::Acquire]);
        assert_eq!(
            report.stages[1].state,
            StageState::Skipped(SkipReason::RunCapReached)
        );
    }

    #[tokio::test]
    async fn test_zero_acquisition_cap_never_runs_acquire() {
        let store = Arc::new(MemoryCheckpointStore::default());
        let options = PipelineOptions {
            max_acquire_runs: 0,
            ..PipelineOptions::default()
        };
        let (_, log) = Harness::all_succeeding().run(store, options).await;
        assert_eq!(log, vec![StageKind::Clean, StageKind::Embed, StageKind::Rank]);
    }

    #[tokio::test]
    async fn test_rerun_after_failure_resumes_at_failed_stage() {
        let store = Arc::new(MemoryCheckpointStore::default());
        let (_, _) = Harness::new()
            .stage(StageKind::Acquire, Behaviour::Succeed)
            .stage(StageKind::Clean, Behaviour::Fail)
            .run(store.clone(), PipelineOptions::default())
            .await;
        // the successful stage's output now exists on "disk"
        store.present.lock().unwrap().insert(out(StageKind::Acquire));

        let (report, log) = Harness::new()
            .stage(StageKind::Acquire, Behaviour::Succeed)
            .stage(StageKind::Clean, Behaviour::Succeed)
            .run(store, PipelineOptions::default())
            .await;

        assert_eq!(log, vec![StageKind::Clean]);
        assert_eq!(report.exit_code(), 0);
    }
}
