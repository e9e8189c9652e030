use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::models::{EmbeddingRecord, ResumeEmbedding};
use crate::paths::ArtifactPaths;
use crate::pipeline::{Stage, StageKind, StageReport};
use crate::ranking::{output, rank_candidates};
use crate::storage;

pub const DEFAULT_TOP_N: usize = 10;

/// Ranks the job embeddings against the resume embedding and writes the top results.
pub struct RankStage {
    jobs_path: PathBuf,
    resume_path: PathBuf,
    json_path: PathBuf,
    csv_path: PathBuf,
    top_n: usize,
    print_table: bool,
}

impl RankStage {
    pub fn new(paths: &ArtifactPaths, top_n: usize) -> Self {
        Self {
            jobs_path: paths.job_embeddings.clone(),
            resume_path: paths.resume_embedding.clone(),
            json_path: paths.top_jobs.clone(),
            csv_path: paths.top_jobs_csv.clone(),
            top_n,
            print_table: true,
        }
    }

    /// Reads embeddings from the given files instead of the work directory defaults.
    pub fn with_inputs(mut self, jobs: Option<PathBuf>, resume: Option<PathBuf>) -> Self {
        if let Some(jobs) = jobs {
            self.jobs_path = jobs;
        }
        if let Some(resume) = resume {
            self.resume_path = resume;
        }
        self
    }

    #[cfg(test)]
    pub fn quiet(mut self) -> Self {
        self.print_table = false;
        self
    }
}

#[async_trait]
impl Stage for RankStage {
    fn kind(&self) -> StageKind {
        StageKind::Rank
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.json_path.clone(), self.csv_path.clone()]
    }

    fn check_preconditions(&self) -> Result<(), PipelineError> {
        storage::require_file(&self.jobs_path, "job embeddings")?;
        storage::require_file(&self.resume_path, "resume embedding")
    }

    async fn run(&self) -> Result<StageReport, PipelineError> {
        let (records, skipped): (Vec<EmbeddingRecord>, usize) = storage::read_jsonl_lenient(&self.jobs_path)?;
        let resume: ResumeEmbedding = storage::read_json(&self.resume_path)?;
        if resume.embedding.is_empty() {
            return Err(PipelineError::InvalidData(format!(
                "resume embedding in {} is empty",
                self.resume_path.display()
            )));
        }

        let ranking = rank_candidates(&resume.embedding, records, self.top_n);
        if ranking.rejected > 0 {
            warn!(
                "{} of {} job vectors did not match the resume dimension",
                ranking.rejected, ranking.candidates
            );
        }

        output::write_results(&self.json_path, &self.csv_path, &ranking.results)?;

        if self.print_table {
            print!("{}", output::render_table(&ranking.results, self.top_n));
            println!(
                "\nSaved top results to {} and {}",
                self.json_path.display(),
                self.csv_path.display()
            );
        }
        info!(
            "Ranked {} candidates, kept {}, skipped {} malformed lines",
            ranking.candidates,
            ranking.results.len(),
            skipped
        );
        Ok(StageReport::new(ranking.results.len(), skipped + ranking.rejected))
    }
}
