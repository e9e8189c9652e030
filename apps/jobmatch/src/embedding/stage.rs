use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::errors::PipelineError;
use crate::models::{EmbeddingMeta, EmbeddingRecord, JobRecord, ResumeEmbedding};
use crate::paths::ArtifactPaths;
use crate::pipeline::{Stage, StageKind, StageReport};
use crate::storage;

/// Characters of resume text kept in the resume embedding file for inspection.
const TEXT_SAMPLE_CHARS: usize = 2000;

/// Embeds every cleaned job and the processed resume with one shared client.
pub struct EmbedStage {
    paths: ArtifactPaths,
    /// `None` when no API key is configured; the stage then fails its precondition.
    client: Option<EmbeddingClient>,
}

impl EmbedStage {
    pub fn new(paths: ArtifactPaths, client: Option<EmbeddingClient>) -> Self {
        Self { paths, client }
    }
}

/// Text sent to the embedding service for one job.
pub fn job_input_text(job: &JobRecord) -> String {
    [
        job.title.trim(),
        job.company_name.trim(),
        job.display_location(),
        job.description.trim(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

#[async_trait]
impl Stage for EmbedStage {
    fn kind(&self) -> StageKind {
        StageKind::Embed
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![
            self.paths.job_embeddings.clone(),
            self.paths.resume_embedding.clone(),
        ]
    }

    fn check_preconditions(&self) -> Result<(), PipelineError> {
        if self.client.is_none() {
            return Err(PipelineError::Precondition("OPENAI_API_KEY is not set".to_string()));
        }
        storage::require_file(&self.paths.cleaned_jobs, "cleaned jobs")?;
        storage::require_file(&self.paths.processed_resume, "processed resume")
    }

    async fn run(&self) -> Result<StageReport, PipelineError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| PipelineError::Precondition("OPENAI_API_KEY is not set".to_string()))?;

        let raw: Vec<Value> = storage::read_json(&self.paths.cleaned_jobs)?;
        let mut jobs = Vec::with_capacity(raw.len());
        let mut skipped = 0usize;
        for (idx, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<JobRecord>(value) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping malformed cleaned job at position {idx}: {e}");
                }
            }
        }

        let resume_text = storage::read_text(&self.paths.processed_resume)?;
        if resume_text.trim().is_empty() {
            return Err(PipelineError::InvalidData(format!(
                "resume text in {} is empty",
                self.paths.processed_resume.display()
            )));
        }

        let inputs: Vec<String> = jobs.iter().map(job_input_text).collect();
        let vectors = client.embed_texts(&inputs).await?;
        let resume_vector = client.embed_one(&resume_text).await?;

        if let Some(first) = vectors.first() {
            if first.len() != resume_vector.len() {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: first.len(),
                    got: resume_vector.len(),
                    index: 0,
                }
                .into());
            }
        }

        let records: Vec<EmbeddingRecord> = jobs
            .iter()
            .zip(vectors)
            .map(|(job, embedding)| EmbeddingRecord {
                job_key: job.job_key.clone(),
                meta: EmbeddingMeta::new(&job.title, &job.company_name, job.display_location()),
                embedding,
            })
            .collect();

        let resume = ResumeEmbedding {
            model: client.model().to_string(),
            embedding: resume_vector,
            text_sample: resume_text.chars().take(TEXT_SAMPLE_CHARS).collect(),
        };

        storage::write_jsonl(&self.paths.job_embeddings, &records)?;
        storage::write_json_pretty(&self.paths.resume_embedding, &resume)?;

        info!(
            "Wrote {} job embeddings to {} and the resume embedding to {}",
            records.len(),
            self.paths.job_embeddings.display(),
            self.paths.resume_embedding.display()
        );
        Ok(StageReport::new(records.len(), skipped))
    }
}
