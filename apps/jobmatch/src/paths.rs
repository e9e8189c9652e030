use std::path::{Path, PathBuf};

/// Locations of every artifact the pipeline reads or writes, rooted at one work directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub work_dir: PathBuf,
    pub raw_response: PathBuf,
    pub listings: PathBuf,
    pub cleaned_jobs: PathBuf,
    pub cleaned_jobs_csv: PathBuf,
    pub processed_resume: PathBuf,
    pub resume_sections: PathBuf,
    pub job_embeddings: PathBuf,
    pub resume_embedding: PathBuf,
    pub top_jobs: PathBuf,
    pub top_jobs_csv: PathBuf,
    pub checkpoint_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        let dir = work_dir.as_ref();
        Self {
            work_dir: dir.to_path_buf(),
            raw_response: dir.join("indeed_response_raw.json"),
            listings: dir.join("stage1_jobs.json"),
            cleaned_jobs: dir.join("cleaned_jobs.json"),
            cleaned_jobs_csv: dir.join("cleaned_jobs.csv"),
            processed_resume: dir.join("processed_resume.txt"),
            resume_sections: dir.join("resume_sections.json"),
            job_embeddings: dir.join("jobs_embeddings.jsonl"),
            resume_embedding: dir.join("resume_embedding.json"),
            top_jobs: dir.join("top_jobs.json"),
            top_jobs_csv: dir.join("top_jobs.csv"),
            checkpoint_dir: dir.join(".checkpoints"),
        }
    }
}
