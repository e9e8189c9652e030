//! Cleaning: turns raw listings into normalised job records and the resume
//! file into plain processed text.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::acquisition::flatten::{first_text, value_text};
use crate::config::{CleaningConfig, MissingPolicy};
use crate::embedding::truncate_input;
use crate::errors::PipelineError;
use crate::models::JobRecord;
use crate::paths::ArtifactPaths;
use crate::pipeline::{Stage, StageKind, StageReport};
use crate::storage;

pub mod resume;
pub mod text;

use text::{html_to_text, normalize_location, normalize_whitespace, remove_special_characters};

/// Placeholder for empty fields under [`MissingPolicy::Fill`].
const MISSING: &str = "n/a";
/// Description length kept in the CSV view.
const CSV_DESCRIPTION_CHARS: usize = 1000;

fn clean_field(value: &str, config: &CleaningConfig) -> String {
    let mut out = if config.lowercase {
        value.to_lowercase()
    } else {
        value.to_string()
    };
    if config.remove_special_chars {
        out = remove_special_characters(&out);
    }
    normalize_whitespace(&out)
}

fn or_missing(value: String) -> String {
    if value.is_empty() {
        MISSING.to_string()
    } else {
        value
    }
}

/// Cleans one raw listing.
///
/// Returns `None` when the entry is not an object, or when the drop policy is
/// active and the title or description is empty.
pub fn preprocess_listing(raw: &Value, config: &CleaningConfig) -> Option<JobRecord> {
    let obj = raw.as_object()?;

    let title = first_text(obj, &["title", "jobTitle"]).unwrap_or_default();
    let company = first_text(obj, &["companyName", "company"]).unwrap_or_default();
    let location_raw = first_text(obj, &["formattedAddress", "formattedAddressLong"]).unwrap_or_else(|| {
        let city = first_text(obj, &["city", "location"]).unwrap_or_default();
        let state = first_text(obj, &["state"]).unwrap_or_default();
        format!("{city} {state}").trim().to_string()
    });
    let description = first_text(obj, &["descriptionText", "description"])
        .or_else(|| first_text(obj, &["descriptionHtml"]).map(|html| html_to_text(&html)))
        .unwrap_or_default();

    let mut record = JobRecord {
        job_key: first_text(obj, &["job_key", "jobKey", "job_id"]),
        title: clean_field(&title, config),
        company_name: clean_field(&company, config),
        location_normalized: normalize_location(&location_raw),
        location_raw,
        date_published: obj.get("datePublished").and_then(value_text),
        job_url: first_text(obj, &["jobUrl", "url"]),
        salary_text: first_text(obj, &["salary_text"]),
        description: clean_field(&description, config),
    };

    match config.missing_policy {
        MissingPolicy::Drop if record.title.is_empty() || record.description.is_empty() => None,
        MissingPolicy::Drop => Some(record),
        MissingPolicy::Fill => {
            record.title = or_missing(record.title);
            record.company_name = or_missing(record.company_name);
            record.location_normalized = or_missing(record.location_normalized);
            record.description = or_missing(record.description);
            Some(record)
        }
    }
}

/// Row of the cleaned jobs CSV view.
#[derive(Debug, Serialize)]
struct CleanedJobRow<'a> {
    job_key: &'a str,
    title: &'a str,
    #[serde(rename = "companyName")]
    company_name: &'a str,
    location_normalized: &'a str,
    #[serde(rename = "datePublished")]
    date_published: &'a str,
    #[serde(rename = "jobUrl")]
    job_url: &'a str,
    salary_text: &'a str,
    description: String,
}

impl CleanedJobRow<'_> {
    const HEADER: [&'static str; 8] = [
        "job_key",
        "title",
        "companyName",
        "location_normalized",
        "datePublished",
        "jobUrl",
        "salary_text",
        "description",
    ];
}

impl<'a> From<&'a JobRecord> for CleanedJobRow<'a> {
    fn from(job: &'a JobRecord) -> Self {
        Self {
            job_key: job.job_key.as_deref().unwrap_or_default(),
            title: &job.title,
            company_name: &job.company_name,
            location_normalized: &job.location_normalized,
            date_published: job.date_published.as_deref().unwrap_or_default(),
            job_url: job.job_url.as_deref().unwrap_or_default(),
            salary_text: job.salary_text.as_deref().unwrap_or_default(),
            description: truncate_input(&job.description, CSV_DESCRIPTION_CHARS),
        }
    }
}

pub struct CleanStage {
    paths: ArtifactPaths,
    resume_path: PathBuf,
    config: CleaningConfig,
}

impl CleanStage {
    pub fn new(paths: ArtifactPaths, resume_path: PathBuf, config: CleaningConfig) -> Self {
        Self {
            paths,
            resume_path,
            config,
        }
    }

    fn clean_listings(&self) -> Result<(Vec<JobRecord>, usize), PipelineError> {
        let raw: Vec<Value> = storage::read_json(&self.paths.listings)?;
        let total = raw.len();
        let cleaned: Vec<JobRecord> = raw
            .iter()
            .filter_map(|listing| preprocess_listing(listing, &self.config))
            .collect();
        let skipped = total - cleaned.len();
        if skipped > 0 {
            warn!("Skipped {skipped} of {total} listings (malformed or missing required fields)");
        }
        Ok((cleaned, skipped))
    }

    async fn process_resume(&self) -> Result<(String, resume::ResumeSections), PipelineError> {
        let path = self.resume_path.clone();
        let raw = tokio::task::spawn_blocking(move || resume::read_resume(&path))
            .await
            .map_err(|e| {
                PipelineError::Internal(anyhow::anyhow!(
                    "resume text extraction aborted for {}: {e}",
                    self.resume_path.display()
                ))
            })??;

        let sections = resume::split_sections(&raw);
        let full = sections.get("full").map_or(raw.as_str(), String::as_str);
        let cleaned = resume::clean_resume_text(full, &self.config);
        Ok((cleaned, sections))
    }
}

#[async_trait]
impl Stage for CleanStage {
    fn kind(&self) -> StageKind {
        StageKind::Clean
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![
            self.paths.cleaned_jobs.clone(),
            self.paths.cleaned_jobs_csv.clone(),
            self.paths.processed_resume.clone(),
            self.paths.resume_sections.clone(),
        ]
    }

    fn check_preconditions(&self) -> Result<(), PipelineError> {
        storage::require_file(&self.paths.listings, "raw listings")?;
        resume::check_resume_path(&self.resume_path)
    }

    async fn run(&self) -> Result<StageReport, PipelineError> {
        let (jobs, skipped) = self.clean_listings()?;
        info!("Parsing resume from {}", self.resume_path.display());
        let (resume_text, sections) = self.process_resume().await?;

        let rows: Vec<CleanedJobRow<'_>> = jobs.iter().map(CleanedJobRow::from).collect();
        storage::write_json_pretty(&self.paths.cleaned_jobs, &jobs)?;
        storage::write_csv(&self.paths.cleaned_jobs_csv, &CleanedJobRow::HEADER, &rows)?;
        storage::write_text(&self.paths.processed_resume, &resume_text)?;
        storage::write_json_pretty(&self.paths.resume_sections, &sections)?;

        info!(
            "Saved {} cleaned jobs to {}; resume text ({} chars) to {}",
            jobs.len(),
            self.paths.cleaned_jobs.display(),
            resume_text.chars().count(),
            self.paths.processed_resume.display()
        );
        Ok(StageReport::new(jobs.len(), skipped))
    }
}
