//! Listing acquisition: one search request against the job listing provider.
//!
//! Every call spends provider quota, so the stage makes a single POST (plus at
//! most the configured transient retries) and always keeps the raw response
//! on disk, including error responses, so the payload can be corrected.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AcquireConfig;
use crate::embedding::transport::{classify_status, snippet, StatusClass};
use crate::errors::PipelineError;
use crate::paths::ArtifactPaths;
use crate::pipeline::{Stage, StageKind, StageReport};
use crate::retry::{retry, RetryError, Transient};
use crate::storage;

pub mod flatten;

pub use flatten::{find_jobs, flatten_listing};

const SERVICE: &str = "listing provider";

/// A provider response of any status.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("provider returned status {status}: {}", snippet(.body))]
    Status { status: u16, body: String },
}

impl Transient for SearchError {
    fn is_transient(&self) -> bool {
        match self {
            SearchError::Network(_) => true,
            SearchError::Status { status, .. } => StatusCode::from_u16(*status)
                .map_or(false, |s| classify_status(s) == StatusClass::Transient),
        }
    }
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Posts one search. Any HTTP response, successful or not, comes back as `Ok`.
    async fn search(&self, payload: &Value) -> Result<SearchResponse, SearchError>;
}

/// reqwest-backed source for the RapidAPI listing endpoint.
pub struct RapidApiSource {
    client: Client,
    endpoint: String,
}

impl RapidApiSource {
    pub fn new(api_key: &str, config: &AcquireConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "listing provider API key is empty");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-rapidapi-key", HeaderValue::from_str(api_key.trim())?);
        headers.insert("x-rapidapi-host", HeaderValue::from_str(&config.host)?);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ListingSource for RapidApiSource {
    async fn search(&self, payload: &Value) -> Result<SearchResponse, SearchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Network(format!("failed to read response body: {e}")))?;
        debug!("Listing provider returned {status} ({} bytes)", body.len());
        Ok(SearchResponse { status, body })
    }
}

/// Request body for a search with the configured parameters.
pub fn search_payload(config: &AcquireConfig) -> Value {
    json!({
        "scraper": {
            "maxRows": config.max_rows,
            "query": config.query,
            "location": config.location,
            "jobType": config.job_type,
            "radius": config.radius,
            "sort": config.sort,
            "fromDays": config.from_days,
            "country": config.country,
        }
    })
}

pub struct AcquireStage {
    paths: ArtifactPaths,
    config: AcquireConfig,
    /// `None` when no API key is configured.
    source: Option<Arc<dyn ListingSource>>,
}

impl AcquireStage {
    pub fn new(paths: ArtifactPaths, config: AcquireConfig, source: Option<Arc<dyn ListingSource>>) -> Self {
        Self { paths, config, source }
    }

    /// Saves a response body, pretty-printed when it is JSON.
    fn save_raw(&self, body: &str) -> Result<(), PipelineError> {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => storage::write_json_pretty(&self.paths.raw_response, &value)?,
            Err(_) => storage::write_text(&self.paths.raw_response, body)?,
        }
        info!("Saved raw response to {}", self.paths.raw_response.display());
        Ok(())
    }

    async fn fetch(&self, source: &dyn ListingSource) -> Result<SearchResponse, PipelineError> {
        let payload = search_payload(&self.config);
        info!(
            "Posting search (query={}, location={}, maxRows={})",
            self.config.query, self.config.location, self.config.max_rows
        );

        let payload = &payload;
        let outcome = retry(&self.config.retry, "Listing search", |_| async move {
            let response = source.search(payload).await?;
            match StatusCode::from_u16(response.status) {
                Ok(status) if status.is_success() => Ok(response),
                _ => Err(SearchError::Status {
                    status: response.status,
                    body: response.body,
                }),
            }
        })
        .await;

        let (error, attempts) = match outcome {
            Ok(response) => return Ok(response),
            Err(RetryError::Aborted { attempt, error }) => (error, attempt),
            Err(RetryError::Exhausted { attempts, last }) => (last, attempts),
        };

        match error {
            SearchError::Status { status, body } => {
                self.save_raw(&body)?;
                Err(PipelineError::Service {
                    service: SERVICE,
                    status: Some(status),
                    message: format!("search rejected after {attempts} attempt(s)"),
                    body: Some(body),
                })
            }
            SearchError::Network(message) => Err(PipelineError::Service {
                service: SERVICE,
                status: None,
                message: format!("{message} (after {attempts} attempt(s))"),
                body: None,
            }),
        }
    }
}

#[async_trait]
impl Stage for AcquireStage {
    fn kind(&self) -> StageKind {
        StageKind::Acquire
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.paths.listings.clone()]
    }

    fn check_preconditions(&self) -> Result<(), PipelineError> {
        match self.source {
            Some(_) => Ok(()),
            None => Err(PipelineError::Precondition("RAPIDAPI_KEY is not set".to_string())),
        }
    }

    async fn run(&self) -> Result<StageReport, PipelineError> {
        let source = self
            .source
            .as_deref()
            .ok_or_else(|| PipelineError::Precondition("RAPIDAPI_KEY is not set".to_string()))?;

        let response = self.fetch(source).await?;
        self.save_raw(&response.body)?;

        let parsed: Value = serde_json::from_str(&response.body).map_err(|e| PipelineError::Service {
            service: SERVICE,
            status: Some(response.status),
            message: format!("response is not valid JSON: {e}"),
            body: Some(response.body.clone()),
        })?;

        let jobs = find_jobs(&parsed).ok_or_else(|| {
            PipelineError::InvalidData(format!(
                "no job list found in response; inspect {}",
                self.paths.raw_response.display()
            ))
        })?;

        let listings: Vec<_> = jobs.iter().filter_map(flatten_listing).collect();
        let skipped = jobs.len() - listings.len();
        if skipped > 0 {
            warn!("Skipped {skipped} postings that were not JSON objects");
        }

        storage::write_json_pretty(&self.paths.listings, &listings)?;
        info!(
            "Saved {} listings to {}",
            listings.len(),
            self.paths.listings.display()
        );
        Ok(StageReport::new(listings.len(), skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawListing;
    use crate::retry::RetryPolicy;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeSource {
        script: Mutex<VecDeque<Result<SearchResponse, SearchError>>>,
        calls: Mutex<Vec<Value>>,
    }

    impl FakeSource {
        fn new(script: Vec<Result<SearchResponse, SearchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ListingSource for FakeSource {
        async fn search(&self, payload: &Value) -> Result<SearchResponse, SearchError> {
            self.calls.lock().unwrap().push(payload.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SearchError::Network("script exhausted".to_string())))
        }
    }

    fn reply(status: u16, body: &str) -> Result<SearchResponse, SearchError> {
        Ok(SearchResponse {
            status,
            body: body.to_string(),
        })
    }

    fn stage(dir: &std::path::Path, source: Option<Arc<FakeSource>>) -> (AcquireStage, ArtifactPaths) {
        let paths = ArtifactPaths::new(dir);
        let config = AcquireConfig {
            retry: RetryPolicy::immediate(2),
            ..AcquireConfig::default()
        };
        let source = source.map(|s| s as Arc<dyn ListingSource>);
        (AcquireStage::new(paths.clone(), config, source), paths)
    }

    const OK_BODY: &str = r#"{"returnvalue":{"data":[
        {"jobKey":"k1","title":"Rust Developer","companyName":"Acme","descriptionText":"build"},
        "garbage",
        {"id":7,"title":"Analyst"}
    ]}}"#;

    #[test]
    fn test_payload_carries_search_parameters() {
        let payload = search_payload(&AcquireConfig::default());
        let scraper = &payload["scraper"];
        assert_eq!(scraper["maxRows"], 15);
        assert_eq!(scraper["fromDays"], "7");
        assert_eq!(scraper["location"], "Saint Louis MO");
        for key in ["query", "jobType", "radius", "sort", "country"] {
            assert!(scraper.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_missing_key_is_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (stage, _) = stage(dir.path(), None);
        assert!(matches!(stage.check_preconditions(), Err(PipelineError::Precondition(_))));
    }

    #[test]
    fn test_status_transience() {
        let status = |s| SearchError::Status {
            status: s,
            body: String::new(),
        };
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(403).is_transient());
        assert!(SearchError::Network("reset".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_success_writes_raw_and_listings() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![reply(200, OK_BODY)]);
        let (stage, paths) = stage(dir.path(), Some(source.clone()));

        let report = stage.run().await.unwrap();

        assert_eq!(report, StageReport::new(2, 1));
        assert_eq!(source.calls(), 1);
        let raw: Value = storage::read_json(&paths.raw_response).unwrap();
        assert!(raw.get("returnvalue").is_some());
        let listings: Vec<RawListing> = storage::read_json(&paths.listings).unwrap();
        assert_eq!(listings[0].job_key.as_deref(), Some("k1"));
        assert_eq!(listings[1].job_key.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_rejected_search_saves_body_and_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"message":"fromDays must be one of [1,3,7,14]"}"#;
        let source = FakeSource::new(vec![reply(400, body)]);
        let (stage, paths) = stage(dir.path(), Some(source.clone()));

        let err = stage.run().await.unwrap_err();

        assert_eq!(source.calls(), 1);
        assert_eq!(err.response_body(), Some(body));
        assert!(paths.raw_response.is_file());
        assert!(!paths.listings.exists());
    }

    #[tokio::test]
    async fn test_transient_status_is_retried_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![reply(503, "busy"), reply(200, OK_BODY)]);
        let (stage, _) = stage(dir.path(), Some(source.clone()));

        stage.run().await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_keeps_last_body() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![reply(429, "slow down"), reply(429, "still slow")]);
        let (stage, paths) = stage(dir.path(), Some(source.clone()));

        let err = stage.run().await.unwrap_err();

        assert_eq!(source.calls(), 2);
        assert_eq!(err.response_body(), Some("still slow"));
        assert_eq!(std::fs::read_to_string(&paths.raw_response).unwrap(), "still slow");
    }

    #[tokio::test]
    async fn test_response_without_job_list_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![reply(200, r#"{"message":"no results"}"#)]);
        let (stage, paths) = stage(dir.path(), Some(source));

        let err = stage.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidData(_)));
        assert!(paths.raw_response.is_file());
        assert!(!paths.listings.exists());
    }
}
