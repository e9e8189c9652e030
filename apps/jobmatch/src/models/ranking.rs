use serde::{Deserialize, Serialize};

use crate::models::embedding::EmbeddingMeta;

/// A job scored against the resume, with its dense 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub rank: usize,
    pub job_key: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub similarity: f64,
    pub meta: EmbeddingMeta,
}

/// Tabular form of a ranked result; similarity is pre-formatted to 6 decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    pub rank: usize,
    pub job_key: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub similarity: String,
}

impl RankedRow {
    /// Column names, in field order.
    pub const HEADER: [&'static str; 6] = ["rank", "job_key", "title", "company", "location", "similarity"];
}

impl From<&RankedResult> for RankedRow {
    fn from(result: &RankedResult) -> Self {
        Self {
            rank: result.rank,
            job_key: result.job_key.clone().unwrap_or_default(),
            title: result.title.clone().unwrap_or_default(),
            company: result.company.clone().unwrap_or_default(),
            location: result.location.clone().unwrap_or_default(),
            similarity: format!("{:.6}", result.similarity),
        }
    }
}
