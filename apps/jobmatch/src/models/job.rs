use serde::{Deserialize, Serialize};

/// A cleaned job posting. Produced by the cleaning stage, read by embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default)]
    pub job_key: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "companyName", default)]
    pub company_name: String,
    #[serde(default)]
    pub location_normalized: String,
    #[serde(default)]
    pub location_raw: String,
    #[serde(rename = "datePublished", default)]
    pub date_published: Option<String>,
    #[serde(rename = "jobUrl", default)]
    pub job_url: Option<String>,
    #[serde(default)]
    pub salary_text: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl JobRecord {
    /// Normalized location, falling back to the raw address.
    pub fn display_location(&self) -> &str {
        if self.location_normalized.trim().is_empty() {
            self.location_raw.trim()
        } else {
            self.location_normalized.trim()
        }
    }
}
