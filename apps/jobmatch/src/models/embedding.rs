use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Display fields carried alongside each job vector.
/// Unknown keys from older files are kept in `extra` so the ranker can fall back on them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "companyName", default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmbeddingMeta {
    pub fn new(title: &str, company_name: &str, location: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            company_name: Some(company_name.to_string()),
            location: Some(location.to_string()),
            extra: Map::new(),
        }
    }

    fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn display_title(&self) -> Option<&str> {
        non_empty(self.title.as_deref()).or_else(|| self.extra_str("job_title"))
    }

    pub fn display_company(&self) -> Option<&str> {
        non_empty(self.company_name.as_deref()).or_else(|| self.extra_str("company"))
    }

    pub fn display_location(&self) -> Option<&str> {
        non_empty(self.location.as_deref())
            .or_else(|| self.extra_str("location_normalized"))
            .or_else(|| self.extra_str("location_raw"))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// One line of the job embeddings JSONL file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    #[serde(default)]
    pub job_key: Option<String>,
    #[serde(default)]
    pub meta: EmbeddingMeta,
    pub embedding: Vec<f32>,
}

/// The single resume vector, embedded with the same model as the jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeEmbedding {
    #[serde(default)]
    pub model: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub text_sample: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_with_null_key_round_trips() {
        let line = r#"{"job_key":null,"meta":{"title":"dev","companyName":"acme","location":"stl"},"embedding":[0.5,0.25]}"#;
        let record: EmbeddingRecord = serde_json::from_str(line).unwrap();
        assert!(record.job_key.is_none());
        assert_eq!(record.meta.display_company(), Some("acme"));
        assert_eq!(serde_json::to_string(&record).unwrap(), line);
    }

    #[test]
    fn test_meta_falls_back_to_alternate_keys() {
        let meta: EmbeddingMeta = serde_json::from_str(
            r#"{"job_title":"analyst","company":"globex","location_raw":"kansas city"}"#,
        )
        .unwrap();
        assert_eq!(meta.display_title(), Some("analyst"));
        assert_eq!(meta.display_company(), Some("globex"));
        assert_eq!(meta.display_location(), Some("kansas city"));
    }

    #[test]
    fn test_record_without_embedding_is_rejected() {
        let result: Result<EmbeddingRecord, _> = serde_json::from_str(r#"{"job_key":"a"}"#);
        assert!(result.is_err());
    }
}
