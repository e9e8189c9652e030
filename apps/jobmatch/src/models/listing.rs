use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A provider job posting flattened into a fixed set of fields.
/// Written by the acquisition stage; every field may be missing upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub job_key: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "companyName")]
    pub company_name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "formattedAddress")]
    pub formatted_address: Option<String>,
    #[serde(rename = "datePublished")]
    pub date_published: Option<Value>,
    #[serde(rename = "jobUrl")]
    pub job_url: Option<String>,
    pub salary_text: Option<String>,
    pub salary_min: Option<Value>,
    pub salary_max: Option<Value>,
    #[serde(rename = "descriptionText")]
    pub description_text: Option<String>,
    pub attributes: Option<String>,
}
