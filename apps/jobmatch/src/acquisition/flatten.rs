//! Locating and flattening postings inside a provider response.

use serde_json::{Map, Value};

use crate::cleaning::text::html_to_text;
use crate::models::RawListing;

/// Keys checked, in order, for the posting list of an object response.
const LIST_KEYS: &[&str] = &["data", "results", "items", "jobs", "listings"];

/// Finds the posting list in a provider response.
///
/// Tries `returnvalue.data`, then the well-known list keys, then the first
/// array of objects anywhere at the top level. A top-level array of objects
/// is returned as-is.
pub fn find_jobs(response: &Value) -> Option<&Vec<Value>> {
    match response {
        Value::Object(obj) => {
            if let Some(Value::Array(list)) = obj.get("returnvalue").and_then(|rv| rv.get("data")) {
                return Some(list);
            }
            for key in LIST_KEYS {
                if let Some(Value::Array(list)) = obj.get(*key) {
                    return Some(list);
                }
            }
            obj.values().find_map(|v| match v {
                Value::Array(list) if list.first().is_some_and(Value::is_object) => Some(list),
                _ => None,
            })
        }
        Value::Array(list) if list.first().is_some_and(Value::is_object) => Some(list),
        _ => None,
    }
}

/// Text of a scalar JSON value. Strings are kept, numbers and booleans are
/// rendered, and empty strings count as missing.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First key of `keys` whose value has text.
pub(crate) fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(value_text))
}

fn first_present(obj: &Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null() && v.as_str() != Some(""))
        .cloned()
}

/// Flattens one provider posting. Returns `None` for anything that is not an object.
pub fn flatten_listing(job: &Value) -> Option<RawListing> {
    let obj = job.as_object()?;
    let empty = Map::new();

    let location = obj.get("location").and_then(Value::as_object).unwrap_or(&empty);
    let salary = obj.get("salary").and_then(Value::as_object).unwrap_or(&empty);

    let description = match first_text(obj, &["descriptionHtml"]) {
        Some(html) => html_to_text(&html),
        None => first_text(obj, &["descriptionText", "description", "snippet"]).unwrap_or_default(),
    };

    let attributes = match obj.get("attributes") {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|a| value_text(a).unwrap_or_else(|| a.to_string()))
                .collect::<Vec<_>>()
                .join("; "),
        ),
        Some(Value::Null) | None => None,
        Some(other) => Some(value_text(other).unwrap_or_else(|| other.to_string())),
    };

    Some(RawListing {
        job_key: first_text(obj, &["jobKey", "id", "job_id"]),
        title: first_text(obj, &["title"]),
        company_name: first_text(obj, &["companyName", "company", "company_name"]),
        city: first_text(location, &["city", "cityName"]),
        state: first_text(location, &["region", "state"]),
        formatted_address: first_text(
            location,
            &["formattedAddressLong", "formattedAddressShort", "fullAddress"],
        ),
        date_published: first_present(obj, &["datePublished"]),
        job_url: first_text(obj, &["jobUrl", "url", "link"]),
        salary_text: first_text(salary, &["salaryText", "text"]),
        salary_min: first_present(salary, &["salaryMin", "salary_min"]),
        salary_max: first_present(salary, &["salaryMax", "salary_max"]),
        description_text: Some(description),
        attributes,
    })
}
