use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cleaning::text::{html_to_text, normalize_whitespace, remove_special_characters};
use crate::config::CleaningConfig;
use crate::errors::PipelineError;
use crate::storage;

/// Section name → section body. Always contains `full`, the unsplit text.
pub type ResumeSections = BTreeMap<String, String>;

static SECTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(experience|education|skills|projects|summary|certifications)\s*[:\-]?\s*$")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumeFormat {
    Pdf,
    Text,
}

fn resume_format(path: &Path) -> Option<ResumeFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(ResumeFormat::Pdf),
        "txt" => Some(ResumeFormat::Text),
        _ => None,
    }
}

/// Fails unless `path` is an existing `.pdf` or `.txt` file.
pub fn check_resume_path(path: &Path) -> Result<(), PipelineError> {
    storage::require_file(path, "resume")?;
    match resume_format(path) {
        Some(_) => Ok(()),
        None => Err(PipelineError::Precondition(format!(
            "unsupported resume format for {} (expected .pdf or .txt)",
            path.display()
        ))),
    }
}

/// Raw resume text. PDFs have their text layer extracted.
pub fn read_resume(path: &Path) -> Result<String, PipelineError> {
    match resume_format(path) {
        Some(ResumeFormat::Pdf) => pdf_extract::extract_text(path).map_err(|e| {
            PipelineError::InvalidData(format!("could not extract text from {}: {e}", path.display()))
        }),
        Some(ResumeFormat::Text) => storage::read_text(path),
        None => Err(PipelineError::Precondition(format!(
            "unsupported resume format for {}",
            path.display()
        ))),
    }
}

/// Splits resume text on lines that consist only of a known heading.
/// Text before the first heading becomes `summary`.
pub fn split_sections(text: &str) -> ResumeSections {
    let mut sections = ResumeSections::new();
    let headings: Vec<_> = SECTION_HEADING.captures_iter(text).collect();

    if let Some(first) = headings.first() {
        let preamble = text[..first.get(0).map_or(0, |m| m.start())].trim();
        if !preamble.is_empty() {
            sections.insert("summary".to_string(), preamble.to_string());
        }
    }

    for (idx, caps) in headings.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let body_end = headings
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        sections.insert(
            name.as_str().to_lowercase(),
            text[whole.end()..body_end].trim().to_string(),
        );
    }

    sections.insert("full".to_string(), text.to_string());
    sections
}

/// Applies the same normalisation as job descriptions.
pub fn clean_resume_text(text: &str, config: &CleaningConfig) -> String {
    let mut cleaned = html_to_text(text);
    if config.lowercase {
        cleaned = cleaned.to_lowercase();
    }
    if config.remove_special_chars {
        cleaned = remove_special_characters(&cleaned);
    }
    normalize_whitespace(&cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME: &str = "Jane Doe\njane@example.com\n\nEXPERIENCE\nRust engineer at Acme\n\nSkills:\nRust, SQL\n\nEducation -\nBS Computer Science\n";

    #[test]
    fn test_split_sections_by_heading() {
        let sections = split_sections(RESUME);

        assert_eq!(sections["summary"], "Jane Doe\njane@example.com");
        assert_eq!(sections["experience"], "Rust engineer at Acme");
        assert_eq!(sections["skills"], "Rust, SQL");
        assert_eq!(sections["education"], "BS Computer Science");
        assert_eq!(sections["full"], RESUME);
    }

    #[test]
    fn test_heading_inside_sentence_is_not_a_section() {
        let sections = split_sections("I have experience with Rust.\nSkills include Go.");
        assert_eq!(sections.len(), 1);
        assert!(sections.contains_key("full"));
    }

    #[test]
    fn test_clean_resume_text() {
        let config = CleaningConfig::default();
        assert_eq!(
            clean_resume_text("Rust & C++ <b>Expert</b>\n\n* 5 yrs!", &config),
            "rust & c++ expert 5 yrs"
        );
    }

    #[test]
    fn test_check_resume_path_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let docx = dir.path().join("resume.docx");
        std::fs::write(&docx, "x").unwrap();
        let txt = dir.path().join("resume.TXT");
        std::fs::write(&txt, "x").unwrap();

        assert!(matches!(check_resume_path(&docx), Err(PipelineError::Precondition(_))));
        assert!(check_resume_path(&txt).is_ok());
        assert!(check_resume_path(&dir.path().join("missing.pdf")).is_err());
    }

    #[test]
    fn test_read_text_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.txt");
        std::fs::write(&path, RESUME).unwrap();
        assert_eq!(read_resume(&path).unwrap(), RESUME);
    }
}
