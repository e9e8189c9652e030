use std::fmt::Write as _;
use std::path::Path;

use crate::errors::PipelineError;
use crate::models::{RankedResult, RankedRow};
use crate::storage;

/// Writes the ranked results as a pretty JSON array and as CSV.
pub fn write_results(json_path: &Path, csv_path: &Path, results: &[RankedResult]) -> Result<(), PipelineError> {
    storage::write_json_pretty(json_path, results)?;
    let rows: Vec<RankedRow> = results.iter().map(RankedRow::from).collect();
    storage::write_csv(csv_path, &RankedRow::HEADER, &rows)
}

fn clip(text: Option<&str>, max_chars: usize) -> String {
    text.unwrap_or_default().chars().take(max_chars).collect()
}

/// Fixed-width table for the terminal.
pub fn render_table(results: &[RankedResult], top_n: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nTop {top_n} jobs (by cosine similarity):\n");
    let _ = writeln!(
        out,
        "{:<4} {:>7}  {:<40} {:<30} {}",
        "Rank", "Sim", "Title", "Company", "Location"
    );
    let _ = writeln!(out, "{}", "-".repeat(110));
    for r in results {
        let _ = writeln!(
            out,
            "{:<4} {:>7.4}  {:<40} {:<30} {}",
            r.rank,
            r.similarity,
            clip(r.title.as_deref(), 38),
            clip(r.company.as_deref(), 28),
            clip(r.location.as_deref(), 40)
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmbeddingMeta;

    fn result(rank: usize, title: &str, similarity: f64) -> RankedResult {
        RankedResult {
            rank,
            job_key: Some(format!("k{rank}")),
            title: Some(title.to_string()),
            company: None,
            location: Some("saint louis, mo".to_string()),
            similarity,
            meta: EmbeddingMeta::default(),
        }
    }

    #[test]
    fn test_csv_columns_and_precision() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("top_jobs.json");
        let csv = dir.path().join("top_jobs.csv");

        write_results(&json, &csv, &[result(1, "rust dev", 0.993_883_734_673)]).unwrap();

        let text = std::fs::read_to_string(&csv).unwrap();
        assert_eq!(
            text,
            "rank,job_key,title,company,location,similarity\n1,k1,rust dev,,\"saint louis, mo\",0.993884\n"
        );
        let parsed: Vec<RankedResult> = storage::read_json(&json).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_table_clips_long_titles() {
        let long = "x".repeat(60);
        let table = render_table(&[result(1, &long, 0.5)], 10);

        assert!(table.contains("Top 10 jobs"));
        assert!(table.contains(&"x".repeat(38)));
        assert!(!table.contains(&"x".repeat(39)));
        assert!(table.contains(" 0.5000  "));
    }
}
