//! Flat-file persistence for stage artifacts.
//!
//! Every write goes to a temp file in the destination directory and is renamed
//! into place, so a reader never sees a half-written artifact.

use std::io::Write;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::errors::PipelineError;

pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PipelineError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.flush())
        .map_err(|e| PipelineError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::io(path, e.error))?;
    Ok(())
}

pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| PipelineError::json(path, e))?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Writes one compact JSON object per line.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), PipelineError> {
    let mut bytes = Vec::new();
    for record in records {
        serde_json::to_writer(&mut bytes, record).map_err(|e| PipelineError::json(path, e))?;
        bytes.push(b'\n');
    }
    write_atomic(path, &bytes)
}

pub fn write_text(path: &Path, text: &str) -> Result<(), PipelineError> {
    write_atomic(path, text.as_bytes())
}

/// Serializes `rows` as CSV under `header`. The header is written even when
/// there are no rows, so an empty result is still a well-formed table.
pub fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<(), PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(header)
        .map_err(|e| PipelineError::csv(path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| PipelineError::csv(path, e))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::io(path, e.into_error()))?;
    write_atomic(path, &bytes)
}

pub fn read_text(path: &Path) -> Result<String, PipelineError> {
    std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|e| PipelineError::json(path, e))
}

/// Reads a JSONL file, skipping blank lines and lines that fail to parse.
/// Returns the parsed records and the number of skipped lines.
pub fn read_jsonl_lenient<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize), PipelineError> {
    let text = read_text(path)?;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!("Skipping malformed line {} in {}: {e}", line_no + 1, path.display());
            }
        }
    }

    Ok((records, skipped))
}

/// Fails with a precondition error when an upstream artifact is missing.
pub fn require_file(path: &Path, what: &str) -> Result<(), PipelineError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::Precondition(format!(
            "{what} not found at {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: u32,
        name: String,
    }

    #[test]
    fn test_write_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.txt");
        write_text(&path, "hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn test_write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_text(&path, "first").unwrap();
        write_text(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        // no stray temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_jsonl_lenient_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        std::fs::write(
            &path,
            "{\"id\":1,\"name\":\"a\"}\n\nnot json\n{\"id\":2}\n{\"id\":3,\"name\":\"c\"}\n",
        )
        .unwrap();

        let (rows, skipped): (Vec<Row>, usize) = read_jsonl_lenient(&path).unwrap();
        assert_eq!(skipped, 2);
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_write_jsonl_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        let rows = vec![
            Row { id: 1, name: "a".into() },
            Row { id: 2, name: "b".into() },
        ];
        write_jsonl(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}\n");
    }

    #[test]
    fn test_write_csv_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        write_csv(&path, &["id", "name"], &[Row { id: 7, name: "x, y".into() }]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "id,name\n7,\"x, y\"\n");
    }

    #[test]
    fn test_write_csv_without_rows_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        write_csv::<Row>(&path, &["id", "name"], &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id,name\n");
    }

    #[test]
    fn test_require_file_reports_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let err = require_file(&dir.path().join("missing.json"), "cleaned jobs").unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(_)));
    }
}
