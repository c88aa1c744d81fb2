//! Loading act files (`.csv`, `.json`, `.jsonl`, and optionally plain `.txt`)
//! into rows, validating them and turning each section into chunks.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::chunker::Chunker;
use crate::error::{Error, Result};
use crate::types::{ChunkMetadata, DocumentChunk, SourceDocument, NO_SECTION_NUMBER};

pub const REQUIRED_COLUMNS: [&str; 3] = ["section_text", "title", "section_name"];
pub const STRUCTURED_EXTENSIONS: [&str; 3] = ["csv", "json", "jsonl"];
pub const PLAIN_TEXT_EXTENSION: &str = "txt";
/// Section name given to the single section of a plain-text act.
pub const PLAIN_TEXT_SECTION: &str = "Full text";

/// One data row, column name to textual value. Absent and null cells are missing keys.
pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// File name without directories; used as the chunk `source`.
    pub name: String,
    pub columns: BTreeSet<String>,
    pub rows: Vec<Row>,
}

impl SourceFile {
    pub fn missing_columns(&self) -> Vec<&'static str> {
        REQUIRED_COLUMNS.iter().copied().filter(|c| !self.columns.contains(*c)).collect()
    }
}

/// Chunks of one file plus the rows that could not be used.
#[derive(Debug, Default)]
pub struct FileChunks {
    pub chunks: Vec<DocumentChunk>,
    pub rows_rejected: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DataProcessor {
    chunker: Chunker,
    plain_text: bool,
}

impl DataProcessor {
    pub fn new(chunker: Chunker) -> Self {
        Self { chunker, plain_text: false }
    }

    /// Also pick up `.txt` files, each read as one section titled by its file stem.
    #[must_use]
    pub fn with_plain_text(mut self, plain_text: bool) -> Self {
        self.plain_text = plain_text;
        self
    }

    pub fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        list_source_files(dir, self.plain_text)
    }

    /// Read a file and check that the required columns are present.
    pub fn load_file(&self, path: &Path) -> Result<SourceFile> {
        let file = read_source_file(path)?;
        let missing = file.missing_columns();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "{} is missing required column(s): {}",
                file.name,
                missing.join(", ")
            )));
        }
        Ok(file)
    }

    /// Chunk every valid row of `file`. Rows with blank required fields are
    /// skipped with a warning; the row index still advances so ids stay stable.
    pub fn chunk_file(&self, file: &SourceFile) -> FileChunks {
        let mut out = FileChunks::default();
        for (row_index, row) in file.rows.iter().enumerate() {
            match row_to_document(row) {
                Ok(doc) => out.chunks.extend(self.chunk_document(&file.name, row_index, &doc)),
                Err(e) => {
                    tracing::warn!(file = %file.name, row = row_index, error = %e, "skipping row");
                    out.rows_rejected += 1;
                }
            }
        }
        out
    }

    pub fn chunk_document(&self, source: &str, row_index: usize, doc: &SourceDocument) -> Vec<DocumentChunk> {
        self.chunker
            .chunk(&doc.section_text)
            .into_iter()
            .enumerate()
            .map(|(sequence_index, text)| DocumentChunk {
                id: DocumentChunk::make_id(source, row_index, sequence_index),
                text,
                row_index,
                sequence_index,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    act_title: doc.title.clone(),
                    section_name: doc.section_name.clone(),
                    section_number: doc.section_number.clone(),
                },
            })
            .collect()
    }
}

/// Files directly under `dir` with a structured extension (plus `.txt` when
/// `plain_text` is set), sorted by path.
pub fn list_source_files(dir: &Path, plain_text: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("folder {}", dir.display())));
    }
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if is_structured(path) || (plain_text && is_plain_text(path)) {
            files.push(path.to_path_buf());
        } else {
            tracing::debug!(path = %path.display(), "ignoring unsupported file");
        }
    }
    files.sort();
    Ok(files)
}

pub fn is_structured(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| STRUCTURED_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

pub fn is_plain_text(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case(PLAIN_TEXT_EXTENSION))
}

/// Parse a source file into rows. Malformed content is a `Validation` error.
pub fn read_source_file(path: &Path) -> Result<SourceFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::Validation(format!("{} has no file name", path.display())))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or_default().to_ascii_lowercase();
    let (columns, rows) = match ext.as_str() {
        "csv" => read_csv(path, &name)?,
        "json" => read_json(path, &name)?,
        "jsonl" => read_jsonl(path, &name)?,
        PLAIN_TEXT_EXTENSION => read_plain_text(path)?,
        other => return Err(Error::Validation(format!("{name}: unsupported extension '{other}'"))),
    };
    Ok(SourceFile { path: path.to_path_buf(), name, columns, rows })
}

/// Build a `SourceDocument` from a row; blank required fields are rejected.
pub fn row_to_document(row: &Row) -> Result<SourceDocument> {
    let field = |key: &str| -> Result<String> {
        match row.get(key).map(|v| v.trim()) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(Error::Validation(format!("missing value for '{key}'"))),
        }
    };
    let section_number = row
        .get("section_number")
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(NO_SECTION_NUMBER)
        .to_string();
    Ok(SourceDocument {
        title: field("title")?,
        section_name: field("section_name")?,
        section_number,
        section_text: field("section_text")?,
    })
}

type Parsed = (BTreeSet<String>, Vec<Row>);

fn read_csv(path: &Path, name: &str) -> Result<Parsed> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| Error::Validation(format!("{name}: {e}")))?;
    let headers = reader.headers().map_err(|e| Error::Validation(format!("{name}: {e}")))?.clone();
    let columns: BTreeSet<String> = headers.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Validation(format!("{name}: {e}")))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, v)| !v.is_empty())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok((columns, rows))
}

fn read_json(path: &Path, name: &str) -> Result<Parsed> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content).map_err(|e| Error::Validation(format!("{name}: {e}")))?;
    let Value::Array(items) = value else {
        return Err(Error::Validation(format!("{name}: expected a JSON array of objects")));
    };
    collect_objects(items, name)
}

fn read_jsonl(path: &Path, name: &str) -> Result<Parsed> {
    let content = fs::read_to_string(path)?;
    let mut items = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| Error::Validation(format!("{name} line {}: {e}", line_no + 1)))?;
        items.push(value);
    }
    collect_objects(items, name)
}

/// A whole act in one file: title from the file stem, text as a single section.
fn read_plain_text(path: &Path) -> Result<Parsed> {
    let content = fs::read_to_string(path)?;
    let title = path.file_stem().map(|s| s.to_string_lossy().trim().to_string()).unwrap_or_default();
    let columns: BTreeSet<String> = REQUIRED_COLUMNS.iter().map(|c| (*c).to_string()).collect();
    let mut row = Row::new();
    row.insert("title".into(), title);
    row.insert("section_name".into(), PLAIN_TEXT_SECTION.into());
    row.insert("section_text".into(), content);
    Ok((columns, vec![row]))
}

fn collect_objects(items: Vec<Value>, name: &str) -> Result<Parsed> {
    let mut columns = BTreeSet::new();
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(map) = item else {
            return Err(Error::Validation(format!("{name}: every record must be an object")));
        };
        let mut row = Row::new();
        for (key, value) in map {
            columns.insert(key.clone());
            if let Some(text) = cell_text(&value) {
                row.insert(key, text);
            }
        }
        rows.push(row);
    }
    Ok((columns, rows))
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn section_number_defaults_to_sentinel() {
        let doc = row_to_document(&row(&[
            ("title", "IPC"),
            ("section_name", "Theft"),
            ("section_text", "Whoever intends to take..."),
        ]))
        .expect("valid row");
        assert_eq!(doc.section_number, NO_SECTION_NUMBER);
    }

    #[test]
    fn blank_required_field_is_rejected() {
        let err = row_to_document(&row(&[("title", "IPC"), ("section_name", "Theft"), ("section_text", "   ")]))
            .expect_err("blank text");
        assert!(err.is_recoverable());
    }

    #[test]
    fn json_numbers_become_text() {
        let (columns, rows) =
            collect_objects(vec![serde_json::json!({"section_number": 378, "title": "IPC", "x": null})], "a.json")
                .expect("objects");
        assert!(columns.contains("x"));
        assert_eq!(rows[0].get("section_number").map(String::as_str), Some("378"));
        assert!(!rows[0].contains_key("x"));
    }

    #[test]
    fn plain_text_file_is_one_section_titled_by_stem() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let path = tmp.path().join("Indian Penal Code.txt");
        fs::write(&path, "CHAPTER XVII\n\nOf offences against property.").expect("write");
        let file = read_source_file(&path).expect("txt");
        assert!(file.missing_columns().is_empty());
        let doc = row_to_document(&file.rows[0]).expect("row");
        assert_eq!(doc.title, "Indian Penal Code");
        assert_eq!(doc.section_name, PLAIN_TEXT_SECTION);
        assert_eq!(doc.section_number, NO_SECTION_NUMBER);
        assert!(doc.section_text.ends_with("against property."));
    }

    #[test]
    fn chunk_ids_follow_row_and_sequence() {
        let processor = DataProcessor::new(Chunker::new(20, 5).expect("chunker"));
        let doc = SourceDocument {
            title: "IPC".into(),
            section_name: "Theft".into(),
            section_number: "378".into(),
            section_text: "Whoever intending to take dishonestly any movable property".into(),
        };
        let chunks = processor.chunk_document("ipc.csv", 3, &doc);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.id, format!("ipc.csv_3_{i}"));
            assert_eq!(c.metadata.act_title, "IPC");
            assert_eq!(c.metadata.source, "ipc.csv");
        }
    }
}
