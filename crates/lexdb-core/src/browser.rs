//! Read-only access to whole acts straight from the structured source files.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::data_processor::{list_source_files, read_source_file, row_to_document, SourceFile};
use crate::error::Result;
use crate::types::{SourceDocument, NO_SECTION_NUMBER};

/// All sections of one act, ordered by section number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullDocument {
    pub title: String,
    pub sections: Vec<SourceDocument>,
}

impl FullDocument {
    /// Markdown-ish rendering, one block per section.
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|s| format!("### Section {}: {}\n\n{}\n\n---\n", s.section_number, s.section_name, s.section_text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct MetadataBrowser {
    folder: PathBuf,
    plain_text: bool,
}

impl MetadataBrowser {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self { folder: folder.into(), plain_text: false }
    }

    #[must_use]
    pub fn with_plain_text(mut self, plain_text: bool) -> Self {
        self.plain_text = plain_text;
        self
    }

    /// Every section whose title equals `title` exactly, across all files.
    /// `Ok(None)` when no row matches.
    pub fn load_full_document(&self, title: &str) -> Result<Option<FullDocument>> {
        let mut sections: Vec<SourceDocument> = self
            .documents()?
            .into_iter()
            .filter(|doc| doc.title == title)
            .collect();
        if sections.is_empty() {
            return Ok(None);
        }
        sections.sort_by(|a, b| compare_section_numbers(&a.section_number, &b.section_number));
        Ok(Some(FullDocument { title: title.to_string(), sections }))
    }

    /// Sorted unique act titles.
    pub fn list_titles(&self) -> Result<Vec<String>> {
        let titles: BTreeSet<String> = self.documents()?.into_iter().map(|d| d.title).collect();
        Ok(titles.into_iter().collect())
    }

    fn documents(&self) -> Result<Vec<SourceDocument>> {
        let mut docs = Vec::new();
        for path in list_source_files(&self.folder, self.plain_text)? {
            match read_source_file(&path) {
                Ok(file) => docs.extend(valid_rows(&file)),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file"),
            }
        }
        Ok(docs)
    }
}

fn valid_rows(file: &SourceFile) -> impl Iterator<Item = SourceDocument> + '_ {
    file.rows.iter().enumerate().filter_map(|(row_index, row)| match row_to_document(row) {
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::warn!(file = %file.name, row = row_index, error = %e, "skipping row");
            None
        }
    })
}

/// Numeric-aware ordering: "2" < "10" < "10A" < "Schedule" < "N/A".
pub fn compare_section_numbers(a: &str, b: &str) -> Ordering {
    section_key(a).cmp(&section_key(b))
}

fn section_key(number: &str) -> (u8, u64, String) {
    if number == NO_SECTION_NUMBER {
        return (2, 0, String::new());
    }
    let digits: String = number.chars().take_while(char::is_ascii_digit).collect();
    match digits.parse::<u64>() {
        Ok(n) => (0, n, number[digits.len()..].to_ascii_lowercase()),
        Err(_) => (1, 0, number.to_ascii_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(number: &str, name: &str) -> SourceDocument {
        SourceDocument {
            title: "Act".into(),
            section_name: name.into(),
            section_number: number.into(),
            section_text: format!("text of {name}"),
        }
    }

    #[test]
    fn sections_sort_numerically() {
        let mut numbers = vec!["10", "2", "N/A", "10A", "1", "Schedule"];
        numbers.sort_by(|a, b| compare_section_numbers(a, b));
        assert_eq!(numbers, vec!["1", "2", "10", "10A", "Schedule", "N/A"]);
    }

    #[test]
    fn render_formats_each_section() {
        let doc = FullDocument {
            title: "Act".into(),
            sections: vec![section("1", "Short title"), section("2", "Definitions")],
        };
        assert_eq!(
            doc.render(),
            "### Section 1: Short title\n\ntext of Short title\n\n---\n\n### Section 2: Definitions\n\ntext of Definitions\n\n---\n"
        );
    }
}
