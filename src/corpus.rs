//! The fixed question/answer knowledge base.
//!
//! Loaded from CSV once at startup and read-only afterwards. Row position is
//! the entry's identity: embedding row i corresponds to corpus row i, so the
//! files must never be reordered without rebuilding the index.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub question: String,
    pub answer: String,
    pub question_sw: Option<String>,
    pub answer_sw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnglishRow {
    question: String,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct SwahiliRow {
    #[serde(default)]
    question_sw: Option<String>,
    #[serde(default)]
    answer_sw: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
}

impl Corpus {
    /// Load the English corpus and, when present, merge the pre-translated
    /// Swahili file row by row.
    pub fn load(english_csv: &Path, swahili_csv: &Path) -> Result<Self> {
        let mut entries = read_english(english_csv)?;

        if swahili_csv.exists() {
            match read_swahili(swahili_csv) {
                Ok(rows) => {
                    if rows.len() != entries.len() {
                        tracing::warn!(
                            "Swahili corpus has {} rows but English has {}; rows beyond the shorter file are ignored",
                            rows.len(),
                            entries.len()
                        );
                    }
                    for (entry, row) in entries.iter_mut().zip(rows) {
                        entry.question_sw = row.question_sw.filter(|s| !s.trim().is_empty());
                        entry.answer_sw = row.answer_sw.filter(|s| !s.trim().is_empty());
                    }
                    tracing::info!("Loaded Swahili translations from {}", swahili_csv.display());
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not load Swahili corpus {}: {e:#}; runtime translation will be used",
                        swahili_csv.display()
                    );
                }
            }
        } else {
            tracing::info!("No Swahili corpus found; runtime translation will be used");
        }

        tracing::info!("Loaded {} knowledge base entries", entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Answer texts in row order; retrieval searches over answers only.
    pub fn answers(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.answer.clone()).collect()
    }

    /// Swahili answer texts in row order, empty string where untranslated.
    /// Returns `None` when no row carries a translation.
    pub fn swahili_answers(&self) -> Option<Vec<String>> {
        if self.entries.iter().any(|e| e.answer_sw.is_some()) {
            Some(
                self.entries
                    .iter()
                    .map(|e| e.answer_sw.clone().unwrap_or_default())
                    .collect(),
            )
        } else {
            None
        }
    }
}

fn read_english(path: &Path) -> Result<Vec<CorpusEntry>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open knowledge base {}", path.display()))?;
    let mut entries = Vec::new();
    for row in reader.deserialize() {
        let row: EnglishRow = row.context("Malformed knowledge base row")?;
        entries.push(CorpusEntry {
            question: row.question,
            answer: row.answer,
            question_sw: None,
            answer_sw: None,
        });
    }
    Ok(entries)
}

fn read_swahili(path: &Path) -> Result<Vec<SwahiliRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open Swahili corpus {}", path.display()))?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        let row: SwahiliRow = row.context("Malformed Swahili corpus row")?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_english_only() {
        let dir = tempfile::tempdir().unwrap();
        let en = write_file(
            &dir,
            "kb.csv",
            "question,answer\nWhat is PCOS?,PCOS is a hormonal disorder.\n",
        );
        let corpus = Corpus::load(&en, &dir.path().join("missing.csv")).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.answers()[0], "PCOS is a hormonal disorder.");
        assert!(corpus.swahili_answers().is_none());
    }

    #[test]
    fn merges_swahili_rows_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let en = write_file(
            &dir,
            "kb.csv",
            "question,answer\nq1,a1\nq2,a2\n",
        );
        let sw = write_file(
            &dir,
            "kb_sw.csv",
            "question,answer,question_sw,answer_sw\nq1,a1,swali moja,jibu moja\nq2,a2,,\n",
        );
        let corpus = Corpus::load(&en, &sw).unwrap();
        let answers = corpus.swahili_answers().unwrap();
        assert_eq!(answers[0], "jibu moja");
        assert_eq!(answers[1], "");
    }

    #[test]
    fn quoted_fields_survive() {
        let dir = tempfile::tempdir().unwrap();
        let en = write_file(
            &dir,
            "kb.csv",
            "question,answer\n\"What, exactly, is PMS?\",\"Mood swings, cramps, and fatigue.\"\n",
        );
        let corpus = Corpus::load(&en, &dir.path().join("missing.csv")).unwrap();
        assert_eq!(corpus.answers()[0], "Mood swings, cramps, and fatigue.");
    }
}
