//! Labeled training data for the intent classifier.
//!
//! The source format is a delimited text file with a header row and at least
//! two columns: the utterance and its intent label. Additional columns are
//! ignored. Quoting follows RFC 4180: a field wrapped in double quotes may
//! contain the delimiter and line breaks, and `""` inside it is a literal quote.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, ClassifierResult};

/// One labeled utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub text: String,
    pub label: String,
}

impl TrainingExample {
    /// Trim both fields; `None` if either is empty afterwards.
    pub fn new(text: &str, label: &str) -> Option<Self> {
        let text = text.trim();
        let label = label.trim();
        if text.is_empty() || label.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            label: label.to_string(),
        })
    }
}

/// Location and dialect of a training data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSource {
    pub path: PathBuf,
    pub delimiter: char,
}

impl TrainingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: ',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Read every usable example from the file.
    ///
    /// Rows with fewer than two fields or an empty text/label are skipped.
    /// An existing file that yields no examples is an `EmptyCorpus` error.
    pub fn load(&self) -> ClassifierResult<Vec<TrainingExample>> {
        let examples = read_examples(&self.path, self.delimiter)?;
        if examples.is_empty() {
            return Err(ClassifierError::EmptyCorpus);
        }
        tracing::debug!(
            path = %self.path.display(),
            examples = examples.len(),
            "training data loaded"
        );
        Ok(examples)
    }
}

fn read_examples(path: &Path, delimiter: char) -> ClassifierResult<Vec<TrainingExample>> {
    if !path.exists() {
        return Err(ClassifierError::SourceNotFound {
            path: path.display().to_string(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ClassifierError::SourceRead {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_examples(&raw, delimiter))
}

/// Parse delimited text (header row first) into training examples.
pub fn parse_examples(raw: &str, delimiter: char) -> Vec<TrainingExample> {
    parse_records(raw, delimiter)
        .into_iter()
        .skip(1)
        .filter_map(|row| match row.as_slice() {
            [text, label, ..] => TrainingExample::new(text, label),
            _ => None,
        })
        .collect()
}

/// Split delimited text into records of fields.
///
/// A leading byte-order mark is ignored; blank lines produce no record.
pub fn parse_records(raw: &str, delimiter: char) -> Vec<Vec<String>> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // Whether the current record has seen any character at all.
    let mut started = false;

    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                started = true;
            }
            c if c == delimiter => {
                record.push(std::mem::take(&mut field));
                started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if started {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                started = false;
            }
            c => {
                field.push(c);
                started = true;
            }
        }
    }
    if started {
        record.push(field);
        records.push(record);
    }
    records
}
