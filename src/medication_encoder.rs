//! Medication name to model code lookup.
//!
//! The table is read once at startup from a `medication,encoded_value` CSV
//! file. When the file is missing or unreadable the fixed table the model
//! was trained with is used instead.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{RiskError, RiskResult};

const FALLBACK_TABLE: &[(&str, i64)] = &[
    ("Sertraline", 0),
    ("Warfarin", 1),
    ("Digoxin", 2),
    ("Propranolol", 3),
    ("Acetaminophen", 4),
    ("Zolpidem", 5),
    ("Aspirin", 6),
    ("Ibuprofen", 7),
    ("Metformin", 8),
    ("Lisinopril", 9),
    ("Atorvastatin", 10),
];

#[derive(Debug, Deserialize)]
struct EncoderRow {
    medication: String,
    encoded_value: i64,
}

/// Where the active table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderSource {
    File,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct MedicationEncoder {
    names: Vec<String>,
    codes: HashMap<String, i64>,
    source: EncoderSource,
}

impl MedicationEncoder {
    /// Build an encoder from `(name, code)` pairs, keeping first-seen order.
    /// A repeated name takes the later code.
    pub fn from_pairs<I, S>(pairs: I, source: EncoderSource) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut names = Vec::new();
        let mut codes = HashMap::new();
        for (name, code) in pairs {
            let name = name.into();
            if codes.insert(name.clone(), code).is_none() {
                names.push(name);
            }
        }
        Self {
            names,
            codes,
            source,
        }
    }

    pub fn fallback() -> Self {
        Self::from_pairs(FALLBACK_TABLE.iter().copied(), EncoderSource::Fallback)
    }

    /// Read the table from a CSV file with a `medication,encoded_value` header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> RiskResult<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;

        let mut pairs = Vec::new();
        for row in reader.deserialize() {
            let row: EncoderRow = row.map_err(|e| csv_error(path, e))?;
            let name = row.medication.trim();
            if name.is_empty() {
                return Err(RiskError::config(format!(
                    "Empty medication name in {}",
                    path.display()
                )));
            }
            pairs.push((name.to_string(), row.encoded_value));
        }

        if pairs.is_empty() {
            return Err(RiskError::config(format!(
                "Medication encoder {} has no rows",
                path.display()
            )));
        }

        Ok(Self::from_pairs(pairs, EncoderSource::File))
    }

    /// Load from `path`, falling back to the built-in table on any failure.
    pub fn load_or_fallback<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::from_csv(path) {
            Ok(encoder) => {
                tracing::info!(
                    "Medication encoder loaded from {} ({} medications)",
                    path.display(),
                    encoder.len()
                );
                encoder
            }
            Err(e) => {
                tracing::warn!("Error loading medication encoder: {e}; using fallback mapping");
                Self::fallback()
            }
        }
    }

    pub fn code(&self, name: &str) -> Option<i64> {
        self.codes.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codes.contains_key(name)
    }

    /// Medication names in table order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn source(&self) -> EncoderSource {
        self.source
    }

    /// True when the table came from the encoder file.
    pub fn loaded_from_file(&self) -> bool {
        self.source == EncoderSource::File
    }
}

fn csv_error(path: &Path, err: csv::Error) -> RiskError {
    match err.into_kind() {
        csv::ErrorKind::Io(source) => {
            RiskError::io(format!("reading encoder {}", path.display()), source)
        }
        other => RiskError::config(format!(
            "Malformed medication encoder {}: {other:?}",
            path.display()
        )),
    }
}
