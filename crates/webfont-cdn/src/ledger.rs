//! Ledger of processed font versions.

use std::{collections::BTreeMap, fs, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Ledger entry for a single font.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Processed version (release tag).
    pub version: String,
    /// Publication timestamp of the processed release; empty if unknown.
    #[serde(default)]
    pub updated_at: String,
}

/// Persistent mapping from font names to the last successfully processed versions,
/// usually stored in `versions.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl VersionLedger {
    /// Loads the ledger from a JSON file. A missing file produces an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let json = match fs::read(path) {
            Ok(json) => json,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };
        serde_json::from_slice(&json).map_err(|source| LedgerError::Json {
            path: path.to_owned(),
            source,
        })
    }

    /// Saves the ledger as pretty-printed JSON, creating parent directories if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let io_error = |source| LedgerError::Io {
            path: path.to_owned(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| LedgerError::Json {
            path: path.to_owned(),
            source,
        })?;
        fs::write(path, json).map_err(io_error)
    }

    /// Returns the recorded version of the font, if any.
    pub fn version(&self, font: &str) -> Option<&str> {
        self.entries.get(font).map(|entry| entry.version.as_str())
    }

    /// Returns the entry for the font, if any.
    pub fn get(&self, font: &str) -> Option<&LedgerEntry> {
        self.entries.get(font)
    }

    /// Records a processed version of the font, replacing the previous entry.
    pub fn record(&mut self, font: &str, version: &str, updated_at: &str) {
        let entry = LedgerEntry {
            version: version.to_owned(),
            updated_at: updated_at.to_owned(),
        };
        self.entries.insert(font.to_owned(), entry);
    }

    /// Returns the number of recorded fonts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
