// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Load/save boundary for the prompt and statistics document

pub mod document;

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use document::{
    default_prompts, Document, DocumentRecord, PersistStatus, ResetTicket,
    DEFAULT_COST_PER_ANALYSIS, FULL_TEMPLATE, QUICK_TEMPLATE,
};

use crate::{Result, ShelfError};

/// Default location of the document, relative to the working directory
pub const DEFAULT_DOCUMENT_PATH: &str = "config.json";

/// Reads and writes the document at a fixed path
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_DOCUMENT_PATH)
    }
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, falling back to defaults only when the file is absent.
    ///
    /// A file that exists but cannot be read or parsed is an error, so user
    /// templates are never silently replaced.
    pub fn load(&self) -> Result<Document> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Document not found at {:?}, using defaults", self.path);
                return Ok(Document::default());
            }
            Err(e) => {
                return Err(ShelfError::StorageRead {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let (record, repaired) = DocumentRecord::parse(&content).map_err(|reason| {
            ShelfError::StorageRead {
                path: self.path.clone(),
                reason,
            }
        })?;

        debug!(
            "Loaded document from {:?}: {} templates, {} analyses",
            self.path,
            record.prompts.len(),
            record.total_analyses
        );
        // Filled-in defaults are not on disk yet.
        let status = if repaired { PersistStatus::Unsaved } else { PersistStatus::Saved };
        Ok(Document::new(record, status))
    }

    /// Write the whole document, replacing the previous file atomically.
    ///
    /// On failure the document keeps its `Unsaved` status and the previous
    /// file is left intact.
    pub fn save(&self, document: &mut Document) -> Result<()> {
        match self.write_record(document.record()) {
            Ok(()) => {
                document.mark_saved();
                debug!("Saved document to {:?}", self.path);
                Ok(())
            }
            Err(e) => {
                document.touch();
                Err(e)
            }
        }
    }

    fn write_record(&self, record: &DocumentRecord) -> Result<()> {
        record
            .validate()
            .map_err(|reason| self.write_error(std::io::Error::new(ErrorKind::InvalidData, reason)))?;

        let json = record
            .to_json()
            .map_err(|e| self.write_error(std::io::Error::other(e)))?;

        self.write_atomic(json.as_bytes())
            .map_err(|e| self.write_error(e))
    }

    fn write_error(&self, source: std::io::Error) -> ShelfError {
        ShelfError::StorageWrite {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(DEFAULT_DOCUMENT_PATH));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomic(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to temp file then rename over the target.
        let tmp_path = self.temp_path();
        let result = (|| {
            let mut file = File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        })();

        if result.is_err() && tmp_path.exists() {
            if let Err(e) = fs::remove_file(&tmp_path) {
                warn!("Failed to remove temporary file {:?}: {}", tmp_path, e);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_absent_returns_defaults() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        let doc = store.load().unwrap();
        assert_eq!(doc.template_names(), vec![FULL_TEMPLATE, QUICK_TEMPLATE]);
        assert_eq!(doc.total_analyses(), 0);
        assert_eq!(doc.total_cost(), 0.0);
        assert_eq!(doc.cost_per_analysis(), 0.0005);
        assert!(!doc.is_saved());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        let mut doc = store.load().unwrap();
        store.save(&mut doc).unwrap();
        assert!(doc.is_saved());

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.record(), doc.record());
        assert!(reloaded.is_saved());
    }

    #[test]
    fn test_save_is_deterministic() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        let mut doc = Document::default();
        doc.update_prompt_template("Aisle", "Check aisle signage").unwrap();
        store.save(&mut doc).unwrap();
        let first = fs::read(store.path()).unwrap();

        let mut reloaded = store.load().unwrap();
        store.save(&mut reloaded).unwrap();
        let second = fs::read(store.path()).unwrap();

        assert_eq!(first, second);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_record_once_and_save() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        let mut doc = store.load().unwrap();
        doc.record_analysis();
        store.save(&mut doc).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.total_analyses(), 1);
        assert_eq!(reloaded.total_cost(), 0.0005);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ \"prompts\": ").unwrap();

        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ShelfError::StorageRead { .. }));
    }

    #[test]
    fn test_directory_in_place_of_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::create_dir(&path).unwrap();

        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ShelfError::StorageRead { .. }));
    }

    #[test]
    fn test_failed_save_keeps_unsaved() {
        let dir = tempdir().unwrap();
        // A directory at the target path makes the final rename fail.
        let path = dir.path().join("config.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let store = ConfigStore::new(&path);
        let mut doc = Document::default();
        let err = store.save(&mut doc).unwrap_err();

        assert!(matches!(err, ShelfError::StorageWrite { .. }));
        assert!(!doc.is_saved());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_failed_save_of_saved_document_marks_unsaved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::new(&path);

        let mut doc = Document::default();
        store.save(&mut doc).unwrap();
        assert!(doc.is_saved());

        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        assert!(store.save(&mut doc).is_err());
        assert!(!doc.is_saved());
    }

    #[test]
    fn test_non_finite_total_is_not_written() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        let mut doc = Document::new(
            DocumentRecord {
                cost_per_analysis: 1e308,
                total_cost: 1.7e308,
                ..DocumentRecord::default()
            },
            PersistStatus::Unsaved,
        );
        store.save(&mut doc).unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        doc.record_analysis();
        let err = store.save(&mut doc).unwrap_err();
        assert!(matches!(err, ShelfError::StorageWrite { .. }));
        assert!(!doc.is_saved());

        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
        assert_eq!(store.load().unwrap().total_cost(), 1.7e308);
    }

    #[test]
    fn test_non_object_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        for content in ["[]", r#"[{"Mine": "keep"}, 0.1, 7]"#] {
            fs::write(&path, content).unwrap();
            let err = ConfigStore::new(&path).load().unwrap_err();
            assert!(matches!(err, ShelfError::StorageRead { .. }), "{}", content);
        }
    }

    #[test]
    fn test_repaired_load_is_unsaved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::new(&path);

        fs::write(&path, r#"{"prompts": {}, "cost_per_analysis": 0.001, "total_analyses": 1, "total_cost": 0.001}"#).unwrap();
        let doc = store.load().unwrap();
        assert_eq!(doc.prompts(), &default_prompts());
        assert!(!doc.is_saved());

        fs::write(&path, r#"{"total_analyses": 4}"#).unwrap();
        assert!(!store.load().unwrap().is_saved());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("state").join("config.json"));

        let mut doc = Document::default();
        store.save(&mut doc).unwrap();
        assert!(store.path().exists());
    }
}
