// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Shelfscan

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Shelfscan operations
pub type Result<T> = std::result::Result<T, ShelfError>;

/// Shelfscan error types
#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("Cannot read stored document {path:?}: {reason}")]
    StorageRead { path: PathBuf, reason: String },

    #[error("Cannot write stored document {path:?}: {source}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown prompt template: {0}")]
    InvalidTemplate(String),

    #[error("Analysis failed: {0}")]
    ExternalCall(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("An analysis is already in progress")]
    Busy,

    #[error("Upload exceeds the {limit} byte limit")]
    UploadTooLarge { limit: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl ShelfError {
    /// Whether this error came from the hosted model rather than local state
    pub fn is_external(&self) -> bool {
        matches!(self, ShelfError::ExternalCall(_))
    }
}
