// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Application settings for Shelfscan
//!
//! These are deployment settings (where the document lives, which model to
//! call, how the web UI binds). Prompt templates and usage counters live in
//! the document managed by [`crate::store`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::store::DEFAULT_DOCUMENT_PATH;

/// Default settings file name
pub const DEFAULT_SETTINGS_PATH: &str = "shelfscan.json";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Path of the prompt/statistics document
    #[serde(default = "default_document_path")]
    pub document_path: String,

    /// Hosted model configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Statistics persistence policy
    #[serde(default)]
    pub stats: StatsConfig,

    /// Analysis history log
    #[serde(default)]
    pub history: HistoryConfig,

    /// Web UI settings
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StatsConfig {
    /// Save the document after every successful analysis.
    /// When off, counters are committed only by an explicit save or reset.
    #[serde(default)]
    pub autosave: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_history_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

// Default value functions
fn default_document_path() -> String { DEFAULT_DOCUMENT_PATH.to_string() }
fn default_engine_url() -> String { "https://generativelanguage.googleapis.com/v1beta/models".to_string() }
fn default_model() -> String { "gemini-1.5-pro-latest".to_string() }
fn default_api_key_env() -> String { "GOOGLE_API_KEY".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_true() -> bool { true }
fn default_history_path() -> String { "shelfscan_history.jsonl".to_string() }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8501 }
fn default_max_upload() -> usize { 10 * 1024 * 1024 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            document_path: default_document_path(),
            engine: EngineConfig::default(),
            stats: StatsConfig::default(),
            history: HistoryConfig::default(),
            web: WebConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_history_path(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .map_err(|e| crate::ShelfError::Config(format!("Failed to parse settings: {}", e)))?;
            if !value.is_object() {
                return Err(crate::ShelfError::Config(format!(
                    "Settings file {:?} must contain a JSON object",
                    path
                )));
            }
            let config: Self = serde_json::from_value(value)
                .map_err(|e| crate::ShelfError::Config(format!("Invalid settings: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Settings file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("shelfscan.json")).unwrap();
        assert_eq!(config.document_path, "config.json");
        assert_eq!(config.engine.model, "gemini-1.5-pro-latest");
        assert!(!config.stats.autosave);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shelfscan.json");
        std::fs::write(&path, r#"{"stats": {"autosave": true}, "web": {"port": 9000}}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert!(config.stats.autosave);
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.engine.api_key_env, "GOOGLE_API_KEY");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shelfscan.json");

        let mut config = AppConfig::default();
        config.engine.timeout_secs = 30;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.engine.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shelfscan.json");
        for content in ["[]", r#"["other.json", {}, {"autosave": true}]"#, "{broken", r#"{"web": {"port": "x"}}"#] {
            std::fs::write(&path, content).unwrap();
            assert!(
                matches!(AppConfig::load(&path), Err(crate::ShelfError::Config(_))),
                "{}",
                content
            );
        }
    }
}
