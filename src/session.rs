// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! One interactive session: a document, its store, and the analysis flow

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::client::AnalysisClient;
use crate::config::AppConfig;
use crate::history::{create_entry, AnalysisLog};
use crate::request::{AnalysisRequest, AnalysisRequestBuilder, ShelfImage};
use crate::store::{ConfigStore, Document, ResetTicket};
use crate::{Result, ShelfError};

/// Result of a successful analysis
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub template: String,
    pub text: String,
    /// Cost added to the running total
    pub cost: f64,
    pub elapsed: Duration,
    /// Whether the updated counters reached disk
    pub saved: bool,
    /// Autosave failure, reported without failing the analysis
    pub save_error: Option<String>,
    /// History append failure, reported the same way
    pub history_error: Option<String>,
}

/// Marks an analysis as outstanding; cleared on drop
pub struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    /// Claim the flag, failing with `Busy` if another analysis holds it
    pub fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ShelfError::Busy)?;
        Ok(Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Working state of one running front-end
pub struct Session {
    store: ConfigStore,
    document: Document,
    autosave: bool,
    log: Option<AnalysisLog>,
}

impl Session {
    /// Load the document from `store`
    pub fn open(store: ConfigStore, autosave: bool) -> Result<Self> {
        let document = store.load()?;
        Ok(Self {
            store,
            document,
            autosave,
            log: None,
        })
    }

    /// Open a session as described by the settings
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let session = Self::open(ConfigStore::new(&config.document_path), config.stats.autosave)?;
        if config.history.enabled {
            Ok(session.with_log(AnalysisLog::new(PathBuf::from(&config.history.path))))
        } else {
            Ok(session)
        }
    }

    pub fn with_log(mut self, log: AnalysisLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Direct access for edits that are saved separately
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn autosave(&self) -> bool {
        self.autosave
    }

    pub fn log(&self) -> Option<&AnalysisLog> {
        self.log.as_ref()
    }

    /// Write the document to disk
    pub fn save(&mut self) -> Result<()> {
        self.store.save(&mut self.document)
    }

    /// Build a request against the current templates
    pub fn prepare(&self, template: &str, image: ShelfImage) -> Result<AnalysisRequest> {
        AnalysisRequestBuilder::build(&self.document, template, image)
    }

    /// Account for a successful model call
    pub fn complete(&mut self, request: &AnalysisRequest, text: String, elapsed: Duration) -> AnalysisOutcome {
        let cost = self.document.record_analysis();

        let history_error = self.log.as_ref().and_then(|log| {
            let entry = create_entry(
                request.template.clone(),
                request.image.hash(),
                cost,
                elapsed.as_millis() as u64,
                text.clone(),
            );
            log.append(&entry).err().map(|e| {
                warn!("Failed to write history entry: {}", e);
                e.to_string()
            })
        });

        let save_error = if self.autosave {
            self.save().err().map(|e| {
                warn!("Autosave failed: {}", e);
                e.to_string()
            })
        } else {
            None
        };

        AnalysisOutcome {
            template: request.template.clone(),
            text,
            cost,
            elapsed,
            saved: self.document.is_saved(),
            save_error,
            history_error,
        }
    }

    /// Build, call and record one analysis.
    ///
    /// Counters change only when the client succeeds.
    pub async fn analyze(
        &mut self,
        client: &dyn AnalysisClient,
        template: &str,
        image: ShelfImage,
    ) -> Result<AnalysisOutcome> {
        let request = self.prepare(template, image)?;

        let started = Instant::now();
        let text = client.analyze(&request).await?;
        let elapsed = started.elapsed();

        info!("Analysis with '{}' finished in {:.1}s", template, elapsed.as_secs_f64());
        Ok(self.complete(&request, text, elapsed))
    }

    /// Replace a template and save
    pub fn update_prompt(&mut self, name: &str, body: &str) -> Result<()> {
        self.document.update_prompt_template(name, body)?;
        self.save()
    }

    /// Remove a template and save
    pub fn remove_prompt(&mut self, name: &str) -> Result<()> {
        self.document.remove_prompt_template(name)?;
        self.save()
    }

    pub fn request_reset(&mut self) -> ResetTicket {
        self.document.request_reset()
    }

    /// Confirm a pending reset and save
    pub fn confirm_reset(&mut self, ticket: ResetTicket) -> Result<()> {
        self.document.confirm_reset(ticket)?;
        self.save()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::request::tests::png_bytes;
    use crate::store::{FULL_TEMPLATE, QUICK_TEMPLATE};
    use async_trait::async_trait;
    use tempfile::tempdir;

    /// Client returning a canned reply or failure
    pub(crate) struct StubClient {
        pub reply: std::result::Result<String, String>,
    }

    impl StubClient {
        pub(crate) fn ok(text: &str) -> Self {
            Self { reply: Ok(text.to_string()) }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self { reply: Err(message.to_string()) }
        }
    }

    #[async_trait]
    impl AnalysisClient for StubClient {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn analyze(&self, _request: &AnalysisRequest) -> Result<String> {
            self.reply.clone().map_err(ShelfError::ExternalCall)
        }
    }

    fn image() -> ShelfImage {
        ShelfImage::from_bytes(png_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_analysis_counts_without_saving() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut session = Session::open(store.clone(), false).unwrap();

        let outcome = session
            .analyze(&StubClient::ok("1. 75%"), QUICK_TEMPLATE, image())
            .await
            .unwrap();

        assert_eq!(outcome.text, "1. 75%");
        assert_eq!(outcome.cost, 0.0005);
        assert!(!outcome.saved);
        assert_eq!(session.document().total_analyses(), 1);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_autosave_persists_counters() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut session = Session::open(store.clone(), true).unwrap();

        let outcome = session
            .analyze(&StubClient::ok("done"), FULL_TEMPLATE, image())
            .await
            .unwrap();

        assert!(outcome.saved);
        assert!(outcome.save_error.is_none());
        assert_eq!(store.load().unwrap().total_analyses(), 1);
    }

    #[tokio::test]
    async fn test_failed_call_leaves_counters() {
        let dir = tempdir().unwrap();
        let mut session = Session::open(ConfigStore::new(dir.path().join("config.json")), true).unwrap();

        let err = session
            .analyze(&StubClient::failing("quota exceeded"), QUICK_TEMPLATE, image())
            .await
            .unwrap_err();

        assert!(err.is_external());
        assert_eq!(session.document().total_analyses(), 0);
        assert_eq!(session.document().total_cost(), 0.0);
    }

    #[tokio::test]
    async fn test_unknown_template_never_calls_client() {
        let dir = tempdir().unwrap();
        let mut session = Session::open(ConfigStore::new(dir.path().join("config.json")), false).unwrap();

        let err = session
            .analyze(&StubClient::ok("unused"), "Nonexistent", image())
            .await
            .unwrap_err();

        assert!(matches!(err, ShelfError::InvalidTemplate(_)));
        assert_eq!(session.document().total_analyses(), 0);
    }

    #[tokio::test]
    async fn test_history_entry_written() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("history.jsonl");
        let mut session = Session::open(ConfigStore::new(dir.path().join("config.json")), false)
            .unwrap()
            .with_log(AnalysisLog::new(log_path));

        session.analyze(&StubClient::ok("shelf ok"), QUICK_TEMPLATE, image()).await.unwrap();

        let entries = session.log().unwrap().read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].template, QUICK_TEMPLATE);
        assert_eq!(entries[0].response, "shelf ok");
        assert_eq!(entries[0].image_hash, image().hash());
    }

    #[tokio::test]
    async fn test_autosave_failure_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut session = Session::open(ConfigStore::new(&path), true).unwrap();

        // Block the target after loading so the save fails.
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();

        let outcome = session
            .analyze(&StubClient::ok("fine"), QUICK_TEMPLATE, image())
            .await
            .unwrap();

        assert!(!outcome.saved);
        assert!(outcome.save_error.is_some());
        assert_eq!(session.document().total_analyses(), 1);
    }

    #[tokio::test]
    async fn test_history_failure_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("history.jsonl");
        std::fs::create_dir(&log_path).unwrap();
        let mut session = Session::open(ConfigStore::new(dir.path().join("config.json")), false)
            .unwrap()
            .with_log(AnalysisLog::new(log_path));

        let outcome = session
            .analyze(&StubClient::ok("fine"), QUICK_TEMPLATE, image())
            .await
            .unwrap();

        assert!(outcome.history_error.is_some());
        assert!(outcome.save_error.is_none());
        assert_eq!(session.document().total_analyses(), 1);
    }

    #[test]
    fn test_update_prompt_saves() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut session = Session::open(store.clone(), false).unwrap();

        session.update_prompt(QUICK_TEMPLATE, "New body").unwrap();
        assert!(session.document().is_saved());

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.prompt(QUICK_TEMPLATE), Some("New body"));
        assert_eq!(reloaded.prompt(FULL_TEMPLATE), Document::default().prompt(FULL_TEMPLATE));
    }

    #[test]
    fn test_confirm_reset_saves() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut session = Session::open(store.clone(), false).unwrap();
        session.document_mut().record_analysis();
        session.save().unwrap();

        let ticket = session.request_reset();
        session.confirm_reset(ticket).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.total_analyses(), 0);
        assert_eq!(reloaded.total_cost(), 0.0);
    }

    #[test]
    fn test_in_flight_guard() {
        let flag = AtomicBool::new(false);
        let guard = InFlight::acquire(&flag).unwrap();
        assert!(matches!(InFlight::acquire(&flag), Err(ShelfError::Busy)));
        drop(guard);
        assert!(InFlight::acquire(&flag).is_ok());
    }
}
