// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The prompt/statistics document and its in-memory lifecycle

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Result, ShelfError};

/// Name of the short default template
pub const QUICK_TEMPLATE: &str = "Quick";

/// Name of the detailed default template
pub const FULL_TEMPLATE: &str = "Full";

/// Fixed cost charged per successful analysis, in USD
pub const DEFAULT_COST_PER_ANALYSIS: f64 = 0.0005;

/// Persisted shape of the document.
///
/// Field order here is the order written to disk, and `prompts` is a sorted
/// map, so two saves of the same document produce identical bytes. Unknown
/// keys are ignored on read and missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Template name -> instruction text
    #[serde(default = "default_prompts")]
    pub prompts: BTreeMap<String, String>,

    #[serde(default = "default_cost_per_analysis")]
    pub cost_per_analysis: f64,

    #[serde(default)]
    pub total_analyses: u64,

    #[serde(default)]
    pub total_cost: f64,
}

fn default_cost_per_analysis() -> f64 { DEFAULT_COST_PER_ANALYSIS }

/// Built-in templates used on first run
pub fn default_prompts() -> BTreeMap<String, String> {
    let mut prompts = BTreeMap::new();
    prompts.insert(
        QUICK_TEMPLATE.to_string(),
        "Analyze this shelf quickly and report:\n\
         1. Occupancy (%)\n\
         2. Main problems (max 2)\n\
         3. Most urgent action".to_string(),
    );
    prompts.insert(
        FULL_TEMPLATE.to_string(),
        "Provide a detailed analysis of this shelf:\n\
         1. Occupancy and organization\n\
         2. Problems found\n\
         3. Required actions".to_string(),
    );
    prompts
}

impl Default for DocumentRecord {
    fn default() -> Self {
        Self {
            prompts: default_prompts(),
            cost_per_analysis: DEFAULT_COST_PER_ANALYSIS,
            total_analyses: 0,
            total_cost: 0.0,
        }
    }
}

/// Keys written by [`DocumentRecord::to_json`]
const RECORD_KEYS: [&str; 4] = ["prompts", "cost_per_analysis", "total_analyses", "total_cost"];

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn check_amount(field: &str, value: f64) -> std::result::Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{} is not a finite number: {}", field, value));
    }
    if value < 0.0 {
        return Err(format!("negative {}: {}", field, value));
    }
    Ok(())
}

impl DocumentRecord {
    /// Parse and validate stored JSON.
    ///
    /// Returns a human-readable reason on failure; the caller attaches the path.
    pub fn from_json(content: &str) -> std::result::Result<Self, String> {
        Self::parse(content).map(|(record, _)| record)
    }

    /// Like [`from_json`](Self::from_json), also reporting whether defaults
    /// were filled in, so the result differs from the stored text.
    pub(crate) fn parse(content: &str) -> std::result::Result<(Self, bool), String> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| format!("invalid JSON: {}", e))?;

        // Derived Deserialize also accepts a positional array.
        let mut repaired = match &value {
            serde_json::Value::Object(map) => RECORD_KEYS.iter().any(|key| !map.contains_key(*key)),
            other => return Err(format!("expected a JSON object, found {}", json_kind(other))),
        };

        let mut record: Self = serde_json::from_value(value)
            .map_err(|e| format!("invalid document: {}", e))?;
        record.validate()?;

        if record.prompts.is_empty() {
            warn!("Stored document has no prompt templates, restoring defaults");
            record.prompts = default_prompts();
            repaired = true;
        }

        Ok((record, repaired))
    }

    /// Check the amounts are finite and non-negative
    pub fn validate(&self) -> std::result::Result<(), String> {
        check_amount("cost_per_analysis", self.cost_per_analysis)?;
        check_amount("total_cost", self.total_cost)
    }

    /// Serialize to the on-disk form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Whether the in-memory document matches what is on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistStatus {
    /// Changed since the last successful save, or never saved
    Unsaved,
    /// Identical to the last successful save
    Saved,
}

/// Token returned by [`Document::request_reset`] and required to confirm it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResetTicket(Uuid);

impl ResetTicket {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ResetTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResetTicket {
    type Err = ShelfError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ShelfError::Validation(format!("malformed reset ticket: {}", s)))
    }
}

/// One session's working copy of the document
#[derive(Debug, Clone)]
pub struct Document {
    record: DocumentRecord,
    status: PersistStatus,
    pending_reset: Option<ResetTicket>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DocumentRecord::default(), PersistStatus::Unsaved)
    }
}

impl Document {
    pub(crate) fn new(record: DocumentRecord, status: PersistStatus) -> Self {
        Self {
            record,
            status,
            pending_reset: None,
        }
    }

    /// Persisted contents
    pub fn record(&self) -> &DocumentRecord {
        &self.record
    }

    pub fn status(&self) -> PersistStatus {
        self.status
    }

    pub fn is_saved(&self) -> bool {
        self.status == PersistStatus::Saved
    }

    pub(crate) fn mark_saved(&mut self) {
        self.status = PersistStatus::Saved;
    }

    pub(crate) fn touch(&mut self) {
        self.status = PersistStatus::Unsaved;
    }

    pub fn prompts(&self) -> &BTreeMap<String, String> {
        &self.record.prompts
    }

    /// Body of a template, if it exists
    pub fn prompt(&self, name: &str) -> Option<&str> {
        self.record.prompts.get(name).map(String::as_str)
    }

    pub fn template_names(&self) -> Vec<&str> {
        self.record.prompts.keys().map(String::as_str).collect()
    }

    pub fn cost_per_analysis(&self) -> f64 {
        self.record.cost_per_analysis
    }

    pub fn total_analyses(&self) -> u64 {
        self.record.total_analyses
    }

    pub fn total_cost(&self) -> f64 {
        self.record.total_cost
    }

    /// Count one successful analysis. Returns the cost that was added.
    pub fn record_analysis(&mut self) -> f64 {
        let cost = self.record.cost_per_analysis;
        self.record.total_analyses += 1;
        self.record.total_cost += cost;
        self.touch();
        debug!(
            "Recorded analysis #{} (total cost {:.4})",
            self.record.total_analyses, self.record.total_cost
        );
        cost
    }

    /// Insert or replace a template
    pub fn update_prompt_template(&mut self, name: &str, body: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ShelfError::Validation("template name must not be empty".to_string()));
        }
        if body.trim().is_empty() {
            return Err(ShelfError::Validation(format!(
                "template '{}' must have a non-empty body",
                name
            )));
        }

        self.record.prompts.insert(name.to_string(), body.to_string());
        self.touch();
        info!("Updated prompt template '{}'", name);
        Ok(())
    }

    /// Remove a template. The last remaining template cannot be removed.
    pub fn remove_prompt_template(&mut self, name: &str) -> Result<()> {
        if !self.record.prompts.contains_key(name) {
            return Err(ShelfError::InvalidTemplate(name.to_string()));
        }
        if self.record.prompts.len() == 1 {
            return Err(ShelfError::Validation(
                "cannot remove the only prompt template".to_string(),
            ));
        }

        self.record.prompts.remove(name);
        self.touch();
        info!("Removed prompt template '{}'", name);
        Ok(())
    }

    /// First half of a statistics reset. Replaces any earlier pending request.
    pub fn request_reset(&mut self) -> ResetTicket {
        let ticket = ResetTicket::new();
        self.pending_reset = Some(ticket);
        debug!("Statistics reset requested ({})", ticket);
        ticket
    }

    pub fn pending_reset(&self) -> Option<ResetTicket> {
        self.pending_reset
    }

    pub fn cancel_reset(&mut self) {
        self.pending_reset = None;
    }

    /// Zero both counters if `ticket` matches the pending request
    pub fn confirm_reset(&mut self, ticket: ResetTicket) -> Result<()> {
        match self.pending_reset {
            Some(pending) if pending == ticket => {
                self.pending_reset = None;
                self.record.total_analyses = 0;
                self.record.total_cost = 0.0;
                self.touch();
                info!("Statistics reset");
                Ok(())
            }
            Some(_) => Err(ShelfError::Validation(
                "reset ticket does not match the pending request".to_string(),
            )),
            None => Err(ShelfError::Validation(
                "no statistics reset has been requested".to_string(),
            )),
        }
    }

    /// Single-call reset for callers that collect confirmation themselves
    pub fn reset_statistics(&mut self, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(ShelfError::Validation(
                "statistics reset requires confirmation".to_string(),
            ));
        }
        let ticket = self.request_reset();
        self.confirm_reset(ticket)
    }
}
