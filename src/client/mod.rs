// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Hosted model clients

pub mod gemini;

use async_trait::async_trait;

use crate::request::AnalysisRequest;
use crate::Result;

pub use gemini::GeminiClient;

/// A multimodal model that turns an instruction plus a photo into text.
///
/// Implementations report every failure (transport, quota, blocked or
/// malformed response) as [`crate::ShelfError::ExternalCall`].
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Short name for logs and status output
    fn name(&self) -> &'static str;

    /// Run one analysis and return the model's text
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String>;

    /// Check that the model endpoint is reachable and the credentials work
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
