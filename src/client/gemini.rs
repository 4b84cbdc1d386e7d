// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Gemini `generateContent` client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::AnalysisClient;
use crate::config::EngineConfig;
use crate::request::{AnalysisRequest, GenerationParams};
use crate::{Result, ShelfError};

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

impl From<GenerationParams> for GenerationConfig {
    fn from(params: GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            top_p: params.top_p,
            max_output_tokens: params.max_output_tokens,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl GeminiClient {
    /// Create a client from engine settings, reading the API key from the environment
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("{} is not set, analyses will fail until it is", config.api_key_env);
        }
        Self::with_api_key(config, api_key)
    }

    /// Create a client with an explicit key
    pub fn with_api_key(config: &EngineConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ShelfError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn model_url(&self) -> String {
        format!("{}/{}", self.base_url, self.model)
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            ShelfError::ExternalCall(format!("API key not set (expected in {})", self.api_key_env))
        })
    }

    async fn error_from_response(response: reqwest::Response) -> ShelfError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        ShelfError::ExternalCall(format!("model returned status {}: {}", status, detail.trim()))
    }
}

fn build_body(request: &AnalysisRequest) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text { text: &request.instruction },
                Part::Image {
                    inline_data: InlineData {
                        mime_type: request.image.mime_type(),
                        data: request.image.to_base64(),
                    },
                },
            ],
        }],
        generation_config: request.params.into(),
    }
}

/// Join the text parts of the first candidate
fn extract_text(response: GenerateResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ShelfError::ExternalCall(format!("request blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ShelfError::ExternalCall("model returned no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(ShelfError::ExternalCall(format!(
            "model returned no text (finish reason: {})",
            reason
        )));
    }

    Ok(text)
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String> {
        let api_key = self.api_key()?;
        let url = format!("{}:generateContent", self.model_url());

        debug!(
            "Sending vision request to Gemini: model={}, template={}",
            self.model, request.template
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| ShelfError::ExternalCall(format!("cannot reach model: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ShelfError::ExternalCall(format!("malformed model response: {}", e)))?;

        extract_text(result)
    }

    async fn health_check(&self) -> Result<()> {
        let api_key = self.api_key()?;

        let response = self
            .client
            .get(self.model_url())
            .header("x-goog-api-key", api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                ShelfError::ExternalCall(format!("cannot connect to {}: {}", self.base_url, e))
            })?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::tests::png_bytes;
    use crate::request::{AnalysisRequestBuilder, ShelfImage};
    use crate::store::{Document, QUICK_TEMPLATE};

    fn sample_request() -> AnalysisRequest {
        let doc = Document::default();
        let image = ShelfImage::from_bytes(png_bytes()).unwrap();
        AnalysisRequestBuilder::build(&doc, QUICK_TEMPLATE, image).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let request = sample_request();
        let body = serde_json::to_value(build_body(&request)).unwrap();

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], request.instruction.as_str());
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], request.image.to_base64().as_str());

        let config = &body["generationConfig"];
        assert_eq!(config["maxOutputTokens"], 300);
        assert!((config["topP"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!((config["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"1. 80%\n"},{"text":"2. Gaps"}]},"finishReason":"STOP"}]}"#,
        ).unwrap();
        assert_eq!(extract_text(response).unwrap(), "1. 80%\n2. Gaps");
    }

    #[test]
    fn test_extract_text_blocked() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#,
        ).unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(err.is_external());
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_text_empty_candidate() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#,
        ).unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_external_error() {
        let client = GeminiClient::with_api_key(&EngineConfig::default(), None).unwrap();
        let err = client.analyze(&sample_request()).await.unwrap_err();
        assert!(err.is_external());
    }
}
