// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Request assembly for shelf analysis

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::store::Document;
use crate::{Result, ShelfError};

/// Sampling parameters sent with every analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    /// Low randomness, short answers
    pub const FIXED: Self = Self {
        temperature: 0.1,
        top_p: 0.8,
        max_output_tokens: 300,
    };
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::FIXED
    }
}

/// A photo held in memory, passed through to the model unchanged
#[derive(Debug, Clone)]
pub struct ShelfImage {
    bytes: Vec<u8>,
    mime_type: &'static str,
}

impl ShelfImage {
    /// Wrap raw bytes, detecting the format from the file signature
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ShelfError::Validation("image is empty".to_string()));
        }

        let mime_type = match image::guess_format(&bytes) {
            Ok(ImageFormat::Jpeg) => "image/jpeg",
            Ok(ImageFormat::Png) => "image/png",
            Ok(ImageFormat::WebP) => "image/webp",
            Ok(other) => {
                return Err(ShelfError::Validation(format!(
                    "unsupported image format {:?}, use JPEG, PNG or WebP",
                    other
                )))
            }
            Err(_) => {
                return Err(ShelfError::Validation("unrecognized image data".to_string()))
            }
        };

        Ok(Self { bytes, mime_type })
    }

    /// Read an image file from disk
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 payload for inline transport
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Content hash, recorded in the history log
    pub fn hash(&self) -> String {
        blake3::hash(&self.bytes).to_hex().to_string()
    }
}

/// Everything the model needs for one analysis
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub template: String,
    pub instruction: String,
    pub image: ShelfImage,
    pub params: GenerationParams,
}

/// Stateless builder pairing a stored template with an image
pub struct AnalysisRequestBuilder;

impl AnalysisRequestBuilder {
    /// Build a request, failing with `InvalidTemplate` if `template` is unknown
    pub fn build(document: &Document, template: &str, image: ShelfImage) -> Result<AnalysisRequest> {
        let instruction = document
            .prompt(template)
            .ok_or_else(|| ShelfError::InvalidTemplate(template.to_string()))?;

        debug!(
            "Built request: template={}, image={} bytes ({})",
            template,
            image.len(),
            image.mime_type()
        );

        Ok(AnalysisRequest {
            template: template.to_string(),
            instruction: instruction.to_string(),
            image,
            params: GenerationParams::FIXED,
        })
    }
}
