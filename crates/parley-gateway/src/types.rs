// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-completion response types as the gateway sends them.
//!
//! Response shapes vary between upstream providers, so message content and
//! image items stay as raw JSON here and are normalized by [`crate::decode`].

use parley_core::TokenUsage;
use serde::Deserialize;

/// A full chat-completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Model that served the request, if reported.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    /// Some providers report failures inside a 200 response.
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

/// The assistant message of a choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    /// A string, an array of content parts, or null.
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    /// Structured image items attached by image-capable models.
    #[serde(default)]
    pub images: Option<Vec<serde_json::Value>>,
}

/// Error body returned with a non-success status.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

/// Error details.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    /// Numeric or string code, depending on the upstream provider.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}
