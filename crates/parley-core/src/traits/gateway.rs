// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway adapter trait for the external LLM/image completion API.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChatCompletion, ChatRequest, ImageGeneration};

/// Adapter for the chat-completion gateway.
///
/// Implementations own retry behavior: a returned error means every
/// permitted attempt has been used and no partial output exists.
#[async_trait]
pub trait ChatGateway: PluginAdapter {
    /// Sends a text/multimodal completion request.
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, ParleyError>;

    /// Sends an image-generation request and decodes every returned image.
    async fn generate_image(&self, request: ChatRequest) -> Result<ImageGeneration, ParleyError>;
}
