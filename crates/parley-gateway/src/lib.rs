// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilient gateway adapter for the Parley bot backend.
//!
//! This crate implements [`ChatGateway`] for OpenAI-compatible
//! chat-completion endpoints: retry with exponential backoff, request-shape
//! builders, multi-shape image decoding, and document text extraction.

pub mod client;
pub mod decode;
pub mod extract;
pub mod request;
pub mod retry;
pub mod types;

use async_trait::async_trait;
use futures::future::join_all;
use parley_config::ParleyConfig;
use parley_core::{
    AdapterType, ChatCompletion, ChatGateway, ChatRequest, HealthStatus, ImageGeneration,
    ParleyError, PluginAdapter,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::client::GatewayClient;
use crate::decode::{NormalizedMessage, collect_images, strip_image_links};
use crate::retry::RetryPolicy;
use crate::types::ChatResponse;

pub use extract::{DocumentKind, EMPTY_CSV_MARKER, extract_text};
pub use request::{AttachedFile, AudioClip, RequestContext};
pub use retry::is_retriable;

/// Gateway adapter implementing [`ChatGateway`].
///
/// API key resolution order: config -> `PARLEY_GATEWAY_API_KEY` ->
/// `OPENROUTER_API_KEY` -> error.
pub struct HttpGateway {
    client: GatewayClient,
    max_image_downloads: usize,
}

impl HttpGateway {
    /// Creates the adapter from configuration.
    pub fn new(config: &ParleyConfig) -> Result<Self, ParleyError> {
        let api_key = resolve_api_key(&config.gateway.api_key)?;
        let client = GatewayClient::new(
            &api_key,
            config.gateway.base_url.clone(),
            Duration::from_secs(config.gateway.timeout_secs),
            RetryPolicy::from(&config.retry),
            &config.bot.name,
        )?;
        info!(
            base_url = config.gateway.base_url,
            max_attempts = config.retry.max_attempts,
            "gateway client initialized"
        );
        Ok(Self::with_client(client, config.gateway.max_image_downloads))
    }

    pub fn with_client(client: GatewayClient, max_image_downloads: usize) -> Self {
        Self {
            client,
            max_image_downloads,
        }
    }

    /// Downloads remote candidates, at most `max_image_downloads`, skipping failures.
    async fn download_all(&self, links: &[String]) -> Vec<parley_core::GeneratedImage> {
        let downloads = links
            .iter()
            .take(self.max_image_downloads)
            .map(|url| self.client.download_image(url));
        join_all(downloads).await.into_iter().flatten().collect()
    }
}

#[async_trait]
impl PluginAdapter for HttpGateway {
    fn name(&self) -> &str {
        "http-gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        // Probing the endpoint would spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        debug!("gateway adapter shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChatGateway for HttpGateway {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, ParleyError> {
        let response = self.client.post_chat(&request).await?;
        let text = completion_text(&response)
            .ok_or_else(|| ParleyError::gateway("gateway returned an empty completion"))?;
        Ok(ChatCompletion {
            text,
            model: response.model.unwrap_or(request.model),
            usage: response.usage.unwrap_or_default(),
        })
    }

    async fn generate_image(&self, request: ChatRequest) -> Result<ImageGeneration, ParleyError> {
        let response = self.client.post_chat(&request).await?;
        let message = NormalizedMessage::from_response(&response);
        let (mut images, links) = collect_images(&message).into_parts();
        if images.is_empty() && !links.is_empty() {
            images = self.download_all(&links).await;
        }
        debug!(
            images = images.len(),
            candidates = links.len(),
            "image generation decoded"
        );
        Ok(ImageGeneration {
            images,
            text: strip_image_links(&message.raw_text()),
            usage: response.usage.unwrap_or_default(),
        })
    }
}

/// Text of the first choice: a string, or the joined text parts.
fn completion_text(response: &ChatResponse) -> Option<String> {
    let content = response.choices.first()?.message.content.as_ref()?;
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Resolves the API key from config or environment.
fn resolve_api_key(config_key: &Option<String>) -> Result<String, ParleyError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    ["PARLEY_GATEWAY_API_KEY", "OPENROUTER_API_KEY"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .ok_or_else(|| {
            ParleyError::Config(
                "gateway API key not found. Set gateway.api_key in config or the OPENROUTER_API_KEY environment variable.".into(),
            )
        })
}
