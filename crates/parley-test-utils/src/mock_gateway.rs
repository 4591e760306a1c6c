// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted gateway for deterministic turn tests.
//!
//! Replies are popped from a FIFO queue. When the queue is empty a default
//! "mock response" text is returned.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parley_core::{
    AdapterType, ChatCompletion, ChatGateway, ChatRequest, GeneratedImage, HealthStatus,
    ImageGeneration, ParleyError, PluginAdapter, TokenUsage,
};
use tokio::sync::Mutex;

/// One scripted gateway outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Images(Vec<GeneratedImage>),
    /// Fails as if every attempt returned this HTTP status.
    Status(u16),
}

/// Gateway double that records requests and counts calls.
#[derive(Default)]
pub struct MockGateway {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub async fn push_reply(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Number of `complete` and `generate_image` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub async fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().await.clone()
    }

    async fn next(&self, request: ChatRequest) -> MockReply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockReply::Text("mock response".to_string()))
    }
}

fn usage() -> TokenUsage {
    TokenUsage {
        prompt_tokens: 10,
        completion_tokens: 20,
        total_tokens: 30,
    }
}

#[async_trait]
impl PluginAdapter for MockGateway {
    fn name(&self) -> &str {
        "mock-gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, ParleyError> {
        let model = request.model.clone();
        match self.next(request).await {
            MockReply::Text(text) => Ok(ChatCompletion {
                text,
                model,
                usage: usage(),
            }),
            MockReply::Images(_) => Err(ParleyError::gateway("scripted image reply to a text call")),
            MockReply::Status(status) => {
                Err(ParleyError::gateway_status(status, format!("scripted status {status}")))
            }
        }
    }

    async fn generate_image(&self, request: ChatRequest) -> Result<ImageGeneration, ParleyError> {
        match self.next(request).await {
            MockReply::Images(images) => Ok(ImageGeneration {
                images,
                text: None,
                usage: usage(),
            }),
            MockReply::Text(text) => Ok(ImageGeneration {
                images: Vec::new(),
                text: Some(text),
                usage: usage(),
            }),
            MockReply::Status(status) => {
                Err(ParleyError::gateway_status(status, format!("scripted status {status}")))
            }
        }
    }
}
