// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the chat-completion gateway.
//!
//! Provides [`GatewayClient`], which handles authentication, per-attempt
//! timeouts, error classification and the retry loop. Every attempt sends
//! the same serialized request.

use std::error::Error as _;
use std::io;
use std::time::Duration;

use parley_core::{ChatRequest, GeneratedImage, ParleyError, TransportErrorKind};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::retry::{RetryPolicy, with_retry};
use crate::types::{ApiErrorResponse, ChatResponse};

/// HTTP client for gateway communication.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    /// Fetches image links from model output. Carries no credentials.
    downloads: reqwest::Client,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GatewayClient {
    /// Creates a client authenticating with `api_key` as a bearer token.
    pub fn new(
        api_key: &str,
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
        app_title: &str,
    ) -> Result<Self, ParleyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ParleyError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(title) = HeaderValue::from_str(app_title) {
            headers.insert("X-Title", title);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(client_build_error)?;
        let downloads = reqwest::Client::builder()
            .build()
            .map_err(client_build_error)?;

        Ok(Self {
            client,
            downloads,
            base_url: base_url.into(),
            timeout,
            retry,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Posts a chat request, retrying transient failures.
    ///
    /// The returned error is the one from the last attempt.
    pub async fn post_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ParleyError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| ParleyError::Internal(format!("failed to serialize request: {e}")))?;
        with_retry(&self.retry, "chat_completion", |attempt| {
            let body = body.clone();
            async move { self.attempt(attempt, body).await }
        })
        .await
    }

    async fn attempt(&self, attempt: u32, body: Vec<u8>) -> Result<ChatResponse, ParleyError> {
        let response = self
            .client
            .post(&self.base_url)
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!(status = %status, attempt, "completion response received");

        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(api_err) => format!("gateway returned {status}: {}", api_err.error.message),
                Err(_) => format!("gateway returned {status}: {}", truncate(&text, 200)),
            };
            return Err(ParleyError::gateway_status(status.as_u16(), message));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| ParleyError::Gateway {
            message: format!("failed to parse gateway response: {e}"),
            status: Some(status.as_u16()),
            transport: None,
            source: Some(Box::new(e)),
        })?;

        // Upstream failures can arrive inside a 200 body.
        if let Some(err) = &parsed.error
            && parsed.choices.is_empty()
        {
            let code = err
                .code
                .as_ref()
                .and_then(|c| c.as_u64())
                .and_then(|c| u16::try_from(c).ok());
            return Err(ParleyError::Gateway {
                message: format!("upstream error: {}", err.message),
                status: code,
                transport: None,
                source: None,
            });
        }
        Ok(parsed)
    }

    /// Downloads one image. Failures are logged and yield `None`.
    pub async fn download_image(&self, url: &str) -> Option<GeneratedImage> {
        let response = match self.downloads.get(url).timeout(self.timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "image download failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "image download rejected");
            return None;
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| mime_from_extension(url).to_string());
        match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => Some(GeneratedImage {
                data: bytes.to_vec(),
                mime_type,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "image download body failed");
                None
            }
        }
    }
}

fn client_build_error(e: reqwest::Error) -> ParleyError {
    ParleyError::Gateway {
        message: format!("failed to build HTTP client: {e}"),
        status: None,
        transport: Some(TransportErrorKind::Other),
        source: Some(Box::new(e)),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn mime_from_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/png"
    }
}

/// Wraps a `reqwest` failure, keeping its transport class for the retry
/// classifier.
pub(crate) fn transport_error(err: reqwest::Error) -> ParleyError {
    let kind = transport_kind(&err);
    ParleyError::Gateway {
        message: format!("HTTP request failed: {err}"),
        status: err.status().map(|s| s.as_u16()),
        transport: Some(kind),
        source: Some(Box::new(err)),
    }
}

fn transport_kind(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        return TransportErrorKind::ResponseTimeout;
    }
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>()
            && let Some(kind) = io_kind(io_err.kind())
        {
            return kind;
        }
        let text = inner.to_string().to_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return TransportErrorKind::DnsResolution;
        }
        source = inner.source();
    }
    if err.is_connect() || err.is_body() {
        return TransportErrorKind::Socket;
    }
    TransportErrorKind::Other
}

fn io_kind(kind: io::ErrorKind) -> Option<TransportErrorKind> {
    match kind {
        io::ErrorKind::ConnectionReset => Some(TransportErrorKind::ConnectionReset),
        io::ErrorKind::ConnectionAborted => Some(TransportErrorKind::ConnectionAborted),
        io::ErrorKind::TimedOut => Some(TransportErrorKind::TimedOut),
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof | io::ErrorKind::NotConnected => {
            Some(TransportErrorKind::Socket)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use parley_core::{ChatMessage, Role};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::retry::is_retriable;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            max_attempts: 3,
        }
    }

    fn test_client(base_url: &str) -> GatewayClient {
        GatewayClient::new(
            "test-key",
            base_url,
            Duration::from_secs(5),
            fast_retry(),
            "parley",
        )
        .unwrap()
    }

    fn test_request() -> ChatRequest {
        ChatRequest {
            model: "openai/gpt-4o-mini".into(),
            messages: vec![ChatMessage::text(Role::User, "Hello")],
            modalities: None,
            max_tokens: None,
        }
    }

    fn ok_body(text: &str) -> serde_json::Value {
        json!({
            "model": "openai/gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": text}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        })
    }

    #[tokio::test]
    async fn sends_bearer_auth_and_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("Hi there!")))
            .expect(1)
            .mount(&server)
            .await;

        let resp = test_client(&server.uri()).post_chat(&test_request()).await.unwrap();
        assert_eq!(resp.choices[0].message.content.as_ref().unwrap(), "Hi there!");
    }

    #[tokio::test]
    async fn rate_limit_exhausts_every_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"error": {"message": "Rate limited", "code": 429}})),
            )
            .expect(3)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .post_chat(&test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Gateway { status: Some(429), .. }));
        assert!(err.to_string().contains("Rate limited"));
        assert!(is_retriable(&err));
    }

    #[tokio::test]
    async fn not_found_is_attempted_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .post_chat(&test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Gateway { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn recovers_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("After retry")))
            .expect(1)
            .mount(&server)
            .await;

        let resp = test_client(&server.uri()).post_chat(&test_request()).await.unwrap();
        assert_eq!(resp.choices[0].message.content.as_ref().unwrap(), "After retry");
    }

    #[tokio::test]
    async fn error_inside_success_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"error": {"message": "provider overloaded", "code": 502}})),
            )
            .expect(3)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .post_chat(&test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Gateway { status: Some(502), .. }));
    }

    #[tokio::test]
    async fn per_attempt_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body("slow"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = GatewayClient::new(
            "k",
            server.uri(),
            Duration::from_millis(50),
            fast_retry(),
            "parley",
        )
        .unwrap();
        let err = client.post_chat(&test_request()).await.unwrap_err();
        assert!(matches!(
            err,
            ParleyError::Gateway {
                transport: Some(TransportErrorKind::ResponseTimeout),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn connection_refused_is_classified() {
        // Nothing listens on the discard port of localhost in CI containers.
        let client = GatewayClient::new(
            "k",
            "http://127.0.0.1:9",
            Duration::from_secs(1),
            RetryPolicy {
                max_attempts: 1,
                ..fast_retry()
            },
            "parley",
        )
        .unwrap();
        let err = client.post_chat(&test_request()).await.unwrap_err();
        match err {
            ParleyError::Gateway { transport, .. } => {
                assert!(transport.is_some_and(|k| k != TransportErrorKind::Other));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn download_uses_declared_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/webp")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let image = client
            .download_image(&format!("{}/cat.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(image.mime_type, "image/webp");
        assert_eq!(image.data, vec![1, 2, 3]);
        assert!(client
            .download_image(&format!("{}/gone.png", server.uri()))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn image_download_carries_no_gateway_credentials() {
        let gateway = MockServer::start().await;
        let image_host = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8, 2]),
            )
            .expect(1)
            .mount(&image_host)
            .await;

        let client = test_client(&gateway.uri());
        let image = client
            .download_image(&format!("{}/x.png", image_host.uri()))
            .await
            .unwrap();
        assert_eq!(image.data, vec![1, 2]);

        let received = image_host.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());
        assert!(received[0].headers.get("x-title").is_none());
    }

    #[test]
    fn mime_guess_from_extension() {
        assert_eq!(mime_from_extension("https://x/a.JPG?sig=1"), "image/jpeg");
        assert_eq!(mime_from_extension("https://x/a.gif"), "image/gif");
        assert_eq!(mime_from_extension("https://x/a"), "image/png");
    }
}
