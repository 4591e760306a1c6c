// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry state machine for outbound gateway calls.
//!
//! `Attempt(n)` either succeeds, or fails and is classified. A retriable
//! failure with attempts left sleeps for `backoff(n)` and moves to
//! `Attempt(n + 1)`; anything else returns the last error unchanged.

use std::future::Future;
use std::time::Duration;

use parley_config::RetryConfig;
use parley_core::ParleyError;
use rand::Rng;
use tracing::warn;

/// Lowercase message fragments that mark a failure as transient.
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "terminated",
    "socket hang up",
    "other side closed",
    "fetch failed",
    "network error",
];

/// Backoff parameters and attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay before attempt `attempt + 1`:
    /// `min(max, base * 2^(attempt - 1))`.
    pub fn exponential(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay with `jitter` in `[0, 1]` scaled to `[0, base / 2]`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let spread = self.base_delay / 2;
        self.exponential(attempt) + spread.mul_f64(jitter.clamp(0.0, 1.0))
    }

    /// Delay before the attempt after `attempt`, with random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..=1.0);
        self.delay_with_jitter(attempt, jitter)
    }
}

/// Whether another attempt could succeed.
///
/// Retriable: HTTP 429 or any 5xx, a known transport failure class,
/// a local timeout, or an error text (including its sources) containing
/// one of the transient markers.
pub fn is_retriable(error: &ParleyError) -> bool {
    match error {
        ParleyError::Gateway {
            status: Some(status),
            ..
        } if *status == 429 || *status >= 500 => return true,
        ParleyError::Gateway {
            transport: Some(kind),
            ..
        } if kind.is_retriable() => return true,
        ParleyError::Timeout { .. } => return true,
        ParleyError::Domain(_)
        | ParleyError::Config(_)
        | ParleyError::UnknownModel(_)
        | ParleyError::Unsupported(_)
        | ParleyError::Extraction { .. } => return false,
        _ => {}
    }
    has_transient_marker(error)
}

fn has_transient_marker(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        let text = err.to_string().to_lowercase();
        if TRANSIENT_MARKERS.iter().any(|m| text.contains(m)) {
            return true;
        }
        current = err.source();
    }
    false
}

/// Runs `op` until it succeeds, fails terminally, or the attempt budget is spent.
///
/// `op` receives the 1-based attempt number. The error from the last attempt
/// is returned as-is so callers can still classify it.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, ParleyError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ParleyError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_retriable(&err) => {
                let delay = policy.backoff(attempt);
                warn!(
                    call = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient gateway failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use parley_core::{DomainError, TransportErrorKind};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn status_classification() {
        assert!(is_retriable(&ParleyError::gateway_status(429, "slow down")));
        assert!(is_retriable(&ParleyError::gateway_status(500, "oops")));
        assert!(is_retriable(&ParleyError::gateway_status(503, "busy")));
        assert!(!is_retriable(&ParleyError::gateway_status(404, "missing")));
        assert!(!is_retriable(&ParleyError::gateway_status(400, "bad request")));
    }

    #[test]
    fn transport_classification() {
        let err = ParleyError::Gateway {
            message: "connect failed".into(),
            status: None,
            transport: Some(TransportErrorKind::ConnectionReset),
            source: None,
        };
        assert!(is_retriable(&err));
        let err = ParleyError::Gateway {
            message: "builder error".into(),
            status: None,
            transport: Some(TransportErrorKind::Other),
            source: None,
        };
        assert!(!is_retriable(&err));
    }

    #[test]
    fn message_classification_is_case_insensitive() {
        assert!(is_retriable(&ParleyError::gateway("Socket Hang Up")));
        assert!(is_retriable(&ParleyError::gateway("upstream TERMINATED")));
        assert!(is_retriable(&ParleyError::Internal("fetch failed".into())));
        assert!(!is_retriable(&ParleyError::gateway("content policy violation")));
    }

    #[test]
    fn marker_found_in_source_chain() {
        let err = ParleyError::Gateway {
            message: "request failed".into(),
            status: None,
            transport: None,
            source: Some(Box::new(std::io::Error::other("operation timed out"))),
        };
        assert!(is_retriable(&err));
    }

    #[test]
    fn domain_errors_are_terminal() {
        assert!(!is_retriable(&DomainError::InsufficientFunds.into()));
    }

    #[test]
    fn backoff_stays_in_documented_window() {
        let p = policy();
        for attempt in 1..=6 {
            let floor = (p.base_delay * 2u32.pow(attempt - 1)).min(p.max_delay);
            let ceiling = floor + p.base_delay / 2;
            for jitter in [0.0, 0.25, 1.0] {
                let d = p.delay_with_jitter(attempt, jitter);
                assert!(d >= floor && d <= ceiling, "attempt {attempt}: {d:?}");
            }
            let d = p.backoff(attempt);
            assert!(d >= floor && d <= ceiling);
        }
        assert_eq!(p.exponential(1), Duration::from_millis(500));
        assert_eq!(p.exponential(2), Duration::from_millis(1000));
        assert_eq!(p.exponential(5), Duration::from_millis(5000));
        assert_eq!(p.exponential(40), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_budget_spent() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ParleyError::gateway_status(429, "rate limited")) }
        })
        .await;
        assert!(matches!(result, Err(ParleyError::Gateway { status: Some(429), .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ParleyError::gateway_status(404, "no such model")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failure() {
        let result = with_retry(&policy(), "test", |attempt| async move {
            if attempt == 1 {
                Err(ParleyError::gateway_status(503, "busy"))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_attempts() {
        let start = tokio::time::Instant::now();
        let _: Result<(), _> = with_retry(&policy(), "test", |_| async {
            Err(ParleyError::gateway_status(500, "down"))
        })
        .await;
        // Two sleeps: at least 500ms + 1000ms.
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert!(start.elapsed() <= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn retries_are_logged_with_attempt_numbers() {
        let _: Result<(), _> = with_retry(&policy(), "chat", |_| async {
            Err(ParleyError::gateway_status(502, "bad gateway"))
        })
        .await;
        assert!(logs_contain("transient gateway failure, retrying"));
        assert!(logs_contain("attempt=1"));
    }
}
