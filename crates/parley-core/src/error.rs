// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley bot backend.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across all Parley adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Keyed store or ledger database errors (connection, command failure, serialization).
    #[error("store error: {source}")]
    Store {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM gateway errors (HTTP status, transport failure, malformed response).
    ///
    /// `status` and `transport` are kept so the retry classifier can inspect
    /// the failure after it has been wrapped.
    #[error("gateway error: {message}")]
    Gateway {
        message: String,
        status: Option<u16>,
        transport: Option<TransportErrorKind>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// File-content extraction failed for the given MIME type.
    #[error("cannot extract text from {mime_type}: {reason}")]
    Extraction { mime_type: String, reason: String },

    /// Billing and subscription domain errors the caller pattern-matches on.
    #[error("domain error: {0}")]
    Domain(DomainError),

    /// The requested model has no pricing entry.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The requested operation is not supported (model capability, input shape).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Wraps any error as a store failure.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ParleyError::Store {
            source: Box::new(err),
        }
    }

    /// Builds a gateway error carrying only a message.
    pub fn gateway(message: impl Into<String>) -> Self {
        ParleyError::Gateway {
            message: message.into(),
            status: None,
            transport: None,
            source: None,
        }
    }

    /// Builds a gateway error for a non-success HTTP status.
    pub fn gateway_status(status: u16, message: impl Into<String>) -> Self {
        ParleyError::Gateway {
            message: message.into(),
            status: Some(status),
            transport: None,
            source: None,
        }
    }

    /// Returns the domain error, if this is one.
    pub fn domain(&self) -> Option<DomainError> {
        match self {
            ParleyError::Domain(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<DomainError> for ParleyError {
    fn from(err: DomainError) -> Self {
        ParleyError::Domain(err)
    }
}

/// Distinguishable billing/subscription failures.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainError {
    UserNotFound,
    AlreadyHasActiveSubscription,
    InsufficientFunds,
    NoActiveSubscription,
}

/// Transport-level failure classes observed on outbound gateway calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorKind {
    ConnectionReset,
    ConnectionAborted,
    TimedOut,
    DnsResolution,
    Socket,
    HeadersTimeout,
    BodyTimeout,
    ResponseTimeout,
    Other,
}

impl TransportErrorKind {
    /// Every known transport class except `Other` is worth another attempt.
    pub fn is_retriable(self) -> bool {
        !matches!(self, TransportErrorKind::Other)
    }
}
