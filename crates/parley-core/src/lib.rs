// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley bot backend.
//!
//! This crate provides the error types, shared data types, and the traits
//! for every external collaborator the session, billing, and gateway crates
//! talk to: the keyed store, the balance/subscription ledger, the LLM
//! gateway, and the file source.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{DomainError, ParleyError, TransportErrorKind};
pub use types::{
    AdapterType, ChatCompletion, ChatMessage, ChatRequest, ContentPart, ConversationEntry,
    GeneratedImage, HealthStatus, ImageGeneration, MessageContent, PendingFileMeta, Role,
    Tier, TokenUsage, UserId,
};

pub use traits::{
    BalanceOracle, ChatGateway, FileFetcher, KeyedStore, PluginAdapter, QuotaCounter,
    SubscriptionOracle,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parley_error_has_all_variants() {
        let _config = ParleyError::Config("test".into());
        let _store = ParleyError::store(std::io::Error::other("test"));
        let _gateway = ParleyError::gateway_status(503, "test");
        let _extraction = ParleyError::Extraction {
            mime_type: "image/png".into(),
            reason: "test".into(),
        };
        let _domain = ParleyError::Domain(DomainError::UserNotFound);
        let _unknown = ParleyError::UnknownModel("x".into());
        let _unsupported = ParleyError::Unsupported("audio".into());
        let _timeout = ParleyError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = ParleyError::Internal("test".into());
    }

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [AdapterType::Store, AdapterType::Gateway, AdapterType::Ledger] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn role_display_is_lowercase() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_keyed_store<T: KeyedStore>() {}
        fn _assert_chat_gateway<T: ChatGateway>() {}
        fn _assert_balance<T: BalanceOracle>() {}
        fn _assert_subscription<T: SubscriptionOracle>() {}
        fn _assert_quota<T: QuotaCounter>() {}
        fn _assert_files<T: FileFetcher>() {}
    }
}
