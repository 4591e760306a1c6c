// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter and collaborator trait definitions.
//!
//! Adapters extend the [`PluginAdapter`] base trait; all traits use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod files;
pub mod gateway;
pub mod ledger;
pub mod store;

pub use adapter::PluginAdapter;
pub use files::FileFetcher;
pub use gateway::ChatGateway;
pub use ledger::{BalanceOracle, QuotaCounter, SubscriptionOracle};
pub use store::KeyedStore;
