// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pricing, access control, and billing for the Parley bot backend.
//!
//! This crate provides:
//! - **Pricing table**: per-model tier, SP prices and capabilities
//! - **Access gate**: daily free quota for BASE models, balance checks for paid ones,
//!   and post-success deduction
//! - **SQLite ledger**: balances, subscriptions and the transaction log

pub mod gate;
pub mod ledger;
pub mod pricing;

pub use gate::{AccessDecision, AccessGate, DenyReason};
pub use ledger::{LedgerTransaction, SqliteLedger, Subscription};
pub use pricing::{Capabilities, Capability, PricePair, PricingEntry, PricingTable};
