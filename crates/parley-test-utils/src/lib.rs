// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for Parley integration tests.
//!
//! - [`InMemoryLedger`]: balance and subscription oracle that records every deduction
//! - [`MockGateway`]: scripted gateway with a call counter
//! - [`MockFileFetcher`]: serves file bytes from a map

pub mod files;
pub mod ledger;
pub mod mock_gateway;

pub use files::MockFileFetcher;
pub use ledger::{Deduction, InMemoryLedger};
pub use mock_gateway::{MockGateway, MockReply};
