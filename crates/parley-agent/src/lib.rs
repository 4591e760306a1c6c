// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn orchestration for the Parley bot backend.
//!
//! [`TurnHandler`] drives one inbound turn through the access gate, the
//! conversation store and the gateway. [`SweepScheduler`] runs the aged-entry
//! sweep in the background until shutdown.

pub mod shutdown;
pub mod sweep;
pub mod turn;

pub use shutdown::{drain_background, install_signal_handler};
pub use sweep::SweepScheduler;
pub use turn::{
    Turn, TurnHandler, TurnInput, TurnOutcome, TurnSettings, deny_message, load_system_prompt,
    user_facing_message,
};
