// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Skiff integration tests.
//!
//! Provides mock adapters and a harness that wires a complete agent stack
//! over a temporary SQLite database.

pub mod echo_tool;
pub mod harness;
pub mod mock_channel;
pub mod mock_provider;

pub use echo_tool::EchoTool;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_channel::MockChannel;
pub use mock_provider::{MockProvider, MockReply};
