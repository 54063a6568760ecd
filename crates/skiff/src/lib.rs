// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Skiff - a lightweight, always-on personal AI agent runtime.
//!
//! This crate assembles the workspace into a running system ([`Runtime`])
//! and carries the `skiff` admin CLI.

pub mod commands;
pub mod jobs;
pub mod logging;
pub mod runtime;

pub use jobs::AgentJobHandler;
pub use logging::init_tracing;
pub use runtime::{Runtime, RuntimeBuilder};
