// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and registry for the Skiff runtime.
//!
//! The [`Tool`] trait is the contract every capability exposed to the model
//! implements. The [`ToolRegistry`] is built once at startup, then shared
//! read-only. It validates arguments against each tool's JSON Schema and
//! turns every failure (unknown tool, bad arguments, executor error, panic,
//! timeout) into a [`ToolResult`] the model can read.
//!
//! [`ToolResult`]: skiff_core::ToolResult

pub mod registry;
pub mod tool;

pub use registry::ToolRegistry;
pub use tool::{SideEffect, Tool, ToolContext, ToolOutput};
