// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Skiff runtime.

use thiserror::Error;

/// The primary error type used across all Skiff adapter traits and core operations.
#[derive(Debug, Error)]
pub enum SkiffError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel adapter errors (connection failure, message format, delivery).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM provider errors (API failure, malformed response, rate limiting).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Tool registration or execution failure.
    #[error("tool error: {message}")]
    Tool { message: String },

    /// Input rejected before it reached any component.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid schedule, unknown timezone, or unknown job at admission time.
    #[error("scheduling error: {0}")]
    Scheduling(String),

    /// A bounded bus queue could not accept a message under the configured policy.
    #[error("{queue} queue is full (capacity {capacity})")]
    BusOverflow { queue: &'static str, capacity: usize },

    /// The message bus was closed while a producer or consumer was waiting.
    #[error("message bus is closed")]
    BusClosed,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SkiffError {
    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a channel error without an underlying source.
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a tool error.
    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool {
            message: message.into(),
        }
    }

    /// Wraps any error as a storage error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(err),
        }
    }
}
