// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Skiff runtime.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level Skiff configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SkiffConfig {
    /// Agent identity and loop behavior.
    #[serde(default)]
    pub agent: AgentConfig,

    /// LLM provider call policy.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Tool execution settings.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Message bus capacities and backpressure.
    #[serde(default)]
    pub bus: BusConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Background subagent limits.
    #[serde(default)]
    pub subagent: SubagentConfig,

    /// Cron scheduler settings.
    #[serde(default)]
    pub cron: CronConfig,
}

/// Agent identity and behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Model identifier passed to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens per provider response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature. `None` leaves the provider default.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum provider round-trips per inbound message.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Number of most recent session records included in the context.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Inline system prompt string. Overridden by `system_prompt_file` if both set.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Path to a markdown file containing the system prompt.
    #[serde(default)]
    pub system_prompt_file: Option<String>,

    /// Seconds a per-session worker may sit idle before it is retired.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Directory reported to the model as its working area.
    #[serde(default)]
    pub workspace: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: None,
            max_iterations: default_max_iterations(),
            history_window: default_history_window(),
            system_prompt: None,
            system_prompt_file: None,
            session_idle_secs: default_session_idle_secs(),
            workspace: None,
        }
    }
}

fn default_agent_name() -> String {
    "skiff".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_iterations() -> usize {
    20
}

fn default_history_window() -> usize {
    50
}

fn default_session_idle_secs() -> u64 {
    300
}

/// LLM provider call policy. Credentials belong to the provider instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Per-call timeout in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after a failed or timed-out call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries; attempt `n` waits `n * retry_backoff_ms`.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// API key handed to the provider adapter at construction.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Endpoint override handed to the provider adapter at construction.
    #[serde(default)]
    pub api_base: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_provider_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            api_key: None,
            api_base: None,
        }
    }
}

fn default_provider_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// Tool execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Per-call timeout in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    60
}

/// What a producer experiences when a bus queue is full.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for space, up to `publish_timeout_ms`.
    #[default]
    Block,
    /// Fail immediately.
    Reject,
    /// Evict the oldest queued message and report the displacement.
    DropOldest,
}

/// Message bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    #[serde(default = "default_queue_capacity")]
    pub inbound_capacity: usize,

    #[serde(default = "default_queue_capacity")]
    pub outbound_capacity: usize,

    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Maximum wait under the `block` policy. 0 waits indefinitely.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: default_queue_capacity(),
            outbound_capacity: default_queue_capacity(),
            overflow_policy: OverflowPolicy::default(),
            publish_timeout_ms: default_publish_timeout_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_publish_timeout_ms() -> u64 {
    5_000
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("skiff").join("skiff.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("skiff.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Background subagent configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubagentConfig {
    /// Maximum provider round-trips per subagent.
    #[serde(default = "default_subagent_max_iterations")]
    pub max_iterations: usize,

    /// Wall-clock limit per subagent in seconds. 0 disables the limit.
    #[serde(default)]
    pub timeout_secs: u64,

    /// When non-empty, subagents may only use these tools.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_subagent_max_iterations(),
            timeout_secs: 0,
            allowed_tools: Vec::new(),
        }
    }
}

fn default_subagent_max_iterations() -> usize {
    15
}

/// Cron scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CronConfig {
    #[serde(default = "default_cron_enabled")]
    pub enabled: bool,

    /// Longest the timer sleeps before re-reading the job store.
    #[serde(default = "default_poll_when_empty_secs")]
    pub poll_when_empty_secs: u64,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: default_cron_enabled(),
            poll_when_empty_secs: default_poll_when_empty_secs(),
        }
    }
}

fn default_cron_enabled() -> bool {
    true
}

fn default_poll_when_empty_secs() -> u64 {
    30
}
