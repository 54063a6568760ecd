// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints serde attributes cannot express. All failures are
//! collected so a single run reports every problem.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::SkiffConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn invalid(errors: &mut Vec<ConfigError>, field: &str, message: impl Into<String>) {
    errors.push(ConfigError::Validation {
        field: field.to_string(),
        message: message.into(),
    });
}

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &SkiffConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.agent.name.trim().is_empty() {
        invalid(&mut errors, "agent.name", "must not be empty");
    }

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        invalid(
            &mut errors,
            "agent.log_level",
            format!(
                "must be one of {}, got `{}`",
                LOG_LEVELS.join(", "),
                config.agent.log_level
            ),
        );
    }

    if config.agent.max_iterations == 0 {
        invalid(&mut errors, "agent.max_iterations", "must be at least 1");
    }

    if config.agent.max_tokens == 0 {
        invalid(&mut errors, "agent.max_tokens", "must be at least 1");
    }

    if let Some(t) = config.agent.temperature
        && !(0.0..=2.0).contains(&t)
    {
        invalid(
            &mut errors,
            "agent.temperature",
            format!("must be between 0.0 and 2.0, got {t}"),
        );
    }

    if config.agent.session_idle_secs == 0 {
        invalid(&mut errors, "agent.session_idle_secs", "must be at least 1");
    }

    if config.provider.timeout_secs == 0 {
        invalid(&mut errors, "provider.timeout_secs", "must be at least 1");
    }

    if config.tools.timeout_secs == 0 {
        invalid(&mut errors, "tools.timeout_secs", "must be at least 1");
    }

    if config.bus.inbound_capacity == 0 {
        invalid(&mut errors, "bus.inbound_capacity", "must be at least 1");
    }

    if config.bus.outbound_capacity == 0 {
        invalid(&mut errors, "bus.outbound_capacity", "must be at least 1");
    }

    if config.storage.database_path.trim().is_empty() {
        invalid(&mut errors, "storage.database_path", "must not be empty");
    }

    if config.subagent.max_iterations == 0 {
        invalid(&mut errors, "subagent.max_iterations", "must be at least 1");
    }

    let mut seen = HashSet::new();
    for tool in &config.subagent.allowed_tools {
        if !seen.insert(tool) {
            invalid(
                &mut errors,
                "subagent.allowed_tools",
                format!("lists `{tool}` more than once"),
            );
        }
    }

    if config.cron.poll_when_empty_secs == 0 {
        invalid(&mut errors, "cron.poll_when_empty_secs", "must be at least 1");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&SkiffConfig::default()).is_ok());
    }

    #[test]
    fn zero_iteration_bound_is_rejected() {
        let mut config = SkiffConfig::default();
        config.agent.max_iterations = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("agent.max_iterations"));
    }

    #[test]
    fn collects_every_failure() {
        let mut config = SkiffConfig::default();
        config.agent.log_level = "loud".into();
        config.bus.inbound_capacity = 0;
        config.cron.poll_when_empty_secs = 0;
        config.subagent.allowed_tools = vec!["read_file".into(), "read_file".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
