// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./skiff.toml` > `~/.config/skiff/skiff.toml` > `/etc/skiff/skiff.toml`
//! with environment variable overrides via the `SKIFF_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::SkiffConfig;

/// Sections that env var names are split on, longest match first.
const ENV_SECTIONS: &[&str] = &[
    "subagent", "provider", "storage", "agent", "tools", "cron", "bus",
];

/// Config files in merge order (earlier ones are overridden by later ones).
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/skiff/skiff.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("skiff/skiff.toml"));
    }
    paths.push(PathBuf::from("skiff.toml"));
    paths
}

/// Build the layered Figment: defaults, then config files, then `SKIFF_*` env vars.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(SkiffConfig::default()));
    for path in config_file_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<SkiffConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<SkiffConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SkiffConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SkiffConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SkiffConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider.
///
/// Uses `Env::map()` rather than `split("_")` because key names contain
/// underscores: `SKIFF_PROVIDER_MAX_RETRIES` must become
/// `provider.max_retries`, not `provider.max.retries`.
fn env_provider() -> Env {
    Env::prefixed("SKIFF_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
