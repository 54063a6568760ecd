// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns Figment and validation failures into miette diagnostics.
//!
//! Unknown keys get a "did you mean" hint from Jaro-Winkler similarity and,
//! when the key came from a file we can re-read, a labelled source span.

#![allow(unused_assignments)] // miette's Diagnostic derive triggers this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Similarity a candidate key needs before it is offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with enough context for rich rendering.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(code(skiff::config::unknown_key), help("{}", unknown_key_help(suggestion.as_deref(), valid_keys)))]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for `{key}`: found {found}")]
    #[diagnostic(code(skiff::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
    },

    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(skiff::config::invalid_value))]
    InvalidValue { key: String, detail: String },

    #[error("missing required key `{key}`")]
    #[diagnostic(code(skiff::config::missing_key), help("add `{key} = <value>` to skiff.toml"))]
    MissingKey { key: String },

    /// A value that parsed but violates a semantic constraint.
    #[error("`{field}` {message}")]
    #[diagnostic(code(skiff::config::validation))]
    Validation { field: String, message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(skiff::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert every error contained in a `figment::Error` into a [`ConfigError`].
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.clone();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = locate_key(&error, &path, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.to_string(),
                },
                Kind::InvalidType(found, expected) => ConfigError::InvalidType {
                    key: path.join("."),
                    found: found.to_string(),
                    expected: expected.clone(),
                },
                Kind::InvalidValue(found, expected) => ConfigError::InvalidValue {
                    key: path.join("."),
                    detail: format!("found {found}, expected {expected}"),
                },
                Kind::UnknownVariant(variant, expected) => ConfigError::InvalidValue {
                    key: path.join("."),
                    detail: format!(
                        "`{variant}` is not one of: {}",
                        expected.join(", ")
                    ),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Resolve a source span for `field` when the failing value came from a known file.
fn locate_key(
    error: &figment::Error,
    path: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(p)) => p.display().to_string(),
        _ => return (None, None),
    };
    let Some((name, content)) = toml_sources.iter().find(|(p, _)| *p == origin) else {
        return (None, None);
    };
    match find_key_offset(content, path, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` as a key inside the `[section]` named by `path[0]`.
///
/// Top-level keys (empty path) are searched from the start of the document.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let mut in_section = path.is_empty();
    let header = path.first().map(|s| format!("[{s}]"));
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            in_section = header.as_deref().is_some_and(|h| trimmed.starts_with(h));
        } else if in_section
            && let Some(rest) = trimmed.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

/// Closest valid key to `unknown`, if any is similar enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render errors to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
