// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette bridge.
//!
//! Turns figment extraction failures into diagnostics that point at the
//! offending line of the config file and suggest the closest valid key.

#![allow(unused_assignments)] // miette's Diagnostic derive triggers this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score above which a valid key is offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}` in [{section}]")]
    #[diagnostic(
        code(engyne::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        section: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for `{key}`: found {found}")]
    #[diagnostic(code(engyne::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(engyne::config::missing_key),
        help("add `{key} = <value>` to engyne.toml")
    )]
    MissingKey { key: String },

    #[error("validation error: {message}")]
    #[diagnostic(code(engyne::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(engyne::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert every error carried by a `figment::Error` into a [`ConfigError`].
///
/// `toml_sources` pairs file paths with their contents so unknown keys can
/// be underlined in place.
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
                    let suggestion = suggest_key(field, expected);
                    let (span, src) = locate(&error, &path, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section: if path.is_empty() {
                            "root".to_string()
                        } else {
                            path.join(".")
                        },
                        suggestion,
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: qualified(&path, field),
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                    key: path.join("."),
                    found: actual.to_string(),
                    expected: expected.clone(),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn qualified(path: &[String], field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{field}", path.join("."))
    }
}

fn locate(
    error: &figment::Error,
    path: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|source| match source {
            figment::Source::File(p) => Some(p.display().to_string()),
            _ => None,
        });

    // Inline strings carry no file source; fall back to the only source given.
    let content = match file {
        Some(file) => toml_sources.iter().find(|(p, _)| *p == file),
        None if toml_sources.len() == 1 => toml_sources.first(),
        None => None,
    };

    let Some((name, content)) = content else {
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

/// Byte offset of `field` inside the `[path...]` table of a TOML document.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = if path.is_empty() {
        0
    } else {
        let header = format!("[{}]", path.join("."));
        content.find(&header)? + header.len()
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            return None;
        }
        if let Some(rest) = trimmed.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

/// Closest valid key by Jaro-Winkler similarity, if close enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        if handler.render_report(&mut buf, error as &dyn Diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("error: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_port_for_prot() {
        let valid = &["host", "port", "bearer_token", "worker_secret"];
        assert_eq!(suggest_key("prot", valid), Some("port".to_string()));
    }

    #[test]
    fn suggests_interval_typo() {
        let valid = &["tick_interval_secs", "stop_grace_secs"];
        assert_eq!(
            suggest_key("tick_intervall_secs", valid),
            Some("tick_interval_secs".to_string())
        );
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        assert_eq!(suggest_key("zzzzzz", &["node_id", "log_level"]), None);
    }

    #[test]
    fn finds_key_inside_its_table() {
        let content = "[node]\nport = 1\n\n[gateway]\nprot = 8001\n";
        let path = vec!["gateway".to_string()];
        let offset = find_key_offset(content, &path, "prot").unwrap();
        assert_eq!(&content[offset..offset + 4], "prot");
    }

    #[test]
    fn finds_key_in_nested_table() {
        let content = "[dispatcher.channels.email]\nwebhook_ulr = \"http://x\"\n";
        let path = vec![
            "dispatcher".to_string(),
            "channels".to_string(),
            "email".to_string(),
        ];
        let offset = find_key_offset(content, &path, "webhook_ulr").unwrap();
        assert_eq!(&content[offset..offset + 11], "webhook_ulr");
    }

    #[test]
    fn key_in_other_table_is_not_matched() {
        let content = "[gateway]\nport = 1\n[node]\nnode_id = \"a\"\n";
        let path = vec!["gateway".to_string()];
        assert_eq!(find_key_offset(content, &path, "node_id"), None);
    }
}
