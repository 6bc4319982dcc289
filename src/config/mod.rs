//! Typed models for the two deployment settings files the browser depends on.
//!
//! - [`search_engine`]: the SearXNG `settings.yml` the search API is served from
//! - [`proxy_values`]: the Helm values for the reverse proxy that terminates TLS
//!   in front of it
//!
//! Both files may reference secrets as `${NAME}`; see [`env`]. Loading never
//! fails on a semantic problem. `validate()` returns every issue found so
//! `check-config` can report them all at once.

pub mod env;
pub mod proxy_values;
pub mod search_engine;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while loading a settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{path} failed validation with {count} error(s)")]
    Invalid { path: String, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single problem found in a settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    pub severity: Severity,
    /// Dotted path of the offending key, e.g. `server.secret_key`.
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.field, self.message)
    }
}

pub fn has_errors(issues: &[ConfigIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrFlag {
    Text(String),
    Flag(bool),
}

/// Read a string field that SearXNG also accepts as `false` for "unset".
pub(crate) fn false_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<TextOrFlag>::deserialize(deserializer)? {
        Some(TextOrFlag::Text(text)) => Ok(Some(text)),
        Some(TextOrFlag::Flag(false)) | None => Ok(None),
        Some(TextOrFlag::Flag(true)) => Err(de::Error::custom("expected a string or `false`")),
    }
}

/// Read a settings file and apply `${NAME}` substitution from the environment.
///
/// Returns the substituted text and the names that could not be resolved.
pub(crate) fn read_substituted(path: &str) -> Result<(String, Vec<String>), ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    Ok(env::substitute_from_env(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_errors() {
        let warn_only = vec![ConfigIssue::warning("a", "meh")];
        assert!(!has_errors(&warn_only));
        let mixed = vec![ConfigIssue::warning("a", "meh"), ConfigIssue::error("b", "bad")];
        assert!(has_errors(&mixed));
        assert!(!has_errors(&[]));
    }

    #[test]
    fn test_issue_display() {
        let issue = ConfigIssue::error("server.secret_key", "must be set");
        assert_eq!(issue.to_string(), "error: server.secret_key: must be set");
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let err = read_substituted("/definitely/not/here.yml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
