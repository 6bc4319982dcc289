//! `${NAME}` environment substitution for settings files.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"));

/// Replace every `${NAME}` in `text` with `lookup(NAME)`.
///
/// Placeholders the lookup cannot resolve are left verbatim. Their names are
/// returned sorted and deduplicated.
pub fn substitute<F>(text: &str, lookup: F) -> (String, Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let mut unresolved = Vec::new();
    let replaced = PLACEHOLDER.replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => {
                unresolved.push(name.to_string());
                caps[0].to_string()
            }
        }
    });
    unresolved.sort();
    unresolved.dedup();
    (replaced.into_owned(), unresolved)
}

/// [`substitute`] against the process environment.
pub fn substitute_from_env(text: &str) -> (String, Vec<String>) {
    substitute(text, |name| std::env::var(name).ok())
}

/// Whether `value` still contains a `${NAME}` placeholder.
pub fn has_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_substitutes_known_variables() {
        let env = vars(&[("SECRET", "s3cr3t"), ("PASS", "pw")]);
        let (out, missing) = substitute(
            "key: ${SECRET}\nurl: redis://:${PASS}@redis:6379/0",
            |n| env.get(n).cloned(),
        );
        assert_eq!(out, "key: s3cr3t\nurl: redis://:pw@redis:6379/0");
        assert!(missing.is_empty());
    }

    #[test]
    fn test_unresolved_are_kept_and_reported_once() {
        let (out, missing) = substitute("${B} ${A} ${B}", |_| None);
        assert_eq!(out, "${B} ${A} ${B}");
        assert_eq!(missing, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_ignores_non_placeholders() {
        let (out, missing) = substitute("$HOME ${} ${1BAD} cost: $5", |_| Some("x".into()));
        assert_eq!(out, "$HOME ${} ${1BAD} cost: $5");
        assert!(missing.is_empty());
    }

    #[test]
    fn test_has_placeholder() {
        assert!(has_placeholder("redis://:${PASS}@host"));
        assert!(!has_placeholder("redis://:pw@host"));
    }
}
