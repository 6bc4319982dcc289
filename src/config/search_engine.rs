//! SearXNG `settings.yml` model.
//!
//! Only the keys this deployment sets are modelled; with
//! `use_default_settings: true` SearXNG fills in the rest from its defaults.

use super::{ConfigError, ConfigIssue, env, false_as_none, read_substituted};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

/// Output formats SearXNG can serve.
pub const KNOWN_FORMATS: &[&str] = &["html", "json", "csv", "rss"];

/// The key SearXNG ships with. An instance running with it is not private.
pub const STOCK_SECRET_KEY: &str = "ultrasecretkey";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchEngineSettings {
    pub use_default_settings: bool,
    pub search: SearchSection,
    pub server: ServerSection,
    pub ui: UiSection,
    pub redis: Option<RedisSection>,
}

impl Default for SearchEngineSettings {
    fn default() -> Self {
        Self {
            use_default_settings: true,
            search: SearchSection::default(),
            server: ServerSection::default(),
            ui: UiSection::default(),
            redis: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Output formats the instance will answer with.
    pub formats: Vec<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            formats: vec!["html".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// `false` in the stock settings means "derive it from the request".
    #[serde(deserialize_with = "false_as_none")]
    pub base_url: Option<String>,
    pub secret_key: String,
    /// Bot detection and rate limiting. Needs the cache.
    pub limiter: bool,
    /// Serve result thumbnails through the instance.
    pub image_proxy: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            base_url: None,
            secret_key: STOCK_SECRET_KEY.to_string(),
            limiter: false,
            image_proxy: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSection {
    /// Append content hashes to static asset URLs.
    pub static_use_hash: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSection {
    /// `false` disables the cache.
    #[serde(deserialize_with = "false_as_none")]
    pub url: Option<String>,
}

impl SearchEngineSettings {
    /// Load settings from a YAML file, substituting `${NAME}` from the environment.
    #[instrument(level = "info")]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let (text, unresolved) = read_substituted(path)?;
        let settings = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        if !unresolved.is_empty() {
            warn!(?unresolved, "Unset environment variables in search settings");
        }
        info!(formats = ?settings.search.formats, "Loaded search settings");
        Ok(settings)
    }

    /// Parse already-substituted YAML.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn serves_json(&self) -> bool {
        self.search.formats.iter().any(|f| f == "json")
    }

    /// Base URL the JSON API is reachable at, if configured.
    pub fn api_base(&self) -> Option<&str> {
        self.server.base_url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// Cache connection URL, if a cache is configured.
    pub fn cache_url(&self) -> Option<&str> {
        self.redis
            .as_ref()
            .and_then(|r| r.url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }

    /// Check the settings against what the browser and a private instance need.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if !self.serves_json() {
            issues.push(ConfigIssue::error(
                "search.formats",
                "`json` must be enabled for the search API to be usable",
            ));
        }
        for format in &self.search.formats {
            if !KNOWN_FORMATS.contains(&format.as_str()) {
                issues.push(ConfigIssue::error(
                    "search.formats",
                    format!("unknown format {format:?} (expected one of {KNOWN_FORMATS:?})"),
                ));
            }
        }

        let key = self.server.secret_key.trim();
        if key.is_empty() {
            issues.push(ConfigIssue::error("server.secret_key", "must not be empty"));
        } else if key == STOCK_SECRET_KEY {
            issues.push(ConfigIssue::error(
                "server.secret_key",
                "still set to the stock value; generate a random key",
            ));
        } else if env::has_placeholder(key) {
            issues.push(ConfigIssue::error(
                "server.secret_key",
                "references an environment variable that is not set",
            ));
        }

        if let Some(base) = self.api_base() {
            match Url::parse(base) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => issues.push(ConfigIssue::error(
                    "server.base_url",
                    format!("unsupported scheme {:?}", url.scheme()),
                )),
                Err(e) => issues.push(ConfigIssue::error(
                    "server.base_url",
                    format!("not a valid URL: {e}"),
                )),
            }
        }

        match self.cache_url() {
            Some(cache_url) => {
                if env::has_placeholder(cache_url) {
                    issues.push(ConfigIssue::error(
                        "redis.url",
                        "references an environment variable that is not set",
                    ));
                } else {
                    match Url::parse(cache_url) {
                        Ok(url) if matches!(url.scheme(), "redis" | "rediss" | "unix") => {}
                        Ok(url) => issues.push(ConfigIssue::error(
                            "redis.url",
                            format!("unsupported scheme {:?}", url.scheme()),
                        )),
                        Err(e) => issues.push(ConfigIssue::error(
                            "redis.url",
                            format!("not a valid URL: {e}"),
                        )),
                    }
                }
            }
            None if self.server.limiter => issues.push(ConfigIssue::warning(
                "server.limiter",
                "the limiter needs a cache; set redis.url",
            )),
            None => {}
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Severity, has_errors};

    const DEPLOYED: &str = r#"
use_default_settings: true
search:
  formats:
    - html
    - json
server:
  base_url: https://search.example.com/
  secret_key: "0f3c5e2b9a"
  limiter: true
  image_proxy: true
ui:
  static_use_hash: true
redis:
  url: redis://:hunter2@redis:6379/0
"#;

    #[test]
    fn test_parses_deployed_settings() {
        let s = SearchEngineSettings::from_yaml(DEPLOYED).unwrap();
        assert!(s.use_default_settings);
        assert!(s.serves_json());
        assert_eq!(s.api_base(), Some("https://search.example.com/"));
        assert!(s.server.limiter);
        assert!(s.server.image_proxy);
        assert!(s.ui.static_use_hash);
        assert_eq!(s.cache_url(), Some("redis://:hunter2@redis:6379/0"));
        assert!(s.validate().is_empty(), "{:?}", s.validate());
    }

    #[test]
    fn test_defaults_are_flagged() {
        let s = SearchEngineSettings::from_yaml("use_default_settings: true\n").unwrap();
        let issues = s.validate();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"search.formats"));
        assert!(fields.contains(&"server.secret_key"));
        assert!(has_errors(&issues));
    }

    #[test]
    fn test_unknown_format_is_error() {
        let s = SearchEngineSettings::from_yaml(
            "search:\n  formats: [json, xml]\nserver:\n  secret_key: abc\n",
        )
        .unwrap();
        let issues = s.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("xml"));
    }

    #[test]
    fn test_unresolved_placeholders_are_errors() {
        let s = SearchEngineSettings::from_yaml(
            "search:\n  formats: [json]\nserver:\n  secret_key: ${SEARXNG_SECRET}\nredis:\n  url: redis://:${REDIS_PASSWORD}@redis:6379/0\n",
        )
        .unwrap();
        let issues = s.validate();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["server.secret_key", "redis.url"]);
    }

    #[test]
    fn test_bad_urls_are_errors() {
        let s = SearchEngineSettings::from_yaml(
            "search:\n  formats: [json]\nserver:\n  secret_key: k\n  base_url: ftp://x/\nredis:\n  url: http://cache:6379\n",
        )
        .unwrap();
        let issues = s.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.severity == Severity::Error));
    }

    #[test]
    fn test_limiter_without_cache_warns() {
        let s = SearchEngineSettings::from_yaml(
            "search:\n  formats: [json]\nserver:\n  secret_key: k\n  limiter: true\n",
        )
        .unwrap();
        let issues = s.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(!has_errors(&issues));
    }

    #[test]
    fn test_empty_base_url_is_ignored() {
        let s = SearchEngineSettings::from_yaml(
            "search:\n  formats: [json]\nserver:\n  secret_key: k\n  base_url: \"\"\n",
        )
        .unwrap();
        assert_eq!(s.api_base(), None);
        assert!(s.validate().is_empty());
    }

    #[test]
    fn test_stock_false_values_mean_unset() {
        let s = SearchEngineSettings::from_yaml(
            r#"
use_default_settings: true
search:
  formats: [html, json]
server:
  base_url: false
  secret_key: "a3f9c1d0e7"
  limiter: true
  image_proxy: false
redis:
  url: false
"#,
        )
        .unwrap();
        assert_eq!(s.server.base_url, None);
        assert_eq!(s.api_base(), None);
        assert_eq!(s.redis.as_ref().unwrap().url, None);
        assert_eq!(s.cache_url(), None);

        let issues = s.validate();
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].field, "server.limiter");
        assert!(!has_errors(&issues));
    }

    #[test]
    fn test_true_is_not_a_url() {
        assert!(SearchEngineSettings::from_yaml("server:\n  base_url: true\n").is_err());
    }

    #[test]
    fn test_load_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        std::fs::write(&path, "search: [unclosed").unwrap();
        let err = SearchEngineSettings::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
