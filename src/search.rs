//! SearXNG JSON API client.
//!
//! The browser finds candidate links by querying a self-hosted SearXNG
//! instance at `GET {base}/search?q=<query>&format=json`. The instance must
//! list `json` under `search.formats` in its settings, otherwise it answers
//! with `403 Forbidden`.

use crate::models::SearchResult;
use itertools::Itertools;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Errors raised while querying the search API.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search API returned HTTP {status}{hint}")]
    Status { status: u16, hint: &'static str },

    #[error("search API returned undecodable JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no usable search results for {query:?}")]
    NoResults { query: String },
}

/// Anything that can turn a query into an ordered list of results.
pub trait WebSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Client for a SearXNG instance.
#[derive(Debug, Clone)]
pub struct SearxClient {
    base_url: Url,
    http: reqwest::Client,
    max_results: usize,
}

impl SearxClient {
    /// Create a client for the instance at `base_url`.
    ///
    /// A missing trailing slash is added so that joining `search` keeps any
    /// path prefix the instance is mounted under.
    pub fn new(base_url: &str, max_results: usize, timeout: Duration) -> Result<Self, SearchError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let parsed = Url::parse(&normalized).map_err(|e| SearchError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SearchError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: parsed,
            http,
            max_results,
        })
    }

    /// The full request URL for `query`.
    pub fn search_url(&self, query: &str) -> String {
        format!(
            "{}search?q={}&format=json",
            self.base_url,
            urlencoding::encode(query)
        )
    }
}

impl WebSearch for SearxClient {
    #[instrument(level = "info", skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let url = self.search_url(query);
        debug!(%url, "Querying search API");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let hint = if status == reqwest::StatusCode::FORBIDDEN {
                " (is `json` listed under search.formats?)"
            } else {
                ""
            };
            warn!(status = status.as_u16(), "Search API rejected request");
            return Err(SearchError::Status {
                status: status.as_u16(),
                hint,
            });
        }
        let body = response.text().await?;
        let parsed: SearxResponse = serde_json::from_str(&body)?;
        let raw_count = parsed.results.len();
        let results = usable_results(parsed.results, self.max_results);
        info!(raw_count, kept = results.len(), "Search completed");

        if results.is_empty() {
            return Err(SearchError::NoResults {
                query: query.to_string(),
            });
        }
        Ok(results)
    }
}

/// Keep http(s) results, drop duplicate URLs (first wins) and cap the count.
fn usable_results(results: Vec<SearchResult>, max_results: usize) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| {
            Url::parse(&r.url)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false)
        })
        .unique_by(|r| r.url.clone())
        .take(max_results)
        .collect()
}
