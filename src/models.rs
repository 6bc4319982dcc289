//! Data models for search results, page visits and the final report.
//!
//! This module defines the core data structures used throughout the application:
//! - [`SearchResult`]: One hit returned by the search API
//! - [`ScoredSnippet`]: A chunk of page text the model rated for relevance
//! - [`LinkVisit`]: What happened while reading one link
//! - [`BrowseReport`]: Everything a run produced, serialized to JSON and Markdown

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single result as returned by the SearXNG JSON API.
///
/// Only the fields the browser uses are kept; anything else in the
/// response is ignored during deserialization.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SearchResult {
    /// The result URL.
    pub url: String,
    /// The result title.
    #[serde(default)]
    pub title: String,
    /// The summary text the search engine shows under the title.
    #[serde(default)]
    pub content: String,
    /// The upstream engine that produced this result.
    #[serde(default)]
    pub engine: Option<String>,
    /// The aggregated score SearXNG assigned.
    #[serde(default)]
    pub score: Option<f64>,
}

/// A chunk of page text along with the relevance score the model gave it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScoredSnippet {
    /// The page the chunk was read from.
    pub url: String,
    /// Zero-based chunk position on the page.
    pub position: usize,
    /// Relevance score, 0 to 10.
    pub score: u8,
    /// The chunk text.
    pub text: String,
}

/// How reading a link ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOutcome {
    /// The model picked a chunk as answering the question.
    Picked,
    /// The model decided to leave the page.
    WentBack,
    /// Every readable chunk was seen without a pick.
    Exhausted,
    /// Only the top of a longer page was read.
    Skimmed,
    /// The page could not be fetched or had no text.
    Unreadable,
}

/// The record of reading one link.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LinkVisit {
    pub url: String,
    pub title: String,
    pub outcome: LinkOutcome,
    /// Number of chunks the page was split into.
    pub chunk_count: usize,
    /// Number of chunks actually shown to the model.
    pub chunks_read: usize,
    /// Actions taken in order, as the model named them.
    pub actions: Vec<String>,
    /// Chunks that were scored, in the order they were recorded.
    pub snippets: Vec<ScoredSnippet>,
}

/// Which pipeline produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowseMode {
    /// Search, scrape every result, ask once.
    Quick,
    /// Read links chunk by chunk until the model picks one.
    Full,
}

/// Everything a single run produced.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrowseReport {
    pub query: String,
    pub mode: BrowseMode,
    pub generated_at: DateTime<Utc>,
    pub search_results: Vec<SearchResult>,
    pub visits: Vec<LinkVisit>,
    /// The link whose chunk the model picked, if any.
    pub picked_url: Option<String>,
    /// The final answer, if the answer call succeeded.
    pub answer: Option<String>,
}

impl BrowseReport {
    /// Create an empty report for `query`.
    pub fn new(query: &str, mode: BrowseMode) -> Self {
        Self {
            query: query.to_string(),
            mode,
            generated_at: Utc::now(),
            search_results: Vec::new(),
            visits: Vec::new(),
            picked_url: None,
            answer: None,
        }
    }

    /// All scored snippets across visits, best first.
    ///
    /// Ties keep visit order so earlier links win.
    pub fn ranked_snippets(&self) -> Vec<&ScoredSnippet> {
        let mut snippets: Vec<&ScoredSnippet> =
            self.visits.iter().flat_map(|v| v.snippets.iter()).collect();
        snippets.sort_by(|a, b| b.score.cmp(&a.score));
        snippets
    }
}
