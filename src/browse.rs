//! The browsing loop.
//!
//! Links from the search API are "clicked" in rank order. Each page is split
//! into scroll-sized chunks and the page-controller model reads them one at a
//! time, answering with an action and a relevance score:
//!
//! | Action        | Effect                                               |
//! |---------------|------------------------------------------------------|
//! | `scroll_down` | read the next chunk of the same page                 |
//! | `go_back`     | leave the page, try the next link                    |
//! | `pick`        | this chunk answers the question; stop browsing       |
//!
//! Once a chunk is picked or the links run out, the answer model is asked
//! once with the best-scored chunks.

use crate::answer::{Source, answer_prompt, sources_from_report};
use crate::api::AskAsync;
use crate::chunk::split_text;
use crate::models::{BrowseMode, BrowseReport, LinkOutcome, LinkVisit, ScoredSnippet, SearchResult};
use crate::scrape::PageReader;
use crate::search::WebSearch;
use crate::utils::truncate_for_log;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Highest relevance score; a picked chunk is recorded with it.
pub const MAX_RELEVANCE: u8 = 10;

#[derive(Debug, Clone)]
pub struct BrowseOptions {
    /// Links to try before giving up.
    pub max_links: usize,
    /// Tokens per scroll.
    pub chunk_size: usize,
    /// Tokens shared between consecutive scrolls.
    pub chunk_overlap: usize,
    /// Scrolls per page before moving on.
    pub max_scrolls: usize,
    /// Bound on a single page-controller call, retries included.
    pub llm_timeout: Duration,
    /// Snippets handed to the answer model.
    pub answer_snippets: usize,
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            max_links: 5,
            chunk_size: 500,
            chunk_overlap: 0,
            max_scrolls: 10,
            llm_timeout: Duration::from_secs(30),
            answer_snippets: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageAction {
    ScrollDown,
    GoBack,
    Pick,
}

impl PageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageAction::ScrollDown => "scroll_down",
            PageAction::GoBack => "go_back",
            PageAction::Pick => "pick",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "scroll_down" => Some(PageAction::ScrollDown),
            "go_back" => Some(PageAction::GoBack),
            "pick" => Some(PageAction::Pick),
            _ => None,
        }
    }
}

/// What the page controller decided for one chunk. Either half may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlDecision {
    pub action: Option<PageAction>,
    pub relevance_score: Option<u8>,
}

/// Parse the page controller's reply.
///
/// The reply should be a JSON object such as
/// `{"action": "scroll_down", "relevance_score": 3}`; code fences and prose
/// around it are ignored. Scores may be integers or digit strings and are
/// clamped to `0..=10`. Anything unrecognised yields an empty decision.
pub fn parse_decision(raw: &str) -> ControlDecision {
    let Some(start) = raw.find('{') else {
        return ControlDecision::default();
    };
    // Stop at the end of the first object; prose after it may hold more braces.
    let first = serde_json::Deserializer::from_str(&raw[start..])
        .into_iter::<Value>()
        .next();
    let value = match first {
        Some(Ok(v)) => v,
        None => return ControlDecision::default(),
        Some(Err(e)) => {
            debug!(error = %e, reply = %truncate_for_log(raw, 200), "Controller reply is not JSON");
            return ControlDecision::default();
        }
    };

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .and_then(PageAction::parse);
    let relevance_score = match value.get("relevance_score") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            s.parse::<u64>().ok()
        }
        _ => None,
    }
    .map(|score| score.min(MAX_RELEVANCE as u64) as u8);

    ControlDecision {
        action,
        relevance_score,
    }
}

/// The text shown to the page controller for one scroll position.
pub fn controller_prompt(
    query: &str,
    link: &str,
    position: usize,
    max_position: usize,
    previous_actions: &[String],
    content: &str,
) -> String {
    format!(
        "Current link: {link}\n\
         Current scroll bar: [{position}/{max_position}]\n\
         Your previous actions\n```{previous_actions:?}```\n\
         Current reading content\n```{content}```\n\n\
         Question: {query}\n"
    )
}

/// Read one page chunk by chunk until the controller leaves, picks, or the
/// scroll budget runs out.
///
/// A score is recorded when it is the first one or at least as high as the
/// last recorded score, so the snippet list climbs toward the best chunk. A
/// controller call that fails or times out counts as no decision and the
/// next chunk is read.
#[instrument(level = "info", skip_all, fields(url = %link.url))]
pub async fn click_link<C>(
    controller: &C,
    query: &str,
    link: &SearchResult,
    chunks: &[String],
    opts: &BrowseOptions,
) -> LinkVisit
where
    C: AskAsync<Response = String>,
{
    let mut recorded: Vec<(usize, u8)> = Vec::new();
    let mut previous_actions: Vec<String> = Vec::new();
    let mut actions: Vec<String> = Vec::new();
    let mut outcome = LinkOutcome::Exhausted;
    let mut chunks_read = 0;

    for (idx, chunk) in chunks.iter().take(opts.max_scrolls).enumerate() {
        chunks_read = idx + 1;
        let prompt = controller_prompt(
            query,
            &link.url,
            idx + 1,
            chunks.len(),
            &previous_actions,
            chunk.trim(),
        );

        let decision = match timeout(opts.llm_timeout, controller.ask(&prompt)).await {
            Ok(Ok(reply)) => parse_decision(&reply),
            Ok(Err(e)) => {
                warn!(position = idx + 1, error = %e, "Controller call failed");
                ControlDecision::default()
            }
            Err(_) => {
                warn!(position = idx + 1, timeout = ?opts.llm_timeout, "Controller call timed out");
                ControlDecision::default()
            }
        };
        info!(
            position = idx + 1,
            of = chunks.len(),
            action = ?decision.action,
            relevance_score = ?decision.relevance_score,
            content = %truncate_for_log(chunk, 120),
            "Read chunk"
        );

        if let Some(score) = decision.relevance_score {
            if recorded.last().is_none_or(|&(_, last)| score >= last) {
                recorded.push((idx, score));
            }
        }

        match decision.action {
            Some(PageAction::ScrollDown) => {
                previous_actions.push(PageAction::ScrollDown.as_str().to_string());
                actions.push(PageAction::ScrollDown.as_str().to_string());
            }
            Some(PageAction::GoBack) => {
                actions.push(PageAction::GoBack.as_str().to_string());
                outcome = LinkOutcome::WentBack;
                break;
            }
            Some(PageAction::Pick) => {
                actions.push(PageAction::Pick.as_str().to_string());
                match recorded.last_mut() {
                    Some(last) if last.0 == idx => last.1 = MAX_RELEVANCE,
                    _ => recorded.push((idx, MAX_RELEVANCE)),
                }
                outcome = LinkOutcome::Picked;
                break;
            }
            None => actions.push("none".to_string()),
        }
    }

    let snippets = recorded
        .into_iter()
        .map(|(idx, score)| ScoredSnippet {
            url: link.url.clone(),
            position: idx,
            score,
            text: chunks[idx].clone(),
        })
        .collect();

    LinkVisit {
        url: link.url.clone(),
        title: link.title.clone(),
        outcome,
        chunk_count: chunks.len(),
        chunks_read,
        actions,
        snippets,
    }
}

fn unreadable(link: &SearchResult) -> LinkVisit {
    LinkVisit {
        url: link.url.clone(),
        title: link.title.clone(),
        outcome: LinkOutcome::Unreadable,
        chunk_count: 0,
        chunks_read: 0,
        actions: Vec::new(),
        snippets: Vec::new(),
    }
}

/// Search, click through links until one is picked, then answer.
///
/// Only the search itself is fatal. Pages that cannot be read are recorded
/// as [`LinkOutcome::Unreadable`] and skipped; a failed answer call leaves
/// `answer` empty.
#[instrument(level = "info", skip(searcher, reader, controller, answerer, opts))]
pub async fn browse<S, R, C, A>(
    searcher: &S,
    reader: &R,
    controller: &C,
    answerer: &A,
    query: &str,
    opts: &BrowseOptions,
) -> Result<BrowseReport, Box<dyn Error>>
where
    S: WebSearch,
    R: PageReader,
    C: AskAsync<Response = String>,
    A: AskAsync<Response = String>,
{
    let mut report = BrowseReport::new(query, BrowseMode::Full);
    report.search_results = searcher.search(query).await?;
    info!(links = report.search_results.len(), max_links = opts.max_links, "Browsing search results");

    let links: Vec<SearchResult> = report
        .search_results
        .iter()
        .take(opts.max_links)
        .cloned()
        .collect();
    for link in &links {
        info!(url = %link.url, title = %link.title, "Clicking link");
        let text = match reader.read(&link.url).await {
            Ok(text) => text,
            Err(e) => {
                warn!(url = %link.url, error = %e, "Could not read page; skipping");
                report.visits.push(unreadable(link));
                continue;
            }
        };
        let chunks = split_text(&text, opts.chunk_size, opts.chunk_overlap);
        if chunks.is_empty() {
            warn!(url = %link.url, "Page has no readable text; skipping");
            report.visits.push(unreadable(link));
            continue;
        }

        let visit = click_link(controller, query, link, &chunks, opts).await;
        info!(url = %link.url, outcome = ?visit.outcome, chunks_read = visit.chunks_read, "Finished link");
        let picked = visit.outcome == LinkOutcome::Picked;
        report.visits.push(visit);
        if picked {
            report.picked_url = Some(link.url.clone());
            break;
        }
    }

    let sources: Vec<Source> = sources_from_report(&report, opts.answer_snippets);
    info!(sources = sources.len(), picked = report.picked_url.is_some(), "Asking for final answer");
    match answerer.ask(&answer_prompt(query, &sources)).await {
        Ok(answer) => report.answer = Some(answer.trim().to_string()),
        Err(e) => error!(error = %e, "Answer call failed"),
    }

    Ok(report)
}
