//! Final-answer prompting and the quick search-and-answer pipeline.

use crate::api::AskAsync;
use crate::chunk::split_text;
use crate::models::{BrowseMode, BrowseReport, LinkOutcome, LinkVisit, ScoredSnippet};
use crate::scrape::PageReader;
use crate::search::WebSearch;
use futures::stream::{self, StreamExt};
use std::error::Error;
use std::fmt::Write;
use tracing::{error, info, instrument, warn};

/// A numbered piece of evidence handed to the answer model.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct QuickOptions {
    /// Tokens kept from the top of each page.
    pub snippet_tokens: usize,
    /// Pages downloaded at once.
    pub concurrency: usize,
}

impl Default for QuickOptions {
    fn default() -> Self {
        Self {
            snippet_tokens: 300,
            concurrency: 4,
        }
    }
}

/// The text sent to the answer model.
pub fn answer_prompt(query: &str, sources: &[Source]) -> String {
    let mut prompt = String::new();
    if sources.is_empty() {
        prompt.push_str("No sources were found.\n\n");
    } else {
        prompt.push_str("Answer using only the sources below and cite them by number, like [1].\n\n");
        for (i, source) in sources.iter().enumerate() {
            let _ = writeln!(prompt, "[{}] {}", i + 1, source.title);
            let _ = writeln!(prompt, "URL: {}", source.url);
            let _ = writeln!(prompt, "{}\n", source.text.trim());
        }
    }
    let _ = writeln!(prompt, "Question: {query}");
    prompt
}

/// Pick the evidence for the answer call.
///
/// The best-scored snippets come first. When browsing scored nothing, the
/// search engine's own result summaries are used instead.
pub fn sources_from_report(report: &BrowseReport, limit: usize) -> Vec<Source> {
    let title_of = |url: &str| {
        report
            .visits
            .iter()
            .find(|v| v.url == url)
            .map(|v| v.title.clone())
            .unwrap_or_default()
    };

    let snippets = report.ranked_snippets();
    if !snippets.is_empty() {
        return snippets
            .into_iter()
            .take(limit)
            .map(|s| Source {
                url: s.url.clone(),
                title: title_of(&s.url),
                text: s.text.clone(),
            })
            .collect();
    }

    report
        .search_results
        .iter()
        .filter(|r| !r.content.trim().is_empty())
        .take(limit)
        .map(|r| Source {
            url: r.url.clone(),
            title: r.title.clone(),
            text: r.content.clone(),
        })
        .collect()
}

/// Search, read the top of every result page, and ask once.
///
/// Pages are downloaded concurrently but kept in search order. A page that
/// cannot be read contributes its search summary instead.
#[instrument(level = "info", skip(searcher, reader, answerer, opts))]
pub async fn quick_answer<S, R, A>(
    searcher: &S,
    reader: &R,
    answerer: &A,
    query: &str,
    opts: &QuickOptions,
) -> Result<BrowseReport, Box<dyn Error>>
where
    S: WebSearch,
    R: PageReader,
    A: AskAsync<Response = String>,
{
    let mut report = BrowseReport::new(query, BrowseMode::Quick);
    report.search_results = searcher.search(query).await?;

    let pages: Vec<Result<String, Box<dyn Error>>> = stream::iter(report.search_results.iter())
        .map(|result| reader.read(&result.url))
        .buffered(opts.concurrency.max(1))
        .collect()
        .await;

    let mut sources = Vec::new();
    for (result, page) in report.search_results.iter().zip(pages) {
        let chunks = match page {
            Ok(text) => split_text(&text, opts.snippet_tokens, 0),
            Err(e) => {
                warn!(url = %result.url, error = %e, "Could not read page; using search summary");
                Vec::new()
            }
        };

        let visit = match chunks.first() {
            Some(first) => LinkVisit {
                url: result.url.clone(),
                title: result.title.clone(),
                outcome: if chunks.len() > 1 {
                    LinkOutcome::Skimmed
                } else {
                    LinkOutcome::Exhausted
                },
                chunk_count: chunks.len(),
                chunks_read: 1,
                actions: vec!["read".to_string()],
                snippets: vec![ScoredSnippet {
                    url: result.url.clone(),
                    position: 0,
                    score: 0,
                    text: first.clone(),
                }],
            },
            None => LinkVisit {
                url: result.url.clone(),
                title: result.title.clone(),
                outcome: LinkOutcome::Unreadable,
                chunk_count: 0,
                chunks_read: 0,
                actions: Vec::new(),
                snippets: Vec::new(),
            },
        };

        let text = match visit.snippets.first() {
            Some(s) => s.text.clone(),
            None => result.content.clone(),
        };
        if !text.trim().is_empty() {
            sources.push(Source {
                url: result.url.clone(),
                title: result.title.clone(),
                text,
            });
        }
        report.visits.push(visit);
    }

    info!(sources = sources.len(), "Asking for answer");
    match answerer.ask(&answer_prompt(query, &sources)).await {
        Ok(answer) => report.answer = Some(answer.trim().to_string()),
        Err(e) => error!(error = %e, "Answer call failed"),
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browse::tests::{FakeReader, FakeSearch, ScriptedAsk, link};

    fn source(n: usize) -> Source {
        Source {
            url: format!("https://s{n}"),
            title: format!("Source {n}"),
            text: format!("  text {n}  "),
        }
    }

    #[test]
    fn test_answer_prompt_numbers_sources() {
        let prompt = answer_prompt("why?", &[source(1), source(2)]);
        assert!(prompt.contains("[1] Source 1\nURL: https://s1\ntext 1\n\n"));
        assert!(prompt.contains("[2] Source 2\nURL: https://s2\ntext 2\n\n"));
        assert!(prompt.ends_with("Question: why?\n"));
    }

    #[test]
    fn test_answer_prompt_without_sources() {
        assert_eq!(answer_prompt("why?", &[]), "No sources were found.\n\nQuestion: why?\n");
    }

    #[test]
    fn test_sources_fall_back_to_search_summaries() {
        let mut report = BrowseReport::new("q", BrowseMode::Full);
        let mut empty = link("https://b");
        empty.content = "  ".to_string();
        report.search_results = vec![link("https://a"), empty, link("https://c")];
        let sources = sources_from_report(&report, 5);
        let urls: Vec<&str> = sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a", "https://c"]);
        assert_eq!(sources[0].text, "Summary of https://a");
    }

    #[tokio::test]
    async fn test_quick_answer_keeps_order_and_falls_back() {
        let search = FakeSearch(vec![link("https://a"), link("https://b"), link("https://c")]);
        let reader = FakeReader::new(&[
            ("https://a", "one two three four five"),
            ("https://c", "six seven"),
        ]);
        let answerer = ScriptedAsk::new(&["Answer [1]"]);
        let opts = QuickOptions {
            snippet_tokens: 3,
            concurrency: 3,
        };

        let report = quick_answer(&search, &reader, &answerer, "q", &opts).await.unwrap();

        assert_eq!(report.mode, BrowseMode::Quick);
        assert_eq!(report.answer.as_deref(), Some("Answer [1]"));
        let outcomes: Vec<LinkOutcome> = report.visits.iter().map(|v| v.outcome).collect();
        assert_eq!(
            outcomes,
            vec![LinkOutcome::Skimmed, LinkOutcome::Unreadable, LinkOutcome::Exhausted]
        );
        let counts: Vec<(usize, usize)> = report
            .visits
            .iter()
            .map(|v| (v.chunks_read, v.chunk_count))
            .collect();
        assert_eq!(counts, vec![(1, 2), (0, 0), (1, 1)]);

        let prompt = &answerer.prompts.borrow()[0];
        let a = prompt.find("one two three").unwrap();
        let b = prompt.find("Summary of https://b").unwrap();
        let c = prompt.find("six seven").unwrap();
        assert!(a < b && b < c);
        assert!(!prompt.contains("four"));
    }

    #[tokio::test]
    async fn test_quick_answer_propagates_search_failure() {
        let search = FakeSearch(vec![]);
        let reader = FakeReader::new(&[]);
        let answerer = ScriptedAsk::default();
        assert!(quick_answer(&search, &reader, &answerer, "q", &QuickOptions::default())
            .await
            .is_err());
        assert!(answerer.prompts.borrow().is_empty());
    }
}
