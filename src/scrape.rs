//! Page fetching and readable-text extraction.
//!
//! A page is reduced to the text a person would read: a site-specific
//! container when one is known, otherwise the page's `<article>` elements,
//! otherwise `<body>`. Text inside non-content elements (scripts, styles,
//! metadata, frames) is skipped.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// Elements whose text never counts as page content.
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "head", "meta", "link", "title", "noscript", "iframe",
];

/// Content selectors for sites where neither `<article>` nor `<body>` gives
/// clean text, keyed by registrable domain.
static SITE_SELECTORS: Lazy<HashMap<&'static str, Selector>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "dcinside.com",
        Selector::parse("div.view_content_wrap, div.comment_box").expect("static selector"),
    );
    map
});

static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").expect("static selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));

/// The last two labels of the URL's host, e.g. `gall.dcinside.com` -> `dcinside.com`.
pub fn site_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let labels: Vec<&str> = host.split('.').collect();
    let start = labels.len().saturating_sub(2);
    Some(labels[start..].join("."))
}

/// Extract readable text from an HTML document.
///
/// Fragments are trimmed, empty fragments dropped and the rest joined with
/// single spaces.
pub fn extract_text(html: &str, url: &str) -> String {
    let document = Html::parse_document(html);

    let site_selector = site_key(url).and_then(|key| SITE_SELECTORS.get(key.as_str()));
    let roots: Vec<ElementRef> = match site_selector {
        Some(selector) => document.select(selector).collect(),
        None => {
            let articles: Vec<ElementRef> = document.select(&ARTICLE).collect();
            if articles.is_empty() {
                document.select(&BODY).collect()
            } else {
                articles
            }
        }
    };

    let mut fragments: Vec<&str> = Vec::new();
    for root in roots {
        collect_text(root, &mut fragments);
    }
    fragments.join(" ")
}

fn collect_text<'a>(root: ElementRef<'a>, out: &mut Vec<&'a str>) {
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| EXCLUDED_TAGS.contains(&el.name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            out.push(trimmed);
        }
    }
}

/// Anything that can turn a URL into readable page text.
pub trait PageReader {
    async fn read(&self, url: &str) -> Result<String, Box<dyn Error>>;
}

/// Fetches pages over HTTP and extracts their text.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    http: reqwest::Client,
}

impl PageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, Box<dyn Error>> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

impl PageReader for PageFetcher {
    #[instrument(level = "info", skip(self))]
    async fn read(&self, url: &str) -> Result<String, Box<dyn Error>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        let text = extract_text(&body, url);
        info!(html_bytes = body.len(), text_bytes = text.len(), "Parsed page");
        debug!(preview = %crate::utils::truncate_for_log(&text, 200), "Page text");
        Ok(text)
    }
}
