//! Markdown rendering of a [`BrowseReport`].

use crate::models::{BrowseMode, BrowseReport, LinkOutcome};
use crate::outputs::indexes;
use crate::utils::slugify_title;
use std::error::Error;
use std::fmt::Write;
use tokio::fs;
use tracing::{info, instrument};

fn outcome_label(outcome: LinkOutcome) -> &'static str {
    match outcome {
        LinkOutcome::Picked => "picked",
        LinkOutcome::WentBack => "went back",
        LinkOutcome::Exhausted => "read to the end",
        LinkOutcome::Skimmed => "skimmed",
        LinkOutcome::Unreadable => "unreadable",
    }
}

/// Render a report as Markdown: the answer, then the sources, then the visit log.
pub fn report_to_markdown(report: &BrowseReport) -> String {
    let mut md = String::new();

    writeln!(md, "# {}\n", report.query).unwrap();
    let mode = match report.mode {
        BrowseMode::Quick => "quick",
        BrowseMode::Full => "full browsing",
    };
    writeln!(
        md,
        "*Generated {} ({})*\n",
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        mode
    )
    .unwrap();

    writeln!(md, "## Answer\n").unwrap();
    match &report.answer {
        Some(answer) => writeln!(md, "{}\n", answer.trim()).unwrap(),
        None => writeln!(md, "_No answer was produced._\n").unwrap(),
    }
    if let Some(picked) = &report.picked_url {
        writeln!(md, "Picked from <{}>\n", picked).unwrap();
    }

    if !report.search_results.is_empty() {
        writeln!(md, "## Search Results\n").unwrap();
        for (i, result) in report.search_results.iter().enumerate() {
            let title = if result.title.is_empty() {
                result.url.as_str()
            } else {
                result.title.as_str()
            };
            writeln!(md, "{}. [{}]({})", i + 1, title, result.url).unwrap();
        }
        md.push('\n');
    }

    if !report.visits.is_empty() {
        writeln!(md, "## Pages Read\n").unwrap();
        for visit in &report.visits {
            writeln!(
                md,
                "- <{}>: {} ({}/{} chunks)",
                visit.url,
                outcome_label(visit.outcome),
                visit.chunks_read,
                visit.chunk_count
            )
            .unwrap();
            for snippet in &visit.snippets {
                if report.mode == BrowseMode::Full {
                    writeln!(md, "    - score {}: {}", snippet.score, snippet.text.trim()).unwrap();
                } else {
                    writeln!(md, "    - {}", snippet.text.trim()).unwrap();
                }
            }
        }
        md.push('\n');
    }

    md
}

/// Write `{markdown_output_dir}/{date}_{slug}.md` and list it in `reports.md`.
///
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(%markdown_output_dir))]
pub async fn write_report(
    report: &BrowseReport,
    markdown_output_dir: &str,
) -> Result<String, Box<dyn Error>> {
    let markdown_output_dir = markdown_output_dir.trim_end_matches('/');
    fs::create_dir_all(markdown_output_dir).await?;

    let markdown_filename = format!(
        "{}_{}.md",
        report.generated_at.date_naive(),
        slugify_title(&report.query)
    );
    let path = format!("{}/{}", markdown_output_dir, markdown_filename);
    fs::write(&path, report_to_markdown(report)).await?;
    info!(%path, "Wrote Markdown report");

    indexes::update_report_index(markdown_output_dir, report, &markdown_filename).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LinkVisit, ScoredSnippet, SearchResult};
    use chrono::{TimeZone, Utc};

    fn sample() -> BrowseReport {
        let mut report = BrowseReport::new("Boiling point of water", BrowseMode::Full);
        report.generated_at = Utc.with_ymd_and_hms(2026, 10, 19, 9, 5, 0).unwrap();
        report.search_results = vec![
            SearchResult {
                url: "https://a.example/".to_string(),
                title: "Water".to_string(),
                content: String::new(),
                engine: None,
                score: None,
            },
            SearchResult {
                url: "https://b.example/".to_string(),
                title: String::new(),
                content: String::new(),
                engine: None,
                score: None,
            },
        ];
        report.visits = vec![LinkVisit {
            url: "https://a.example/".to_string(),
            title: "Water".to_string(),
            outcome: LinkOutcome::Picked,
            chunk_count: 4,
            chunks_read: 2,
            actions: vec!["scroll_down".to_string(), "pick".to_string()],
            snippets: vec![ScoredSnippet {
                url: "https://a.example/".to_string(),
                position: 1,
                score: 10,
                text: "100 °C at sea level".to_string(),
            }],
        }];
        report.picked_url = Some("https://a.example/".to_string());
        report.answer = Some("100 °C [1]".to_string());
        report
    }

    #[test]
    fn test_report_to_markdown_sections() {
        let md = report_to_markdown(&sample());
        assert!(md.starts_with("# Boiling point of water\n\n*Generated 2026-10-19 09:05 UTC (full browsing)*\n"));
        assert!(md.contains("## Answer\n\n100 °C [1]\n"));
        assert!(md.contains("Picked from <https://a.example/>"));
        assert!(md.contains("1. [Water](https://a.example/)\n2. [https://b.example/](https://b.example/)\n"));
        assert!(md.contains("- <https://a.example/>: picked (2/4 chunks)\n    - score 10: 100 °C at sea level\n"));
    }

    #[test]
    fn test_report_without_answer() {
        let report = BrowseReport::new("q", BrowseMode::Quick);
        let md = report_to_markdown(&report);
        assert!(md.contains("_No answer was produced._"));
        assert!(!md.contains("## Search Results"));
        assert!(!md.contains("## Pages Read"));
    }

    #[test]
    fn test_quick_report_shows_skimmed_pages() {
        let mut report = BrowseReport::new("q", BrowseMode::Quick);
        report.visits = vec![LinkVisit {
            url: "https://long.example/".to_string(),
            title: String::new(),
            outcome: LinkOutcome::Skimmed,
            chunk_count: 4,
            chunks_read: 1,
            actions: vec!["read".to_string()],
            snippets: vec![ScoredSnippet {
                url: "https://long.example/".to_string(),
                position: 0,
                score: 0,
                text: "top of the page".to_string(),
            }],
        }];
        let md = report_to_markdown(&report);
        assert!(md.contains("- <https://long.example/>: skimmed (1/4 chunks)\n    - top of the page\n"));
    }

    #[tokio::test]
    async fn test_write_report_updates_index() {
        let dir = tempfile::tempdir().unwrap();
        let out = format!("{}/", dir.path().to_str().unwrap());
        let path = write_report(&sample(), &out).await.unwrap();
        assert!(path.ends_with("/2026-10-19_boiling-point-of-water.md"));
        assert!(std::path::Path::new(&path).exists());

        let index = std::fs::read_to_string(dir.path().join("reports.md")).unwrap();
        assert!(index.contains("- [Boiling point of water](./2026-10-19_boiling-point-of-water.md)"));
    }
}
