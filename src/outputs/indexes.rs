//! Master index of Markdown reports.
//!
//! `reports.md` lists every report grouped by the UTC date it was generated,
//! newest date first:
//!
//! ```text
//! # Awful Browse Reports
//!
//! - **2026-10-19**
//!     - [What is the boiling point of water?](./2026-10-19_what-is-the-boiling-point-of-water.md)
//! ```
//!
//! Re-running the same question on the same day does not duplicate its entry.

use crate::models::BrowseReport;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

const INDEX_HEADER: &str = "# Awful Browse Reports";

/// Add `markdown_filename` to `{markdown_output_dir}/reports.md`.
#[instrument(level = "info", skip_all, fields(%markdown_output_dir, file = %markdown_filename))]
pub async fn update_report_index(
    markdown_output_dir: &str,
    report: &BrowseReport,
    markdown_filename: &str,
) -> Result<(), Box<dyn Error>> {
    let index_path = format!("{}/reports.md", markdown_output_dir);
    let content = if Path::new(&index_path).exists() {
        fs::read_to_string(&index_path).await?
    } else {
        format!("{INDEX_HEADER}\n")
    };

    let date = report.generated_at.date_naive().to_string();
    let date_heading = format!("- **{}**", date);
    let entry = format!(
        "    - [{}](./{})",
        report.query.replace(['[', ']'], ""),
        markdown_filename
    );

    let mut lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();

    match lines.iter().position(|l| l.trim() == date_heading) {
        Some(i) => {
            let mut j = i + 1;
            let mut found = false;
            while j < lines.len() && lines[j].starts_with("    - ") {
                if lines[j] == entry {
                    found = true;
                    break;
                }
                j += 1;
            }
            if !found {
                lines.insert(j, entry);
            }
        }
        None => {
            let insert_at = lines
                .iter()
                .position(|l| l.starts_with(INDEX_HEADER))
                .map(|pos| pos + 1)
                .unwrap_or(lines.len());
            lines.insert(insert_at, String::new());
            lines.insert(insert_at + 1, date_heading);
            lines.insert(insert_at + 2, entry);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    fs::write(&index_path, out).await?;
    info!(path = %index_path, "Updated reports.md index");
    Ok(())
}
