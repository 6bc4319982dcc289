//! JSON report output.
//!
//! Reports are organized by the UTC date they were generated:
//! ```text
//! json_output_dir/
//! └── 2026-10-19/
//!     ├── what-is-the-boiling-point-of-water.json
//!     └── who-maintains-tokio.json
//! ```

use crate::models::BrowseReport;
use crate::utils::slugify_title;
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`BrowseReport`] to `{json_output_dir}/{date}/{slug}.json`.
///
/// Returns the path written. An existing report for the same question on the
/// same day is replaced.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_report(
    report: &BrowseReport,
    json_output_dir: &str,
) -> Result<String, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    let full_json_dir = format!(
        "{}/{}",
        json_output_dir.trim_end_matches('/'),
        report.generated_at.date_naive()
    );
    info!(%full_json_dir, "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(%full_json_dir, error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let output_json_filename = format!("{}/{}.json", full_json_dir, slugify_title(&report.query));
    fs::write(&output_json_filename, json).await?;
    info!(path = %output_json_filename, "Wrote JSON report");

    Ok(output_json_filename)
}
