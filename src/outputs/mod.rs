//! Report output in JSON and Markdown.
//!
//! # Submodules
//!
//! - [`json`]: Writes a `BrowseReport` to a dated JSON file
//! - [`markdown`]: Renders a `BrowseReport` to Markdown and writes it
//! - [`indexes`]: Maintains the `reports.md` index of Markdown reports
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 2026-10-19/
//!     └── who-maintains-tokio.json
//!
//! markdown_output_dir/
//! ├── 2026-10-19_who-maintains-tokio.md
//! └── reports.md                       # Master index
//! ```

pub mod indexes;
pub mod json;
pub mod markdown;
