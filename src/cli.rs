//! Command-line interface definitions for Awful Browse.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Connection settings can be provided via flags or environment variables.

use clap::{Args, Parser, Subcommand};

/// Command-line arguments for the Awful Browse application.
///
/// # Examples
///
/// ```sh
/// # Read result pages until the model finds the answer
/// awful_browse browse "When was the Rust 1.0 release?" --searx-url https://search.example.com
///
/// # Search once, read the top of each result, answer
/// awful_browse ask "What is SearXNG?" -j ./json -m ./markdown
///
/// # Check the deployment settings before relying on them
/// awful_browse check-config --search-settings settings.yml --proxy-values values.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to the awful_aj config.yaml (defaults to the awful_aj config dir)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Click through search results chunk by chunk until the model picks an answer
    Browse(BrowseArgs),
    /// Search once, read the top of every result page and answer in one call
    Ask(AskArgs),
    /// Validate the search-engine settings and reverse-proxy values files
    CheckConfig(CheckConfigArgs),
    /// Install the bundled prompt templates into the awful_aj config directory
    Init {
        /// Overwrite templates that already exist
        #[arg(long)]
        force: bool,
    },
}

/// Where to find the search API.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Base URL of the SearXNG instance
    #[arg(long, env = "SEARXNG_URL")]
    pub searx_url: Option<String>,

    /// SearXNG settings.yml to take `server.base_url` from when --searx-url is not given
    #[arg(long, env = "AWFUL_BROWSE_SETTINGS")]
    pub settings: Option<String>,

    /// Search request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub search_timeout: u64,
}

/// Where to write the report.
#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output directory for the JSON report
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Output directory for the Markdown report
    #[arg(short, long)]
    pub markdown_output_dir: Option<String>,
}

#[derive(Args, Debug)]
pub struct BrowseArgs {
    /// The question to answer
    pub query: String,

    #[command(flatten)]
    pub search: SearchArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Links to try before giving up
    #[arg(long, default_value_t = 5)]
    pub max_links: usize,

    /// Tokens per scroll
    #[arg(long, default_value_t = 500)]
    pub chunk_size: usize,

    /// Tokens shared between consecutive scrolls
    #[arg(long, default_value_t = 0)]
    pub chunk_overlap: usize,

    /// Scrolls per page before moving on
    #[arg(long, default_value_t = 10)]
    pub max_scrolls: usize,

    /// Seconds allowed for each page-controller call
    #[arg(long, default_value_t = 30)]
    pub llm_timeout: u64,

    /// Seconds allowed for each page download
    #[arg(long, default_value_t = 10)]
    pub page_timeout: u64,

    /// Best snippets handed to the answer model
    #[arg(long, default_value_t = 3)]
    pub answer_snippets: usize,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to answer
    pub query: String,

    #[command(flatten)]
    pub search: SearchArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Search results to read
    #[arg(long, default_value_t = 3)]
    pub max_results: usize,

    /// Tokens kept from the top of each page
    #[arg(long, default_value_t = 300)]
    pub snippet_tokens: usize,

    /// Seconds allowed for each page download
    #[arg(long, default_value_t = 10)]
    pub page_timeout: u64,

    /// Pages downloaded at once
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
}

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// SearXNG settings.yml
    #[arg(long)]
    pub search_settings: Option<String>,

    /// Reverse-proxy Helm values.yaml
    #[arg(long)]
    pub proxy_values: Option<String>,
}
