//! # Awful Browse
//!
//! Answers a question by searching a self-hosted SearXNG instance, reading the
//! result pages, and letting an OpenAI-compatible LLM decide where the answer is.
//!
//! ## Modes
//!
//! - `browse`: clicks results in rank order and reads each page one chunk at a
//!   time. The page-controller model scrolls down, goes back, or picks the
//!   chunk that answers the question. The answer model then writes a reply
//!   from the best chunks.
//! - `ask`: reads the top of every result page and asks the answer model once.
//! - `check-config`: validates the SearXNG `settings.yml` and the reverse-proxy
//!   Helm values the instance is deployed with.
//! - `init`: installs the two prompt templates into the awful_aj config dir.
//!
//! ## Usage
//!
//! ```sh
//! awful_browse browse "Who maintains tokio?" --searx-url https://search.example.com -m ./reports
//! ```

use awful_aj::config::{AwfulJadeConfig, load_config};
use awful_aj::{config_dir, template};
use clap::Parser;
use itertools::Itertools;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod answer;
mod api;
mod browse;
mod chunk;
mod cli;
mod config;
mod models;
mod outputs;
mod scrape;
mod search;
mod utils;

use crate::config::proxy_values::ProxyValues;
use crate::config::search_engine::SearchEngineSettings;
use crate::config::{ConfigError, ConfigIssue, Severity, has_errors};
use answer::{QuickOptions, quick_answer};
use api::{ANSWER_MAX_RETRIES, CONTROLLER_MAX_RETRIES, retrying};
use browse::{BrowseOptions, browse};
use cli::{AskArgs, BrowseArgs, CheckConfigArgs, Cli, Command, OutputArgs, SearchArgs};
use models::BrowseReport;
use outputs::{json, markdown};
use scrape::PageFetcher;
use search::SearxClient;
use utils::ensure_writable_dir;

const CONTROLLER_TEMPLATE: &str = "web_page_controller";
const ANSWER_TEMPLATE: &str = "web_answer";

const BUNDLED_TEMPLATES: &[(&str, &str)] = &[
    (
        CONTROLLER_TEMPLATE,
        include_str!("../templates/web_page_controller.yaml"),
    ),
    (ANSWER_TEMPLATE, include_str!("../templates/web_answer.yaml")),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let result = match args.command {
        Command::Browse(ref browse_args) => run_browse(args.config.as_deref(), browse_args).await,
        Command::Ask(ref ask_args) => run_ask(args.config.as_deref(), ask_args).await,
        Command::CheckConfig(ref check_args) => run_check_config(check_args),
        Command::Init { force } => run_init(force).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, "Execution complete"),
        Err(e) => error!(?elapsed, error = %e, "Execution failed"),
    }
    result
}

/// Load the awful_aj config from `path` or the awful_aj config dir.
fn load_llm_config(path: Option<&str>) -> Result<AwfulJadeConfig, Box<dyn Error>> {
    let conf_file = match path {
        Some(p) => PathBuf::from(p),
        None => config_dir()?.join("config.yaml"),
    };
    let config_path = conf_file.to_str().ok_or("Not a valid config filename")?;
    let config = load_config(config_path)
        .map_err(|e| format!("failed to load LLM config {config_path}: {e}"))?;
    info!(config_path, "Loaded configuration");
    Ok(config)
}

/// The SearXNG base URL: `--searx-url` if given, else `server.base_url` from the settings file.
fn resolve_search_base(args: &SearchArgs) -> Result<String, Box<dyn Error>> {
    if let Some(url) = &args.searx_url {
        return Ok(url.clone());
    }
    let Some(path) = &args.settings else {
        return Err("no search instance configured; pass --searx-url or --settings".into());
    };

    let settings = SearchEngineSettings::load(path)?;
    if !settings.serves_json() {
        return Err(format!("{path}: `json` is not listed under search.formats").into());
    }
    match settings.api_base() {
        Some(base) => Ok(base.to_string()),
        None => Err(format!("{path}: server.base_url is not set").into()),
    }
}

fn search_client(args: &SearchArgs, max_results: usize) -> Result<SearxClient, Box<dyn Error>> {
    let base = resolve_search_base(args)?;
    info!(%base, max_results, "Using search instance");
    Ok(SearxClient::new(
        &base,
        max_results,
        Duration::from_secs(args.search_timeout),
    )?)
}

#[instrument(level = "info", skip_all, fields(query = %args.query))]
async fn run_browse(config_path: Option<&str>, args: &BrowseArgs) -> Result<(), Box<dyn Error>> {
    check_output_dirs(&args.output).await?;

    let searcher = search_client(&args.search, args.max_links)?;
    let reader = PageFetcher::new(Duration::from_secs(args.page_timeout))?;

    let config = load_llm_config(config_path)?;
    let controller_template = template::load_template(CONTROLLER_TEMPLATE).await?;
    let answer_template = template::load_template(ANSWER_TEMPLATE).await?;
    info!("Loaded templates: {CONTROLLER_TEMPLATE}, {ANSWER_TEMPLATE}");
    let controller = retrying(&config, &controller_template, CONTROLLER_MAX_RETRIES);
    let answerer = retrying(&config, &answer_template, ANSWER_MAX_RETRIES);

    let opts = BrowseOptions {
        max_links: args.max_links,
        chunk_size: args.chunk_size,
        chunk_overlap: args.chunk_overlap,
        max_scrolls: args.max_scrolls,
        llm_timeout: Duration::from_secs(args.llm_timeout),
        answer_snippets: args.answer_snippets,
    };
    let report = browse(&searcher, &reader, &controller, &answerer, &args.query, &opts).await?;
    finish(&report, &args.output).await
}

#[instrument(level = "info", skip_all, fields(query = %args.query))]
async fn run_ask(config_path: Option<&str>, args: &AskArgs) -> Result<(), Box<dyn Error>> {
    check_output_dirs(&args.output).await?;

    let searcher = search_client(&args.search, args.max_results)?;
    let reader = PageFetcher::new(Duration::from_secs(args.page_timeout))?;

    let config = load_llm_config(config_path)?;
    let answer_template = template::load_template(ANSWER_TEMPLATE).await?;
    let answerer = retrying(&config, &answer_template, ANSWER_MAX_RETRIES);

    let opts = QuickOptions {
        snippet_tokens: args.snippet_tokens,
        concurrency: args.concurrency,
    };
    let report = quick_answer(&searcher, &reader, &answerer, &args.query, &opts).await?;
    finish(&report, &args.output).await
}

/// Fail before any network work if an output directory is not writable.
async fn check_output_dirs(output: &OutputArgs) -> Result<(), Box<dyn Error>> {
    for dir in [&output.json_output_dir, &output.markdown_output_dir]
        .into_iter()
        .flatten()
    {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Output directory is not writable (fix perms or choose a different path)");
            return Err(e);
        }
    }
    Ok(())
}

/// Write the requested outputs and print the answer.
async fn finish(report: &BrowseReport, output: &OutputArgs) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = &output.json_output_dir {
        if let Err(e) = json::write_report(report, dir).await {
            error!(error = %e, "Failed to write JSON report");
        }
    }
    if let Some(dir) = &output.markdown_output_dir {
        if let Err(e) = markdown::write_report(report, dir).await {
            error!(error = %e, "Failed to write Markdown report");
        }
    }

    match &report.answer {
        Some(answer) => {
            println!("{answer}");
            if let Some(url) = &report.picked_url {
                println!("\nSource: {url}");
            }
            Ok(())
        }
        None => Err("no answer was produced".into()),
    }
}

fn print_issues(path: &str, issues: &[ConfigIssue]) {
    if issues.is_empty() {
        println!("{path}: ok");
        return;
    }
    for issue in issues {
        println!("{path}: {issue}");
    }
}

fn check_search_settings(path: &str) -> Result<Vec<ConfigIssue>, ConfigError> {
    Ok(SearchEngineSettings::load(path)?.validate())
}

fn check_proxy_values(path: &str) -> Result<Vec<ConfigIssue>, ConfigError> {
    let values = ProxyValues::load(path)?;
    for resolver in values.certificate_resolvers() {
        info!(
            name = %resolver.name,
            email = ?resolver.email,
            storage = ?resolver.storage,
            challenge = ?resolver.challenge(),
            "Certificate resolver"
        );
    }
    Ok(values.validate())
}

/// Check every file given, print what was found, and fail if any file failed.
fn run_check_config(args: &CheckConfigArgs) -> Result<(), Box<dyn Error>> {
    let mut checks: Vec<(&str, Result<Vec<ConfigIssue>, ConfigError>)> = Vec::new();
    if let Some(path) = &args.search_settings {
        checks.push((path.as_str(), check_search_settings(path)));
    }
    if let Some(path) = &args.proxy_values {
        checks.push((path.as_str(), check_proxy_values(path)));
    }
    if checks.is_empty() {
        return Err("nothing to check; pass --search-settings and/or --proxy-values".into());
    }

    let mut failures: Vec<ConfigError> = Vec::new();
    for (path, outcome) in checks {
        match outcome {
            Ok(issues) => {
                print_issues(path, &issues);
                if has_errors(&issues) {
                    failures.push(ConfigError::Invalid {
                        path: path.to_string(),
                        count: issues.iter().filter(|i| i.severity == Severity::Error).count(),
                    });
                }
            }
            Err(e) => {
                println!("{e}");
                failures.push(e);
            }
        }
    }

    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0).into()),
        _ => Err(failures.iter().join("; ").into()),
    }
}

async fn run_init(force: bool) -> Result<(), Box<dyn Error>> {
    let dir = config_dir()?.join("templates");
    let written = install_templates(&dir, force).await?;
    info!(dir = %dir.display(), installed = written.len(), "Templates ready");
    Ok(())
}

/// Write the bundled templates into `dir`, keeping existing files unless `force`.
///
/// Returns the paths that were written.
async fn install_templates(dir: &Path, force: bool) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut written = Vec::new();
    for (name, body) in BUNDLED_TEMPLATES {
        let path = dir.join(format!("{name}.yaml"));
        if path.exists() && !force {
            warn!(path = %path.display(), "Template exists; leaving it alone (use --force to overwrite)");
            continue;
        }
        tokio::fs::write(&path, body).await?;
        info!(path = %path.display(), "Installed template");
        written.push(path);
    }
    Ok(written)
}
