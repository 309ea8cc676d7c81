//! Export commands

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::validate::ValidateCommand;
use super::CliError;
use crate::downloader::config::{DEFAULT_FILE_BUDGET, DEFAULT_FILE_WINDOW};
use crate::export::{ExportConfig, ExportError, ExportOrchestrator, ExportReport, NamePattern};
use crate::fetcher::slack_config::DEFAULT_BASE_URL;
use crate::fetcher::slack_http::SlackHttpClient;
use crate::shutdown::SharedShutdown;

/// Slack workspace exporter
#[derive(Parser, Debug)]
#[command(name = "slack-exporter")]
#[command(about = "Export a Slack workspace into a local, resumable directory tree", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Export root directory
    #[arg(long, global = true, default_value = "export")]
    pub root: PathBuf,

    /// API token (takes precedence over --token-file)
    #[arg(long, global = true, env = "SLACK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// File holding the API token
    #[arg(long, global = true, default_value = "TOKEN")]
    pub token_file: PathBuf,

    /// Slack Web API base URL
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Maximum number of retries for failed requests (default: 5, range: 1-20)
    #[arg(long, global = true, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full export: top-level lists, conversations, files
    Export(ExportArgs),

    /// Export conversation details only
    Conversations(ConversationsArgs),

    /// Download files only
    Files(FilesArgs),

    /// Check an export tree offline
    Validate(ValidateCommand),
}

/// Auto-pull switch shared by every export command
#[derive(Args, Debug, Clone, Copy)]
pub struct PullArgs {
    /// Fail instead of pulling a missing top-level list
    #[arg(long, default_value_t = false)]
    pub no_auto_pull: bool,
}

/// File download budget
#[derive(Args, Debug, Clone, Copy)]
pub struct FileBudgetArgs {
    /// File downloads allowed per window
    #[arg(long, default_value_t = DEFAULT_FILE_BUDGET, value_parser = parse_budget)]
    pub file_budget: usize,

    /// File download window in seconds
    #[arg(long, default_value_t = DEFAULT_FILE_WINDOW.as_secs_f64(), value_parser = parse_window)]
    pub file_window_secs: f64,

    /// Show a progress bar while downloading files
    #[arg(long, default_value_t = false)]
    pub progress: bool,
}

/// Full export arguments
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Only expand conversations whose name matches this regular expression (anchored at the start)
    #[arg(long, default_value = crate::export::config::MATCH_ALL)]
    pub pattern: String,

    #[command(flatten)]
    pub pull: PullArgs,

    #[command(flatten)]
    pub files: FileBudgetArgs,
}

/// Conversation export arguments
#[derive(Args, Debug)]
pub struct ConversationsArgs {
    /// Only expand conversations whose name matches this regular expression (anchored at the start)
    #[arg(long, default_value = crate::export::config::MATCH_ALL)]
    pub pattern: String,

    #[command(flatten)]
    pub pull: PullArgs,
}

/// File download arguments
#[derive(Args, Debug)]
pub struct FilesArgs {
    #[command(flatten)]
    pub pull: PullArgs,

    #[command(flatten)]
    pub files: FileBudgetArgs,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

fn parse_budget(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("file budget must be at least 1".to_string());
    }
    Ok(value)
}

fn parse_window(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number of seconds"))?;
    if !value.is_finite() || value < 0.0 {
        return Err("file window must be a non-negative number of seconds".to_string());
    }
    Ok(value)
}

impl Cli {
    /// Resolve the API token: `--token`/`SLACK_TOKEN`, else the trimmed token file
    pub fn resolve_token(&self) -> Result<String, CliError> {
        if let Some(token) = self.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }
        read_token_file(&self.token_file)
    }

    fn api_client(&self) -> Result<SlackHttpClient, CliError> {
        Ok(SlackHttpClient::new(self.resolve_token()?)?
            .with_base_url(self.api_base_url.clone())
            .with_max_retries(self.max_retries))
    }

    fn orchestrator(
        &self,
        config: ExportConfig,
        shutdown: SharedShutdown,
        progress: bool,
    ) -> Result<ExportOrchestrator, CliError> {
        let api = self.api_client()?;
        Ok(ExportOrchestrator::new(Arc::new(api), config)
            .with_shutdown(shutdown)
            .with_progress(progress && self.output_format == OutputFormat::Human))
    }
}

/// Read and trim a token file
pub fn read_token_file(path: &Path) -> Result<String, CliError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        CliError::ConfigurationError(format!(
            "no --token given and token file {} is unreadable: {e}",
            path.display()
        ))
    })?;
    let token = contents.trim();
    if token.is_empty() {
        return Err(CliError::ConfigurationError(format!(
            "token file {} is empty",
            path.display()
        )));
    }
    Ok(token.to_string())
}

fn base_config(cli: &Cli, pull: PullArgs) -> ExportConfig {
    ExportConfig::new(cli.root.clone()).with_auto_pull(!pull.no_auto_pull)
}

fn with_files(config: ExportConfig, files: FileBudgetArgs) -> ExportConfig {
    config.with_file_budget(files.file_budget, Duration::from_secs_f64(files.file_window_secs))
}

impl ExportArgs {
    /// Run the full export
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = with_files(base_config(cli, self.pull), self.files)
            .with_pattern(NamePattern::new(&self.pattern)?);
        let orchestrator = cli.orchestrator(config, shutdown, self.files.progress)?;

        let report = orchestrator.run().await?;
        finish(cli.output_format, "Export", &report)
    }
}

impl ConversationsArgs {
    /// Export conversation details
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = base_config(cli, self.pull).with_pattern(NamePattern::new(&self.pattern)?);
        let orchestrator = cli.orchestrator(config, shutdown, false)?;

        let mut report = ExportReport::new();
        let result = orchestrator.export_conversations(&mut report).await;
        report.finish();
        finish_stage(cli.output_format, result, "Conversation export", &report)
    }
}

impl FilesArgs {
    /// Download files
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = with_files(base_config(cli, self.pull), self.files);
        let orchestrator = cli.orchestrator(config, shutdown, self.files.progress)?;

        let mut report = ExportReport::new();
        let result = orchestrator.download_files(&mut report).await;
        report.finish();
        finish_stage(cli.output_format, result, "File download", &report)
    }
}

/// Print what a stage recorded, then surface its error if it stopped early
fn finish_stage(
    format: OutputFormat,
    result: Result<(), ExportError>,
    name: &str,
    report: &ExportReport,
) -> Result<(), CliError> {
    match result {
        Ok(()) => finish(format, name, report),
        Err(e) => {
            print_report(format, name, report)?;
            error!(error = %e, "{} stopped early", name);
            Err(e.into())
        }
    }
}

/// Print the report and turn failed units into a command error
fn finish(format: OutputFormat, name: &str, report: &ExportReport) -> Result<(), CliError> {
    print_report(format, name, report)?;

    if report.has_failures() {
        error!(failed = report.failed(), "{} finished with failures", name);
        return Err(CliError::Incomplete {
            failed: report.failed(),
        });
    }
    info!("{} finished", name);
    Ok(())
}

fn print_report(format: OutputFormat, name: &str, report: &ExportReport) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string(report)
                .map_err(|e| CliError::ConfigurationError(format!("failed to render report: {e}")))?;
            println!("{json}");
        }
        OutputFormat::Human => {
            if report.has_failures() {
                eprintln!("\n{name} finished with failures");
            } else if report.cancelled {
                println!("\n{name} cancelled; re-run to continue");
            } else {
                println!("\n{name} completed successfully!");
            }
            println!("{}", report.summary());
        }
    }
    Ok(())
}
