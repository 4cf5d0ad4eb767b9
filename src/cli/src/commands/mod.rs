//! CLI command definitions and dispatch.

mod convert;
mod info;
mod sparsify;
mod validate;
mod version;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use imgport_core::ImporterConfig;
use imgport_runtime::{
    ExportConfig, LimitedExecutor, NbdkitFilter, NbdkitImporter, ProgressMetric,
};
use url::Url;

/// imgport: inspect, validate and convert disk images through nbdkit.
#[derive(Parser)]
#[command(name = "imgport", version, about)]
pub struct Cli {
    /// YAML configuration file (environment variables still apply on top)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Show format and sizes of an image
    Info(info::InfoArgs),
    /// Check that an image can be imported into the given capacity
    Validate(validate::ValidateArgs),
    /// Convert an image to a raw file
    Convert(convert::ConvertArgs),
    /// Reclaim unused space inside an image in place
    Sparsify(sparsify::SparsifyArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Source image and how nbdkit should reach it.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Image URL (http or https)
    pub url: Url,

    /// Content filter applied by nbdkit (repeatable, listed innermost first)
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<NbdkitFilter>,

    /// Where nbdkit writes its pid
    #[arg(long)]
    pub pid_file: Option<PathBuf>,

    /// Directory holding tls.crt (overrides the configured one)
    #[arg(long)]
    pub cert_dir: Option<PathBuf>,
}

fn parse_filter(s: &str) -> Result<NbdkitFilter, String> {
    s.parse()
}

/// Configuration from `path` when given, otherwise defaults; environment
/// variables are applied in both cases.
pub fn load_config(path: Option<&Path>) -> imgport_core::Result<ImporterConfig> {
    match path {
        Some(path) => ImporterConfig::load(path),
        None => ImporterConfig::from_env(),
    }
}

fn default_pid_file() -> PathBuf {
    std::env::temp_dir().join(format!("imgport-nbdkit-{}.pid", std::process::id()))
}

/// Build an importer for `source` backed by the process-wide progress metric.
pub(crate) fn build_importer(
    config: &ImporterConfig,
    source: &SourceArgs,
) -> Result<NbdkitImporter, Box<dyn std::error::Error>> {
    let pid_file = source.pid_file.clone().unwrap_or_else(default_pid_file);
    let cert_dir = source.cert_dir.as_deref().or(config.cert_dir.as_deref());

    let mut export = ExportConfig::new_curl(pid_file, cert_dir);
    for filter in &source.filters {
        export.add_filter(*filter);
    }

    let metric = ProgressMetric::global()?;
    Ok(NbdkitImporter::from_config(
        config,
        export,
        Arc::new(LimitedExecutor::new()),
        metric,
    ))
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: ImporterConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Info(args) => info::execute(args, &config).await,
        Command::Validate(args) => validate::execute(args, &config).await,
        Command::Convert(args) => convert::execute(args, &config).await,
        Command::Sparsify(args) => sparsify::execute(args, config).await,
        Command::Version(args) => version::execute(args).await,
    }
}
