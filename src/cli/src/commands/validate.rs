//! `imgport validate` command.

use clap::Args;
use imgport_core::ImporterConfig;

use super::{build_importer, SourceArgs};
use crate::output::{format_bytes, parse_fraction, parse_size_bytes};

/// Filesystem overhead reserved when none is given.
const DEFAULT_FILESYSTEM_OVERHEAD: f64 = 0.055;

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Capacity available for the image (e.g. 10g, 500m)
    #[arg(long, value_parser = parse_size_bytes)]
    pub available: u64,

    /// Fraction of the capacity reserved for filesystem overhead
    #[arg(long, default_value_t = DEFAULT_FILESYSTEM_OVERHEAD, value_parser = parse_fraction)]
    pub overhead: f64,
}

pub async fn execute(args: ValidateArgs, config: &ImporterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut importer = build_importer(config, &args.source)?;
    let info = importer
        .validate(&args.source.url, args.available, args.overhead)
        .await?;

    println!(
        "{} fits: {} virtual size, {} available ({:.1}% overhead)",
        args.source.url,
        format_bytes(info.virtual_size),
        format_bytes(args.available),
        args.overhead * 100.0
    );
    Ok(())
}
