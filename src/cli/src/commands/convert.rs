//! `imgport convert` command.

use std::path::PathBuf;

use clap::Args;
use imgport_core::ImporterConfig;

use super::{build_importer, SourceArgs};

#[derive(Args)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Raw file to write (overwritten if present)
    #[arg(long)]
    pub dest: PathBuf,

    /// Print the progress metric in prometheus text format when done
    #[arg(long)]
    pub metrics: bool,
}

pub async fn execute(args: ConvertArgs, config: &ImporterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut importer = build_importer(config, &args.source)?;
    let result = importer
        .convert_to_raw_stream(&args.source.url, &args.dest)
        .await;

    // Progress is reported whether or not the conversion succeeded
    if args.metrics {
        print!("{}", imgport_runtime::render_text(prometheus::default_registry())?);
    }
    result?;

    println!("{} -> {}", args.source.url, args.dest.display());
    Ok(())
}
