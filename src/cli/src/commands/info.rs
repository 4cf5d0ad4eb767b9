//! `imgport info` command.

use clap::Args;
use imgport_core::ImporterConfig;

use super::{build_importer, SourceArgs};
use crate::output::{format_bytes, new_table};

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: InfoArgs, config: &ImporterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut importer = build_importer(config, &args.source)?;
    let info = importer.info(&args.source.url).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let mut table = new_table(&["FORMAT", "VIRTUAL SIZE", "ACTUAL SIZE", "BACKING FILE"]);
    table.add_row(vec![
        info.format.clone(),
        format_bytes(info.virtual_size),
        format_bytes(info.actual_size),
        info.backing_file.clone().unwrap_or_else(|| "-".to_string()),
    ]);
    println!("{table}");
    Ok(())
}
