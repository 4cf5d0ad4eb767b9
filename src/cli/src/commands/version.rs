//! `imgport version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("imgport version {}", imgport_core::VERSION);
    println!("runtime version {}", imgport_runtime::VERSION);
    Ok(())
}
