//! `imgport sparsify` command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use imgport_core::{ImporterConfig, SparsifyMode};
use imgport_runtime::LimitedExecutor;

#[derive(Args)]
pub struct SparsifyArgs {
    /// Image file to sparsify in place
    pub image: PathBuf,

    /// Run virt-sparsify locally or ask the sidecar
    #[arg(long)]
    pub mode: Option<SparsifyMode>,

    /// Sidecar unix socket (remote mode)
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// RPC deadline in seconds (remote mode)
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub async fn execute(args: SparsifyArgs, mut config: ImporterConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(mode) = args.mode {
        config.sparsify.mode = mode;
    }
    if let Some(socket) = args.socket {
        config.sparsify.socket_path = socket;
    }
    if let Some(timeout) = args.timeout {
        config.sparsify.timeout_secs = timeout;
    }
    config.validate()?;

    let sparsifier =
        imgport_runtime::sparsify::from_config(&config.sparsify, Arc::new(LimitedExecutor::new()));
    sparsifier.sparsify(&args.image).await?;

    println!("Sparsified {} ({})", args.image.display(), sparsifier.mode());
    Ok(())
}
