//! imgport Runtime - image access orchestration.
//!
//! Exposes remote or compressed disk images through nbdkit and drives
//! qemu-img against the export, so no image format is parsed in-process.
//! Also carries the progress metric fed from qemu-img output and the
//! sparsify clients.

#![allow(clippy::result_large_err)]

pub mod exec;
pub mod image;
pub mod metrics;
pub mod nbdkit;
pub mod progress;
pub mod sparsify;

// Re-export common types
pub use exec::{LimitedExecutor, LineCallback, ProcessExecutor};
pub use image::{check_backing_file, check_capacity, parse_info, ImgInfo, NbdkitImporter};
pub use metrics::{render_text, ProgressMetric};
pub use nbdkit::{build_args, ExportConfig, NbdkitFilter, NbdkitPlugin, ParsedInvocation, QemuImgCommand};
pub use progress::{parse_progress, ProgressReporter};
pub use sparsify::{DirectSparsifier, RemoteSparsifier, Sparsifier, SparsifyState};

/// imgport Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
