//! imgport Core - Foundational Types
//!
//! Error taxonomy, configuration and exec request/response types shared by
//! the runtime and the CLI.

pub mod config;
pub mod error;
pub mod exec;

// Re-export commonly used types
pub use config::{ImporterConfig, LogLevel, SparsifyConfig, SparsifyMode};
pub use error::{ImportError, Result};
pub use exec::{ExecOutput, ExecRequest, ProcessLimits};

/// imgport version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
