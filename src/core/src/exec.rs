//! Exec types for running external tools.
//!
//! Shared request/response types used by the process runner and the
//! components that build commands for it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum output size per stream (stdout/stderr): 16 MiB.
pub const MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Resource ceilings requested for a spawned process.
///
/// Applied as rlimits in the child before exec, so they are inherited by
/// anything the child spawns in turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLimits {
    /// Address space ceiling in bytes (RLIMIT_AS).
    #[serde(default)]
    pub address_space_bytes: Option<u64>,
    /// CPU time ceiling in seconds (RLIMIT_CPU).
    #[serde(default)]
    pub cpu_time_secs: Option<u64>,
}

impl ProcessLimits {
    pub fn is_unlimited(&self) -> bool {
        self.address_space_bytes.is_none() && self.cpu_time_secs.is_none()
    }
}

/// Request to execute a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Program to run, resolved through PATH.
    pub program: String,
    /// Arguments, passed verbatim (no shell).
    pub args: Vec<String>,
    /// Additional environment variables.
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Optional resource ceilings.
    #[serde(default)]
    pub limits: Option<ProcessLimits>,
    /// Kill the process and fail once this elapses.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl ExecRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
            limits: None,
            timeout: None,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn limits(mut self, limits: Option<ProcessLimits>) -> Self {
        self.limits = limits.filter(|l| !l.is_unlimited());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments as a single line, for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output from an executed program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Captured stdout bytes.
    pub stdout: Vec<u8>,
    /// Captured stderr bytes.
    pub stderr: Vec<u8>,
    /// stdout and stderr interleaved in arrival order.
    pub combined: Vec<u8>,
    /// Process exit code (None when killed by a signal).
    pub exit_code: Option<i32>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn combined_lossy(&self) -> String {
        String::from_utf8_lossy(&self.combined).into_owned()
    }
}
