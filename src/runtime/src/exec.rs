//! Process runner.
//!
//! Spawns an external tool under optional rlimits, hands every output line
//! to a callback while the process runs, and captures stdout, stderr and the
//! interleaved combined stream.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use imgport_core::error::{ImportError, Result};
use imgport_core::exec::{ExecOutput, ExecRequest, ProcessLimits, MAX_OUTPUT_BYTES};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

const READ_CHUNK: usize = 8192;

/// Callback receiving each output line, in emission order per stream.
pub type LineCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Strategy for running an external program.
///
/// Implementations must call `on_line` for each line before the process
/// exits, and return [`ImportError::ProcessError`] carrying the combined
/// output when the program fails.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn run(&self, request: &ExecRequest, on_line: LineCallback<'_>) -> Result<ExecOutput>;
}

/// Runs programs with tokio, applying [`ProcessLimits`] as rlimits in the
/// child and honouring the request timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct LimitedExecutor;

impl LimitedExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessExecutor for LimitedExecutor {
    async fn run(&self, request: &ExecRequest, on_line: LineCallback<'_>) -> Result<ExecOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(limits) = request.limits {
            apply_limits(&mut cmd, limits);
        }

        tracing::debug!(
            command = %request.display(),
            limits = ?request.limits,
            "Spawning process"
        );

        let mut child = cmd.spawn().map_err(|e| ImportError::ProcessError {
            command: request.program.clone(),
            exit_code: None,
            output: format!("failed to spawn: {}", e),
        })?;
        let pid = child.id();
        tracing::debug!(pid = ?pid, program = %request.program, "Process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ImportError::Other("child stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ImportError::Other("child stderr was not captured".to_string()))?;

        let run = async {
            let capture = pump(stdout, stderr, on_line).await;
            let status = child.wait().await?;
            Ok::<(Capture, ExitStatus), std::io::Error>((capture, status))
        };

        let (capture, status) = match request.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(
                        pid = ?pid,
                        program = %request.program,
                        timeout_ms = timeout.as_millis() as u64,
                        "Process timed out, killing"
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!(pid = ?pid, error = %e, "Failed to kill timed out process");
                    }
                    return Err(ImportError::DeadlineExceeded {
                        operation: request.program.clone(),
                        timeout,
                    });
                }
            },
            None => run.await?,
        };

        let output = capture.into_output(status.code());
        if !output.success() {
            let combined = output.combined_lossy();
            tracing::error!(
                pid = ?pid,
                command = %request.display(),
                exit_code = ?output.exit_code,
                output = %combined,
                "Process failed"
            );
            return Err(ImportError::ProcessError {
                command: request.program.clone(),
                exit_code: output.exit_code,
                output: combined,
            });
        }

        tracing::debug!(pid = ?pid, program = %request.program, "Process exited");
        Ok(output)
    }
}

/// Read both streams to EOF, feeding lines to `on_line` as they complete.
async fn pump<O, E>(mut stdout: O, mut stderr: E, on_line: LineCallback<'_>) -> Capture
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];
    let mut out_lines = LineSplitter::default();
    let mut err_lines = LineSplitter::default();
    let mut out_open = true;
    let mut err_open = true;
    let mut capture = Capture::default();

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read {
                Ok(0) => out_open = false,
                Ok(n) => {
                    capture.push_stdout(&out_buf[..n]);
                    out_lines.push(&out_buf[..n], on_line);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Error reading stdout");
                    out_open = false;
                }
            },
            read = stderr.read(&mut err_buf), if err_open => match read {
                Ok(0) => err_open = false,
                Ok(n) => {
                    capture.push_stderr(&err_buf[..n]);
                    err_lines.push(&err_buf[..n], on_line);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Error reading stderr");
                    err_open = false;
                }
            },
        }
    }

    out_lines.finish(on_line);
    err_lines.finish(on_line);
    if capture.truncated {
        tracing::warn!(limit = MAX_OUTPUT_BYTES, "Process output truncated");
    }
    capture
}

/// Splits a byte stream into lines on `\n` and `\r`.
///
/// Empty segments (for example the gap in `\r\n`) are not emitted.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn push(&mut self, chunk: &[u8], on_line: LineCallback<'_>) {
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.flush(on_line);
            } else if self.pending.len() < MAX_OUTPUT_BYTES {
                self.pending.push(byte);
            }
        }
    }

    pub(crate) fn finish(&mut self, on_line: LineCallback<'_>) {
        self.flush(on_line);
    }

    fn flush(&mut self, on_line: LineCallback<'_>) {
        if !self.pending.is_empty() {
            on_line(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
    }
}

#[derive(Debug, Default)]
struct Capture {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    combined: Vec<u8>,
    truncated: bool,
}

impl Capture {
    fn push_stdout(&mut self, chunk: &[u8]) {
        self.truncated |= append_capped(&mut self.stdout, chunk, MAX_OUTPUT_BYTES);
        self.truncated |= append_capped(&mut self.combined, chunk, 2 * MAX_OUTPUT_BYTES);
    }

    fn push_stderr(&mut self, chunk: &[u8]) {
        self.truncated |= append_capped(&mut self.stderr, chunk, MAX_OUTPUT_BYTES);
        self.truncated |= append_capped(&mut self.combined, chunk, 2 * MAX_OUTPUT_BYTES);
    }

    fn into_output(self, exit_code: Option<i32>) -> ExecOutput {
        ExecOutput {
            stdout: self.stdout,
            stderr: self.stderr,
            combined: self.combined,
            exit_code,
        }
    }
}

/// Append up to `cap` total bytes; returns true when bytes were dropped.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_sub(buf.len());
    let take = room.min(chunk.len());
    buf.extend_from_slice(&chunk[..take]);
    take < chunk.len()
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
type RlimitResource = libc::c_int;

fn apply_limits(cmd: &mut Command, limits: ProcessLimits) {
    // SAFETY: the closure only calls getrlimit/setrlimit, which are
    // async-signal-safe, and allocates nothing.
    unsafe {
        cmd.pre_exec(move || {
            if let Some(bytes) = limits.address_space_bytes {
                lower_limit(libc::RLIMIT_AS as RlimitResource, bytes)?;
            }
            if let Some(secs) = limits.cpu_time_secs {
                lower_limit(libc::RLIMIT_CPU as RlimitResource, secs)?;
            }
            Ok(())
        });
    }
}

/// Set the soft limit to `value`, never above the current hard limit.
fn lower_limit(resource: RlimitResource, value: u64) -> std::io::Result<()> {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `current` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    let wanted = (value as libc::rlim_t).min(current.rlim_max);
    let new = libc::rlimit {
        rlim_cur: wanted,
        rlim_max: current.rlim_max,
    };
    // SAFETY: `new` is a valid rlimit.
    if unsafe { libc::setrlimit(resource, &new) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
