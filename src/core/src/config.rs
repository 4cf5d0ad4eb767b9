use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ImportError, Result};
use crate::exec::ProcessLimits;

/// Environment variable naming the owner that progress is attributed to.
pub const OWNER_UID_ENV: &str = "OWNER_UID";

/// Default deadline for the remote sparsify call.
pub const DEFAULT_SPARSIFY_TIMEOUT_SECS: u64 = 300;

/// Default sidecar socket for the remote sparsify service.
pub const DEFAULT_SPARSIFY_SOCKET: &str = "/var/run/libguestfs/guestfs.sock";

/// Importer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    /// Owner the import progress metric is attributed to (unset disables it)
    pub owner_uid: Option<String>,

    /// Directory holding `tls.crt` for the curl plugin
    pub cert_dir: Option<PathBuf>,

    /// Export daemon binary
    pub nbdkit_binary: String,

    /// Image utility binary
    pub qemu_img_binary: String,

    /// Resource ceilings for the export process
    pub limits: ProcessLimits,

    /// Bound on info/convert runs in seconds (unset = unbounded)
    pub exec_timeout_secs: Option<u64>,

    /// Sparsify settings
    pub sparsify: SparsifyConfig,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            owner_uid: None,
            cert_dir: None,
            nbdkit_binary: "nbdkit".to_string(),
            qemu_img_binary: "qemu-img".to_string(),
            limits: ProcessLimits::default(),
            exec_timeout_secs: None,
            sparsify: SparsifyConfig::default(),
            log_level: LogLevel::Info,
        }
    }
}

impl ImporterConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file, then overlay environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ImportError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(owner) = lookup(OWNER_UID_ENV) {
            self.owner_uid = Some(owner);
        }
        if let Some(dir) = lookup("IMPORTER_CERT_DIR") {
            self.cert_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = lookup("IMPORTER_EXEC_TIMEOUT") {
            self.exec_timeout_secs = Some(parse_secs("IMPORTER_EXEC_TIMEOUT", &secs)?);
        }
        if let Some(socket) = lookup("IMPORTER_SPARSIFY_SOCKET") {
            self.sparsify.socket_path = PathBuf::from(socket);
        }
        if let Some(secs) = lookup("IMPORTER_SPARSIFY_TIMEOUT") {
            self.sparsify.timeout_secs = parse_secs("IMPORTER_SPARSIFY_TIMEOUT", &secs)?;
        }
        if let Some(mode) = lookup("IMPORTER_SPARSIFY_MODE") {
            self.sparsify.mode = mode.parse().map_err(ImportError::ConfigError)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sparsify.timeout_secs == 0 {
            return Err(ImportError::ConfigError(
                "sparsify timeout must be greater than zero".to_string(),
            ));
        }
        if self.exec_timeout_secs == Some(0) {
            return Err(ImportError::ConfigError(
                "exec timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Owner id with empty strings treated as unset.
    pub fn owner(&self) -> Option<&str> {
        self.owner_uid.as_deref().filter(|o| !o.is_empty())
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout_secs.map(Duration::from_secs)
    }
}

/// How sparsification is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SparsifyMode {
    /// Run the sparsify utility locally
    Direct,
    /// Ask the sidecar over its unix socket
    Remote,
}

impl std::fmt::Display for SparsifyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for SparsifyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "remote" => Ok(Self::Remote),
            _ => Err(format!("unknown sparsify mode: '{}' (supported: direct, remote)", s)),
        }
    }
}

/// Sparsify configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SparsifyConfig {
    pub mode: SparsifyMode,

    /// Sidecar unix socket (remote mode)
    pub socket_path: PathBuf,

    /// RPC deadline in seconds (remote mode)
    pub timeout_secs: u64,

    /// Sparsify utility (direct mode)
    pub binary: String,

    /// Value forced into LIBGUESTFS_BACKEND (direct mode)
    pub backend: String,
}

impl Default for SparsifyConfig {
    fn default() -> Self {
        Self {
            mode: SparsifyMode::Remote,
            socket_path: PathBuf::from(DEFAULT_SPARSIFY_SOCKET),
            timeout_secs: DEFAULT_SPARSIFY_TIMEOUT_SECS,
            binary: "virt-sparsify".to_string(),
            backend: "direct".to_string(),
        }
    }
}

impl SparsifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| {
        ImportError::ConfigError(format!("{} must be a number of seconds, got '{}'", key, value))
    })
}
