//! Info, Validate and ConvertToRawStream through an nbdkit export.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use imgport_core::config::ImporterConfig;
use imgport_core::error::{ImportError, Result};
use imgport_core::exec::{ExecOutput, ExecRequest, ProcessLimits};
use url::Url;

use super::{check_backing_file, check_capacity, parse_info, ImgInfo};
use crate::exec::ProcessExecutor;
use crate::metrics::ProgressMetric;
use crate::nbdkit::{build_args, ExportConfig, QemuImgCommand};
use crate::progress::ProgressReporter;

/// Runs qemu-img against an image exported by nbdkit.
///
/// Each call sets the source on the owned [`ExportConfig`], so one importer
/// serves one caller at a time. Nothing is retried.
pub struct NbdkitImporter {
    export: ExportConfig,
    executor: Arc<dyn ProcessExecutor>,
    reporter: ProgressReporter,
    nbdkit: String,
    qemu_img: String,
    limits: Option<ProcessLimits>,
    timeout: Option<Duration>,
}

impl NbdkitImporter {
    pub fn new(
        export: ExportConfig,
        executor: Arc<dyn ProcessExecutor>,
        reporter: ProgressReporter,
    ) -> Self {
        Self {
            export,
            executor,
            reporter,
            nbdkit: "nbdkit".to_string(),
            qemu_img: "qemu-img".to_string(),
            limits: None,
            timeout: None,
        }
    }

    /// Binaries, limits, timeout and progress owner taken from `config`.
    pub fn from_config(
        config: &ImporterConfig,
        export: ExportConfig,
        executor: Arc<dyn ProcessExecutor>,
        metric: Arc<ProgressMetric>,
    ) -> Self {
        let reporter = ProgressReporter::new(config.owner(), metric);
        Self::new(export, executor, reporter)
            .with_binaries(&config.nbdkit_binary, &config.qemu_img_binary)
            .with_limits(Some(config.limits))
            .with_timeout(config.exec_timeout())
    }

    pub fn with_binaries(mut self, nbdkit: &str, qemu_img: &str) -> Self {
        self.nbdkit = nbdkit.to_string();
        self.qemu_img = qemu_img.to_string();
        self
    }

    pub fn with_limits(mut self, limits: Option<ProcessLimits>) -> Self {
        self.limits = limits.filter(|l| !l.is_unlimited());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn export(&self) -> &ExportConfig {
        &self.export
    }

    pub fn export_mut(&mut self) -> &mut ExportConfig {
        &mut self.export
    }

    pub fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Format and sizes of the image at `url`.
    pub async fn info(&mut self, url: &Url) -> Result<ImgInfo> {
        tracing::info!(url = %url, "Querying image info");
        let output = self.run(url, QemuImgCommand::Info).await?;
        let info = parse_info(&output.stdout, url.as_str())?;
        tracing::debug!(
            url = %url,
            format = %info.format,
            virtual_size = info.virtual_size,
            actual_size = info.actual_size,
            "Image info"
        );
        Ok(info)
    }

    /// Check that the image at `url` has no backing file and fits in
    /// `available` bytes once `overhead` is reserved.
    pub async fn validate(&mut self, url: &Url, available: u64, overhead: f64) -> Result<ImgInfo> {
        let info = self.info(url).await?;
        check_backing_file(&info, url.as_str())?;
        check_capacity(&info, available, overhead, url.as_str())?;
        tracing::info!(
            url = %url,
            virtual_size = info.virtual_size,
            available,
            "Image validated"
        );
        Ok(info)
    }

    /// Convert the image at `url` to raw, writing `dest`. An existing `dest`
    /// is overwritten.
    pub async fn convert_to_raw_stream(&mut self, url: &Url, dest: &Path) -> Result<()> {
        tracing::info!(url = %url, dest = %dest.display(), "Converting image to raw");
        let command = QemuImgCommand::Convert {
            dest: dest.to_path_buf(),
        };
        self.run(url, command).await?;
        tracing::info!(url = %url, dest = %dest.display(), "Conversion complete");
        Ok(())
    }

    async fn run(&mut self, url: &Url, command: QemuImgCommand) -> Result<ExecOutput> {
        self.export.set_source(url.clone());
        let args = build_args(&self.export, &command, &self.qemu_img)?;
        let request = ExecRequest::new(self.nbdkit.clone(), args)
            .limits(self.limits)
            .timeout(self.timeout);

        let reporter = &self.reporter;
        let on_line = |line: &str| reporter.on_line(line);
        self.executor
            .run(&request, &on_line)
            .await
            .map_err(|e| attribute(e, &command, url))
    }
}

/// Name the image and qemu-img operation in process failures.
fn attribute(err: ImportError, command: &QemuImgCommand, url: &Url) -> ImportError {
    match err {
        ImportError::ProcessError {
            exit_code, output, ..
        } => ImportError::ProcessError {
            command: format!("qemu-img {} of {}", command.subcommand(), url),
            exit_code,
            output,
        },
        ImportError::DeadlineExceeded { timeout, .. } => ImportError::DeadlineExceeded {
            operation: format!("qemu-img {} of {}", command.subcommand(), url),
            timeout,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_names_source() {
        let url = Url::parse("http://example.com/disk.img").unwrap();
        let err = attribute(
            ImportError::ProcessError {
                command: "nbdkit".to_string(),
                exit_code: Some(1),
                output: "curl: 404".to_string(),
            },
            &QemuImgCommand::Info,
            &url,
        );
        assert_eq!(
            err.to_string(),
            "qemu-img info of http://example.com/disk.img failed (exit code 1): curl: 404"
        );
        assert_eq!(err.output(), Some("curl: 404"));
    }

    #[test]
    fn test_attribute_keeps_other_errors() {
        let url = Url::parse("http://example.com/disk.img").unwrap();
        let err = attribute(
            ImportError::ConfigError("bad".to_string()),
            &QemuImgCommand::Info,
            &url,
        );
        assert!(matches!(err, ImportError::ConfigError(_)));
    }
}
