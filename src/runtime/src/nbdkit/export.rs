//! Per-invocation nbdkit export configuration.

use std::path::{Path, PathBuf};

use imgport_core::error::{ImportError, Result};
use url::Url;

use super::plugin::{NbdkitFilter, NbdkitPlugin, RenderSource, SourceRenderers};

/// Everything needed to export one image through nbdkit.
///
/// Owned by a single caller; `add_filter` and `set_source` are the only
/// mutations and there is no internal synchronisation.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pid_file: PathBuf,
    plugin: NbdkitPlugin,
    runtime_args: Vec<String>,
    plugin_args: Vec<String>,
    filters: Vec<NbdkitFilter>,
    source: Option<Url>,
    renderers: SourceRenderers,
}

impl ExportConfig {
    pub fn new(plugin: NbdkitPlugin, pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
            plugin,
            runtime_args: Vec::new(),
            plugin_args: Vec::new(),
            filters: Vec::new(),
            source: None,
            renderers: SourceRenderers::default(),
        }
    }

    /// Curl export: read-only hint for nbdkit, a verbose plugin and, when a
    /// certificate directory is given, `cainfo=<dir>/tls.crt`.
    pub fn new_curl(pid_file: impl Into<PathBuf>, cert_dir: Option<&Path>) -> Self {
        let mut config = Self::new(NbdkitPlugin::Curl, pid_file);
        config.runtime_args.push("-r".to_string());
        config.plugin_args.push("--verbose".to_string());
        if let Some(dir) = cert_dir {
            config
                .plugin_args
                .push(format!("cainfo={}", dir.join("tls.crt").display()));
        }
        config
    }

    /// Add a filter unless it is already present. Order of first insertion
    /// is kept.
    pub fn add_filter(&mut self, filter: NbdkitFilter) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    pub fn with_filter(mut self, filter: NbdkitFilter) -> Self {
        self.add_filter(filter);
        self
    }

    pub fn add_runtime_arg(&mut self, arg: impl Into<String>) {
        self.runtime_args.push(arg.into());
    }

    pub fn add_plugin_arg(&mut self, arg: impl Into<String>) {
        self.plugin_args.push(arg.into());
    }

    /// Register a source renderer for a plugin kind this config may use.
    pub fn with_renderer(mut self, plugin: NbdkitPlugin, render: RenderSource) -> Self {
        self.renderers.register(plugin, render);
        self
    }

    pub fn set_source(&mut self, source: Url) {
        self.source = Some(source);
    }

    pub fn source(&self) -> Option<&Url> {
        self.source.as_ref()
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    pub fn plugin(&self) -> &NbdkitPlugin {
        &self.plugin
    }

    pub fn filters(&self) -> &[NbdkitFilter] {
        &self.filters
    }

    pub fn runtime_args(&self) -> &[String] {
        &self.runtime_args
    }

    pub fn plugin_args(&self) -> &[String] {
        &self.plugin_args
    }

    /// Plugin arguments as the single token nbdkit receives.
    pub fn joined_plugin_args(&self) -> String {
        self.plugin_args.join(" ")
    }

    /// The plugin's source token; fails when no source has been set.
    pub fn rendered_source(&self) -> Result<String> {
        let source = self.source.as_ref().ok_or_else(|| {
            ImportError::ConfigError(format!(
                "no source set for the {} export",
                self.plugin
            ))
        })?;
        Ok(self.renderers.render(&self.plugin, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_filter_dedups_in_first_insertion_order() {
        let mut config = ExportConfig::new(NbdkitPlugin::Curl, "/tmp/nbdkit.pid");
        config.add_filter(NbdkitFilter::Tar);
        config.add_filter(NbdkitFilter::Xz);
        config.add_filter(NbdkitFilter::Tar);
        config.add_filter(NbdkitFilter::Gzip);
        config.add_filter(NbdkitFilter::Xz);
        assert_eq!(
            config.filters(),
            &[NbdkitFilter::Tar, NbdkitFilter::Xz, NbdkitFilter::Gzip]
        );
    }

    #[test]
    fn test_new_curl_without_certs() {
        let config = ExportConfig::new_curl("/tmp/nbdkit.pid", None);
        assert_eq!(config.plugin(), &NbdkitPlugin::Curl);
        assert_eq!(config.runtime_args(), &["-r".to_string()]);
        assert_eq!(config.plugin_args(), &["--verbose".to_string()]);
        assert_eq!(config.joined_plugin_args(), "--verbose");
    }

    #[test]
    fn test_new_curl_with_cert_dir() {
        let config = ExportConfig::new_curl("/tmp/nbdkit.pid", Some(Path::new("/certs")));
        assert_eq!(
            config.plugin_args(),
            &["--verbose".to_string(), "cainfo=/certs/tls.crt".to_string()]
        );
        assert_eq!(config.joined_plugin_args(), "--verbose cainfo=/certs/tls.crt");
    }

    #[test]
    fn test_joined_plugin_args() {
        let mut config = ExportConfig::new(NbdkitPlugin::Curl, "/tmp/nbdkit.pid");
        config.add_plugin_arg("--verbose");
        config.add_plugin_arg("cainfo=/certs/tls.crt");
        assert_eq!(config.joined_plugin_args(), "--verbose cainfo=/certs/tls.crt");
    }

    #[test]
    fn test_rendered_source_requires_source() {
        let config = ExportConfig::new(NbdkitPlugin::Curl, "/tmp/nbdkit.pid");
        let err = config.rendered_source().unwrap_err();
        assert!(matches!(err, ImportError::ConfigError(_)));
    }

    #[test]
    fn test_rendered_source_curl() {
        let mut config = ExportConfig::new(NbdkitPlugin::Curl, "/tmp/nbdkit.pid");
        config.set_source(Url::parse("http://10.0.0.1:8080/disk.img").unwrap());
        assert_eq!(
            config.rendered_source().unwrap(),
            "url=http://10.0.0.1:8080/disk.img"
        );
    }

    #[test]
    fn test_custom_renderer() {
        fn render_ssh(url: &Url) -> String {
            format!("host={} path={}", url.host_str().unwrap_or_default(), url.path())
        }

        let plugin = NbdkitPlugin::Other("ssh".to_string());
        let mut config =
            ExportConfig::new(plugin.clone(), "/tmp/nbdkit.pid").with_renderer(plugin, render_ssh);
        config.set_source(Url::parse("ssh://builder/var/disk.img").unwrap());
        assert_eq!(
            config.rendered_source().unwrap(),
            "host=builder path=/var/disk.img"
        );
    }
}
