//! nbdkit argument vector construction.
//!
//! The vector always has the shape
//!
//! ```text
//! --foreground --readonly --exit-with-parent -U - --pidfile <pid> [runtime args...]
//! [--filter=F ...] <plugin> "<plugin args>" <source> --run "<qemu-img ...>"
//! ```
//!
//! nbdkit's grammar is positional after the plugin name, so the order of the
//! last five groups must not change.

use std::path::PathBuf;

use imgport_core::error::{ImportError, Result};

use super::export::ExportConfig;
use super::plugin::{NbdkitFilter, NbdkitPlugin};

/// Placeholder nbdkit substitutes with the NBD URI of the export.
pub const NBD_PLACEHOLDER: &str = "$nbd";

const RUN_FLAG: &str = "--run";
const FILTER_PREFIX: &str = "--filter=";

/// qemu-img sub-command embedded in the nbdkit run command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QemuImgCommand {
    /// `info --output=json`
    Info,
    /// `convert -p -O raw <dest> -t none`
    Convert { dest: PathBuf },
}

impl QemuImgCommand {
    pub fn subcommand(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Convert { .. } => "convert",
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Info => vec!["--output=json".to_string()],
            Self::Convert { dest } => vec![
                "-p".to_string(),
                "-O".to_string(),
                "raw".to_string(),
                dest.display().to_string(),
                "-t".to_string(),
                "none".to_string(),
            ],
        }
    }

    /// Shell command line nbdkit runs once the export is up. The placeholder
    /// is left unquoted so the shell expands it.
    pub fn embedded(&self, qemu_img: &str) -> String {
        format!(
            "{} {} {} {}",
            shell_words::quote(qemu_img),
            self.subcommand(),
            NBD_PLACEHOLDER,
            shell_words::join(self.args())
        )
    }
}

/// Flags every export runs with: foreground, read-only, tied to our
/// lifetime, anonymous socket, pid file.
fn base_args(config: &ExportConfig) -> Vec<String> {
    vec![
        "--foreground".to_string(),
        "--readonly".to_string(),
        "--exit-with-parent".to_string(),
        "-U".to_string(),
        "-".to_string(),
        "--pidfile".to_string(),
        config.pid_file().display().to_string(),
    ]
}

/// Build the nbdkit argument vector for `command`.
///
/// Fails only when the config has no source. No I/O happens here.
pub fn build_args(
    config: &ExportConfig,
    command: &QemuImgCommand,
    qemu_img: &str,
) -> Result<Vec<String>> {
    let source = config.rendered_source()?;

    let mut args = base_args(config);
    args.extend(config.runtime_args().iter().cloned());
    args.extend(
        config
            .filters()
            .iter()
            .map(|f| format!("{}{}", FILTER_PREFIX, f)),
    );
    args.push(config.plugin().to_string());
    args.push(config.joined_plugin_args());
    args.push(source);
    args.push(RUN_FLAG.to_string());
    args.push(command.embedded(qemu_img));
    Ok(args)
}

/// An nbdkit argument vector taken apart again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInvocation {
    pub pid_file: Option<String>,
    pub runtime_args: Vec<String>,
    pub filters: Vec<NbdkitFilter>,
    pub plugin: NbdkitPlugin,
    pub plugin_args: Vec<String>,
    pub source: String,
    pub run_command: Option<String>,
}

impl ParsedInvocation {
    /// Recover the export settings from an argument vector produced by
    /// [`build_args`]. Runtime arguments must be flag-style (start with `-`).
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut iter = args.iter();
        let mut pid_file = None;
        let mut runtime_args = Vec::new();
        let mut filters = Vec::new();

        let plugin = loop {
            let arg = iter.next().ok_or_else(|| {
                ImportError::Other("nbdkit arguments have no plugin".to_string())
            })?;
            match arg.as_str() {
                "--foreground" | "--readonly" | "--exit-with-parent" => {}
                "-U" => {
                    iter.next();
                }
                "--pidfile" => pid_file = iter.next().cloned(),
                a if a.starts_with(FILTER_PREFIX) => {
                    let filter = a[FILTER_PREFIX.len()..]
                        .parse()
                        .map_err(ImportError::Other)?;
                    filters.push(filter);
                }
                a if a.starts_with('-') => runtime_args.push(a.to_string()),
                a => break NbdkitPlugin::from(a),
            }
        };

        let plugin_args = iter
            .next()
            .map(|joined| joined.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let source = iter.next().cloned().unwrap_or_default();
        let run_command = match iter.next().map(String::as_str) {
            Some(RUN_FLAG) => iter.next().cloned(),
            _ => None,
        };

        Ok(Self {
            pid_file,
            runtime_args,
            filters,
            plugin,
            plugin_args,
            source,
            run_command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use url::Url;

    fn curl_config() -> ExportConfig {
        let mut config = ExportConfig::new_curl("/run/nbdkit.pid", Some(Path::new("/certs")));
        config.add_filter(NbdkitFilter::Xz);
        config.add_filter(NbdkitFilter::Tar);
        config.set_source(Url::parse("https://example.com/disk.img.tar.xz").unwrap());
        config
    }

    #[test]
    fn test_build_info_args_exact() {
        let args = build_args(&curl_config(), &QemuImgCommand::Info, "qemu-img").unwrap();
        assert_eq!(
            args,
            vec![
                "--foreground",
                "--readonly",
                "--exit-with-parent",
                "-U",
                "-",
                "--pidfile",
                "/run/nbdkit.pid",
                "-r",
                "--filter=xz",
                "--filter=tar",
                "curl",
                "--verbose cainfo=/certs/tls.crt",
                "url=https://example.com/disk.img.tar.xz",
                "--run",
                "qemu-img info $nbd --output=json",
            ]
        );
    }

    #[test]
    fn test_build_convert_embedded_command() {
        let command = QemuImgCommand::Convert {
            dest: PathBuf::from("/data/disk.img"),
        };
        let args = build_args(&curl_config(), &command, "qemu-img").unwrap();
        assert_eq!(
            args.last().unwrap(),
            "qemu-img convert $nbd -p -O raw /data/disk.img -t none"
        );
    }

    #[test]
    fn test_info_and_convert_differ_only_in_run_command() {
        let config = curl_config();
        let info = build_args(&config, &QemuImgCommand::Info, "qemu-img").unwrap();
        let convert = build_args(
            &config,
            &QemuImgCommand::Convert {
                dest: PathBuf::from("/data/disk.img"),
            },
            "qemu-img",
        )
        .unwrap();
        assert_eq!(info.len(), convert.len());
        assert_eq!(info[..info.len() - 1], convert[..convert.len() - 1]);
        assert_ne!(info.last(), convert.last());
    }

    #[test]
    fn test_build_without_source_fails() {
        let config = ExportConfig::new(NbdkitPlugin::Curl, "/run/nbdkit.pid");
        let err = build_args(&config, &QemuImgCommand::Info, "qemu-img").unwrap_err();
        assert!(matches!(err, ImportError::ConfigError(_)));
    }

    #[test]
    fn test_plugin_without_renderer_gets_empty_source() {
        let mut config = ExportConfig::new(NbdkitPlugin::Other("ssh".to_string()), "/p.pid");
        config.set_source(Url::parse("ssh://host/disk").unwrap());
        let args = build_args(&config, &QemuImgCommand::Info, "qemu-img").unwrap();
        let plugin_at = args.iter().position(|a| a == "ssh").unwrap();
        assert_eq!(args[plugin_at + 1], "");
        assert_eq!(args[plugin_at + 2], "");
        assert_eq!(args[plugin_at + 3], "--run");
    }

    #[test]
    fn test_destination_with_spaces_is_quoted() {
        let command = QemuImgCommand::Convert {
            dest: PathBuf::from("/data/my disk.img"),
        };
        assert_eq!(
            command.embedded("qemu-img"),
            "qemu-img convert $nbd -p -O raw '/data/my disk.img' -t none"
        );
    }

    #[test]
    fn test_parse_roundtrip_recovers_plugin_and_filters() {
        let config = curl_config();
        let args = build_args(&config, &QemuImgCommand::Info, "qemu-img").unwrap();
        let parsed = ParsedInvocation::parse(&args).unwrap();

        assert_eq!(&parsed.plugin, config.plugin());
        assert_eq!(parsed.filters, config.filters());
        assert_eq!(parsed.plugin_args, config.plugin_args());
        assert_eq!(parsed.runtime_args, config.runtime_args());
        assert_eq!(parsed.pid_file.as_deref(), Some("/run/nbdkit.pid"));
        assert_eq!(parsed.source, "url=https://example.com/disk.img.tar.xz");
        assert_eq!(
            parsed.run_command.as_deref(),
            Some("qemu-img info $nbd --output=json")
        );
    }

    #[test]
    fn test_parse_roundtrip_ignores_plugin_arg_whitespace() {
        let mut config = ExportConfig::new(NbdkitPlugin::Curl, "/p.pid");
        config.add_plugin_arg("--verbose");
        config.add_plugin_arg("cainfo=/certs/tls.crt");
        config.add_filter(NbdkitFilter::Gzip);
        config.add_filter(NbdkitFilter::Gzip);
        config.set_source(Url::parse("http://example.com/a.gz").unwrap());

        let args = build_args(&config, &QemuImgCommand::Info, "qemu-img").unwrap();
        let parsed = ParsedInvocation::parse(&args).unwrap();
        assert_eq!(parsed.filters, vec![NbdkitFilter::Gzip]);
        assert_eq!(parsed.plugin_args, vec!["--verbose", "cainfo=/certs/tls.crt"]);
    }

    #[test]
    fn test_parse_rejects_unknown_filter() {
        let args: Vec<String> = ["--filter=bzip2", "curl"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(ParsedInvocation::parse(&args).is_err());
    }

    #[test]
    fn test_parse_requires_plugin() {
        let args: Vec<String> = ["--foreground", "--readonly"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(ParsedInvocation::parse(&args).is_err());
    }
}
