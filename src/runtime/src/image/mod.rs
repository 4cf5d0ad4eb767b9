//! Image introspection and conversion.
//!
//! All format parsing happens in qemu-img behind an nbdkit export; this
//! module only reads qemu-img's JSON report and applies import checks to it.

mod importer;

pub use importer::NbdkitImporter;

use imgport_core::error::{ImportError, Result};
use serde::{Deserialize, Serialize};

/// Image metadata as reported by `qemu-img info --output=json`.
///
/// Unknown fields in the report are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImgInfo {
    /// Image format (`raw`, `qcow2`, ...)
    pub format: String,
    /// Size of the disk as seen by a guest
    #[serde(rename = "virtual-size")]
    pub virtual_size: u64,
    /// Bytes the image occupies in its container
    #[serde(rename = "actual-size", default)]
    pub actual_size: u64,
    /// Backing file reference, for images layered on another
    #[serde(
        rename = "backing-filename",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub backing_file: Option<String>,
}

/// Parse qemu-img's JSON report for `image`.
pub fn parse_info(stdout: &[u8], image: &str) -> Result<ImgInfo> {
    serde_json::from_slice(stdout).map_err(|e| ImportError::ParseError {
        image: image.to_string(),
        message: e.to_string(),
        output: String::from_utf8_lossy(stdout).into_owned(),
    })
}

/// Reject images that depend on a backing file.
pub fn check_backing_file(info: &ImgInfo, image: &str) -> Result<()> {
    match info.backing_file.as_deref() {
        Some(backing) if !backing.is_empty() => Err(ImportError::ValidationError {
            image: image.to_string(),
            message: format!("image has a backing file: {}", backing),
        }),
        _ => Ok(()),
    }
}

/// Check that the image fits in `available` bytes after reserving the
/// `overhead` fraction for the filesystem.
///
/// `overhead` must be in `[0, 1)`. The usable size is rounded down.
pub fn check_capacity(info: &ImgInfo, available: u64, overhead: f64, image: &str) -> Result<()> {
    if !(0.0..1.0).contains(&overhead) {
        return Err(ImportError::ConfigError(format!(
            "filesystem overhead must be in [0, 1), got {}",
            overhead
        )));
    }

    let usable = (available as f64 * (1.0 - overhead)) as u64;
    if usable < info.virtual_size {
        return Err(ImportError::ValidationError {
            image: image.to_string(),
            message: format!(
                "virtual size {} is larger than the available storage {} ({} with {:.1}% filesystem overhead)",
                info.virtual_size,
                available,
                usable,
                overhead * 100.0
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn info(virtual_size: u64) -> ImgInfo {
        ImgInfo {
            format: "qcow2".to_string(),
            virtual_size,
            actual_size: 0,
            backing_file: None,
        }
    }

    #[test]
    fn test_parse_minimal_report() {
        let parsed = parse_info(br#"{"format":"qcow2","virtual-size":1073741824}"#, "img").unwrap();
        assert_eq!(parsed.format, "qcow2");
        assert_eq!(parsed.virtual_size, GIB);
        assert_eq!(parsed.actual_size, 0);
        assert_eq!(parsed.backing_file, None);
    }

    #[test]
    fn test_parse_full_report_ignores_unknown_fields() {
        let report = br#"{
            "virtual-size": 2147483648,
            "filename": "nbd+unix://?socket=/tmp/sock",
            "cluster-size": 65536,
            "format": "qcow2",
            "actual-size": 200704,
            "backing-filename": "base.qcow2",
            "format-specific": {"type": "qcow2", "data": {"compat": "1.1"}},
            "dirty-flag": false
        }"#;
        let parsed = parse_info(report, "img").unwrap();
        assert_eq!(parsed.virtual_size, 2 * GIB);
        assert_eq!(parsed.actual_size, 200704);
        assert_eq!(parsed.backing_file.as_deref(), Some("base.qcow2"));
    }

    #[test]
    fn test_parse_truncated_json() {
        let raw = br#"{"format":"qcow2","virtual-si"#;
        let err = parse_info(raw, "http://example.com/disk.qcow2").unwrap_err();
        match &err {
            ImportError::ParseError { image, output, .. } => {
                assert_eq!(image, "http://example.com/disk.qcow2");
                assert_eq!(output.as_bytes(), raw);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("http://example.com/disk.qcow2"));
    }

    #[test]
    fn test_backing_file_rejected() {
        let mut with_backing = info(GIB);
        with_backing.backing_file = Some("base.qcow2".to_string());
        let err = check_backing_file(&with_backing, "img").unwrap_err();
        assert!(matches!(err, ImportError::ValidationError { .. }));
        assert!(err.to_string().contains("base.qcow2"));

        assert!(check_backing_file(&info(GIB), "img").is_ok());
    }

    #[test]
    fn test_capacity_fits() {
        assert!(check_capacity(&info(GIB), GIB, 0.0, "img").is_ok());
        assert!(check_capacity(&info(GIB), 2 * GIB, 0.055, "img").is_ok());
    }

    #[test]
    fn test_capacity_overhead_reserved() {
        let err = check_capacity(&info(GIB), GIB, 0.055, "http://example.com/a.img").unwrap_err();
        match err {
            ImportError::ValidationError { image, message } => {
                assert_eq!(image, "http://example.com/a.img");
                assert!(message.contains("1073741824"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_capacity_too_small() {
        assert!(check_capacity(&info(2 * GIB), GIB, 0.0, "img").is_err());
    }

    #[test]
    fn test_capacity_rejects_bad_overhead() {
        for overhead in [-0.1, 1.0, 1.5, f64::NAN] {
            let err = check_capacity(&info(1), GIB, overhead, "img").unwrap_err();
            assert!(matches!(err, ImportError::ConfigError(_)));
        }
    }
}
