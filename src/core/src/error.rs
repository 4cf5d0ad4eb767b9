use std::time::Duration;

use thiserror::Error;

/// imgport error types
#[derive(Error, Debug)]
pub enum ImportError {
    /// Dialing the sparsify sidecar failed
    #[error("Unable to connect to {endpoint}: {message}")]
    ConnectionError { endpoint: String, message: String },

    /// A subprocess exited unsuccessfully or could not be started
    #[error("{command} failed ({}): {output}", describe_exit(.exit_code))]
    ProcessError {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// Structured tool output could not be parsed
    #[error("Invalid json for image {image}: {message}")]
    ParseError {
        image: String,
        message: String,
        output: String,
    },

    /// Image does not satisfy import constraints
    #[error("Image {image} is invalid: {message}")]
    ValidationError { image: String, message: String },

    /// Operation exceeded its deadline
    #[error("Deadline exceeded: {operation} did not finish within {timeout:?}")]
    DeadlineExceeded { operation: String, timeout: Duration },

    /// Sparsify RPC rejected by the sidecar
    #[error("Unable to sparsify the image {path}: {status}")]
    RpcError { path: String, status: tonic::Status },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ImportError {
    /// Tool output captured alongside the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            ImportError::ProcessError { output, .. } | ImportError::ParseError { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, ImportError::DeadlineExceeded { .. })
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ImportError {
    fn from(err: serde_yaml::Error) -> Self {
        ImportError::SerializationError(err.to_string())
    }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

/// Result type alias for imgport operations
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let error = ImportError::ConnectionError {
            endpoint: "unix:///run/sparsify.sock".to_string(),
            message: "No such file or directory".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unable to connect to unix:///run/sparsify.sock: No such file or directory"
        );
    }

    #[test]
    fn test_process_error_display_and_output() {
        let error = ImportError::ProcessError {
            command: "nbdkit".to_string(),
            exit_code: Some(1),
            output: "curl: 404 Not Found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "nbdkit failed (exit code 1): curl: 404 Not Found"
        );
        assert_eq!(error.output(), Some("curl: 404 Not Found"));
    }

    #[test]
    fn test_process_error_without_exit_code() {
        let error = ImportError::ProcessError {
            command: "nbdkit".to_string(),
            exit_code: None,
            output: "failed to spawn: No such file or directory".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "nbdkit failed (no exit code): failed to spawn: No such file or directory"
        );
    }

    #[test]
    fn test_parse_error_keeps_raw_output() {
        let error = ImportError::ParseError {
            image: "http://example.com/disk.img".to_string(),
            message: "EOF while parsing an object".to_string(),
            output: "{\"format\":".to_string(),
        };
        assert!(error.to_string().contains("http://example.com/disk.img"));
        assert_eq!(error.output(), Some("{\"format\":"));
    }

    #[test]
    fn test_validation_error_display() {
        let error = ImportError::ValidationError {
            image: "http://example.com/disk.img".to_string(),
            message: "too large".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Image http://example.com/disk.img is invalid: too large"
        );
        assert!(error.output().is_none());
    }

    #[test]
    fn test_deadline_exceeded_is_distinct() {
        let error = ImportError::DeadlineExceeded {
            operation: "sparsify".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert!(error.is_deadline_exceeded());
        assert_eq!(
            error.to_string(),
            "Deadline exceeded: sparsify did not finish within 10s"
        );

        let rejected = ImportError::RpcError {
            path: "/data/disk.img".to_string(),
            status: tonic::Status::internal("boom"),
        };
        assert!(!rejected.is_deadline_exceeded());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ImportError = io_error.into();
        assert!(matches!(error, ImportError::IoError(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let error: ImportError = result.unwrap_err().into();
        assert!(matches!(error, ImportError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: ImportError = result.unwrap_err().into();
        assert!(matches!(error, ImportError::SerializationError(_)));
    }

    #[test]
    fn test_config_error_display() {
        let error = ImportError::ConfigError("no source set".to_string());
        assert_eq!(error.to_string(), "Configuration error: no source set");
    }
}
