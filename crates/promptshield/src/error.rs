//! Error types for promptshield.
//!
//! This module defines all error types used throughout the promptshield crate.
//! The filter entry points never return these directly: they are rendered into
//! the `errors` list of a [`FilterResult`](crate::filter::FilterResult) instead.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for promptshield operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Filter Errors ===
    /// The filter was handed something other than a string.
    #[error("input must be a string, got {found}")]
    InputType {
        /// JSON type name of the rejected value.
        found: &'static str,
    },

    /// Scanning failed unexpectedly.
    #[error("content filtering failed: {message}")]
    Processing {
        /// Description of what went wrong.
        message: String,
    },

    /// A phishing pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    // === Ingestion Errors ===
    /// An uploaded file could not be read.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Path of the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An uploaded file is empty.
    #[error("file is empty: {path}")]
    FileEmpty {
        /// Path of the file.
        path: PathBuf,
    },

    /// An uploaded file exceeds the byte limit.
    #[error("file {path} is {size} bytes, limit is {limit}")]
    FileTooLarge {
        /// Path of the file.
        path: PathBuf,
        /// Actual size in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// Extracted text exceeds the character limit.
    #[error("content of {path} is {chars} characters, limit is {limit}")]
    ContentTooLarge {
        /// Path of the file.
        path: PathBuf,
        /// Actual length in characters.
        chars: usize,
        /// Configured limit in characters.
        limit: usize,
    },

    /// An uploaded file is not valid UTF-8 text.
    #[error("file {path} is not valid UTF-8 text")]
    NotText {
        /// Path of the file.
        path: PathBuf,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for promptshield operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new processing error.
    #[must_use]
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Create an input type error for a JSON value.
    #[must_use]
    pub fn input_type(value: &serde_json::Value) -> Self {
        let found = match value {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Self::InputType { found }
    }

    /// Check if this error came from reading or validating an uploaded file.
    #[must_use]
    pub fn is_ingest_error(&self) -> bool {
        matches!(
            self,
            Self::FileRead { .. }
                | Self::FileEmpty { .. }
                | Self::FileTooLarge { .. }
                | Self::ContentTooLarge { .. }
                | Self::NotText { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::processing("bad offset");
        assert_eq!(err.to_string(), "content filtering failed: bad offset");
    }

    #[test]
    fn test_input_type_error() {
        let err = Error::input_type(&serde_json::Value::Null);
        assert!(matches!(err, Error::InputType { found: "null" }));
        assert_eq!(err.to_string(), "input must be a string, got null");

        let err = Error::input_type(&serde_json::json!([1, 2]));
        assert!(err.to_string().contains("array"));
        assert!(!Error::processing("x").is_ingest_error());
    }

    #[test]
    fn test_invalid_pattern_error_display() {
        let source = regex::Regex::new("[unclosed").unwrap_err();
        let err = Error::InvalidPattern {
            pattern: "[unclosed".to_string(),
            source,
        };
        assert!(err.to_string().contains("[unclosed"));
    }

    #[test]
    fn test_file_too_large_display() {
        let err = Error::FileTooLarge {
            path: PathBuf::from("/tmp/big.txt"),
            size: 20,
            limit: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/big.txt"));
        assert!(msg.contains("20 bytes"));
        assert!(err.is_ingest_error());
    }

    #[test]
    fn test_content_too_large_display() {
        let err = Error::ContentTooLarge {
            path: PathBuf::from("notes.md"),
            chars: 5,
            limit: 4,
        };
        assert!(err.to_string().contains("5 characters"));
        assert!(err.is_ingest_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
        assert!(!err.is_ingest_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "min_payload_length too small".to_string(),
        };
        assert!(err.to_string().contains("min_payload_length"));
    }
}
