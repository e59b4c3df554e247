//! Error types for dictionary and configuration loading.
//!
//! Provides a unified error type covering I/O, JSON and YAML parsing, and
//! dictionary validation failures.

use rowbind_core::ValidationError;
use thiserror::Error;

/// Errors that can occur while loading dictionaries or configuration.
#[derive(Debug, Error)]
pub enum DictionaryError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The file extension is neither JSON nor YAML.
    #[error("unsupported dictionary file: {0}")]
    UnsupportedFormat(String),

    /// The dictionary failed validation.
    #[error("invalid dictionary: {}", format_validation(.0))]
    Invalid(Vec<ValidationError>),

    /// All configured loader sources failed.
    #[error("no dictionary sources available")]
    NoSourcesAvailable,
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias for results with [`DictionaryError`].
pub type Result<T> = std::result::Result<T, DictionaryError>;
