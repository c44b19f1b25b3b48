//! Error handling for audioprep
//!
//! Every error aborts the pipeline application that raised it. Nothing is
//! retried; the suggestions below are hints for the person running the tool.

use thiserror::Error;

/// Result type alias for audioprep operations
pub type Result<T> = std::result::Result<T, AudioPrepError>;

/// Main error type for audioprep operations
#[derive(Error, Debug)]
pub enum AudioPrepError {
    // Input Errors
    #[error("Failed to decode {path}: {reason}")]
    Decode {
        path: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Transform Errors
    #[error("{transform}: input does not match configuration: {reason}")]
    ConfigMismatch { transform: String, reason: String },

    #[error("{transform}: invalid parameter: {reason}")]
    InvalidParameter { transform: String, reason: String },

    // Buffer Errors
    #[error("Shape mismatch: expected {expected:?} (channels, frames), got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid buffer: {reason}")]
    InvalidBuffer { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AudioPrepError {
    /// Shorthand for a [`AudioPrepError::ConfigMismatch`]
    pub fn config_mismatch(transform: &str, reason: impl Into<String>) -> Self {
        AudioPrepError::ConfigMismatch {
            transform: transform.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`AudioPrepError::InvalidParameter`]
    pub fn invalid_parameter(transform: &str, reason: impl Into<String>) -> Self {
        AudioPrepError::InvalidParameter {
            transform: transform.to_string(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            AudioPrepError::Decode { .. } => "DECODE_ERROR",
            AudioPrepError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            AudioPrepError::ConfigMismatch { .. } => "CONFIG_MISMATCH",
            AudioPrepError::InvalidParameter { .. } => "INVALID_PARAMETER",
            AudioPrepError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            AudioPrepError::InvalidBuffer { .. } => "INVALID_BUFFER",
            AudioPrepError::Io(_) => "IO_ERROR",
            AudioPrepError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            AudioPrepError::Decode { .. } => vec![
                "Check the file path is correct",
                "Check if the file plays in another application",
                "Convert the file to PCM WAV first",
            ],
            AudioPrepError::UnsupportedFormat { .. } => vec![
                "Supported formats: 8/16/24/32-bit PCM WAV, 32-bit float WAV",
            ],
            AudioPrepError::ConfigMismatch { .. } => vec![
                "Use channel_permute to switch between frames-first and channels-first",
                "Downmix or select a single channel before resampling",
                "Check the configured sample rate against the input",
            ],
            AudioPrepError::ShapeMismatch { .. } => vec![
                "Compare buffers produced from the same source",
            ],
            _ => vec![],
        }
    }
}
