//! Operator-friendly error types with suggestions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes attached to every [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DeviceNotFound,
    TransportFailed,
    InvalidOutput,
    InvalidInput,
    CacheError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::DeviceNotFound => write!(f, "DEVICE_NOT_FOUND"),
            ErrorCode::TransportFailed => write!(f, "TRANSPORT_FAILED"),
            ErrorCode::InvalidOutput => write!(f, "INVALID_OUTPUT"),
            ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
            ErrorCode::CacheError => write!(f, "CACHE_ERROR"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// An error with a hint for whoever is watching the farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn device_not_found(device: &str) -> Self {
        Self {
            code: ErrorCode::DeviceNotFound,
            message: format!("Device '{}' is not attached", device),
            suggestion: Some("Run 'dialfarm devices' to see attached devices".into()),
        }
    }

    /// A device command failed to run or exited unsuccessfully.
    pub fn transport_failed(command: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let message = if detail.trim().is_empty() {
            format!("Command '{}' failed", command)
        } else {
            format!("Command '{}' failed: {}", command, detail.trim())
        };
        Self {
            code: ErrorCode::TransportFailed,
            message,
            suggestion: Some(
                "Check the USB connection and that the device authorized this host".into(),
            ),
        }
    }

    /// A command ran but its output could not be interpreted.
    pub fn invalid_output(what: &str, output: &str) -> Self {
        let shown: String = output.trim().chars().take(120).collect();
        Self {
            code: ErrorCode::InvalidOutput,
            message: format!("Could not parse {} from '{}'", what, shown),
            suggestion: Some(
                "The device may be mid-boot; it will be retried after the cooldown".into(),
            ),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            suggestion: Some("Check the command syntax and try again".into()),
        }
    }

    /// Create an invalid input error with a custom suggestion.
    pub fn invalid_input_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// A coordinate cache file could not be read, parsed or written.
    pub fn cache(path: &str, detail: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::CacheError,
            message: format!("Coordinate cache '{}': {}", path, detail.into()),
            suggestion: Some(
                "Run 'dialfarm cache clear' to force a fresh resolution on next use".into(),
            ),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: message.into(),
            suggestion: Some("This is an internal error. Please report it if it persists.".into()),
        }
    }
}
