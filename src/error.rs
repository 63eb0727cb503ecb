//! Error types for the token analyzer

use std::io;

use thiserror::Error;

use crate::client::ValidationError;

/// Result type alias for the token analyzer
pub type Result<T> = std::result::Result<T, Error>;

/// Token analyzer errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Form input rejected before any request was made
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The analysis API answered with a failure
    #[error("{message}")]
    Api {
        /// HTTP status returned by the API (or the worker in front of it)
        status: u16,
        /// Best-effort human readable message
        message: String,
    },

    /// The network request itself failed
    #[error("Network error: {0}")]
    Network(String),

    /// Precaching the install manifest failed
    #[error("Install failed for {url}: {reason}")]
    Install {
        /// Manifest URL that could not be cached
        url: String,
        /// Why it could not be cached
        reason: String,
    },

    /// Cache storage failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Illegal worker lifecycle transition
    #[error("Invalid worker transition from {from} to {to}")]
    InvalidTransition {
        /// State the worker was in
        from: &'static str,
        /// State that was requested
        to: &'static str,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an API error
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the failure happened before anything was sent
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Message suitable for the error banner
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Api { message, .. } => message.clone(),
            Self::Network(e) => format!("Unable to reach the analysis service: {e}"),
            Self::Http(e) => format!("Unable to reach the analysis service: {e}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_displays_message_only() {
        let err = Error::api(400, "Missing required parameter: csv_base64");
        assert_eq!(err.to_string(), "Missing required parameter: csv_base64");
        assert_eq!(err.user_message(), "Missing required parameter: csv_base64");
    }

    #[test]
    fn validation_is_transparent() {
        let err = Error::from(ValidationError::MissingFile);
        assert!(err.is_validation());
        assert_eq!(err.user_message(), "Please upload a CSV file");
    }
}
