//! Error types for picgrab operations.
//!
//! This module defines the main error type [`PicgrabError`]. Most resolution
//! failures never reach callers as errors: [`crate::Resolver::resolve`] turns
//! them into an empty result and logs the reason. The variants here surface
//! from the lower level building blocks (fetching, parsing, configuration
//! loading and saving images) that do propagate failures.
//!
//! # Example
//!
//! ```rust
//! use picgrab_core::{PicgrabError, Result};
//!
//! fn require_markup(html: &str) -> Result<&str> {
//!     if html.is_empty() {
//!         return Err(PicgrabError::HtmlParseError("empty markup".to_string()));
//!     }
//!     Ok(html)
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for picgrab operations.
#[derive(Error, Debug)]
pub enum PicgrabError {
    /// HTTP request errors from reqwest.
    ///
    /// This variant wraps network errors, DNS failures, connection issues,
    /// and other HTTP-related problems.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Request timeout.
    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// The server answered with a non-success status code.
    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTML parsing errors.
    ///
    /// Returned when markup is empty or contains structural errors outside
    /// the tolerated set (unopened, unclosed and needless end tags).
    #[error("Failed to parse HTML: {0}")]
    HtmlParseError(String),

    /// A CSS selector could not be parsed.
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// Domain configuration errors.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A host or path pattern of a domain failed to compile.
    #[error("Invalid pattern {pattern:?} in domain {domain}: {source}")]
    InvalidPattern {
        domain: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Configuration JSON could not be read.
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// File system errors while reading configuration or saving images.
    #[error("File I/O failed: {0}")]
    WriteError(#[from] std::io::Error),

    /// The HTTP collaborator returned nothing for a URL.
    #[error("Nothing could be fetched from {0}")]
    FetchFailed(String),
}

/// Result type alias for PicgrabError.
pub type Result<T> = std::result::Result<T, PicgrabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PicgrabError::InvalidUrl("not a url".to_string());
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_http_status_error() {
        let err = PicgrabError::HttpStatus { status: 404, url: "https://example.com/x".to_string() };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("https://example.com/x"));
    }

    #[test]
    fn test_invalid_pattern_error() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let err = PicgrabError::InvalidPattern {
            domain: "xkcd.com".to_string(),
            pattern: "(unclosed".to_string(),
            source,
        };
        assert!(err.to_string().contains("xkcd.com"));
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_timeout_error() {
        let err = PicgrabError::Timeout { timeout: 30 };
        assert!(err.to_string().contains("30"));
    }
}
