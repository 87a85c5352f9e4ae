//! Error types for leadgen operations.
//!
//! This module defines [`LeadgenError`], the error type shared by the
//! library. Most pipeline stages absorb provider failures into neutral
//! results and never surface these; they are returned by configuration,
//! construction and spreadsheet persistence.
//!
//! # Example
//!
//! ```rust
//! use leadgen_core::{LeadgenError, Result};
//!
//! fn require_key(key: &str) -> Result<&str> {
//!     if key.is_empty() {
//!         return Err(LeadgenError::Config("SERPAPI_KEY is required".to_string()));
//!     }
//!     Ok(key)
//! }
//! ```

use thiserror::Error;

/// Main error type for leadgen operations.
#[derive(Error, Debug)]
pub enum LeadgenError {
    /// HTTP request errors from reqwest.
    ///
    /// Wraps network errors, DNS failures, TLS and connection problems.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Request timeout.
    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A remote API answered with a non-success status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// A response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Spreadsheet authentication failed.
    ///
    /// Returned when the service-account credentials cannot be turned into
    /// an access token.
    #[error("Google Sheets auth failed: {0}")]
    SheetsAuth(String),

    /// Spreadsheet read/write errors after authentication.
    #[error("Google Sheets error: {0}")]
    Sheets(String),
}

impl From<jsonwebtoken::errors::Error> for LeadgenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        LeadgenError::SheetsAuth(err.to_string())
    }
}

/// Result type alias for LeadgenError.
pub type Result<T> = std::result::Result<T, LeadgenError>;
