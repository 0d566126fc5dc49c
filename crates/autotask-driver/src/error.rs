/*
[INPUT]:  Error sources (HTTP transport, WebDriver protocol, scripted sessions)
[OUTPUT]: Structured driver error type shared by every session implementation
[POS]:    Error handling layer - unified error type for the driver crate
[UPDATE]: When adding new session backends or WebDriver error codes
*/

use thiserror::Error;

/// Main error type for UI driver sessions
#[derive(Error, Debug)]
pub enum DriverError {
    /// HTTP request to the automation endpoint failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The WebDriver endpoint answered with a protocol error
    #[error("WebDriver error ({error}): {message}")]
    WebDriver { error: String, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid response from the endpoint
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Requested window handle does not exist
    #[error("No such window: {0}")]
    NoSuchWindow(String),

    /// Session was already closed
    #[error("Session already closed")]
    SessionClosed,
}

impl DriverError {
    /// WebDriver error code for a missing element
    pub const NO_SUCH_ELEMENT: &'static str = "no such element";

    /// Check if the error means the element is simply not there (yet)
    pub fn is_no_such_element(&self) -> bool {
        matches!(self, DriverError::WebDriver { error, .. } if error == Self::NO_SUCH_ELEMENT)
    }

    /// Check if the error is transient and a retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DriverError::Http(err) => err.is_timeout() || err.is_connect(),
            DriverError::WebDriver { error, .. } => {
                error == Self::NO_SUCH_ELEMENT || error == "stale element reference"
            }
            _ => false,
        }
    }
}

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;
