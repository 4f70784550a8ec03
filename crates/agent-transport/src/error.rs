//! Transport Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, TransportError>;

/// Delivery and webhook errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    Signature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    Parse(String),

    /// Could not reach the push endpoint
    #[error("Push request failed: {0}")]
    Http(String),

    /// Push endpoint rejected the message
    #[error("Push endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

