//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limited by the provider
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A tool argument was missing or had the wrong type
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Skill loading failed
    #[error("Skill error: {0}")]
    Skill(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Whether the error came from the model call itself.
    pub const fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Auth(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => {
                format!("The AI service encountered an error: {msg}. Please try again later.")
            }
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again later.".into()
            }
            Self::RateLimited(_) => "Too many requests to the AI service. Please wait a moment.".into(),
            Self::Auth(_) => "The AI service rejected our credentials. Please contact the operator.".into(),
            Self::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_family() {
        assert!(AgentError::Auth("bad key".into()).is_provider_error());
        assert!(AgentError::RateLimited("slow down".into()).is_provider_error());
        assert!(!AgentError::ToolExecution("boom".into()).is_provider_error());
    }

    #[test]
    fn test_user_message_is_plain_text() {
        let msg = AgentError::Provider("HTTP 500".into()).user_message();
        assert!(msg.contains("HTTP 500"));
        assert!(!msg.contains("Provider error"));
    }
}
