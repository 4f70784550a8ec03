//! Error Types for Tool Backends

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolsError>;

#[derive(Error, Debug)]
pub enum ToolsError {
    #[error("Invalid cron expression \"{expression}\": {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Command failed to start: {0}")]
    Spawn(String),

    #[error("Command timed out after {0}s")]
    Timeout(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ToolsError> for agent_core::AgentError {
    fn from(err: ToolsError) -> Self {
        match err {
            ToolsError::InvalidInput(msg) => Self::ToolValidation(msg),
            other => Self::ToolExecution(other.to_string()),
        }
    }
}
