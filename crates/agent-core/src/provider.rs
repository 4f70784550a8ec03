//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for tool-calling chat backends so the agent
//! loop never depends on a specific vendor API.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{GenerationOptions, LlmProvider};
//!
//! let provider = OpenAiProvider::from_env()?;
//! let completion = provider.complete(&messages, &tool_schemas, &options).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;
use crate::tool::ToolSchema;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "deepseek-ai/DeepSeek-V3")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

const fn default_temperature() -> f32 {
    0.7
}
const fn default_max_tokens() -> u32 {
    4096
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "deepseek-ai/DeepSeek-V3".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The assistant turn of the first choice, `None` when the provider
    /// returned no usable choice
    pub message: Option<Message>,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    /// Whether the model asked for tools, either by finish reason or by
    /// carrying a non-empty tool call list.
    pub fn requests_tools(&self) -> bool {
        self.finish_reason == Some(FinishReason::ToolUse)
            || self.message.as_ref().is_some_and(Message::has_tool_calls)
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

impl FinishReason {
    /// Map an OpenAI-style finish reason string
    pub fn parse(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" | "function_call" | "tool_use" => Self::ToolUse,
            "content_filter" => Self::ContentFilter,
            _ => Self::Error,
        }
    }
}

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub owned_by: Option<String>,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion from the transcript and tool catalogue
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCallRequest;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 4096);
    }

    #[test]
    fn test_requests_tools() {
        let mut completion = Completion {
            message: Some(Message::assistant("hi")),
            model: "m".into(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        };
        assert!(!completion.requests_tools());

        completion.finish_reason = Some(FinishReason::parse("tool_calls"));
        assert!(completion.requests_tools());

        completion.finish_reason = None;
        completion.message = Some(Message::assistant_with_tool_calls(
            "",
            vec![ToolCallRequest::new("c1", "echo", "{}")],
        ));
        assert!(completion.requests_tools());
    }
}
