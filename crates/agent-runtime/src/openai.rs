//! OpenAI-compatible LLM Provider
//!
//! Implementation of `LlmProvider` for any `/chat/completions` endpoint with
//! native function calling (SiliconFlow, DeepSeek, OpenAI, vLLM, ...).

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role, ToolCallRequest},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, ModelInfo, TokenUsage},
    tool::ToolSchema,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API base URL, without the `/chat/completions` suffix
    pub base_url: String,

    /// Bearer token
    pub api_key: String,

    /// Default model
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.siliconflow.cn/v1".into(),
            api_key: String::new(),
            model: "deepseek-ai/DeepSeek-V3".into(),
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    /// Read `LLM_API_KEY`, `LLM_BASE_URL`, `LLM_MODEL` and `LLM_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let api_key = lookup("LLM_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AgentError::Config("LLM_API_KEY is not set".into()))?;

        Ok(Self {
            base_url: lookup("LLM_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key,
            model: lookup("LLM_MODEL").unwrap_or(defaults.model),
            timeout_secs: lookup("LLM_TIMEOUT_SECS")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        })
    }
}

// Wire format

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireMessage {
    #[serde(default)]
    role: String,
    content: Option<String>,
    /// Some servers send `null` here instead of omitting the field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireFunction {
    name: String,
    /// A JSON string per the API, though some servers send an object
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<WireMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    owned_by: Option<String>,
}

/// OpenAI-compatible LLM provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env()?)
    }

    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url)
    }

    /// Convert agent messages to the wire format
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| {
                let tool_calls: Vec<WireToolCall> = m
                    .tool_calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: Some(c.id.clone()),
                        kind: function_type(),
                        function: WireFunction {
                            name: c.name.clone(),
                            arguments: Value::String(c.arguments.clone()),
                        },
                    })
                    .collect();
                let content = if m.content.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(m.content.clone())
                };
                WireMessage {
                    role: m.role.to_string(),
                    content,
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: if m.role == Role::Tool {
                        m.tool_call_id.clone()
                    } else {
                        None
                    },
                }
            })
            .collect()
    }

    /// Convert a response body into a completion
    fn convert_response(response: ChatResponse, requested_model: &str) -> Completion {
        let model = if response.model.is_empty() {
            requested_model.to_string()
        } else {
            response.model
        };
        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let Some(choice) = response.choices.into_iter().next() else {
            return Completion {
                message: None,
                model,
                usage,
                finish_reason: None,
            };
        };

        let finish_reason = choice.finish_reason.as_deref().map(FinishReason::parse);
        let message = choice.message.map(|wire| {
            let calls = wire
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|c| {
                    let id = c
                        .id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                    let arguments = match c.function.arguments {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    ToolCallRequest::new(id, c.function.name, arguments)
                })
                .collect();
            Message::assistant_with_tool_calls(wire.content.unwrap_or_default(), calls)
        });

        Completion {
            message,
            model,
            usage,
            finish_reason,
        }
    }

    fn map_status(status: StatusCode, body: &str) -> AgentError {
        let snippet: String = body.chars().take(300).collect();
        let detail = format!("HTTP {}: {snippet}", status.as_u16());
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
            StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(detail),
            s if s.is_server_error() => AgentError::ProviderUnavailable(detail),
            _ => AgentError::Provider(detail),
        }
    }

    fn map_transport(err: &reqwest::Error) -> AgentError {
        if err.is_timeout() || err.is_connect() {
            AgentError::ProviderUnavailable(err.to_string())
        } else {
            AgentError::Provider(err.to_string())
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Provider health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let model = if options.model.is_empty() {
            self.config.model.as_str()
        } else {
            options.model.as_str()
        };
        let request = ChatRequest {
            model,
            messages: Self::convert_messages(messages),
            tools: tools.iter().map(ToolSchema::to_function_json).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        tracing::debug!(model, messages = messages.len(), tools = tools.len(), "POST chat/completions");
        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::map_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("invalid response body: {e}")))?;

        let completion = Self::convert_response(body, model);
        if let Some(usage) = &completion.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion usage"
            );
        }
        Ok(completion)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(self.url("models"))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| Self::map_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &body));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("invalid model list: {e}")))?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                owned_by: m.owned_by,
            })
            .collect())
    }
}
