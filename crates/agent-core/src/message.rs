//! Conversation Messages
//!
//! Transcript format shared by the session store, the agent loop and the
//! provider adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result, correlated to a request by `tool_call_id`
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is the raw payload exactly as the provider sent it; parsing
/// happens at dispatch time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call identifier, unique within one assistant turn
    pub id: String,

    /// Name of the requested tool
    pub name: String,

    /// Serialized argument object
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content (empty when an assistant turn only carries tool calls)
    #[serde(default)]
    pub content: String,

    /// Tool calls requested by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Correlation id, present only on tool-result turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Optional name (tool name on tool-result turns)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message that requests tool calls
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Add a name to the message
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

}

/// Ordered transcript with round-aware trimming.
///
/// A round starts at a user turn and runs up to (not including) the next
/// user turn. Turns before the first user turn form the preamble, which is
/// where the system turn lives.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.push(Message::system(prompt));
        conv
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Install `system` as the first turn, replacing an existing system turn
    /// in place rather than adding a second one.
    pub fn set_system(&mut self, system: Message) {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => *first = system,
            _ => self.messages.insert(0, system),
        }
    }

    /// Indices of the user turns that open each round.
    pub fn round_starts(&self) -> Vec<usize> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::User)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of rounds in the transcript
    pub fn rounds(&self) -> usize {
        self.round_starts().len()
    }

    /// Drop whole rounds from the front until at most `max_rounds` remain and
    /// the transcript fits in `max_turns`. The newest round is never dropped
    /// and the first system turn is kept at index 0.
    ///
    /// Returns the number of turns removed.
    pub fn trim_rounds(&mut self, max_rounds: usize, max_turns: usize) -> usize {
        let starts = self.round_starts();
        if starts.is_empty() {
            return 0;
        }

        let system = self
            .messages
            .first()
            .filter(|m| m.role == Role::System)
            .cloned();
        let preamble_len = usize::from(system.is_some());

        // Index into `starts` of the oldest round we keep.
        let mut keep_from = starts.len().saturating_sub(max_rounds.max(1));
        while keep_from + 1 < starts.len()
            && preamble_len + (self.messages.len() - starts[keep_from]) > max_turns
        {
            keep_from += 1;
        }

        let cut = starts[keep_from];
        if cut <= preamble_len {
            return 0;
        }

        let before = self.messages.len();
        let mut kept: Vec<Message> = Vec::with_capacity(preamble_len + before - cut);
        if let Some(system) = system {
            kept.push(system);
        }
        kept.extend(self.messages.drain(cut..));
        self.messages = kept;
        before - self.messages.len()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
