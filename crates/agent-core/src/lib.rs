//! # agent-core
//!
//! Core agent logic with provider-agnostic LLM abstraction, per-user
//! sessions and concurrent tool dispatch.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                            Agent                                  │
//! │  ┌─────────────┐  ┌──────────────┐  ┌───────────────────────────┐ │
//! │  │  Reasoning  │──│  Dispatcher  │──│  ToolRegistry (ArcSwap)   │ │
//! │  │    Loop     │  └──────────────┘  └───────────────────────────┘ │
//! │  │             │──┌──────────────┐  ┌───────────────────────────┐ │
//! │  │             │  │ SessionStore │  │  SkillCatalog (ArcSwap)   │ │
//! │  │             │  └──────────────┘  └───────────────────────────┘ │
//! │  │             │──┌──────────────────────────┐                    │
//! │  └─────────────┘  │ LlmProvider (Strategy)   │                    │
//! │                   └──────────────────────────┘                    │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the loop independent of any vendor API;
//! tool backends plug in through the `Tool` trait.

pub mod dispatch;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod skill;
pub mod tool;

pub use dispatch::{DispatchOutcome, ToolDispatcher};
pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role, ToolCallRequest};
pub use provider::{Completion, FinishReason, GenerationOptions, LlmProvider, ModelInfo};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, MemoryDigest};
pub use session::{RetentionPolicy, Session, SessionStore};
pub use skill::{Skill, SkillCatalog};
pub use tool::{
    ParameterSchema, Tool, ToolArguments, ToolCall, ToolCategory, ToolEffect, ToolRegistry,
    ToolResult, ToolSchema,
};
