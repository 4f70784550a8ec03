//! # agent-runtime
//!
//! Runtime providers for the agent core.
//!
//! ## Providers
//!
//! - **OpenAI-compatible** (default): any `/chat/completions` endpoint with
//!   native function calling
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::OpenAiProvider;
//!
//! let provider = OpenAiProvider::from_env()?;
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(provider))
//!     .build()?;
//! ```

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use agent_core::{Agent, AgentError, LlmProvider, Message, Result, Role, Tool, ToolRegistry};
