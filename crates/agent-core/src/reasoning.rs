//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for agent behavior.
//! Each `run` builds the instruction context, then alternates model calls
//! and tool dispatch until the model answers in plain text or the iteration
//! ceiling is reached.
//!
//! Runs for the same user are serialized through a per-user mutex; runs for
//! different users proceed in parallel.

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::dispatch::ToolDispatcher;
use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider};
use crate::session::SessionStore;
use crate::skill::{DEFAULT_INLINE_LIMIT, SkillCatalog};
use crate::tool::{Tool, ToolCategory, ToolRegistry};

/// Returned when the provider produced no usable choice.
pub const EMPTY_RESPONSE: &str = "The AI returned an empty response. Please try again.";

/// Returned when the final assistant turn has no text.
pub const NO_TEXT_CONTENT: &str = "(The AI returned no text content.)";

/// Source of the per-user long-term memory digest placed in the system prompt
#[async_trait]
pub trait MemoryDigest: Send + Sync {
    /// Up to `limit` recent entries, newest first, one per line.
    /// An empty string means nothing is known.
    async fn digest(&self, user_id: &str, limit: usize) -> Result<String>;
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Name the assistant introduces itself with
    pub assistant_name: String,

    /// Timezone for the clock line in the system prompt
    pub timezone: Tz,

    /// Maximum tool rounds before giving up
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Skill bodies up to this length are inlined
    pub skill_inline_limit: usize,

    /// Memory entries included in the system prompt
    pub memory_digest_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            assistant_name: "AI Assistant".into(),
            timezone: chrono_tz::Asia::Shanghai,
            max_iterations: 15,
            generation: GenerationOptions::default(),
            skill_inline_limit: DEFAULT_INLINE_LIMIT,
            memory_digest_limit: 20,
        }
    }
}

/// Advisory returned when the iteration ceiling is hit
pub fn ceiling_message(max_iterations: usize) -> String {
    format!(
        "The assistant made {max_iterations} rounds of tool calls without finishing and was stopped. \
         Please try simplifying your request."
    )
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    dispatcher: ToolDispatcher,
    skills: Arc<SkillCatalog>,
    sessions: Arc<SessionStore>,
    memory: Option<Arc<dyn MemoryDigest>>,
    config: AgentConfig,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        skills: Arc<SkillCatalog>,
        sessions: Arc<SessionStore>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            dispatcher: ToolDispatcher::new(tools).with_skills(Arc::clone(&skills)),
            skills,
            sessions,
            memory: None,
            config,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a long-term memory source
    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn MemoryDigest>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Run the loop for one user message. Failures come back as plain text.
    pub async fn run(&self, user_id: &str, text: &str) -> String {
        match self.try_run(user_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Agent run failed");
                e.user_message()
            }
        }
    }

    /// Run the loop, surfacing provider failures as errors
    pub async fn try_run(&self, user_id: &str, text: &str) -> Result<String> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let system = self.build_system_prompt(user_id).await;
        self.sessions.replace_system(user_id, Message::system(system));
        self.sessions.append(user_id, Message::user(text));

        let max_iterations = self.config.max_iterations;
        let mut iterations = 0;

        while iterations < max_iterations {
            let transcript = self.sessions.get(user_id);
            let schemas = self.dispatcher.registry().schemas();
            tracing::debug!(
                user_id,
                iteration = iterations + 1,
                messages = transcript.len(),
                "Calling model"
            );

            let completion = self
                .provider
                .complete(&transcript, &schemas, &self.config.generation)
                .await?;

            let requests_tools = completion.requests_tools();
            let Some(message) = completion.message else {
                tracing::warn!(user_id, "Model returned no choices");
                return Ok(EMPTY_RESPONSE.into());
            };

            self.sessions.append(user_id, message.clone());

            if requests_tools {
                tracing::info!(user_id, calls = message.tool_calls.len(), "Model requested tools");
                let outcomes = self.dispatcher.execute(&message.tool_calls, user_id).await;
                let results = outcomes.iter().map(|o| o.to_message()).collect();
                self.sessions.append_batch(user_id, results);
                iterations += 1;
                continue;
            }

            tracing::info!(user_id, iterations = iterations + 1, "Agent loop finished");
            if message.content.is_empty() {
                return Ok(NO_TEXT_CONTENT.into());
            }
            return Ok(message.content);
        }

        tracing::warn!(user_id, max_iterations, "Iteration ceiling reached");
        Ok(ceiling_message(max_iterations))
    }

    /// Build the full system prompt for `user_id`
    pub async fn build_system_prompt(&self, user_id: &str) -> String {
        let now = Utc::now().with_timezone(&self.config.timezone);
        let registry = self.dispatcher.registry();

        let mut prompt = format!(
            "You are {name}, a capable and efficient personal AI assistant.\n\n\
             ## Ground rules\n\
             - Current time ({tz}): {now}\n\
             - You run on the user's own server with shell access and file read/write.\n\
             - Use tools proactively to get things done; no need to ask for confirmation repeatedly.\n\
             - Keep replies concise; chat messages should not be long.\n\
             - When the user shares important personal information, remember it with save_memory.\n\
             - For complex tasks, plan the steps first, then carry them out one by one.",
            name = self.config.assistant_name,
            tz = self.config.timezone.name(),
            now = now.format("%Y-%m-%d %H:%M:%S"),
        );

        if !registry.is_empty() {
            prompt.push_str("\n\n## Tools\n");
            prompt.push_str(registry.describe().trim_end());
        }

        if registry
            .schemas()
            .iter()
            .any(|s| s.category == ToolCategory::SkillMarketplace)
        {
            prompt.push_str(
                "\n\n## Skill marketplace\n\
                 You can search an online skill marketplace and install new abilities.\n\
                 - When you lack a capability, search the marketplace first.\n\
                 - When the user asks whether you can do something you have no skill for, look it up.\n\
                 - Newly installed skills take effect from the next model call.",
            );
        }

        let skills = self.skills.render_prompt(self.config.skill_inline_limit);
        if !skills.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&skills);
        }

        if let Some(memory) = &self.memory {
            match memory.digest(user_id, self.config.memory_digest_limit).await {
                Ok(digest) if !digest.trim().is_empty() => {
                    prompt.push_str("\n\n## What you know about this user\n");
                    prompt.push_str(digest.trim_end());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(user_id, error = %e, "Memory digest unavailable"),
            }
        }

        prompt
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        Arc::clone(
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drop per-user locks nobody holds or waits on. Returns the count removed.
    pub async fn prune_idle_locks(&self) -> usize {
        let mut locks = self.user_locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    /// Forget a user's conversation
    pub fn clear_session(&self, user_id: &str) -> bool {
        self.sessions.clear(user_id)
    }

    pub const fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub const fn skills(&self) -> &Arc<SkillCatalog> {
        &self.skills
    }

    /// Get the tool registry
    pub const fn tools(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    registry: Option<Arc<ToolRegistry>>,
    pending_tools: Vec<Arc<dyn Tool>>,
    skills: Option<Arc<SkillCatalog>>,
    sessions: Option<Arc<SessionStore>>,
    memory: Option<Arc<dyn MemoryDigest>>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            registry: None,
            pending_tools: Vec::new(),
            skills: None,
            sessions: None,
            memory: None,
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.pending_tools.push(Arc::new(tool));
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.registry = Some(tools);
        self
    }

    #[must_use]
    pub fn skills(mut self, skills: Arc<SkillCatalog>) -> Self {
        self.skills = Some(skills);
        self
    }

    #[must_use]
    pub fn sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    #[must_use]
    pub fn memory(mut self, memory: Arc<dyn MemoryDigest>) -> Self {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    #[must_use]
    pub fn assistant_name(mut self, name: impl Into<String>) -> Self {
        self.config.assistant_name = name.into();
        self
    }

    #[must_use]
    pub const fn timezone(mut self, tz: Tz) -> Self {
        self.config.timezone = tz;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        let registry = self.registry.unwrap_or_default();
        for tool in self.pending_tools {
            registry.register_arc(tool)?;
        }

        let skills = self
            .skills
            .unwrap_or_else(|| Arc::new(SkillCatalog::new("skills")));
        let sessions = self.sessions.unwrap_or_default();

        let agent = Agent::new(provider, registry, skills, sessions, self.config);
        Ok(match self.memory {
            Some(memory) => agent.with_memory(memory),
            None => agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Role, ToolCallRequest};
    use crate::provider::{Completion, FinishReason, ModelInfo};
    use crate::tool::{ParameterSchema, ToolCall, ToolResult, ToolSchema};
    use chrono::TimeDelta;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn text(content: &str) -> Completion {
        Completion {
            message: Some(Message::assistant(content)),
            model: "stub".into(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        }
    }

    fn tool_call(id: &str, name: &str, args: &str) -> Completion {
        Completion {
            message: Some(Message::assistant_with_tool_calls(
                "",
                vec![ToolCallRequest::new(id, name, args)],
            )),
            model: "stub".into(),
            usage: None,
            finish_reason: Some(FinishReason::ToolUse),
        }
    }

    /// Replays scripted completions, then repeats `fallback` forever.
    struct ScriptedProvider {
        script: std::sync::Mutex<VecDeque<Result<Completion>>>,
        fallback: Option<Completion>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<Completion>>) -> Self {
            Self {
                script: std::sync::Mutex::new(script.into()),
                fallback: None,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn looping(completion: Completion) -> Self {
            Self {
                fallback: Some(completion),
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolSchema],
            _options: &GenerationOptions,
        ) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| AgentError::Provider("script exhausted".into())),
            }
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    /// Answers "re: <last user text>" after a short pause.
    struct EchoUserProvider;

    #[async_trait]
    impl LlmProvider for EchoUserProvider {
        fn name(&self) -> &str {
            "echo-user"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[ToolSchema],
            _options: &GenerationOptions,
        ) -> Result<Completion> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let last = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(text(&format!("re: {last}")))
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo the text argument".into(),
                parameters: vec![ParameterSchema::required("text", "string", "Text to echo")],
                category: ToolCategory::General,
                has_side_effects: false,
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
            Ok(ToolResult::success("echo", call.arguments.str("text")?))
        }
    }

    struct FixedMemory;

    #[async_trait]
    impl MemoryDigest for FixedMemory {
        async fn digest(&self, user_id: &str, _limit: usize) -> Result<String> {
            if user_id == "broken" {
                return Err(AgentError::Other("store offline".into()));
            }
            Ok("- [preference] likes green tea".into())
        }
    }

    fn agent(provider: Arc<dyn LlmProvider>) -> Agent {
        AgentBuilder::new()
            .provider(provider)
            .tool(EchoTool)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_reply() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text("hello"))]));
        let agent = agent(provider.clone());

        assert_eq!(agent.run("u1", "hi").await, "hello");
        assert_eq!(provider.calls(), 1);

        let transcript = agent.sessions().get("u1");
        let roles: Vec<Role> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(transcript[1].content, "hi");
        assert_eq!(transcript[2].content, "hello");
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call("call_1", "echo", r#"{"text":"ping"}"#)),
            Ok(text("done")),
        ]));
        let agent = agent(provider.clone());

        assert_eq!(agent.run("u1", "use the tool").await, "done");
        assert_eq!(provider.calls(), 2);

        let transcript = agent.sessions().get("u1");
        let result = transcript.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(result.content, "ping");

        let request = transcript.iter().find(|m| m.has_tool_calls()).unwrap();
        assert_eq!(request.tool_calls[0].id, "call_1");
    }

    #[tokio::test]
    async fn test_iteration_ceiling() {
        let provider = Arc::new(ScriptedProvider::looping(tool_call("c", "echo", "{}")));
        let agent = AgentBuilder::new()
            .provider(provider.clone())
            .tool(EchoTool)
            .max_iterations(4)
            .build()
            .unwrap();

        let reply = agent.run("u1", "loop forever").await;
        assert_eq!(reply, ceiling_message(4));
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_default_ceiling_is_fifteen() {
        let provider = Arc::new(ScriptedProvider::looping(tool_call("c", "missing_tool", "{}")));
        let agent = agent(provider.clone());

        let reply = agent.run("u1", "go").await;
        assert!(reply.contains("15 rounds"));
        assert_eq!(provider.calls(), 15);
    }

    #[tokio::test]
    async fn test_empty_choice_and_empty_text() {
        let empty = Completion {
            message: None,
            model: "stub".into(),
            usage: None,
            finish_reason: None,
        };
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(empty), Ok(text(""))]));
        let agent = agent(provider);

        assert_eq!(agent.run("u1", "a").await, EMPTY_RESPONSE);
        assert_eq!(agent.run("u1", "b").await, NO_TEXT_CONTENT);
    }

    #[tokio::test]
    async fn test_provider_error_stops_loop() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(AgentError::RateLimited(
            "429".into(),
        ))]));
        let agent = agent(provider.clone());

        let reply = agent.run("u1", "hi").await;
        assert_eq!(reply, AgentError::RateLimited(String::new()).user_message());
        assert_eq!(provider.calls(), 1);

        let err = agent.try_run("u1", "again").await.unwrap_err();
        assert!(err.is_provider_error());
    }

    #[tokio::test]
    async fn test_cold_session_twice() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text("one")), Ok(text("two"))]));
        let agent = agent(provider);

        assert_eq!(agent.run("u1", "same").await, "one");
        agent.clear_session("u1");
        assert_eq!(agent.run("u1", "same").await, "two");
        assert_eq!(agent.sessions().get("u1").len(), 3);
    }

    #[tokio::test]
    async fn test_system_turn_refreshed_not_duplicated() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text("a")), Ok(text("b"))]));
        let agent = agent(provider);
        agent.run("u1", "first").await;
        agent.run("u1", "second").await;

        let transcript = agent.sessions().get("u1");
        assert_eq!(transcript.len(), 5);
        assert_eq!(transcript.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(transcript[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_expired_session_restarts() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text("a")), Ok(text("b"))]));
        let agent = agent(provider);
        agent.run("u1", "first").await;
        agent.sessions().backdate("u1", TimeDelta::hours(3));

        assert!(agent.sessions().get("u1").is_empty());
        agent.run("u1", "second").await;

        let transcript = agent.sessions().get("u1");
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0].role, Role::System);
        assert_eq!(transcript[1].content, "second");
    }

    #[tokio::test]
    async fn test_same_user_runs_are_serialized() {
        let agent = Arc::new(agent(Arc::new(EchoUserProvider)));
        let a = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.run("u1", "alpha").await })
        };
        let b = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.run("u1", "beta").await })
        };
        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(ra, "re: alpha");
        assert_eq!(rb, "re: beta");

        let transcript = agent.sessions().get("u1");
        assert_eq!(transcript.len(), 5);
        assert_eq!(transcript[2].content, format!("re: {}", transcript[1].content));
        assert_eq!(transcript[4].content, format!("re: {}", transcript[3].content));

        assert_eq!(agent.prune_idle_locks().await, 1);
    }

    #[tokio::test]
    async fn test_users_run_in_parallel() {
        let provider = Arc::new(ScriptedProvider {
            delay: Duration::from_millis(100),
            fallback: Some(text("ok")),
            ..ScriptedProvider::new(Vec::new())
        });
        let agent = agent(provider);

        let started = std::time::Instant::now();
        let (a, b) = tokio::join!(agent.run("u1", "x"), agent.run("u2", "y"));
        assert_eq!((a.as_str(), b.as_str()), ("ok", "ok"));
        assert!(started.elapsed() < Duration::from_millis(190));
    }

    #[tokio::test]
    async fn test_system_prompt_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tea.md"), "Brew at 80C.").unwrap();
        let skills = Arc::new(SkillCatalog::load(dir.path()).await);

        let agent = AgentBuilder::new()
            .provider(Arc::new(ScriptedProvider::new(Vec::new())))
            .tool(EchoTool)
            .skills(skills)
            .memory(Arc::new(FixedMemory))
            .assistant_name("Mochi")
            .build()
            .unwrap();

        let prompt = agent.build_system_prompt("u1").await;
        assert!(prompt.starts_with("You are Mochi"));
        assert!(prompt.contains("Asia/Shanghai"));
        assert!(prompt.contains("- general: echo"));
        assert!(prompt.contains("Brew at 80C."));
        assert!(prompt.contains("likes green tea"));
        assert!(!prompt.contains("Skill marketplace"));

        let prompt = agent.build_system_prompt("broken").await;
        assert!(!prompt.contains("What you know about this user"));
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(AgentBuilder::new().build().is_err());
    }
}
