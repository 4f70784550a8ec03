//! Tool dispatch
//!
//! Fans one assistant turn's tool calls out concurrently and collects exactly
//! one textual result per call id. Nothing a tool does (returning an error,
//! panicking, receiving garbage arguments, not existing) escapes
//! [`ToolDispatcher::execute`]; it all becomes result text for the model.

use futures::FutureExt;
use futures::future::join_all;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::message::{Message, ToolCallRequest};
use crate::skill::SkillCatalog;
use crate::tool::{ToolArguments, ToolCall, ToolEffect, ToolRegistry};

/// Result of one dispatched call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Id of the originating request
    pub call_id: String,
    pub tool: String,
    pub success: bool,
    /// Text handed back to the model
    pub output: String,
}

impl DispatchOutcome {
    /// Tool-result turn for the transcript
    pub fn to_message(&self) -> Message {
        Message::tool(self.output.clone(), self.call_id.clone()).with_name(self.tool.clone())
    }

    fn failed(call: &ToolCallRequest, output: String) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            success: false,
            output,
        }
    }
}

/// Routes tool calls to registered handlers
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    skills: Option<Arc<SkillCatalog>>,
}

impl ToolDispatcher {
    pub const fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            skills: None,
        }
    }

    /// Reload `skills` whenever a tool reports [`ToolEffect::SkillsChanged`]
    #[must_use]
    pub fn with_skills(mut self, skills: Arc<SkillCatalog>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute every call concurrently and wait for all of them.
    ///
    /// Returns one outcome per request, in request order.
    pub async fn execute(&self, calls: &[ToolCallRequest], user_id: &str) -> Vec<DispatchOutcome> {
        let futures = calls.iter().map(|call| self.execute_one(call, user_id));
        let results = join_all(futures).await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut skills_changed = false;
        for (outcome, effect) in results {
            skills_changed |= effect == Some(ToolEffect::SkillsChanged);
            outcomes.push(outcome);
        }

        if skills_changed {
            if let Some(skills) = &self.skills {
                let count = skills.reload().await;
                tracing::info!(count, "Skills hot-reloaded after tool call");
            }
        }

        outcomes
    }

    async fn execute_one(
        &self,
        call: &ToolCallRequest,
        user_id: &str,
    ) -> (DispatchOutcome, Option<ToolEffect>) {
        let Some(tool) = self.registry.get(&call.name) else {
            tracing::warn!(tool = %call.name, call_id = %call.id, "Unknown tool requested");
            return (
                DispatchOutcome::failed(call, format!("Unknown tool: {}", call.name)),
                None,
            );
        };

        let arguments = ToolArguments::try_parse(&call.arguments).unwrap_or_else(|| {
            tracing::warn!(
                tool = %call.name,
                call_id = %call.id,
                "Malformed tool arguments, using an empty mapping"
            );
            ToolArguments::new()
        });

        let category = tool.schema().category;
        let parsed = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
            user_id: user_id.to_string(),
        };

        tracing::info!(tool = %call.name, call_id = %call.id, %category, user_id, "Executing tool");
        let started = Instant::now();
        let result = AssertUnwindSafe(tool.execute(&parsed)).catch_unwind().await;
        let elapsed_ms = started.elapsed().as_millis();

        match result {
            Ok(Ok(result)) => {
                tracing::debug!(tool = %call.name, success = result.success, elapsed_ms, "Tool finished");
                let effect = if result.success { result.effect } else { None };
                let outcome = DispatchOutcome {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    success: result.success,
                    output: result.output,
                };
                (outcome, effect)
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = %call.name, error = %e, elapsed_ms, "Tool failed");
                (DispatchOutcome::failed(call, format!("Error: {e}")), None)
            }
            Err(_) => {
                tracing::error!(tool = %call.name, elapsed_ms, "Tool panicked");
                (
                    DispatchOutcome::failed(call, format!("Error: tool '{}' crashed", call.name)),
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, Result};
    use crate::tool::{ParameterSchema, Tool, ToolCategory, ToolResult, ToolSchema};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::time::Duration;

    fn schema(name: &str) -> ToolSchema {
        ToolSchema {
            name: name.into(),
            description: "test tool".into(),
            parameters: vec![ParameterSchema::optional("text", "string", "text")],
            category: ToolCategory::General,
            has_side_effects: false,
        }
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn schema(&self) -> ToolSchema {
            schema("echo")
        }
        async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
            let text = call.arguments.opt_str("text")?.unwrap_or("(nothing)");
            Ok(ToolResult::success("echo", text))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn schema(&self) -> ToolSchema {
            schema("fail")
        }
        async fn execute(&self, _call: &ToolCall) -> Result<ToolResult> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err(AgentError::ToolExecution("disk on fire".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Tool for Panicking {
        fn schema(&self) -> ToolSchema {
            schema("panic")
        }
        async fn execute(&self, _call: &ToolCall) -> Result<ToolResult> {
            panic!("handler bug");
        }
    }

    struct Sleepy;

    #[async_trait]
    impl Tool for Sleepy {
        fn schema(&self) -> ToolSchema {
            schema("sleep")
        }
        async fn execute(&self, _call: &ToolCall) -> Result<ToolResult> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(ToolResult::success("sleep", "rested"))
        }
    }

    struct Installer {
        root: PathBuf,
    }

    #[async_trait]
    impl Tool for Installer {
        fn schema(&self) -> ToolSchema {
            schema("install")
        }
        async fn execute(&self, _call: &ToolCall) -> Result<ToolResult> {
            tokio::fs::create_dir_all(self.root.join("new")).await?;
            tokio::fs::write(self.root.join("new/SKILL.md"), "New skill").await?;
            Ok(ToolResult::success("install", "installed").with_effect(ToolEffect::SkillsChanged))
        }
    }

    fn dispatcher() -> ToolDispatcher {
        let registry = ToolRegistry::new();
        registry.register(Echo).unwrap();
        registry.register(Failing).unwrap();
        registry.register(Panicking).unwrap();
        ToolDispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_one_result_per_call_even_when_all_fail() {
        let dispatcher = dispatcher();
        let calls: Vec<ToolCallRequest> = (0..6)
            .map(|i| {
                let name = ["fail", "panic", "missing"][i % 3];
                ToolCallRequest::new(format!("c{i}"), name, "{}")
            })
            .collect();

        let outcomes = dispatcher.execute(&calls, "u1").await;
        assert_eq!(outcomes.len(), 6);
        let ids: HashSet<_> = outcomes.iter().map(|o| o.call_id.as_str()).collect();
        assert_eq!(ids.len(), 6);
        assert!(outcomes.iter().all(|o| !o.success));

        assert!(outcomes[0].output.starts_with("Error: "));
        assert!(outcomes[0].output.contains("disk on fire"));
        assert!(outcomes[1].output.contains("crashed"));
        assert_eq!(outcomes[2].output, "Unknown tool: missing");
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let dispatcher = dispatcher();
        let calls = vec![
            ToolCallRequest::new("a", "panic", "{}"),
            ToolCallRequest::new("b", "echo", r#"{"text":"still here"}"#),
            ToolCallRequest::new("c", "fail", "{}"),
        ];

        let outcomes = dispatcher.execute(&calls, "u1").await;
        assert_eq!(outcomes[1].call_id, "b");
        assert!(outcomes[1].success);
        assert_eq!(outcomes[1].output, "still here");
    }

    #[tokio::test]
    async fn test_batch_runs_concurrently() {
        let registry = ToolRegistry::new();
        registry.register(Sleepy).unwrap();
        let dispatcher = ToolDispatcher::new(Arc::new(registry));
        let calls: Vec<ToolCallRequest> = (0..5)
            .map(|i| ToolCallRequest::new(format!("s{i}"), "sleep", "{}"))
            .collect();

        let started = Instant::now();
        let outcomes = dispatcher.execute(&calls, "u1").await;
        let elapsed = started.elapsed();

        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.success));
        // Sequential execution would take 5 x 200ms
        assert!(elapsed < Duration::from_millis(600), "batch took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_malformed_arguments_become_empty_mapping() {
        let dispatcher = dispatcher();
        let calls = vec![ToolCallRequest::new("m", "echo", "{\"text\": ")];
        let outcomes = dispatcher.execute(&calls, "u1").await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].output, "(nothing)");

        let message = outcomes[0].to_message();
        assert_eq!(message.tool_call_id.as_deref(), Some("m"));
        assert_eq!(message.name.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn test_skills_reload_after_install() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("skills");
        std::fs::create_dir_all(&root).unwrap();
        let skills = Arc::new(SkillCatalog::load(&root).await);
        assert!(skills.is_empty());

        let registry = ToolRegistry::new();
        registry.register(Installer { root: root.clone() }).unwrap();
        let dispatcher = ToolDispatcher::new(Arc::new(registry)).with_skills(Arc::clone(&skills));

        let outcomes = dispatcher
            .execute(&[ToolCallRequest::new("i", "install", "{}")], "u1")
            .await;
        assert!(outcomes[0].success);
        assert_eq!(skills.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        assert!(dispatcher().execute(&[], "u1").await.is_empty());
    }
}
