//! Stubs shared by the handler and background task tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::{
    AgentBuilder, Completion, FinishReason, GenerationOptions, LlmProvider, Message, ModelInfo,
    Role, SessionStore, SkillCatalog, ToolSchema,
};
use agent_transport::{InflightTracker, Outbound, TransportError};

use crate::state::AppState;

/// Replies `echo: <last user text>`
pub struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn health_check(&self) -> agent_core::Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _options: &GenerationOptions,
    ) -> agent_core::Result<Completion> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(Completion {
            message: Some(Message::assistant(format!("echo: {last}"))),
            model: "echo-1".into(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        })
    }

    async fn list_models(&self) -> agent_core::Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "echo-1".into(),
            owned_by: None,
        }])
    }
}

/// Records deliveries; can be told to fail the next one
#[derive(Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<(String, String)>>,
    fail_next: AtomicBool,
}

impl RecordingOutbound {
    pub fn fail_first(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Wait until at least `count` messages were delivered
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<(String, String)> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.sent.lock().unwrap().clone();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send(&self, user_id: &str, text: &str) -> agent_transport::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Http("connection refused".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

pub async fn test_state(
    secret: Option<&str>,
) -> (tempfile::TempDir, AppState, Arc<RecordingOutbound>) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("skills")).unwrap();

    let agent = AgentBuilder::new()
        .provider(Arc::new(EchoProvider))
        .skills(Arc::new(SkillCatalog::load(dir.path().join("skills")).await))
        .sessions(Arc::new(SessionStore::default()))
        .build()
        .unwrap();
    let outbound = Arc::new(RecordingOutbound::default());

    let state = AppState {
        agent: Arc::new(agent),
        outbound: outbound.clone(),
        inflight: InflightTracker::new(),
        webhook_secret: secret.map(Arc::from),
    };
    (dir, state, outbound)
}
