//! Chat assistant HTTP server
//!
//! Wires the agent loop to an OpenAI-compatible provider, the built-in tool
//! backends and a chat platform webhook, then serves the HTTP API.

mod background;
mod config;
mod handlers;
mod state;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{AgentBuilder, LlmProvider, SessionStore, SkillCatalog, ToolRegistry};
use agent_runtime::{OpenAiConfig, OpenAiProvider};
use agent_tools::{ClawHub, CronScheduler, MemoryStore, ShellRunner, Toolbox};
use agent_transport::{InflightTracker, LogOutbound, Outbound, PushClient};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Initialize LLM provider
    let llm = OpenAiConfig::from_env()?;
    let model = llm.model.clone();
    let provider = Arc::new(OpenAiProvider::from_config(llm)?);

    match provider.health_check().await {
        Ok(true) => tracing::info!(model = %model, "✓ LLM provider reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ LLM provider not reachable - replies will fail until it is");
        }
    }

    // Initialize tool backends
    tokio::fs::create_dir_all(config.skills_dir()).await?;
    let runner = Arc::new(ShellRunner::new(&config.workspace_dir));
    let memory = Arc::new(MemoryStore::open(config.memory_path()).await?);
    let (scheduler, fired) = CronScheduler::new(config.timezone);
    let toolbox = Toolbox {
        runner: Arc::clone(&runner),
        memory: Arc::clone(&memory),
        scheduler: Arc::new(scheduler),
        marketplace: Arc::new(ClawHub::new(runner, config.skills_dir())),
    };

    let tools = Arc::new(ToolRegistry::new());
    toolbox.register(&tools)?;
    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let skills = Arc::new(SkillCatalog::load(config.skills_dir()).await);
    tracing::info!(count = skills.len(), dir = %config.skills_dir().display(), "Skills loaded");

    let agent = AgentBuilder::new()
        .provider(provider)
        .tools(tools)
        .skills(skills)
        .sessions(Arc::new(SessionStore::default()))
        .memory(memory)
        .model(model)
        .assistant_name(config.assistant_name.clone())
        .timezone(config.timezone)
        .build()?;
    let agent = Arc::new(agent);

    // Outbound delivery
    let outbound: Arc<dyn Outbound> = match &config.push_url {
        Some(url) => {
            tracing::info!(url = %url, "✓ Push delivery configured");
            Arc::new(PushClient::new(url.clone(), config.push_token.clone())?)
        }
        None => {
            tracing::warn!("⚠ PUSH_URL not set - webhook replies will only be logged");
            Arc::new(LogOutbound)
        }
    };
    if config.webhook_secret.is_none() {
        tracing::warn!("⚠ WEBHOOK_SECRET not set - webhook signatures are not checked");
    }

    // Background tasks
    background::spawn_cron_consumer(Arc::clone(&agent), Arc::clone(&outbound), fired);
    background::spawn_session_sweeper(Arc::clone(&agent), background::SWEEP_INTERVAL);

    let state = AppState {
        agent,
        outbound,
        inflight: InflightTracker::new(),
        webhook_secret: config.webhook_secret.as_deref().map(Arc::from),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 {} running on http://{}", config.assistant_name, config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                  - Health check");
    tracing::info!("  GET    /api/models              - List available models");
    tracing::info!("  POST   /api/chat                - Send message, wait for reply");
    tracing::info!("  POST   /webhook/message         - Chat platform webhook");
    tracing::info!("  DELETE /api/sessions/{{user_id}}  - Forget a conversation");
    tracing::info!("  POST   /api/skills/reload       - Re-scan skills");

    axum::serve(listener, app).await?;

    Ok(())
}
