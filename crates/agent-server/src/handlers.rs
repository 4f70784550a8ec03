//! HTTP Handlers

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use agent_core::{AgentError, ModelInfo};
use agent_transport::{InboundMessage, InflightGuard, SIGNATURE_HEADER, verify_signature};

use crate::state::AppState;

/// Immediate reply to an accepted webhook message
pub const ACK_REPLY: &str = "Got it, thinking...";

/// Reply to non-text webhook messages
pub const TEXT_ONLY_REPLY: &str = "Only text messages are supported for now 😊";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub time: String,
    pub provider: String,
    pub provider_connected: bool,
    pub tools: usize,
    pub skills: usize,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub user_id: String,
    pub reply: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<&'static str>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn agent_error(err: &AgentError) -> ApiError {
    let status = if err.is_provider_error() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    api_error(status, "AGENT_ERROR", err.user_message())
}

/// All routes
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))
        // Agent API
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions/{user_id}", delete(clear_session))
        .route("/api/skills/reload", post(reload_skills))
        // Chat platform
        .route("/webhook/message", post(webhook_message))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider = state.agent.provider();
    let provider_connected = provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        time: chrono::Utc::now().to_rfc3339(),
        provider: provider.name().to_string(),
        provider_connected,
        tools: state.agent.tools().len(),
        skills: state.agent.skills().len(),
        sessions: state.agent.sessions().len(),
    })
}

/// Models offered by the provider
pub async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    state
        .agent
        .provider()
        .list_models()
        .await
        .map(Json)
        .map_err(|e| {
            tracing::warn!(error = %e, "Listing models failed");
            agent_error(&e)
        })
}

/// Synchronous chat: runs the loop and returns the reply
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = payload.user_id.trim();
    if user_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", "user_id is required"));
    }

    let reply = state
        .agent
        .try_run(user_id, &payload.message)
        .await
        .map_err(|e| {
            tracing::error!(user_id, error = %e, "Agent error");
            agent_error(&e)
        })?;

    Ok(Json(ChatResponse {
        user_id: user_id.to_string(),
        reply,
        model: state.agent.config().generation.model.clone(),
    }))
}

/// Forget one user's conversation
pub async fn clear_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<serde_json::Value> {
    let cleared = state.agent.clear_session(&user_id);
    tracing::info!(user_id = %user_id, cleared, "Session cleared");
    Json(serde_json::json!({ "user_id": user_id, "cleared": cleared }))
}

/// Re-scan the skills directory
pub async fn reload_skills(State(state): State<AppState>) -> Json<serde_json::Value> {
    let count = state.agent.skills().reload().await;
    tracing::info!(count, "Skills reloaded on request");
    Json(serde_json::json!({ "skills": count }))
}

/// Chat platform webhook.
///
/// Acknowledges at once and answers through the outbound channel, since
/// platforms only wait a few seconds for the HTTP response.
pub async fn webhook_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                api_error(StatusCode::UNAUTHORIZED, "MISSING_SIGNATURE", "Missing webhook signature")
            })?;
        verify_signature(secret, &body, signature).map_err(|e| {
            tracing::warn!(error = %e, "Webhook signature failed");
            api_error(StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE", "Invalid signature")
        })?;
    }

    let msg = InboundMessage::parse(&body).map_err(|e| {
        tracing::warn!(error = %e, "Webhook payload rejected");
        api_error(StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", e.to_string())
    })?;

    if !msg.is_text() {
        tracing::debug!(user_id = %msg.user_id, msg_type = %msg.msg_type, "Non-text message");
        return Ok(Json(WebhookAck {
            status: "ignored",
            reply: Some(TEXT_ONLY_REPLY),
        }));
    }

    let Some(guard) = state.inflight.try_begin(&msg) else {
        tracing::info!(user_id = %msg.user_id, message_id = ?msg.message_id, "Duplicate delivery ignored");
        return Ok(Json(WebhookAck {
            status: "duplicate",
            reply: None,
        }));
    };

    tracing::info!(user_id = %msg.user_id, chars = msg.content.chars().count(), "Message received");
    tokio::spawn(answer_in_background(state, msg, guard));

    Ok(Json(WebhookAck {
        status: "accepted",
        reply: Some(ACK_REPLY),
    }))
}

async fn answer_in_background(state: AppState, msg: InboundMessage, _guard: InflightGuard) {
    let started = Instant::now();
    let text = msg.content.trim();
    let reply = state.agent.run(&msg.user_id, text).await;
    tracing::info!(
        user_id = %msg.user_id,
        elapsed_ms = started.elapsed().as_millis(),
        "Reply ready"
    );

    if let Err(e) = state.outbound.send(&msg.user_id, &reply).await {
        tracing::error!(user_id = %msg.user_id, error = %e, "Reply delivery failed");
        let notice = format!("❌ Failed to deliver the reply: {e}");
        if let Err(e) = state.outbound.send(&msg.user_id, &notice).await {
            tracing::error!(user_id = %msg.user_id, error = %e, "Failure notice could not be delivered either");
        }
    }
}
