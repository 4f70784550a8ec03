//! Outbound Delivery
//!
//! Pushes assistant replies back to the chat platform. Platforms cap message
//! size, so long replies go out as several chunks with a short pause between
//! them to keep them in order.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Default chunk size in characters
pub const DEFAULT_CHUNK_CHARS: usize = 600;

/// Default pause between chunks
pub const DEFAULT_CHUNK_PAUSE: Duration = Duration::from_millis(300);

/// Delivers text to a user
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, user_id: &str, text: &str) -> Result<()>;
}

/// Split `text` into chunks of at most `max_chars` characters, preferring to
/// break at a newline in the second half of the window.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining: Vec<char> = text.chars().collect();

    while remaining.len() > max_chars {
        let window = &remaining[..=max_chars];
        let split_at = window
            .iter()
            .rposition(|&c| c == '\n')
            .filter(|&pos| pos * 2 >= max_chars && pos > 0)
            .unwrap_or(max_chars);

        chunks.push(remaining[..split_at].iter().collect());
        let rest_start = remaining[split_at..]
            .iter()
            .position(|c| !c.is_whitespace())
            .map_or(remaining.len(), |offset| split_at + offset);
        remaining.drain(..rest_start);
    }
    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.into_iter().collect());
    }
    chunks
}

#[derive(Serialize)]
struct PushPayload<'a> {
    user_id: &'a str,
    text: &'a str,
}

/// HTTP push client for the chat platform
pub struct PushClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    chunk_chars: usize,
    pause: Duration,
}

impl PushClient {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(TransportError::Config("push URL is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url,
            token: token.filter(|t| !t.is_empty()),
            chunk_chars: DEFAULT_CHUNK_CHARS,
            pause: DEFAULT_CHUNK_PAUSE,
        })
    }

    #[must_use]
    pub const fn with_chunking(mut self, chunk_chars: usize, pause: Duration) -> Self {
        self.chunk_chars = chunk_chars;
        self.pause = pause;
        self
    }

    async fn push(&self, user_id: &str, text: &str) -> Result<()> {
        let mut request = self.client.post(&self.url).json(&PushPayload { user_id, text });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }
}

#[async_trait]
impl Outbound for PushClient {
    async fn send(&self, user_id: &str, text: &str) -> Result<()> {
        let chunks = split_message(text, self.chunk_chars);
        let count = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            self.push(user_id, chunk).await?;
            if i + 1 < count {
                tokio::time::sleep(self.pause).await;
            }
        }
        tracing::info!(user_id, chunks = count, "Reply pushed");
        Ok(())
    }
}

/// Writes replies to the log instead of delivering them
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOutbound;

#[async_trait]
impl Outbound for LogOutbound {
    async fn send(&self, user_id: &str, text: &str) -> Result<()> {
        tracing::info!(user_id, chars = text.chars().count(), reply = %text, "Reply (no push endpoint configured)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_short_message_is_one_chunk() {
        assert_eq!(split_message("hello", 600), vec!["hello"]);
        assert_eq!(split_message("", 600), vec![""]);
    }

    #[test]
    fn test_prefers_newline_in_second_half() {
        let text = format!("{}\n{}", "a".repeat(8), "b".repeat(8));
        assert_eq!(split_message(&text, 10), vec!["aaaaaaaa", "bbbbbbbb"]);
    }

    #[test]
    fn test_hard_cut_without_good_newline() {
        let text = format!("ab\n{}", "c".repeat(20));
        let chunks = split_message(&text, 10);
        assert_eq!(chunks[0], "ab\nccccccc");
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat().replace('\n', ""), text.replace('\n', ""));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "你好".repeat(10);
        let chunks = split_message(&text, 7);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 7);
    }

    type Seen = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn record(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> &'static str {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        seen.lock().unwrap().push((auth, body));
        "ok"
    }

    #[tokio::test]
    async fn test_push_client_sends_chunks_in_order() {
        let seen: Seen = Arc::default();
        let app = Router::new().route("/push", post(record)).with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = PushClient::new(format!("http://{addr}/push"), Some("tok".into()))
            .unwrap()
            .with_chunking(5, Duration::from_millis(1));
        client.send("u1", "hello world").await.unwrap();

        let seen = seen.lock().unwrap();
        let texts: Vec<&str> = seen.iter().map(|(_, b)| b["text"].as_str().unwrap()).collect();
        assert_eq!(texts, vec!["hello", "world"]);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer tok"));
        assert_eq!(seen[0].1["user_id"], "u1");
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(PushClient::new("  ", None).is_err());
    }
}
