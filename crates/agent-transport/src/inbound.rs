//! Inbound Webhook Messages
//!
//! Parses chat-platform webhook payloads, verifies their HMAC signature and
//! tracks which messages are still being processed, so a platform retry of
//! the same message is not run twice.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Result, TransportError};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the raw body
pub const SIGNATURE_HEADER: &str = "x-signature";

/// A user message delivered by the chat platform
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: String,

    /// Platform message id, used for de-duplication
    #[serde(default)]
    pub message_id: Option<String>,

    #[serde(default = "default_msg_type")]
    pub msg_type: String,

    #[serde(default)]
    pub content: String,
}

fn default_msg_type() -> String {
    "text".into()
}

impl InboundMessage {
    /// Parse a JSON webhook body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let msg: Self =
            serde_json::from_slice(body).map_err(|e| TransportError::Parse(e.to_string()))?;
        if msg.user_id.trim().is_empty() {
            return Err(TransportError::Parse("user_id is empty".into()));
        }
        Ok(msg)
    }

    pub fn is_text(&self) -> bool {
        self.msg_type.eq_ignore_ascii_case("text")
    }
}

/// Check `signature` (hex, optionally prefixed with `sha256=`) against the
/// HMAC-SHA256 of `body` keyed with `secret`. The comparison is constant-time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> Result<()> {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = hex::decode(signature)
        .map_err(|_| TransportError::Signature("signature is not valid hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TransportError::Config(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| TransportError::Signature("signature mismatch".into()))
}

/// Hex HMAC-SHA256 of `body`, as a sender would compute it
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TransportError::Config(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Set of `(user_id, message_id)` pairs currently being processed
#[derive(Clone, Debug, Default)]
pub struct InflightTracker {
    keys: Arc<Mutex<HashSet<String>>>,
}

/// Marks a message as in flight until dropped
#[derive(Debug)]
pub struct InflightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: Option<String>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.keys
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a message. Returns `None` when the same message is already in
    /// flight. Messages without an id are never treated as duplicates.
    pub fn try_begin(&self, msg: &InboundMessage) -> Option<InflightGuard> {
        let Some(message_id) = msg.message_id.as_deref() else {
            return Some(InflightGuard {
                keys: Arc::clone(&self.keys),
                key: None,
            });
        };
        let key = format!("{}:{message_id}", msg.user_id);
        let inserted = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then(|| InflightGuard {
            keys: Arc::clone(&self.keys),
            key: Some(key),
        })
    }

    /// Number of messages in flight
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
