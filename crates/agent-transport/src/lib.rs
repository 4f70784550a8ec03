//! # agent-transport
//!
//! The edges between the assistant and a chat platform.
//!
//! ```text
//!  platform ──POST /webhook/message──▶ InboundMessage ──▶ agent
//!     ▲        (x-signature: HMAC)      InflightTracker      │
//!     └──────────── PushClient ◀── split_message ◀───────────┘
//! ```
//!
//! Webhook bodies are JSON `{user_id, message_id?, msg_type, content}`.
//! The platform expects a quick acknowledgement, so replies are delivered
//! later through the [`Outbound`] push channel.

mod error;
mod inbound;
mod outbound;

pub use error::{Result, TransportError};
pub use inbound::{
    InboundMessage, InflightGuard, InflightTracker, SIGNATURE_HEADER, sign, verify_signature,
};
pub use outbound::{
    DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_PAUSE, LogOutbound, Outbound, PushClient, split_message,
};
