//! Application State

use std::sync::Arc;

use agent_core::Agent;
use agent_transport::{InflightTracker, Outbound};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The conversation loop, with its tools, skills and sessions
    pub agent: Arc<Agent>,

    /// Where asynchronous replies are delivered
    pub outbound: Arc<dyn Outbound>,

    /// Webhook messages currently being answered
    pub inflight: InflightTracker,

    /// HMAC key for webhook bodies
    pub webhook_secret: Option<Arc<str>>,
}
