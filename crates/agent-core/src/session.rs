//! Session Management
//!
//! Per-user transcripts held in memory, with round-based retention and an
//! idle expiry window. Every mutation and the expiry sweep take the user's
//! entry lock, so a sweep can never discard a session in the middle of an
//! append.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use std::time::Duration;

use crate::message::{Conversation, Message};

/// Retention and expiry limits
#[derive(Clone, Debug)]
pub struct RetentionPolicy {
    /// Conversational rounds kept per session
    pub max_rounds: usize,

    /// Upper bound on turns; whole rounds are dropped beyond it
    pub max_turns: usize,

    /// Sessions untouched for longer than this are discarded
    pub idle_timeout: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_rounds: 30,
            max_turns: 120,
            idle_timeout: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl RetentionPolicy {
    fn idle_window(&self) -> TimeDelta {
        TimeDelta::from_std(self.idle_timeout).unwrap_or_else(|_| TimeDelta::days(36_500))
    }
}

/// One user's conversation state
#[derive(Clone, Debug)]
pub struct Session {
    /// Conversation history
    pub conversation: Conversation,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            conversation: Conversation::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn is_idle(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        now - self.last_active > window
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory session store keyed by user id.
///
/// Entries live in a sharded map, so users on different shards never contend
/// and every operation on one user holds that user's shard lock for its full
/// duration.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    policy: RetentionPolicy,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl SessionStore {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            policy,
        }
    }

    pub const fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Transcript for `user_id`; empty when absent or expired. An expired
    /// session is discarded.
    pub fn get(&self, user_id: &str) -> Vec<Message> {
        let window = self.policy.idle_window();
        let live = self
            .sessions
            .get(user_id)
            .filter(|s| !s.is_idle(Utc::now(), window))
            .map(|s| s.conversation.messages().to_vec());
        if let Some(transcript) = live {
            return transcript;
        }

        // Re-checked under the entry lock; an append may have landed in between.
        if self
            .sessions
            .remove_if(user_id, |_, s| s.is_idle(Utc::now(), window))
            .is_some()
        {
            tracing::debug!(user_id, "Discarded expired session on read");
            return Vec::new();
        }
        self.sessions
            .get(user_id)
            .map(|s| s.conversation.messages().to_vec())
            .unwrap_or_default()
    }

    /// Append one turn, then apply retention
    pub fn append(&self, user_id: &str, message: Message) {
        self.append_batch(user_id, vec![message]);
    }

    /// Append turns in order under one lock acquisition
    pub fn append_batch(&self, user_id: &str, messages: Vec<Message>) {
        let mut session = self.live_session(user_id);
        for message in messages {
            session.conversation.push(message);
            let removed = session
                .conversation
                .trim_rounds(self.policy.max_rounds, self.policy.max_turns);
            if removed > 0 {
                tracing::debug!(user_id, removed, "Trimmed session history");
            }
        }
        session.touch();
    }

    /// Install `system` as the first turn, replacing an existing one in place
    pub fn replace_system(&self, user_id: &str, system: Message) {
        let mut session = self.live_session(user_id);
        session.conversation.set_system(system);
        session.touch();
    }

    /// Drop a session. Returns whether one existed.
    pub fn clear(&self, user_id: &str) -> bool {
        self.sessions.remove(user_id).is_some()
    }

    /// Remove every session idle beyond the window. Returns the count removed.
    pub fn sweep_expired(&self) -> usize {
        let window = self.policy.idle_window();
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|user_id, s| {
            let keep = !s.is_idle(now, window);
            if !keep {
                tracing::info!(user_id = %user_id, "Evicted idle session");
            }
            keep
        });
        before.saturating_sub(self.sessions.len())
    }

    /// Number of sessions held, expired ones included until swept
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Existing session for `user_id`, or a fresh one if it is absent or
    /// expired. The returned guard holds the entry lock.
    fn live_session(&self, user_id: &str) -> RefMut<'_, String, Session> {
        let window = self.policy.idle_window();
        let mut session = self.sessions.entry(user_id.to_string()).or_default();
        if session.is_idle(Utc::now(), window) {
            tracing::debug!(user_id, "Session expired, starting fresh");
            *session = Session::new();
        }
        session
    }

    /// Shift a session's activity timestamp into the past
    #[cfg(test)]
    pub(crate) fn backdate(&self, user_id: &str, by: TimeDelta) {
        if let Some(mut s) = self.sessions.get_mut(user_id) {
            s.last_active -= by;
        }
    }
}
