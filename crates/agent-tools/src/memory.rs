//! Long-term memory store
//!
//! Per-user facts persisted as a single JSON document (`memory.json` in the
//! workspace). Every write rewrites the file through a temporary sibling and
//! a rename, so a crash mid-write leaves the previous version intact.

use agent_core::MemoryDigest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::Result;

/// Kind of fact being remembered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Preference,
    Project,
    Person,
    Habit,
    Todo,
    #[default]
    General,
}

impl MemoryCategory {
    pub const ALL: [&'static str; 6] = ["preference", "project", "person", "habit", "todo", "general"];

    /// Unknown names fall back to `General`
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "preference" => Self::Preference,
            "project" => Self::Project,
            "person" => Self::Person,
            "habit" => Self::Habit,
            "todo" => Self::Todo,
            _ => Self::General,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preference => "preference",
            Self::Project => "project",
            Self::Person => "person",
            Self::Habit => "habit",
            Self::Todo => "todo",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remembered fact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: u64,
    pub user_id: String,
    pub category: MemoryCategory,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryFile {
    next_id: u64,
    entries: Vec<MemoryEntry>,
}

/// JSON-backed memory store
pub struct MemoryStore {
    path: PathBuf,
    state: Mutex<MemoryFile>,
}

impl MemoryStore {
    /// Open the store at `path`, starting empty when the file does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => MemoryFile::default(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryFile::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(path = %path.display(), entries = state.entries.len(), "Memory store opened");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a new fact and return it
    pub async fn save(
        &self,
        user_id: &str,
        content: &str,
        category: MemoryCategory,
    ) -> Result<MemoryEntry> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let now = Utc::now();
        let entry = MemoryEntry {
            id: state.next_id,
            user_id: user_id.to_string(),
            category,
            content: content.trim().to_string(),
            created_at: now,
            updated_at: now,
        };
        state.entries.push(entry.clone());
        self.persist(&state).await?;
        tracing::debug!(user_id, id = entry.id, %category, "Memory saved");
        Ok(entry)
    }

    /// Case-insensitive substring search, newest first
    pub async fn search(&self, user_id: &str, query: &str, limit: usize) -> Vec<MemoryEntry> {
        let needle = query.trim().to_lowercase();
        let state = self.state.lock().await;
        newest_first(
            state
                .entries
                .iter()
                .filter(|e| e.user_id == user_id && e.content.to_lowercase().contains(&needle)),
            limit,
        )
    }

    /// Most recently updated entries, newest first
    pub async fn recent(&self, user_id: &str, limit: usize) -> Vec<MemoryEntry> {
        let state = self.state.lock().await;
        newest_first(state.entries.iter().filter(|e| e.user_id == user_id), limit)
    }

    /// Delete one of the user's entries. Returns whether it existed.
    pub async fn delete(&self, user_id: &str, id: u64) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|e| !(e.id == id && e.user_id == user_id));
        if state.entries.len() == before {
            return Ok(false);
        }
        self.persist(&state).await?;
        Ok(true)
    }

    async fn persist(&self, state: &MemoryFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn newest_first<'a>(entries: impl Iterator<Item = &'a MemoryEntry>, limit: usize) -> Vec<MemoryEntry> {
    let mut found: Vec<MemoryEntry> = entries.cloned().collect();
    found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
    found.truncate(limit);
    found
}

#[async_trait]
impl MemoryDigest for MemoryStore {
    async fn digest(&self, user_id: &str, limit: usize) -> agent_core::Result<String> {
        let lines: Vec<String> = self
            .recent(user_id, limit)
            .await
            .into_iter()
            .map(|e| format!("- [{}] {}", e.category, e.content))
            .collect();
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("memory.json")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_save_and_search() {
        let (_dir, store) = store().await;
        store.save("u1", "Likes green tea", MemoryCategory::Preference).await.unwrap();
        store.save("u1", "Works on the Atlas project", MemoryCategory::Project).await.unwrap();
        store.save("u2", "Also likes TEA", MemoryCategory::General).await.unwrap();

        let hits = store.search("u1", "TEA", 10).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Likes green tea");
        assert!(store.search("u1", "coffee", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let (_dir, store) = store().await;
        for n in 0..5 {
            store.save("u1", &format!("fact {n}"), MemoryCategory::General).await.unwrap();
        }
        let recent = store.recent("u1", 3).await;
        let contents: Vec<&str> = recent.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["fact 4", "fact 3", "fact 2"]);
    }

    #[tokio::test]
    async fn test_delete_is_scoped_to_user() {
        let (_dir, store) = store().await;
        let entry = store.save("u1", "secret", MemoryCategory::Person).await.unwrap();
        assert!(!store.delete("u2", entry.id).await.unwrap());
        assert!(store.delete("u1", entry.id).await.unwrap());
        assert!(store.recent("u1", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let (dir, store) = store().await;
        store.save("u1", "remember me", MemoryCategory::Habit).await.unwrap();
        drop(store);

        let reopened = MemoryStore::open(dir.path().join("memory.json")).await.unwrap();
        let recent = reopened.recent("u1", 10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].category, MemoryCategory::Habit);

        let next = reopened.save("u1", "second", MemoryCategory::General).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn test_digest_lines() {
        let (_dir, store) = store().await;
        store.save("u1", "Likes green tea", MemoryCategory::Preference).await.unwrap();
        let digest = store.digest("u1", 20).await.unwrap();
        assert_eq!(digest, "- [preference] Likes green tea");
        assert!(store.digest("nobody", 20).await.unwrap().is_empty());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(MemoryCategory::parse_lenient("TODO"), MemoryCategory::Todo);
        assert_eq!(MemoryCategory::parse_lenient("misc"), MemoryCategory::General);
    }
}
