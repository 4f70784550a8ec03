//! Server configuration from the environment

use anyhow::{Context, anyhow};
use chrono_tz::Tz;
use std::path::PathBuf;

/// Settings not owned by a library crate
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Shell working directory, file tool root, `skills/` and `memory.json`
    pub workspace_dir: PathBuf,
    pub assistant_name: String,
    pub timezone: Tz,
    /// HMAC key for webhook bodies; unsigned webhooks are accepted when unset
    pub webhook_secret: Option<String>,
    pub push_url: Option<String>,
    pub push_token: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timezone = match non_empty("ASSISTANT_TIMEZONE") {
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|e| anyhow!("{e}"))
                .with_context(|| format!("invalid ASSISTANT_TIMEZONE '{name}'"))?,
            None => chrono_tz::Asia::Shanghai,
        };

        Ok(Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            workspace_dir: PathBuf::from(non_empty("WORKSPACE_DIR").unwrap_or_else(|| ".".into())),
            assistant_name: non_empty("ASSISTANT_NAME").unwrap_or_else(|| "AI Assistant".into()),
            timezone,
            webhook_secret: non_empty("WEBHOOK_SECRET"),
            push_url: non_empty("PUSH_URL"),
            push_token: non_empty("PUSH_TOKEN"),
        })
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.workspace_dir.join("skills")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.workspace_dir.join("memory.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.timezone, chrono_tz::Asia::Shanghai);
        assert_eq!(config.skills_dir(), PathBuf::from("./skills"));
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("ASSISTANT_TIMEZONE", "Europe/Berlin"),
            ("WORKSPACE_DIR", "/srv/ws"),
            ("WEBHOOK_SECRET", ""),
            ("PUSH_URL", "http://push.local/send"),
        ]))
        .unwrap();
        assert_eq!(config.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(config.memory_path(), PathBuf::from("/srv/ws/memory.json"));
        assert!(config.webhook_secret.is_none());
        assert_eq!(config.push_url.as_deref(), Some("http://push.local/send"));
    }

    #[test]
    fn test_bad_timezone() {
        let err = ServerConfig::from_lookup(lookup(&[("ASSISTANT_TIMEZONE", "Mars/Olympus")]))
            .unwrap_err();
        assert!(err.to_string().contains("ASSISTANT_TIMEZONE"));
    }
}
