//! Memory Tools
//!
//! Let the model save, search and forget long-term facts about the user.

use async_trait::async_trait;
use std::sync::Arc;

use agent_core::{
    ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolCategory, ToolResult, ToolSchema,
};

use crate::memory::{MemoryCategory, MemoryStore};

/// Default number of hits returned by `search_memory`
pub const SEARCH_LIMIT: usize = 10;

pub struct SaveMemoryTool {
    store: Arc<MemoryStore>,
}

impl SaveMemoryTool {
    pub const fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveMemoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "save_memory".into(),
            description: "Remember a lasting fact about the user (preferences, projects, people, \
                          habits, todos). Saved facts appear in every future conversation."
                .into(),
            parameters: vec![
                ParameterSchema::required("content", "string", "The fact to remember"),
                ParameterSchema::optional("category", "string", "Kind of fact (default: general)")
                    .with_enum(MemoryCategory::ALL),
            ],
            category: ToolCategory::Memory,
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let content = call.arguments.str("content")?;
        if content.trim().is_empty() {
            return Ok(ToolResult::failure("save_memory", "Nothing to remember: content is empty."));
        }
        let category = call
            .arguments
            .opt_str("category")?
            .map(MemoryCategory::parse_lenient)
            .unwrap_or_default();

        let entry = self.store.save(&call.user_id, content, category).await?;
        Ok(ToolResult::success(
            "save_memory",
            format!("Saved memory #{} [{}]: {}", entry.id, entry.category, entry.content),
        ))
    }
}

pub struct SearchMemoryTool {
    store: Arc<MemoryStore>,
}

impl SearchMemoryTool {
    pub const fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "search_memory".into(),
            description: "Search what you remember about the user by keyword.".into(),
            parameters: vec![ParameterSchema::required("query", "string", "Keyword to look for")],
            category: ToolCategory::Memory,
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let query = call.arguments.str("query")?;
        let hits = self.store.search(&call.user_id, query, SEARCH_LIMIT).await;
        if hits.is_empty() {
            return Ok(ToolResult::success(
                "search_memory",
                format!("No memories match \"{query}\"."),
            ));
        }

        let lines: Vec<String> = hits
            .iter()
            .map(|e| {
                format!(
                    "#{} [{}] {} ({})",
                    e.id,
                    e.category,
                    e.content,
                    e.updated_at.format("%Y-%m-%d")
                )
            })
            .collect();
        Ok(ToolResult::success(
            "search_memory",
            format!("Found {} memories:\n{}", hits.len(), lines.join("\n")),
        ))
    }
}

pub struct DeleteMemoryTool {
    store: Arc<MemoryStore>,
}

impl DeleteMemoryTool {
    pub const fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteMemoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "delete_memory".into(),
            description: "Forget a saved memory by its id (as shown by search_memory).".into(),
            parameters: vec![ParameterSchema::required("memory_id", "number", "Memory id")],
            category: ToolCategory::Memory,
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let id = call.arguments.i64("memory_id")?;
        let deleted = match u64::try_from(id) {
            Ok(id) => self.store.delete(&call.user_id, id).await?,
            Err(_) => false,
        };
        if deleted {
            Ok(ToolResult::success("delete_memory", format!("Deleted memory #{id}.")))
        } else {
            Ok(ToolResult::failure("delete_memory", format!("No memory #{id} found.")))
        }
    }
}
