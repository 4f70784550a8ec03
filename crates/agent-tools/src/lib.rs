//! # agent-tools
//!
//! Tool backends for the assistant and their `agent_core::Tool` adapters.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Toolbox                                                     │
//! ├──────────────┬──────────────┬──────────────┬─────────────────┤
//! │ ShellRunner  │ MemoryStore  │ CronScheduler│ ClawHub         │
//! │ bash_execute │ save_memory  │ add_cron_job │ clawhub_search  │
//! │ read_file    │ search_memory│ list_cron_.. │ clawhub_install │
//! │ write_file   │ delete_memory│ remove_cron..│ clawhub_list    │
//! │ edit_file    │              │              │ clawhub_update  │
//! └──────────────┴──────────────┴──────────────┴─────────────────┘
//! ```
//!
//! Backends never panic on bad input: recoverable problems come back as
//! failed [`agent_core::ToolResult`]s with readable text, everything else as
//! an [`agent_core::AgentError`] that the dispatcher turns into text.

pub mod error;
pub mod marketplace;
pub mod memory;
pub mod scheduler;
pub mod shell;
pub mod svckit;

use agent_core::ToolRegistry;
use std::sync::Arc;

pub use error::{Result, ToolsError};
pub use marketplace::{ClawHub, InstallReport};
pub use memory::{MemoryCategory, MemoryEntry, MemoryStore};
pub use scheduler::{CronJob, CronScheduler, ScheduledPrompt};
pub use shell::{ShellOutput, ShellRunner};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{
        AddCronJobTool, BashExecuteTool, ClawHubInstallTool, ClawHubListTool, ClawHubSearchTool,
        ClawHubUpdateTool, DeleteMemoryTool, EditFileTool, ListCronJobsTool, ReadFileTool,
        RemoveCronJobTool, SaveMemoryTool, SearchMemoryTool, WriteFileTool,
    };
}

/// The backends behind the built-in tools
#[derive(Clone)]
pub struct Toolbox {
    pub runner: Arc<ShellRunner>,
    pub memory: Arc<MemoryStore>,
    pub scheduler: Arc<CronScheduler>,
    pub marketplace: Arc<ClawHub>,
}

impl Toolbox {
    /// Register every built-in tool
    pub fn register(&self, registry: &ToolRegistry) -> agent_core::Result<()> {
        use tools::{
            AddCronJobTool, BashExecuteTool, ClawHubInstallTool, ClawHubListTool,
            ClawHubSearchTool, ClawHubUpdateTool, DeleteMemoryTool, EditFileTool,
            ListCronJobsTool, ReadFileTool, RemoveCronJobTool, SaveMemoryTool, SearchMemoryTool,
            WriteFileTool,
        };

        let root = self.runner.workdir().to_path_buf();
        registry.register(BashExecuteTool::new(self.runner.clone()))?;
        registry.register(ReadFileTool::new(root.clone()))?;
        registry.register(WriteFileTool::new(root.clone()))?;
        registry.register(EditFileTool::new(root))?;

        registry.register(SaveMemoryTool::new(self.memory.clone()))?;
        registry.register(SearchMemoryTool::new(self.memory.clone()))?;
        registry.register(DeleteMemoryTool::new(self.memory.clone()))?;

        registry.register(AddCronJobTool::new(self.scheduler.clone()))?;
        registry.register(ListCronJobsTool::new(self.scheduler.clone()))?;
        registry.register(RemoveCronJobTool::new(self.scheduler.clone()))?;

        registry.register(ClawHubSearchTool::new(self.marketplace.clone()))?;
        registry.register(ClawHubInstallTool::new(self.marketplace.clone()))?;
        registry.register(ClawHubListTool::new(self.marketplace.clone()))?;
        registry.register(ClawHubUpdateTool::new(self.marketplace.clone()))?;

        tracing::info!(tools = registry.len(), "Built-in tools registered");
        Ok(())
    }
}
