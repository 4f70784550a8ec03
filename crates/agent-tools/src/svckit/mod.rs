//! Service Kit - Agent Tools
//!
//! `agent_core::Tool` adapters over the backends in this crate.

mod cron_tools;
mod marketplace_tools;
mod memory_tools;
mod workspace;

pub use cron_tools::{AddCronJobTool, ListCronJobsTool, RemoveCronJobTool};
pub use marketplace_tools::{
    ClawHubInstallTool, ClawHubListTool, ClawHubSearchTool, ClawHubUpdateTool,
};
pub use memory_tools::{DeleteMemoryTool, SaveMemoryTool, SearchMemoryTool};
pub use workspace::{BashExecuteTool, EditFileTool, ReadFileTool, WriteFileTool};
