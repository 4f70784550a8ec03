//! Skill Marketplace Tools
//!
//! Search, install, list and update skills from ClawHub. A successful
//! install asks the dispatcher to reload the skill catalogue, so the new
//! skill is visible from the next model request on.

use async_trait::async_trait;
use std::sync::Arc;

use agent_core::{
    ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolCategory, ToolEffect, ToolResult,
    ToolSchema,
};

use crate::marketplace::ClawHub;

pub struct ClawHubSearchTool {
    hub: Arc<ClawHub>,
}

impl ClawHubSearchTool {
    pub const fn new(hub: Arc<ClawHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Tool for ClawHubSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "clawhub_search".into(),
            description: "Search the ClawHub skill marketplace. Use it when the user needs a \
                          capability you do not have yet."
                .into(),
            parameters: vec![ParameterSchema::required(
                "query",
                "string",
                "Search keywords, e.g. 'weather', 'email', 'pdf'",
            )],
            category: ToolCategory::SkillMarketplace,
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let query = call.arguments.str("query")?;
        let output = self.hub.search(query).await?;
        let output = if output.trim().is_empty() {
            "No matching skills found.".to_string()
        } else {
            output
        };
        Ok(ToolResult::success("clawhub_search", output))
    }
}

pub struct ClawHubInstallTool {
    hub: Arc<ClawHub>,
}

impl ClawHubInstallTool {
    pub const fn new(hub: Arc<ClawHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Tool for ClawHubInstallTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "clawhub_install".into(),
            description: "Install a skill from ClawHub into the local skills directory. \
                          It becomes available right after installation."
                .into(),
            parameters: vec![
                ParameterSchema::required(
                    "skill_name",
                    "string",
                    "Skill name as returned by clawhub_search",
                ),
                ParameterSchema::optional("version", "string", "Version (defaults to latest)"),
            ],
            category: ToolCategory::SkillMarketplace,
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let name = call.arguments.str("skill_name")?;
        let version = call.arguments.opt_str("version")?;
        let report = self.hub.install(name, version).await?;

        if report.installed {
            Ok(ToolResult::success(
                "clawhub_install",
                format!(
                    "✅ Skill \"{name}\" installed at {}\n\n{}\n\nThe skill is loaded and ready to use.",
                    report.skill_dir.display(),
                    report.output
                ),
            )
            .with_effect(ToolEffect::SkillsChanged))
        } else {
            Ok(ToolResult::failure(
                "clawhub_install",
                format!("Installation did not produce a SKILL.md. Output:\n{}", report.output),
            ))
        }
    }
}

pub struct ClawHubListTool {
    hub: Arc<ClawHub>,
}

impl ClawHubListTool {
    pub const fn new(hub: Arc<ClawHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Tool for ClawHubListTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "clawhub_list".into(),
            description: "List locally installed skills with their descriptions.".into(),
            parameters: vec![],
            category: ToolCategory::SkillMarketplace,
            has_side_effects: false,
        }
    }

    async fn execute(&self, _call: &ToolCall) -> CoreResult<ToolResult> {
        Ok(ToolResult::success("clawhub_list", self.hub.list_installed().await?))
    }
}

pub struct ClawHubUpdateTool {
    hub: Arc<ClawHub>,
}

impl ClawHubUpdateTool {
    pub const fn new(hub: Arc<ClawHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Tool for ClawHubUpdateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "clawhub_update".into(),
            description: "Update an installed skill, or all of them, to the latest version.".into(),
            parameters: vec![
                ParameterSchema::required(
                    "skill_name",
                    "string",
                    "Skill to update, or '--all' for every installed skill",
                ),
                ParameterSchema::optional("force", "boolean", "Overwrite local modifications"),
            ],
            category: ToolCategory::SkillMarketplace,
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let name = call.arguments.str("skill_name")?;
        let force = call.arguments.bool_or("force", false)?;
        let output = self.hub.update(name, force).await?;
        Ok(ToolResult::success("clawhub_update", output).with_effect(ToolEffect::SkillsChanged))
    }
}
