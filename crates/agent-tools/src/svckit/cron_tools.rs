//! Cron Tools
//!
//! Scheduled jobs whose prompt is run through the agent when they fire.

use async_trait::async_trait;
use std::sync::Arc;

use agent_core::{
    ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolCategory, ToolResult, ToolSchema,
};

use crate::error::ToolsError;
use crate::scheduler::CronScheduler;

const CRON_EXAMPLES: &str =
    "Examples: \"0 9 * * *\" (every day at 9:00), \"*/5 * * * *\" (every 5 minutes), \
     \"30 8 * * 1-5\" (weekdays at 8:30)";

pub struct AddCronJobTool {
    scheduler: Arc<CronScheduler>,
}

impl AddCronJobTool {
    pub const fn new(scheduler: Arc<CronScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for AddCronJobTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "add_cron_job".into(),
            description: format!(
                "Create a scheduled task. When it fires you will carry out the prompt and the \
                 result is sent to the user. Times are in {}. Common expressions: \
                 '0 9 * * *' (daily 9:00), '0 */2 * * *' (every 2 hours), \
                 '30 8 * * 1-5' (weekdays 8:30).",
                self.scheduler.timezone()
            ),
            parameters: vec![
                ParameterSchema::required("expression", "string", "Cron expression, e.g. '0 9 * * *'"),
                ParameterSchema::required(
                    "description",
                    "string",
                    "Short description, e.g. 'morning water reminder'",
                ),
                ParameterSchema::required("prompt", "string", "Instruction to carry out when it fires"),
            ],
            category: ToolCategory::Scheduling,
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let expression = call.arguments.str("expression")?;
        let description = call.arguments.str("description")?;
        let prompt = call.arguments.str("prompt")?;

        match self
            .scheduler
            .add(&call.user_id, expression, description, prompt)
            .await
        {
            Ok(job) => {
                let next = self
                    .scheduler
                    .next_fire(&job.expression)
                    .ok()
                    .flatten()
                    .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
                Ok(ToolResult::success(
                    "add_cron_job",
                    format!(
                        "Scheduled task created:\n- ID: {}\n- Schedule: {}\n- Description: {}\n- Prompt: {}\n- Next run: {next}",
                        job.id, job.expression, job.description, job.prompt
                    ),
                ))
            }
            Err(ToolsError::InvalidCron { expression, reason }) => Ok(ToolResult::failure(
                "add_cron_job",
                format!("Invalid cron expression \"{expression}\" ({reason}). {CRON_EXAMPLES}"),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct ListCronJobsTool {
    scheduler: Arc<CronScheduler>,
}

impl ListCronJobsTool {
    pub const fn new(scheduler: Arc<CronScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ListCronJobsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_cron_jobs".into(),
            description: "List the user's active scheduled tasks.".into(),
            parameters: vec![],
            category: ToolCategory::Scheduling,
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let jobs = self.scheduler.list(&call.user_id).await;
        if jobs.is_empty() {
            return Ok(ToolResult::success("list_cron_jobs", "There are no active scheduled tasks."));
        }
        let tz = self.scheduler.timezone();
        let lines: Vec<String> = jobs
            .iter()
            .map(|j| {
                format!(
                    "- [{}] {} | schedule: {} | created: {}",
                    j.id,
                    j.description,
                    j.expression,
                    j.created_at.with_timezone(&tz).format("%Y-%m-%d %H:%M")
                )
            })
            .collect();
        Ok(ToolResult::success("list_cron_jobs", lines.join("\n")))
    }
}

pub struct RemoveCronJobTool {
    scheduler: Arc<CronScheduler>,
}

impl RemoveCronJobTool {
    pub const fn new(scheduler: Arc<CronScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for RemoveCronJobTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "remove_cron_job".into(),
            description: "Delete one of the user's scheduled tasks.".into(),
            parameters: vec![ParameterSchema::required(
                "job_id",
                "string",
                "Task id, e.g. 'cron_1'",
            )],
            category: ToolCategory::Scheduling,
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let job_id = call.arguments.str("job_id")?;
        match self.scheduler.remove(&call.user_id, job_id).await {
            Some(job) => Ok(ToolResult::success(
                "remove_cron_job",
                format!("Scheduled task {} ({}) deleted.", job.id, job.description),
            )),
            None => Ok(ToolResult::failure(
                "remove_cron_job",
                format!("No scheduled task {job_id} found."),
            )),
        }
    }
}
