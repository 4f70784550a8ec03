//! Workspace Tools
//!
//! Shell execution and plain file access rooted at the workspace directory.
//! Relative paths resolve against the workspace; absolute paths are used as
//! given.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_core::{
    ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolCategory, ToolResult, ToolSchema,
};

use crate::error::ToolsError;
use crate::shell::{MAX_OUTPUT_CHARS, ShellRunner};

/// `read_file` output beyond this many characters is truncated
pub const MAX_READ_CHARS: usize = 8000;

fn resolve(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path.trim());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Run a shell command in the workspace
pub struct BashExecuteTool {
    runner: Arc<ShellRunner>,
}

impl BashExecuteTool {
    pub const fn new(runner: Arc<ShellRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for BashExecuteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "bash_execute".into(),
            description: format!(
                "Run a shell command on the server: scripts, system checks, package installs, \
                 searching files with grep/find/rg. Commands time out after {}s.",
                self.runner.timeout().as_secs()
            ),
            parameters: vec![
                ParameterSchema::required(
                    "command",
                    "string",
                    "Shell command to run, e.g. 'ls -la' or 'cat /etc/os-release'",
                ),
                ParameterSchema::optional(
                    "cwd",
                    "string",
                    "Working directory (defaults to the workspace)",
                ),
            ],
            category: ToolCategory::Workspace,
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let command = call.arguments.str("command")?;
        let cwd = call.arguments.opt_str("cwd")?.map(Path::new);

        match self.runner.run(command, cwd).await {
            Ok(out) => {
                let text = out.render(MAX_OUTPUT_CHARS);
                Ok(ToolResult {
                    success: out.success(),
                    ..ToolResult::success("bash_execute", text)
                })
            }
            Err(ToolsError::Timeout(secs)) => Ok(ToolResult::failure(
                "bash_execute",
                format!("Command timed out after {secs}s and was killed."),
            )),
            Err(e) => Ok(ToolResult::failure(
                "bash_execute",
                format!("Command failed: {e}"),
            )),
        }
    }
}

/// Read a file with line numbers
pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn line_number(value: Option<i64>, default: usize) -> usize {
    value.map_or(default, |n| usize::try_from(n).unwrap_or(0))
}

/// Numbered view of `content` between 1-based `start` and `end`, inclusive
fn numbered_view(path: &Path, content: &str, start: Option<i64>, end: Option<i64>) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let total = lines.len();
    let start = line_number(start, 1).max(1);
    let end = line_number(end, total).min(total);

    let numbered = lines
        .iter()
        .enumerate()
        .skip(start - 1)
        .take(end.saturating_sub(start - 1))
        .map(|(i, line)| format!("{}: {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    let body = if numbered.chars().count() > MAX_READ_CHARS {
        let head: String = numbered.chars().take(MAX_READ_CHARS).collect();
        format!("{head}\n...(file truncated, {total} lines in total)")
    } else {
        numbered
    };
    format!(
        "File: {} ({total} lines, showing {start}-{end})\n{}\n{body}",
        path.display(),
        "─".repeat(40)
    )
}

#[async_trait]
impl Tool for ReadFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read_file".into(),
            description: "Read a file and return its text with line numbers. \
                          Optionally restrict to a range of lines."
                .into(),
            parameters: vec![
                ParameterSchema::required(
                    "path",
                    "string",
                    "Absolute path, or a path relative to the workspace",
                ),
                ParameterSchema::optional("start_line", "number", "First line to show (1-based)"),
                ParameterSchema::optional("end_line", "number", "Last line to show"),
            ],
            category: ToolCategory::Workspace,
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let path = resolve(&self.root, call.arguments.str("path")?);
        let start = call.arguments.opt_i64("start_line")?;
        let end = call.arguments.opt_i64("end_line")?;

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::success(
                "read_file",
                numbered_view(&path, &content, start, end),
            )),
            Err(e) => Ok(ToolResult::failure(
                "read_file",
                format!("Failed to read {}: {e}", path.display()),
            )),
        }
    }
}

/// Overwrite a file, creating parent directories
pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "write_file".into(),
            description: "Write content to a file, replacing it entirely. \
                          Missing files and parent directories are created."
                .into(),
            parameters: vec![
                ParameterSchema::required(
                    "path",
                    "string",
                    "Absolute path, or a path relative to the workspace",
                ),
                ParameterSchema::required("content", "string", "Complete file content"),
            ],
            category: ToolCategory::Workspace,
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let path = resolve(&self.root, call.arguments.str("path")?);
        let content = call.arguments.str("content")?;

        let written = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content).await
        }
        .await;

        match written {
            Ok(()) => {
                tracing::info!(path = %path.display(), chars = content.chars().count(), "File written");
                Ok(ToolResult::success(
                    "write_file",
                    format!(
                        "Wrote {} ({} characters)",
                        path.display(),
                        content.chars().count()
                    ),
                ))
            }
            Err(e) => Ok(ToolResult::failure(
                "write_file",
                format!("Failed to write {}: {e}", path.display()),
            )),
        }
    }
}

/// Replace the first exact occurrence of a string in a file
pub struct EditFileTool {
    root: PathBuf,
}

impl EditFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns `false` when `target` does not occur in the file
    async fn edit(path: &Path, target: &str, replacement: &str) -> std::io::Result<bool> {
        let original = tokio::fs::read_to_string(path).await?;
        if target.is_empty() || !original.contains(target) {
            return Ok(false);
        }
        tokio::fs::write(path, original.replacen(target, replacement, 1)).await?;
        Ok(true)
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "edit_file".into(),
            description: "Edit a file by replacing the first exact occurrence of target_content \
                          with replacement_content. The target must match exactly, \
                          including whitespace and line breaks."
                .into(),
            parameters: vec![
                ParameterSchema::required("path", "string", "File path"),
                ParameterSchema::required(
                    "target_content",
                    "string",
                    "Existing text to replace (exact match)",
                ),
                ParameterSchema::required("replacement_content", "string", "New text"),
            ],
            category: ToolCategory::Workspace,
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let path = resolve(&self.root, call.arguments.str("path")?);
        let target = call.arguments.str("target_content")?;
        let replacement = call.arguments.str("replacement_content")?;

        match Self::edit(&path, target, replacement).await {
            Ok(true) => Ok(ToolResult::success(
                "edit_file",
                format!(
                    "Edited {} (replaced {} characters with {})",
                    path.display(),
                    target.chars().count(),
                    replacement.chars().count()
                ),
            )),
            Ok(false) => Ok(ToolResult::failure(
                "edit_file",
                format!(
                    "Edit failed: target content not found in {}. It must match exactly, \
                     including whitespace and line breaks.",
                    path.display()
                ),
            )),
            Err(e) => Ok(ToolResult::failure(
                "edit_file",
                format!("Failed to edit {}: {e}", path.display()),
            )),
        }
    }
}
