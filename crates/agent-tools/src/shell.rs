//! Shell runner
//!
//! Runs `sh -c` commands in the workspace with a hard wall-clock limit.
//! Shared by the `bash_execute` tool and the skill marketplace client.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::{Result, ToolsError};

/// Default wall-clock limit for one command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Output longer than this many characters is truncated
pub const MAX_OUTPUT_CHARS: usize = 4000;

/// Captured result of a finished command
#[derive(Clone, Debug)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

impl ShellOutput {
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// stdout, then stderr behind a separator
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() {
                out.push_str("\n--- stderr ---\n");
            }
            out.push_str(&self.stderr);
        }
        out
    }

    /// Text handed back to the model
    pub fn render(&self, max_chars: usize) -> String {
        let mut out = self.combined();
        if out.trim().is_empty() {
            out = if self.success() {
                "(command succeeded with no output)".into()
            } else {
                "(command produced no output)".into()
            };
        }
        if !self.success() {
            match self.exit_code {
                Some(code) => out.push_str(&format!("\n[Exit code: {code}]")),
                None => out.push_str("\n[Terminated by signal]"),
            }
        }
        truncate_chars(&out, max_chars)
    }
}

/// Keep the first `max_chars` characters, noting how long the text was
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}\n...(output truncated, {total} characters in total)")
}

/// Executes shell commands with a fixed timeout
#[derive(Clone, Debug)]
pub struct ShellRunner {
    workdir: PathBuf,
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `command` through `sh -c`. The child is killed if it outlives the
    /// timeout.
    pub async fn run(&self, command: &str, cwd: Option<&Path>) -> Result<ShellOutput> {
        let dir = cwd.map_or_else(|| self.workdir.clone(), |c| self.workdir.join(c));
        let preview: String = command.chars().take(300).collect();
        tracing::info!(command = %preview, cwd = %dir.display(), "Running shell command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&dir)
            .env("LANG", "en_US.UTF-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| ToolsError::Spawn(format!("{e} (cwd: {})", dir.display())))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(command = %preview, timeout_secs = self.timeout.as_secs(), "Shell command timed out");
                return Err(ToolsError::Timeout(self.timeout.as_secs()));
            }
        };

        let result = ShellOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            exit_code = ?result.exit_code,
            elapsed_ms = result.elapsed.as_millis(),
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Shell command finished"
        );
        Ok(result)
    }
}

/// Quote `s` as a single shell word
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> (tempfile::TempDir, ShellRunner) {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(dir.path());
        (dir, runner)
    }

    #[tokio::test]
    async fn test_stdout_and_stderr() {
        let (_dir, runner) = runner();
        let out = runner.run("echo out && echo err >&2", None).await.unwrap();
        assert!(out.success());
        let text = out.render(MAX_OUTPUT_CHARS);
        assert!(text.starts_with("out"));
        assert!(text.contains("--- stderr ---\nerr"));
    }

    #[tokio::test]
    async fn test_exit_code_note() {
        let (_dir, runner) = runner();
        let out = runner.run("exit 42", None).await.unwrap();
        assert_eq!(out.exit_code, Some(42));
        assert!(out.render(MAX_OUTPUT_CHARS).contains("[Exit code: 42]"));
    }

    #[tokio::test]
    async fn test_empty_output_placeholder() {
        let (_dir, runner) = runner();
        let out = runner.run("true", None).await.unwrap();
        assert_eq!(out.render(MAX_OUTPUT_CHARS), "(command succeeded with no output)");
    }

    #[tokio::test]
    async fn test_runs_in_workdir() {
        let (dir, runner) = runner();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/marker.txt"), "").unwrap();
        let out = runner.run("ls", Some(Path::new("sub"))).await.unwrap();
        assert!(out.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_timeout_kills() {
        let (_dir, runner) = runner();
        let runner = runner.with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = runner.run("sleep 5", None).await.unwrap_err();
        assert!(matches!(err, ToolsError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_truncation() {
        let long = "é".repeat(5000);
        let out = truncate_chars(&long, MAX_OUTPUT_CHARS);
        assert!(out.contains("5000 characters in total"));
        assert!(out.starts_with(&"é".repeat(10)));
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
