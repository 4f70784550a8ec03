//! Skill marketplace client
//!
//! Drives the `clawhub` command-line client through the shell runner.
//! Anything interpolated into a command line is either validated against a
//! conservative character set or single-quoted.

use agent_core::Skill;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, ToolsError};
use crate::shell::{MAX_OUTPUT_CHARS, ShellRunner, shell_quote};

const CLI_MISSING: &str =
    "The clawhub CLI could not be installed. Install it manually with: npm install -g clawhub";

/// Outcome of an install attempt
#[derive(Clone, Debug)]
pub struct InstallReport {
    /// `<skills>/<name>/SKILL.md` exists after the command ran
    pub installed: bool,
    pub skill_dir: PathBuf,
    /// CLI output
    pub output: String,
}

/// `clawhub` CLI wrapper
pub struct ClawHub {
    runner: Arc<ShellRunner>,
    skills_dir: PathBuf,
    cli: String,
}

impl ClawHub {
    pub fn new(runner: Arc<ShellRunner>, skills_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            skills_dir: skills_dir.into(),
            cli: "clawhub".into(),
        }
    }

    /// Use a different executable name or path for the CLI
    #[must_use]
    pub fn with_cli(mut self, cli: impl Into<String>) -> Self {
        self.cli = cli.into();
        self
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    async fn cli_available(&self) -> bool {
        let probe = format!("command -v {}", shell_quote(&self.cli));
        match self.runner.run(&probe, None).await {
            Ok(out) => out.success() && !out.stdout.trim().is_empty(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not probe for clawhub");
                false
            }
        }
    }

    /// Make sure the CLI is on PATH, installing it through npm if needed
    pub async fn ensure_cli(&self) -> bool {
        if self.cli_available().await {
            return true;
        }
        tracing::info!("clawhub CLI not found, installing via npm");
        match self.runner.run("npm install -g clawhub 2>&1", None).await {
            Ok(out) => tracing::info!(exit_code = ?out.exit_code, "npm install finished"),
            Err(e) => tracing::warn!(error = %e, "npm install failed"),
        }
        self.cli_available().await
    }

    async fn run_cli(&self, args: &str) -> Result<String> {
        let command = format!("{} {args} 2>&1", shell_quote(&self.cli));
        let out = self.runner.run(&command, None).await?;
        Ok(out.render(MAX_OUTPUT_CHARS))
    }

    /// Search the marketplace
    pub async fn search(&self, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ToolsError::InvalidInput("search query is empty".into()));
        }
        if !self.ensure_cli().await {
            return Ok(CLI_MISSING.into());
        }
        self.run_cli(&format!("search {}", shell_quote(query))).await
    }

    /// Install a skill into the skills directory
    pub async fn install(&self, name: &str, version: Option<&str>) -> Result<InstallReport> {
        validate_token("skill name", name)?;
        if let Some(version) = version {
            validate_token("version", version)?;
        }
        if !self.ensure_cli().await {
            return Err(ToolsError::NotFound(CLI_MISSING.into()));
        }

        tokio::fs::create_dir_all(&self.skills_dir).await?;
        let version_flag = version.map(|v| format!(" --version {v}")).unwrap_or_default();
        let output = self
            .run_cli(&format!(
                "install {name}{version_flag} --dir {}",
                shell_quote(&self.skills_dir.to_string_lossy())
            ))
            .await?;

        let skill_dir = self.skills_dir.join(name);
        let installed = tokio::fs::try_exists(skill_dir.join("SKILL.md"))
            .await
            .unwrap_or(false);
        tracing::info!(skill = name, installed, "Skill install finished");
        Ok(InstallReport {
            installed,
            skill_dir,
            output,
        })
    }

    /// Update one skill, or everything with `--all`
    pub async fn update(&self, name: &str, force: bool) -> Result<String> {
        if name != "--all" {
            validate_token("skill name", name)?;
        }
        if !self.ensure_cli().await {
            return Ok(CLI_MISSING.into());
        }
        let force_flag = if force { " --force" } else { "" };
        self.run_cli(&format!(
            "update {name}{force_flag} --dir {}",
            shell_quote(&self.skills_dir.to_string_lossy())
        ))
        .await
    }

    /// Describe locally installed skills
    pub async fn list_installed(&self) -> Result<String> {
        let mut entries = match tokio::fs::read_dir(&self.skills_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok("The skills directory does not exist yet; no skills are installed.".into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                let skill_md = path.join("SKILL.md");
                let Ok(raw) = tokio::fs::read_to_string(&skill_md).await else {
                    continue;
                };
                let description = Skill::parse(&raw, &name, &skill_md)
                    .map(|s| s.description)
                    .unwrap_or_default();
                let description: String = if description.is_empty() {
                    "(no description)".into()
                } else {
                    description.chars().take(80).collect()
                };
                lines.push(format!("📦 {name}: {description}"));
            } else if file_type.is_file() && path.extension().is_some_and(|e| e == "md") {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or(name);
                lines.push(format!("📄 {stem} (custom)"));
            }
        }

        if lines.is_empty() {
            return Ok("No skills are installed.".into());
        }
        lines.sort();
        Ok(format!("{} skills installed:\n\n{}", lines.len(), lines.join("\n")))
    }
}

/// Accept only `[A-Za-z0-9._@/-]`, no leading dash and no `..`
fn validate_token(what: &str, value: &str) -> Result<()> {
    let ok = !value.is_empty()
        && !value.starts_with('-')
        && !value.contains("..")
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '/' | '-'));
    if ok {
        Ok(())
    } else {
        Err(ToolsError::InvalidInput(format!(
            "{what} '{value}' may only contain letters, digits and . _ @ / -"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_token() {
        assert!(validate_token("n", "weather").is_ok());
        assert!(validate_token("n", "@scope/pkg-1.2").is_ok());
        assert!(validate_token("n", "x; rm -rf /").is_err());
        assert!(validate_token("n", "$(whoami)").is_err());
        assert!(validate_token("n", "--dir").is_err());
        assert!(validate_token("n", "../etc").is_err());
        assert!(validate_token("n", "").is_err());
    }

    #[tokio::test]
    async fn test_list_installed() {
        let dir = tempfile::tempdir().unwrap();
        let skills = dir.path().join("skills");
        std::fs::create_dir_all(skills.join("weather")).unwrap();
        std::fs::write(
            skills.join("weather/SKILL.md"),
            "---\nname: weather\ndescription: Forecasts by city\n---\nbody",
        )
        .unwrap();
        std::fs::write(skills.join("notes.md"), "mine").unwrap();

        let hub = ClawHub::new(Arc::new(ShellRunner::new(dir.path())), &skills);
        let listing = hub.list_installed().await.unwrap();
        assert!(listing.starts_with("2 skills installed"));
        assert!(listing.contains("📦 weather: Forecasts by city"));
        assert!(listing.contains("📄 notes (custom)"));
    }

    #[tokio::test]
    async fn test_list_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let hub = ClawHub::new(Arc::new(ShellRunner::new(dir.path())), dir.path().join("nope"));
        assert!(hub.list_installed().await.unwrap().contains("does not exist"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_with_fake_cli() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cli = dir.path().join("fake-clawhub");
        // install <name> --dir <dir>
        std::fs::write(
            &cli,
            "#!/bin/sh\nif [ \"$1\" = install ]; then mkdir -p \"$4/$2\" && echo skill > \"$4/$2/SKILL.md\"; echo \"installed $2\"; fi\n",
        )
        .unwrap();
        std::fs::set_permissions(&cli, std::fs::Permissions::from_mode(0o755)).unwrap();

        let skills = dir.path().join("skills");
        let hub = ClawHub::new(Arc::new(ShellRunner::new(dir.path())), &skills)
            .with_cli(cli.to_string_lossy());

        let report = hub.install("weather", None).await.unwrap();
        assert!(report.installed, "output: {}", report.output);
        assert!(report.output.contains("installed weather"));
        assert!(skills.join("weather/SKILL.md").exists());

        assert!(hub.install("bad name", None).await.is_err());
    }
}
