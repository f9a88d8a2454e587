use super::{HostingPlatform, OpenPullRequest, PullRequest, Tool, ToolCommand};
use crate::error::{ToolError, ToolResult};
use std::path::Path;
use std::time::Duration;

/// `gh` command-line client
#[derive(Debug, Clone)]
pub struct Gh {
    cmd: ToolCommand,
}

impl Gh {
    /// Client with the given per-command budget
    pub fn new(timeout: Duration) -> Self {
        Self::with_command(
            ToolCommand::new(Tool::Gh)
                .with_timeout(timeout)
                .env("GH_PROMPT_DISABLED", "1"),
        )
    }

    /// Client driving a preconfigured runner
    pub fn with_command(cmd: ToolCommand) -> Self {
        Self { cmd }
    }
}

impl HostingPlatform for Gh {
    fn create_pull_request(&self, repo: &Path, request: &PullRequest) -> ToolResult<String> {
        let out = self.cmd.run(
            Some(repo),
            [
                "pr",
                "create",
                "--title",
                request.title.as_str(),
                "--body",
                request.body.as_str(),
                "--head",
                request.head.as_str(),
                "--base",
                request.base.as_str(),
            ],
        )?;
        // gh prints the new PR's URL as its last line
        let url = out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or_default();
        Ok(url.to_string())
    }

    fn list_open_pull_requests(&self, repo: &Path) -> ToolResult<Vec<OpenPullRequest>> {
        let out = self.cmd.run(
            Some(repo),
            [
                "pr",
                "list",
                "--state",
                "open",
                "--json",
                "title,url,headRefName",
            ],
        )?;
        if out.stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&out.stdout).map_err(|e| ToolError::Output {
            tool: Tool::Gh,
            message: format!("unexpected pr list output: {}", e),
        })
    }
}
