use super::{SourceControl, Tool, ToolCommand};
use crate::error::{ToolError, ToolResult};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// `git` command-line client
#[derive(Debug, Clone)]
pub struct Git {
    cmd: ToolCommand,
}

impl Git {
    /// Client with the given per-command budget. Credential prompts are
    /// disabled so a missing key fails instead of hanging.
    pub fn new(timeout: Duration) -> Self {
        Self::with_command(
            ToolCommand::new(Tool::Git)
                .with_timeout(timeout)
                .env("GIT_TERMINAL_PROMPT", "0"),
        )
    }

    /// Client driving a preconfigured runner
    pub fn with_command(cmd: ToolCommand) -> Self {
        Self { cmd }
    }
}

impl SourceControl for Git {
    fn clone_repo(&self, url: &str, dest: &Path) -> ToolResult<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| ToolError::Io {
                tool: Tool::Git,
                source,
            })?;
        }
        let args: [&OsStr; 3] = [OsStr::new("clone"), OsStr::new(url), dest.as_os_str()];
        self.cmd.run(None, args)?;
        Ok(())
    }

    fn refresh(&self, repo: &Path) -> ToolResult<()> {
        self.cmd.run(Some(repo), ["reset", "--hard"])?;
        self.cmd.run(Some(repo), ["pull"])?;
        Ok(())
    }

    fn head_revision(&self, repo: &Path) -> ToolResult<String> {
        let out = self.cmd.run(Some(repo), ["rev-parse", "HEAD"])?;
        let rev = out.stdout.trim();
        if rev.is_empty() {
            return Err(ToolError::Output {
                tool: Tool::Git,
                message: "rev-parse HEAD printed nothing".to_string(),
            });
        }
        Ok(rev.to_string())
    }

    fn create_branch(&self, repo: &Path, branch: &str) -> ToolResult<()> {
        match self.cmd.run(Some(repo), ["checkout", "-b", branch]) {
            Ok(_) => Ok(()),
            Err(ToolError::Failed { .. }) => {
                debug!(target: "mintd::tools", branch, "Branch exists, checking it out");
                self.cmd.run(Some(repo), ["checkout", branch])?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn commit_all(&self, repo: &Path, message: &str) -> ToolResult<()> {
        self.cmd.run(Some(repo), ["add", "."])?;
        self.cmd.run(Some(repo), ["commit", "-m", message])?;
        Ok(())
    }

    fn push_branch(&self, repo: &Path, branch: &str) -> ToolResult<()> {
        self.cmd.run(Some(repo), ["push", "-u", "origin", branch])?;
        Ok(())
    }
}
