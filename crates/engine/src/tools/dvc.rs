use super::{ContentTracker, Tool, ToolCommand};
use crate::error::ToolResult;
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Remote name assumed when a repository's tracker config names none
pub const DEFAULT_REMOTE_NAME: &str = "storage";

/// `dvc` command-line client
#[derive(Debug, Clone)]
pub struct Dvc {
    cmd: ToolCommand,
}

impl Dvc {
    /// Client with the given per-command budget
    pub fn new(timeout: Duration) -> Self {
        Self::with_command(ToolCommand::new(Tool::Dvc).with_timeout(timeout))
    }

    /// Client driving a preconfigured runner
    pub fn with_command(cmd: ToolCommand) -> Self {
        Self { cmd }
    }
}

impl ContentTracker for Dvc {
    fn configure_remote(
        &self,
        repo: &Path,
        name: &str,
        url: &str,
        endpoint: Option<&str>,
    ) -> ToolResult<()> {
        self.cmd
            .run(Some(repo), ["remote", "add", "-f", name, url])?;
        if let Some(endpoint) = endpoint {
            self.cmd
                .run(Some(repo), ["remote", "modify", name, "endpointurl", endpoint])?;
        }
        Ok(())
    }

    fn pull(&self, repo: &Path, targets: &[PathBuf]) -> ToolResult<()> {
        let mut args: Vec<OsString> = vec!["pull".into()];
        args.extend(targets.iter().map(|t| t.as_os_str().to_owned()));
        self.cmd.run(Some(repo), args)?;
        Ok(())
    }

    fn import(
        &self,
        project: &Path,
        url: &str,
        source_path: &str,
        dest: &str,
        rev: Option<&str>,
    ) -> ToolResult<()> {
        let mut args = vec!["import", url, source_path, "-o", dest];
        if let Some(rev) = rev {
            args.extend(["--rev", rev]);
        }
        self.cmd.run(Some(project), args)?;
        Ok(())
    }
}

/// Remote name configured in `repo/.dvc/config`, or [`DEFAULT_REMOTE_NAME`].
///
/// Only the `remote = <name>` line of the `[core]` section matters here, so
/// the file is scanned line by line rather than parsed as a whole.
pub fn read_remote_name(repo: &Path) -> String {
    let config = repo.join(".dvc").join("config");
    let Ok(text) = fs::read_to_string(&config) else {
        return DEFAULT_REMOTE_NAME.to_string();
    };
    text.lines()
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == "remote")
        .map(|(_, value)| value.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_REMOTE_NAME.to_string())
}

#[derive(Deserialize)]
struct PointerFile {
    #[serde(default)]
    outs: Vec<PointerOut>,
}

#[derive(Deserialize)]
struct PointerOut {
    md5: Option<String>,
}

/// Content hash recorded in the stage pointer `repo/data/<stage>.dvc`.
///
/// The first output carrying a hash wins. Returns `None` when the pointer
/// is missing, unreadable or has no hashed output.
pub fn read_stage_hash(repo: &Path, stage: &str) -> Option<String> {
    let pointer = stage_pointer(repo, stage);
    let text = fs::read_to_string(&pointer).ok()?;
    let parsed: PointerFile = match serde_yaml::from_str(&text) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(target: "mintd::tools", pointer = %pointer.display(), error = %e, "Unreadable stage pointer");
            return None;
        }
    };
    parsed
        .outs
        .into_iter()
        .find_map(|out| out.md5.filter(|md5| !md5.is_empty()))
}

/// Path of the pointer file that tracks `data/<stage>`
pub fn stage_pointer(repo: &Path, stage: &str) -> PathBuf {
    repo.join("data").join(format!("{}.dvc", stage))
}
