//! External collaborators: version control, content tracking, hosting platform
//!
//! Operations talk to git, dvc and gh only through the traits below. The
//! real implementations shell out through [`ToolCommand`]; tests substitute
//! in-process fakes.

mod dvc;
mod gh;
mod git;
mod runner;

pub use dvc::{read_remote_name, read_stage_hash, stage_pointer, Dvc, DEFAULT_REMOTE_NAME};
pub use gh::Gh;
pub use git::Git;
pub use runner::{ToolCommand, ToolOutput, DEFAULT_TIMEOUT};

use crate::error::ToolResult;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// The external executables mintd drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Version control
    Git,
    /// Content tracking
    Dvc,
    /// Hosting platform CLI
    Gh,
}

impl Tool {
    /// Executable name
    pub fn executable(self) -> &'static str {
        match self {
            Tool::Git => "git",
            Tool::Dvc => "dvc",
            Tool::Gh => "gh",
        }
    }

    /// How to install the executable
    pub fn install_hint(self) -> &'static str {
        match self {
            Tool::Git => "Install git from https://git-scm.com/",
            Tool::Dvc => "Install DVC with: pip install dvc or see https://dvc.org/doc/install",
            Tool::Gh => "Install GitHub CLI from https://cli.github.com/",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable())
    }
}

/// Version-control client
pub trait SourceControl {
    /// Clone `url` into `dest` (which must not exist yet)
    fn clone_repo(&self, url: &str, dest: &Path) -> ToolResult<()>;

    /// Discard local changes in `repo` and pull from its origin
    fn refresh(&self, repo: &Path) -> ToolResult<()>;

    /// Full revision id of `HEAD`
    fn head_revision(&self, repo: &Path) -> ToolResult<String>;

    /// Create and check out `branch`, or check it out if it already exists
    fn create_branch(&self, repo: &Path, branch: &str) -> ToolResult<()>;

    /// Stage everything and commit
    fn commit_all(&self, repo: &Path, message: &str) -> ToolResult<()>;

    /// Push `branch` to origin and set upstream
    fn push_branch(&self, repo: &Path, branch: &str) -> ToolResult<()>;
}

/// Content-tracking client
pub trait ContentTracker {
    /// Point remote `name` at `url`, optionally with a custom endpoint
    fn configure_remote(
        &self,
        repo: &Path,
        name: &str,
        url: &str,
        endpoint: Option<&str>,
    ) -> ToolResult<()>;

    /// Fetch tracked data; an empty target list pulls everything
    fn pull(&self, repo: &Path, targets: &[PathBuf]) -> ToolResult<()>;

    /// Import `source_path` of the repository at `url` into `dest` inside
    /// `project`, pinned to `rev` when given
    fn import(
        &self,
        project: &Path,
        url: &str,
        source_path: &str,
        dest: &str,
        rev: Option<&str>,
    ) -> ToolResult<()>;
}

/// Pull request to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Title
    pub title: String,
    /// Markdown body
    pub body: String,
    /// Source branch
    pub head: String,
    /// Target branch
    pub base: String,
}

/// An open pull request as listed by the hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenPullRequest {
    /// Title
    pub title: String,
    /// Web URL
    pub url: String,
    /// Source branch
    #[serde(rename = "headRefName")]
    pub head_ref: String,
}

/// Hosting-platform client
pub trait HostingPlatform {
    /// Open a pull request from within `repo`; returns its URL
    fn create_pull_request(&self, repo: &Path, request: &PullRequest) -> ToolResult<String>;

    /// Open pull requests of the repository checked out at `repo`
    fn list_open_pull_requests(&self, repo: &Path) -> ToolResult<Vec<OpenPullRequest>>;
}

const GITHUB_HTTPS: &str = "https://github.com/";

/// Rewrite a GitHub HTTPS URL to its SSH form; other URLs pass through.
pub fn to_ssh_url(url: &str) -> String {
    match url.strip_prefix(GITHUB_HTTPS) {
        Some(path) => {
            let path = path.trim_end_matches('/');
            let path = path.strip_suffix(".git").unwrap_or(path);
            format!("git@github.com:{}.git", path)
        }
        None => url.to_string(),
    }
}

/// `(org, repo)` of a GitHub URL in HTTPS or SSH form
pub fn parse_github_repo(url: &str) -> Option<(String, String)> {
    let path = url
        .strip_prefix(GITHUB_HTTPS)
        .or_else(|| url.strip_prefix("http://github.com/"))
        .or_else(|| url.strip_prefix("git@github.com:"))?;
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut parts = path.split('/');
    match (parts.next(), parts.next()) {
        (Some(org), Some(repo)) if !org.is_empty() && !repo.is_empty() => {
            Some((org.to_string(), repo.to_string()))
        }
        _ => None,
    }
}
