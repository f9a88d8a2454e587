//! In-process fakes of the git, dvc, gh and registry collaborators
//!
//! Available to this crate's unit tests and, with the `testing` feature, to
//! integration tests. The fakes work on real directories so operations see
//! the same filesystem effects they would with the real tools; remote
//! repositories are plain local directories registered by URL.

use crate::enclave::fsutil;
use crate::error::{RegistryError, RegistryResult, ToolError, ToolResult};
use crate::registry::{
    CatalogEntry, EntryProposal, ProductSummary, RegistrationStatus, Registry,
};
use crate::tools::{
    ContentTracker, HostingPlatform, OpenPullRequest, PullRequest, SourceControl, Tool,
};
use mintd_core::{CatalogValue, EntryKind};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Revision reported for remotes without an explicit one
pub const DEFAULT_REVISION: &str = "0123456789abcdef0123456789abcdef01234567";

fn failed(tool: Tool, command: String, stderr: &str) -> ToolError {
    ToolError::Failed {
        tool,
        command,
        exit_code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn io_error(tool: Tool) -> impl FnOnce(io::Error) -> ToolError {
    move |source| ToolError::Io { tool, source }
}

fn snapshot(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            snapshot(root, &path, out)?;
        } else {
            let body = String::from_utf8_lossy(&fs::read(&path)?).into_owned();
            out.insert(fsutil::relative_display(root, &path), body);
        }
    }
    Ok(())
}

// =============================================================================
// git
// =============================================================================

/// A commit made through [`FakeGit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Branch checked out at commit time
    pub branch: String,
    /// Commit message
    pub message: String,
    /// Working tree at commit time, keyed by `/`-separated relative path
    pub files: BTreeMap<String, String>,
}

/// Version control backed by local "remote" directories
#[derive(Debug, Default)]
pub struct FakeGit {
    remotes: RefCell<HashMap<String, PathBuf>>,
    revisions: RefCell<HashMap<String, String>>,
    failing: RefCell<HashSet<String>>,
    clones: RefCell<HashMap<PathBuf, String>>,
    branches: RefCell<HashMap<PathBuf, String>>,
    commits: RefCell<Vec<Commit>>,
    pushed: RefCell<Vec<String>>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `url` from the directory at `path`
    pub fn add_remote(&self, url: &str, path: &Path) {
        self.remotes
            .borrow_mut()
            .insert(url.to_string(), path.to_path_buf());
    }

    /// Head revision reported for clones of `url`
    pub fn set_revision(&self, url: &str, rev: &str) {
        self.revisions
            .borrow_mut()
            .insert(url.to_string(), rev.to_string());
    }

    /// Make clones of `url` fail
    pub fn fail_clone(&self, url: &str) {
        self.failing.borrow_mut().insert(url.to_string());
    }

    /// URLs cloned so far, in no particular order
    pub fn cloned_urls(&self) -> Vec<String> {
        self.clones.borrow().values().cloned().collect()
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.commits.borrow().clone()
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.borrow().clone()
    }

    fn origin_of(&self, repo: &Path) -> ToolResult<PathBuf> {
        let url = self.clones.borrow().get(repo).cloned().ok_or_else(|| {
            failed(
                Tool::Git,
                format!("git -C {} pull", repo.display()),
                "fatal: not a git repository",
            )
        })?;
        self.remotes.borrow().get(&url).cloned().ok_or_else(|| {
            failed(Tool::Git, format!("git pull {}", url), "fatal: remote gone")
        })
    }
}

impl SourceControl for FakeGit {
    fn clone_repo(&self, url: &str, dest: &Path) -> ToolResult<()> {
        let command = format!("git clone {} {}", url, dest.display());
        if self.failing.borrow().contains(url) {
            return Err(failed(Tool::Git, command, "fatal: Could not read from remote repository."));
        }
        let origin = self.remotes.borrow().get(url).cloned().ok_or_else(|| {
            failed(Tool::Git, command.clone(), "ERROR: Repository not found.")
        })?;
        fsutil::copy_dir(&origin, dest).map_err(io_error(Tool::Git))?;
        self.clones
            .borrow_mut()
            .insert(dest.to_path_buf(), url.to_string());
        Ok(())
    }

    fn refresh(&self, repo: &Path) -> ToolResult<()> {
        let origin = self.origin_of(repo)?;
        fsutil::replace_with_copy(&origin, repo).map_err(io_error(Tool::Git))
    }

    fn head_revision(&self, repo: &Path) -> ToolResult<String> {
        let url = self.clones.borrow().get(repo).cloned().unwrap_or_default();
        Ok(self
            .revisions
            .borrow()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| DEFAULT_REVISION.to_string()))
    }

    fn create_branch(&self, repo: &Path, branch: &str) -> ToolResult<()> {
        self.branches
            .borrow_mut()
            .insert(repo.to_path_buf(), branch.to_string());
        Ok(())
    }

    fn commit_all(&self, repo: &Path, message: &str) -> ToolResult<()> {
        let mut files = BTreeMap::new();
        snapshot(repo, repo, &mut files).map_err(io_error(Tool::Git))?;
        let branch = self
            .branches
            .borrow()
            .get(repo)
            .cloned()
            .unwrap_or_else(|| "main".to_string());
        self.commits.borrow_mut().push(Commit {
            branch,
            message: message.to_string(),
            files,
        });
        Ok(())
    }

    fn push_branch(&self, _repo: &Path, branch: &str) -> ToolResult<()> {
        self.pushed.borrow_mut().push(branch.to_string());
        Ok(())
    }
}

// =============================================================================
// gh
// =============================================================================

/// Hosting platform that records pull requests
#[derive(Debug, Default)]
pub struct FakeHosting {
    open: RefCell<Vec<OpenPullRequest>>,
    created: RefCell<Vec<PullRequest>>,
    fail_listing: Cell<bool>,
}

impl FakeHosting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_open_pr(&self, title: &str, url: &str, head: &str) {
        self.open.borrow_mut().push(OpenPullRequest {
            title: title.to_string(),
            url: url.to_string(),
            head_ref: head.to_string(),
        });
    }

    /// Make listing open pull requests fail
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.set(fail);
    }

    pub fn created(&self) -> Vec<PullRequest> {
        self.created.borrow().clone()
    }
}

impl HostingPlatform for FakeHosting {
    fn create_pull_request(&self, _repo: &Path, request: &PullRequest) -> ToolResult<String> {
        let mut created = self.created.borrow_mut();
        created.push(request.clone());
        Ok(format!("https://github.com/lab/registry/pull/{}", created.len()))
    }

    fn list_open_pull_requests(&self, _repo: &Path) -> ToolResult<Vec<OpenPullRequest>> {
        if self.fail_listing.get() {
            return Err(failed(
                Tool::Gh,
                "gh pr list".to_string(),
                "To get started with GitHub CLI, please run:  gh auth login",
            ));
        }
        Ok(self.open.borrow().clone())
    }
}

// =============================================================================
// dvc
// =============================================================================

/// A `dvc import` made through [`FakeDvc`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportCall {
    pub project: PathBuf,
    pub url: String,
    pub source_path: String,
    pub dest: String,
    pub rev: Option<String>,
}

/// Content tracker that records calls and writes pointer files on import
#[derive(Debug, Default)]
pub struct FakeDvc {
    remotes: RefCell<Vec<(String, String, Option<String>)>>,
    pulls: RefCell<Vec<(PathBuf, Vec<PathBuf>)>>,
    imports: RefCell<Vec<ImportCall>>,
    failing_pulls: RefCell<HashSet<String>>,
    failing_imports: RefCell<Vec<String>>,
}

impl FakeDvc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make pulls in a checkout directory named `repo` fail
    pub fn fail_pull(&self, repo: &str) {
        self.failing_pulls.borrow_mut().insert(repo.to_string());
    }

    /// Make imports whose URL contains `pattern` fail
    pub fn fail_import(&self, pattern: &str) {
        self.failing_imports.borrow_mut().push(pattern.to_string());
    }

    /// Configured remotes as `(name, url, endpoint)`
    pub fn remotes(&self) -> Vec<(String, String, Option<String>)> {
        self.remotes.borrow().clone()
    }

    pub fn pulls(&self) -> Vec<(PathBuf, Vec<PathBuf>)> {
        self.pulls.borrow().clone()
    }

    pub fn imports(&self) -> Vec<ImportCall> {
        self.imports.borrow().clone()
    }
}

impl ContentTracker for FakeDvc {
    fn configure_remote(
        &self,
        _repo: &Path,
        name: &str,
        url: &str,
        endpoint: Option<&str>,
    ) -> ToolResult<()> {
        self.remotes.borrow_mut().push((
            name.to_string(),
            url.to_string(),
            endpoint.map(str::to_string),
        ));
        Ok(())
    }

    fn pull(&self, repo: &Path, targets: &[PathBuf]) -> ToolResult<()> {
        let name = repo
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing_pulls.borrow().contains(&name) {
            return Err(failed(
                Tool::Dvc,
                "dvc pull".to_string(),
                "ERROR: failed to pull data from the cloud",
            ));
        }
        self.pulls
            .borrow_mut()
            .push((repo.to_path_buf(), targets.to_vec()));
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
        if self
            .failing_imports
            .borrow()
            .iter()
            .any(|p| url.contains(p.as_str()))
        {
            return Err(failed(
                Tool::Dvc,
                format!("dvc import {} {}", url, source_path),
                "ERROR: unexpected error - authentication failed",
            ));
        }
        let trimmed = dest.trim_end_matches('/');
        fs::create_dir_all(project.join(trimmed)).map_err(io_error(Tool::Dvc))?;
        let pointer = format!(
            "deps:\n- path: {}\n  repo:\n    url: {}\nouts:\n- path: {}\n",
            source_path,
            url,
            Path::new(trimmed)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        fs::write(project.join(format!("{}.dvc", trimmed)), pointer)
            .map_err(io_error(Tool::Dvc))?;
        self.imports.borrow_mut().push(ImportCall {
            project: project.to_path_buf(),
            url: url.to_string(),
            source_path: source_path.to_string(),
            dest: dest.to_string(),
            rev: rev.map(str::to_string),
        });
        Ok(())
    }
}

// =============================================================================
// registry
// =============================================================================

/// In-memory registry
#[derive(Debug, Default)]
pub struct FakeRegistry {
    entries: RefCell<BTreeMap<String, CatalogEntry>>,
    open: RefCell<Vec<OpenPullRequest>>,
    submitted: RefCell<Vec<EntryProposal>>,
    fail: Cell<bool>,
}

const FAKE_REGISTRY_URL: &str = "https://github.com/lab/registry";

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, kind: EntryKind, name: &str, value: CatalogValue) {
        self.entries.borrow_mut().insert(
            name.to_string(),
            CatalogEntry {
                kind,
                path: kind.entry_path(name),
                value,
            },
        );
    }

    /// Register a data product with its repository and, optionally, its
    /// content-tracking remote
    pub fn add_data_product(&self, name: &str, github_url: &str, remote_url: Option<&str>) {
        let mut value = CatalogValue::default();
        value.set_path("project.name", name.into());
        value.set_path("project.type", "data".into());
        value.set_path("project.full_name", format!("data_{}", name).into());
        value.set_path("repository.github_url", github_url.into());
        if let Some(url) = remote_url {
            value.set_path("storage.dvc.remote_url", url.into());
        }
        self.add_entry(EntryKind::Data, name, value);
    }

    pub fn add_open_pr(&self, title: &str, url: &str, head: &str) {
        self.open.borrow_mut().push(OpenPullRequest {
            title: title.to_string(),
            url: url.to_string(),
            head_ref: head.to_string(),
        });
    }

    /// Make submissions fail as if the hosting platform rejected them
    pub fn fail_submissions(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn submitted(&self) -> Vec<EntryProposal> {
        self.submitted.borrow().clone()
    }
}

impl Registry for FakeRegistry {
    fn url(&self) -> &str {
        FAKE_REGISTRY_URL
    }

    fn fetch_entry(&self, name: &str) -> RegistryResult<CatalogEntry> {
        self.entries
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    fn query_data_product(&self, name: &str) -> RegistryResult<CatalogValue> {
        let entries = self.entries.borrow();
        match entries.get(name) {
            Some(e) if e.kind == EntryKind::Data => Ok(e.value.clone()),
            _ => Err(RegistryError::ProductNotFound {
                name: name.to_string(),
                available: entries
                    .iter()
                    .filter(|(_, e)| e.kind == EntryKind::Data)
                    .map(|(n, _)| n.clone())
                    .collect(),
            }),
        }
    }

    fn list_data_products(&self) -> RegistryResult<Vec<ProductSummary>> {
        Ok(self
            .entries
            .borrow()
            .iter()
            .filter(|(_, e)| e.kind == EntryKind::Data)
            .map(|(n, e)| ProductSummary::from_entry(n, &e.value))
            .collect())
    }

    fn submit(&self, proposal: &EntryProposal) -> RegistryResult<String> {
        if self.fail.get() {
            return Err(failed(
                Tool::Gh,
                "gh pr create".to_string(),
                "pull request create failed: GraphQL: Could not resolve to a Repository",
            )
            .into());
        }
        let mut submitted = self.submitted.borrow_mut();
        submitted.push(proposal.clone());
        Ok(format!("{}/pull/{}", FAKE_REGISTRY_URL, submitted.len()))
    }

    fn registration_status(&self, name: &str) -> RegistryResult<RegistrationStatus> {
        if let Some(entry) = self.entries.borrow().get(name) {
            return Ok(RegistrationStatus::Registered {
                kind: entry.kind,
                full_name: format!("{}_{}", entry.kind.type_name(), name),
                url: format!("{}/blob/main/{}", FAKE_REGISTRY_URL, entry.path),
            });
        }
        let branch = format!("register-{}", name);
        Ok(self
            .open
            .borrow()
            .iter()
            .find(|pr| pr.head_ref.contains(&branch))
            .map(|pr| RegistrationStatus::PendingReview {
                pr_url: pr.url.clone(),
                pr_title: pr.title.clone(),
            })
            .unwrap_or(RegistrationStatus::NotFound))
    }
}
