use super::{
    CatalogEntry, EntryProposal, ProductSummary, RegistrationStatus, Registry,
};
use crate::config::MintConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::tools::{
    parse_github_repo, Gh, Git, HostingPlatform, PullRequest, SourceControl,
};
use mintd_core::{CatalogValue, EntryKind};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const CLONE_PREFIX: &str = "mintd-registry-";

/// A throwaway clone, removed on drop
struct Checkout {
    _dir: TempDir,
    repo: PathBuf,
}

/// Registry backed by a GitHub repository, driven through git and gh
#[derive(Debug, Clone)]
pub struct GitRegistry<S = Git, H = Gh> {
    url: String,
    org: String,
    name: String,
    default_branch: String,
    git: S,
    gh: H,
}

impl GitRegistry<Git, Gh> {
    /// Registry from the user configuration, using the real git and gh
    pub fn from_config(config: &MintConfig) -> RegistryResult<Self> {
        let url = config
            .registry
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(RegistryError::NotConfigured)?;
        let timeout = config.tool_timeout();
        Self::new(
            url,
            &config.registry.default_branch,
            Git::new(timeout),
            Gh::new(timeout),
        )
    }
}

impl<S: SourceControl, H: HostingPlatform> GitRegistry<S, H> {
    /// Registry at `url` (`https://github.com/<org>/<name>` or SSH form)
    pub fn new(url: &str, default_branch: &str, git: S, gh: H) -> RegistryResult<Self> {
        let (org, name) =
            parse_github_repo(url).ok_or_else(|| RegistryError::InvalidUrl(url.to_string()))?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            org,
            name,
            default_branch: default_branch.to_string(),
            git,
            gh,
        })
    }

    /// Version control used for clones and branches
    pub fn source_control(&self) -> &S {
        &self.git
    }

    /// Platform pull requests are opened on
    pub fn hosting(&self) -> &H {
        &self.gh
    }

    /// SSH URL the registry is cloned from
    pub fn clone_url(&self) -> String {
        format!("git@github.com:{}/{}.git", self.org, self.name)
    }

    fn checkout(&self) -> RegistryResult<Checkout> {
        let dir = tempfile::Builder::new().prefix(CLONE_PREFIX).tempdir()?;
        let repo = dir.path().join(&self.name);
        let url = self.clone_url();
        debug!(target: "mintd::registry", url = %url, dest = %repo.display(), "Cloning registry");
        self.git.clone_repo(&url, &repo)?;
        Ok(Checkout { _dir: dir, repo })
    }

    fn find_in(repo: &Path, name: &str) -> RegistryResult<Option<CatalogEntry>> {
        for kind in EntryKind::ALL {
            let rel = kind.entry_path(name);
            let path = repo.join(&rel);
            if path.is_file() {
                let value = read_entry(&path, &rel)?;
                return Ok(Some(CatalogEntry {
                    kind,
                    path: rel,
                    value,
                }));
            }
        }
        Ok(None)
    }
}

fn read_entry(path: &Path, rel: &str) -> RegistryResult<CatalogValue> {
    let text = fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| RegistryError::InvalidEntry {
        path: rel.to_string(),
        reason: e.to_string(),
    })
}

fn yaml_stems(dir: &Path) -> RegistryResult<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            out.push((stem.to_string(), path.clone()));
        }
    }
    out.sort();
    Ok(out)
}

impl<S: SourceControl, H: HostingPlatform> Registry for GitRegistry<S, H> {
    fn url(&self) -> &str {
        &self.url
    }

    fn fetch_entry(&self, name: &str) -> RegistryResult<CatalogEntry> {
        let checkout = self.checkout()?;
        Self::find_in(&checkout.repo, name)?.ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })
    }

    fn query_data_product(&self, name: &str) -> RegistryResult<CatalogValue> {
        let checkout = self.checkout()?;
        let rel = EntryKind::Data.entry_path(name);
        let path = checkout.repo.join(&rel);
        if !path.is_file() {
            let data_dir = checkout.repo.join("catalog").join(EntryKind::Data.dir_name());
            let available = yaml_stems(&data_dir)?
                .into_iter()
                .map(|(stem, _)| stem)
                .collect();
            return Err(RegistryError::ProductNotFound {
                name: name.to_string(),
                available,
            });
        }
        read_entry(&path, &rel)
    }

    fn list_data_products(&self) -> RegistryResult<Vec<ProductSummary>> {
        let checkout = self.checkout()?;
        let data_dir = checkout.repo.join("catalog").join(EntryKind::Data.dir_name());
        let mut products = Vec::new();
        for (stem, path) in yaml_stems(&data_dir)? {
            match read_entry(&path, &stem) {
                Ok(entry) => products.push(ProductSummary::from_entry(&stem, &entry)),
                Err(e) => {
                    debug!(target: "mintd::registry", entry = %stem, error = %e, "Skipping malformed entry")
                }
            }
        }
        Ok(products)
    }

    fn submit(&self, proposal: &EntryProposal) -> RegistryResult<String> {
        let checkout = self.checkout()?;
        let repo = &checkout.repo;

        self.git.create_branch(repo, &proposal.branch)?;

        let rel = proposal.kind.entry_path(&proposal.name);
        let path = repo.join(&rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(&proposal.entry).map_err(|e| {
            RegistryError::InvalidEntry {
                path: rel.clone(),
                reason: e.to_string(),
            }
        })?;
        fs::write(&path, yaml)?;
        debug!(target: "mintd::registry", entry = %rel, "Wrote catalog entry");

        self.git.commit_all(repo, &proposal.commit_message)?;
        self.git.push_branch(repo, &proposal.branch)?;

        let pr_url = self.gh.create_pull_request(
            repo,
            &PullRequest {
                title: proposal.title.clone(),
                body: proposal.body.clone(),
                head: proposal.branch.clone(),
                base: self.default_branch.clone(),
            },
        )?;
        info!(target: "mintd::registry", branch = %proposal.branch, pr = %pr_url, "Opened pull request");
        Ok(pr_url)
    }

    fn registration_status(&self, name: &str) -> RegistryResult<RegistrationStatus> {
        let checkout = self.checkout()?;
        if let Some(entry) = Self::find_in(&checkout.repo, name)? {
            let type_name = entry.kind.type_name();
            return Ok(RegistrationStatus::Registered {
                kind: entry.kind,
                full_name: format!("{}_{}", type_name, name),
                url: format!("{}/blob/{}/{}", self.url, self.default_branch, entry.path),
            });
        }

        let branch = format!("register-{}", name);
        match self.gh.list_open_pull_requests(&checkout.repo) {
            Ok(prs) => {
                if let Some(pr) = prs.into_iter().find(|pr| pr.head_ref.contains(&branch)) {
                    return Ok(RegistrationStatus::PendingReview {
                        pr_url: pr.url,
                        pr_title: pr.title,
                    });
                }
            }
            Err(e) => {
                warn!(target: "mintd::registry", error = %e, "Could not list open pull requests");
            }
        }
        Ok(RegistrationStatus::NotFound)
    }
}
