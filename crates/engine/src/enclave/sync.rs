//! Sync/Promote: fetch one pipeline stage of an approved product into a
//! versioned download directory.

use super::fsutil;
use super::{Enclave, EnclaveWarning};
use crate::error::{EnclaveError, EnclaveResult, RegistryError};
use crate::registry::Registry;
use crate::tools::{
    read_remote_name, read_stage_hash, stage_pointer, to_ssh_url, ContentTracker, SourceControl,
};
use chrono::NaiveDate;
use mintd_core::{short_hash, timestamp_now, ApprovedProduct, DownloadRecord, Upsert, VersionId};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Collaborators a pull needs
pub struct SyncContext<'a> {
    registry: &'a dyn Registry,
    git: &'a dyn SourceControl,
    dvc: &'a dyn ContentTracker,
    storage_endpoint: Option<String>,
    date: Option<NaiveDate>,
}

impl<'a> SyncContext<'a> {
    /// Context over the given registry, version control and content tracker
    pub fn new(
        registry: &'a dyn Registry,
        git: &'a dyn SourceControl,
        dvc: &'a dyn ContentTracker,
    ) -> Self {
        Self {
            registry,
            git,
            dvc,
            storage_endpoint: None,
            date: None,
        }
    }

    /// Endpoint applied to content-tracking remotes
    pub fn with_storage_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.storage_endpoint = endpoint;
        self
    }

    /// Date used in version identifiers, instead of today
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

/// Which approved products to pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullTarget {
    /// Every approved product, in approval order
    All,
    /// One approved product
    Repo(String),
    /// The only approved product; ambiguous if there are several
    Default,
}

/// One promoted version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledVersion {
    /// Product repo
    pub repo: String,
    /// Version folder
    pub version: VersionId,
    /// Content hash of the stage output
    pub content_hash: String,
    /// Staging clone revision
    pub source_revision: String,
    /// Download directory, relative to the enclave root
    pub local_path: String,
    /// Whether the download record was new or refreshed
    pub upsert: Upsert,
    /// Non-fatal conditions
    pub warnings: Vec<EnclaveWarning>,
}

/// Outcome of pulling one repo
#[derive(Debug)]
pub struct RepoPull {
    /// Product repo
    pub repo: String,
    /// Promoted version, or why the pull failed
    pub result: EnclaveResult<PulledVersion>,
}

/// Outcome of a pull over one or more repos
#[derive(Debug, Default)]
pub struct PullReport {
    /// Per-repo results, in pull order
    pub repos: Vec<RepoPull>,
}

impl PullReport {
    /// Repos that were promoted
    pub fn succeeded(&self) -> impl Iterator<Item = &PulledVersion> {
        self.repos.iter().filter_map(|r| r.result.as_ref().ok())
    }

    /// Repos that failed, with their errors
    pub fn failed(&self) -> impl Iterator<Item = (&str, &EnclaveError)> {
        self.repos
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (r.repo.as_str(), e)))
    }

    /// Whether every repo was promoted
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

impl Enclave {
    /// Pull approved products.
    ///
    /// Target resolution errors (not approved, ambiguous, nothing approved)
    /// are returned directly. Once targets are known, each repo is pulled in
    /// turn and a failure is recorded in the report without stopping the
    /// others.
    pub fn pull(&self, ctx: &SyncContext<'_>, target: PullTarget) -> EnclaveResult<PullReport> {
        let manifest = self.store().load()?;
        let approved = &manifest.approved_products;
        if approved.is_empty() {
            return Err(EnclaveError::NoApprovedProducts);
        }

        let targets: Vec<ApprovedProduct> = match target {
            PullTarget::All => approved.clone(),
            PullTarget::Repo(repo) => match manifest.approved(&repo) {
                Some(p) => vec![p.clone()],
                None => return Err(EnclaveError::NotApproved { repo }),
            },
            PullTarget::Default if approved.len() == 1 => approved.clone(),
            PullTarget::Default => {
                return Err(EnclaveError::AmbiguousTarget {
                    approved: approved.iter().map(|p| p.repo.clone()).collect(),
                })
            }
        };

        let mut report = PullReport::default();
        for product in targets {
            info!(target: "mintd::enclave", repo = %product.repo, stage = %product.stage, "Pulling");
            let result = self.pull_one(ctx, &product);
            if let Err(e) = &result {
                warn!(target: "mintd::enclave", repo = %product.repo, error = %e, "Pull failed");
            }
            report.repos.push(RepoPull {
                repo: product.repo,
                result,
            });
        }
        Ok(report)
    }

    fn pull_one(&self, ctx: &SyncContext<'_>, product: &ApprovedProduct) -> EnclaveResult<PulledVersion> {
        let repo = product.repo.as_str();
        let stage = product.stage.as_str();

        let entry = ctx.registry.query_data_product(repo).map_err(|e| match e {
            RegistryError::ProductNotFound { .. } | RegistryError::NotFound { .. } => {
                EnclaveError::ProductNotFound {
                    repo: repo.to_string(),
                }
            }
            other => other.into(),
        })?;
        let repo_url = entry
            .str_at("repository.github_url")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| EnclaveError::IncompleteEntry {
                repo: repo.to_string(),
                reason: "missing repository.github_url".to_string(),
            })?;
        let remote_url = entry
            .str_at("storage.dvc.remote_url")
            .filter(|u| !u.is_empty());

        let staging = self.staging_dir(repo);
        if staging.is_dir() {
            debug!(target: "mintd::enclave", repo, "Refreshing staging clone");
            ctx.git.refresh(&staging)?;
        } else {
            ctx.git.clone_repo(&to_ssh_url(repo_url), &staging)?;
        }

        match remote_url {
            Some(url) => {
                let name = read_remote_name(&staging);
                ctx.dvc
                    .configure_remote(&staging, &name, url, ctx.storage_endpoint.as_deref())?;
            }
            None => {
                debug!(target: "mintd::enclave", repo, "No remote URL in registry, using the clone's own remote")
            }
        }

        let targets: Vec<PathBuf> = if stage_pointer(&staging, stage).is_file() {
            vec![PathBuf::from("data").join(format!("{}.dvc", stage))]
        } else {
            Vec::new()
        };
        ctx.dvc.pull(&staging, &targets)?;

        let source_revision = ctx.git.head_revision(&staging)?;
        let content_hash = read_stage_hash(&staging, stage)
            .unwrap_or_else(|| short_hash(&source_revision).to_string());
        let version = VersionId::derive_on(&content_hash, ctx.today());

        let dest = self.download_dir(repo, &version);
        fs::create_dir_all(&dest)?;
        let stage_src = staging.join("data").join(stage);
        let all_src = staging.join("data");
        if stage_src.is_dir() {
            fsutil::replace_with_copy(&stage_src, &dest.join(stage))?;
        } else if all_src.is_dir() {
            debug!(target: "mintd::enclave", repo, stage, "Stage directory absent, promoting all of data/");
            fsutil::replace_with_copy(&all_src, &dest.join("data"))?;
        } else {
            warn!(target: "mintd::enclave", repo, "Staging clone has no data/ directory");
        }

        let local_path = self.manifest_path(&dest);
        let record = DownloadRecord {
            repo: repo.to_string(),
            content_hash: content_hash.clone(),
            source_revision: source_revision.clone(),
            downloaded_at: timestamp_now(),
            local_path: local_path.clone(),
        };

        let (upsert, warnings) = self.store().update(|m| {
            let mut warnings = Vec::new();
            if let Some(t) = m.find_transfer(repo, &content_hash) {
                let warning = EnclaveWarning::AlreadyTransferred {
                    repo: repo.to_string(),
                    content_hash: content_hash.clone(),
                    transfer_id: t.transfer_id.clone(),
                    transfer_date: t.transfer_date.clone(),
                };
                warn!(target: "mintd::enclave", "{}", warning);
                warnings.push(warning);
            }
            Ok::<_, EnclaveError>((m.record_download(record), warnings))
        })?;

        info!(target: "mintd::enclave", repo, version = %version, "Promoted");
        Ok(PulledVersion {
            repo: repo.to_string(),
            version,
            content_hash,
            source_revision,
            local_path,
            upsert,
            warnings,
        })
    }
}
