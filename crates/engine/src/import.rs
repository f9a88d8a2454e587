//! Import Transaction: bring registered data products into an analysis
//! project as tracked dependencies.
//!
//! The content import and the descriptor update are two separate steps. A
//! failed import leaves no dependency record; a failed descriptor update
//! after a good import is reported on the [`ImportOutcome`] and leaves the
//! imported data in place.
//!
//! [`ImportTransaction`] accumulates per-product results and writes a
//! snapshot to `.mintd/import_state.json` after every product, so an
//! interrupted batch can be audited. The snapshot is removed once a whole
//! batch succeeds. Rollback actions are registered for every import but are
//! only run when the caller asks for it.

use crate::error::{ImportError, RegistryError, ToolError};
use crate::registry::Registry;
use crate::tools::{to_ssh_url, ContentTracker, Tool};
use mintd_core::{
    timestamp_now, CoreError, DependencyRecord, DescriptorStore, StateFile, Upsert, DEFAULT_STAGE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory under a project holding mintd state
pub const STATE_DIR: &str = ".mintd";
/// Recovery snapshot file name
pub const IMPORT_STATE_FILE: &str = "import_state.json";
/// Default parent of stage imports
pub const IMPORTS_DIR: &str = "data/imports";

/// Outcome of importing one product, as recorded in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Product name
    pub product_name: String,
    /// Whether the content import succeeded
    pub success: bool,
    /// Failure message
    #[serde(default)]
    pub error_message: Option<String>,
    /// Pointer file written by the import
    #[serde(alias = "dvc_file", default)]
    pub artifact_pointer: Option<String>,
    /// Destination inside the project
    #[serde(default)]
    pub local_path: Option<String>,
    /// Revision the import was pinned to
    #[serde(alias = "source_commit", default)]
    pub source_revision: Option<String>,
}

impl ImportResult {
    fn failure(product: &str, error: &ImportError) -> Self {
        Self {
            product_name: product.to_string(),
            success: false,
            error_message: Some(error.to_string()),
            artifact_pointer: None,
            local_path: None,
            source_revision: None,
        }
    }
}

/// Counts over a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Products attempted
    pub total: usize,
    /// Products imported
    pub successful: usize,
    /// Products that failed
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ImportState {
    started_at: String,
    #[serde(default)]
    completed: Vec<ImportResult>,
    #[serde(default)]
    failed: Vec<ImportResult>,
    #[serde(default)]
    rollback_actions_count: usize,
}

type RollbackAction = Box<dyn FnOnce() -> io::Result<()>>;

/// Accumulated results of a multi-product import
pub struct ImportTransaction {
    state: StateFile,
    started_at: String,
    completed: Vec<ImportResult>,
    failed: Vec<ImportResult>,
    rollback_actions: Vec<(String, RollbackAction)>,
}

impl fmt::Debug for ImportTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportTransaction")
            .field("state", &self.state.path())
            .field("completed", &self.completed)
            .field("failed", &self.failed)
            .field("rollback_actions", &self.rollback_actions.len())
            .finish()
    }
}

impl ImportTransaction {
    /// Empty transaction for the project at `project`
    pub fn new(project: &Path) -> Self {
        Self {
            state: StateFile::json(state_path(project)),
            started_at: timestamp_now(),
            completed: Vec::new(),
            failed: Vec::new(),
            rollback_actions: Vec::new(),
        }
    }

    /// Snapshot path
    pub fn state_path(&self) -> &Path {
        self.state.path()
    }

    /// Imports that succeeded, in order
    pub fn completed(&self) -> &[ImportResult] {
        &self.completed
    }

    /// Imports that failed, in order
    pub fn failed(&self) -> &[ImportResult] {
        &self.failed
    }

    /// Record a completed import
    pub fn add_success(&mut self, result: ImportResult) {
        self.completed.push(result);
    }

    /// Record a failed import
    pub fn add_failure(&mut self, result: ImportResult) {
        self.failed.push(result);
    }

    /// Register a cleanup step, run by [`rollback`](Self::rollback)
    pub fn add_rollback_action<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> io::Result<()> + 'static,
    {
        self.rollback_actions.push((label.into(), Box::new(action)));
    }

    /// Run every registered cleanup step, newest first.
    ///
    /// A failing step is logged and the rest still run. Returns the number
    /// of steps that failed.
    pub fn rollback(&mut self) -> usize {
        info!(target: "mintd::import", actions = self.rollback_actions.len(), "Rolling back imports");
        let mut failures = 0;
        while let Some((label, action)) = self.rollback_actions.pop() {
            if let Err(e) = action() {
                warn!(target: "mintd::import", action = %label, error = %e, "Rollback action failed");
                failures += 1;
            }
        }
        failures
    }

    /// Counts of attempted, completed and failed imports
    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            total: self.completed.len() + self.failed.len(),
            successful: self.completed.len(),
            failed: self.failed.len(),
        }
    }

    /// Write the snapshot
    pub fn save_state(&self) -> Result<(), ImportError> {
        let state = ImportState {
            started_at: self.started_at.clone(),
            completed: self.completed.clone(),
            failed: self.failed.clone(),
            rollback_actions_count: self.rollback_actions.len(),
        };
        self.state.save(&state).map_err(ImportError::State)
    }

    /// Restore results from the snapshot.
    ///
    /// Returns `false` when there is no snapshot or it cannot be parsed.
    pub fn load_state(&mut self) -> Result<bool, ImportError> {
        match self.state.load::<ImportState>() {
            Ok(state) => {
                self.started_at = state.started_at;
                self.completed = state.completed;
                self.failed = state.failed;
                Ok(true)
            }
            Err(CoreError::ManifestNotFound { .. }) => Ok(false),
            Err(CoreError::ManifestCorrupt { path, reason }) => {
                warn!(target: "mintd::import", path = %path.display(), %reason, "Ignoring unreadable import snapshot");
                Ok(false)
            }
            Err(e) => Err(ImportError::State(e)),
        }
    }

    /// Delete the snapshot if present
    pub fn cleanup_state(&self) -> Result<(), ImportError> {
        match fs::remove_file(self.state.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ImportError::State(CoreError::Io(e))),
        }
    }
}

/// Snapshot path for a project
pub fn state_path(project: &Path) -> PathBuf {
    project.join(STATE_DIR).join(IMPORT_STATE_FILE)
}

/// One product to import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRequest {
    /// Product name
    pub product: String,
    /// Pipeline stage; `final` when neither stage nor path is given
    pub stage: Option<String>,
    /// Path inside the product repository, instead of a stage
    pub source_path: Option<String>,
    /// Destination inside the project
    pub dest: Option<String>,
    /// Revision to pin
    pub rev: Option<String>,
}

impl ImportRequest {
    /// Request for the default stage of `product`
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            ..Self::default()
        }
    }
}

/// A successful content import
#[derive(Debug)]
pub struct ImportOutcome {
    /// What was imported
    pub result: ImportResult,
    /// How the dependency record was written, if it was
    pub upsert: Option<Upsert>,
    /// Descriptor update failure; the data is imported regardless
    pub metadata_error: Option<ImportError>,
}

/// Per-product result of a batch
#[derive(Debug)]
pub struct ProductImport {
    /// Requested product
    pub product: String,
    /// Its outcome
    pub result: Result<ImportOutcome, ImportError>,
}

/// Result of a batch
#[derive(Debug)]
pub struct ImportReport {
    /// Per-product results, in request order
    pub imports: Vec<ProductImport>,
    /// The transaction, with its rollback actions still pending
    pub transaction: ImportTransaction,
}

impl ImportReport {
    /// Counts over the batch
    pub fn summary(&self) -> ImportSummary {
        self.transaction.summary()
    }

    /// True if every product imported
    pub fn is_success(&self) -> bool {
        self.imports.iter().all(|i| i.result.is_ok())
    }
}

struct Resolved {
    source_path: String,
    dest: String,
    stage: String,
    path: String,
}

fn resolve(request: &ImportRequest) -> Result<Resolved, ImportError> {
    if request.product.trim().is_empty() {
        return Err(ImportError::InvalidRequest("product name is empty".to_string()));
    }
    match (&request.stage, &request.source_path) {
        (Some(_), Some(_)) => Err(ImportError::InvalidRequest(
            "cannot specify both --stage and --source-path".to_string(),
        )),
        (_, Some(path)) => Ok(Resolved {
            source_path: path.clone(),
            dest: request.dest.clone().unwrap_or_else(|| path.clone()),
            stage: String::new(),
            path: path.clone(),
        }),
        (stage, None) => {
            let stage = stage.as_deref().unwrap_or(DEFAULT_STAGE);
            let short = request
                .product
                .strip_prefix("data_")
                .unwrap_or(&request.product);
            Ok(Resolved {
                source_path: format!("data/{}/", stage),
                dest: request
                    .dest
                    .clone()
                    .unwrap_or_else(|| format!("{}/{}/", IMPORTS_DIR, short)),
                stage: stage.to_string(),
                path: String::new(),
            })
        }
    }
}

/// Pointer file for a destination (`<dest>.dvc`)
pub fn artifact_pointer(dest: &str) -> String {
    format!("{}.dvc", dest.trim_end_matches('/'))
}

/// Imports into one project
pub struct DataImporter<'a> {
    project: PathBuf,
    registry: &'a dyn Registry,
    tracker: &'a dyn ContentTracker,
    descriptors: DescriptorStore,
}

impl<'a> DataImporter<'a> {
    /// Importer for the project at `project`.
    ///
    /// The project must have a descriptor of an importing kind.
    pub fn new(
        project: impl Into<PathBuf>,
        registry: &'a dyn Registry,
        tracker: &'a dyn ContentTracker,
    ) -> Result<Self, ImportError> {
        let project = project.into();
        let descriptors = DescriptorStore::for_project(&project);
        if !descriptors.exists() {
            return Err(ImportError::InvalidProject(format!(
                "missing {}",
                descriptors.path().display()
            )));
        }
        let descriptor = descriptors
            .load()
            .map_err(|e| ImportError::InvalidProject(e.to_string()))?;
        if !descriptor.accepts_imports() {
            return Err(ImportError::InvalidProject(format!(
                "data import is only supported for project/infra repositories, not '{}'",
                descriptor.project.kind
            )));
        }
        Ok(Self {
            project,
            registry,
            tracker,
            descriptors,
        })
    }

    /// Project root
    pub fn project(&self) -> &Path {
        &self.project
    }

    /// Import one product and record it in the descriptor
    pub fn import(&self, request: &ImportRequest) -> Result<ImportOutcome, ImportError> {
        let resolved = resolve(request)?;
        let product = request.product.as_str();

        let entry = self.registry.query_data_product(product)?;
        let source_url = entry
            .str_at("repository.github_url")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                ImportError::Registry(RegistryError::InvalidEntry {
                    path: product.to_string(),
                    reason: "missing repository.github_url".to_string(),
                })
            })?
            .to_string();

        let content_err = |source: ToolError| ImportError::ContentImport {
            product: product.to_string(),
            source,
        };
        let target = self.project.join(resolved.dest.trim_end_matches('/'));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| {
                content_err(ToolError::Io {
                    tool: Tool::Dvc,
                    source,
                })
            })?;
        }

        info!(target: "mintd::import", product, source = %resolved.source_path, dest = %resolved.dest, "Importing");
        self.tracker
            .import(
                &self.project,
                &to_ssh_url(&source_url),
                &resolved.source_path,
                &resolved.dest,
                request.rev.as_deref(),
            )
            .map_err(content_err)?;

        let pointer = artifact_pointer(&resolved.dest);
        let source_revision = request.rev.clone().unwrap_or_else(|| "HEAD".to_string());
        let result = ImportResult {
            product_name: product.to_string(),
            success: true,
            error_message: None,
            artifact_pointer: Some(pointer.clone()),
            local_path: Some(resolved.dest.clone()),
            source_revision: Some(source_revision.clone()),
        };

        let record = DependencyRecord {
            source: product.to_string(),
            source_url,
            stage: resolved.stage,
            path: resolved.path,
            local_path: resolved.dest,
            artifact_pointer: pointer,
            imported_at: timestamp_now(),
            source_revision,
        };
        let (upsert, metadata_error) = match self
            .descriptors
            .update(|d| Ok::<_, CoreError>(d.record_dependency(record)))
        {
            Ok(u) => {
                debug!(target: "mintd::import", product, upsert = ?u, "Recorded dependency");
                (Some(u), None)
            }
            Err(e) => {
                warn!(target: "mintd::import", product, error = %e, "Imported, but metadata.json was not updated");
                (None, Some(ImportError::MetadataUpdate(e)))
            }
        };

        Ok(ImportOutcome {
            result,
            upsert,
            metadata_error,
        })
    }

    /// Import several products, isolating failures.
    ///
    /// The snapshot is rewritten after each product and removed when every
    /// product succeeded.
    pub fn import_all(&self, requests: &[ImportRequest]) -> Result<ImportReport, ImportError> {
        let mut transaction = ImportTransaction::new(&self.project);
        let mut imports = Vec::with_capacity(requests.len());

        for request in requests {
            let result = self.import(request);
            match &result {
                Ok(outcome) => {
                    transaction.add_success(outcome.result.clone());
                    if let Some(dest) = &outcome.result.local_path {
                        let data = self.project.join(dest.trim_end_matches('/'));
                        let pointer = self.project.join(artifact_pointer(dest));
                        let descriptors = self.descriptors.clone();
                        let (source, local_path) = (request.product.clone(), dest.clone());
                        transaction.add_rollback_action(format!("remove {}", dest), move || {
                            remove_import(&data, &pointer)?;
                            descriptors
                                .update(|d| {
                                    Ok::<_, CoreError>(d.forget_dependency(&source, &local_path))
                                })
                                .map(|_| ())
                                .map_err(io::Error::other)
                        });
                    }
                }
                Err(e) => {
                    warn!(target: "mintd::import", product = %request.product, error = %e, "Import failed");
                    transaction.add_failure(ImportResult::failure(&request.product, e));
                }
            }
            transaction.save_state()?;
            imports.push(ProductImport {
                product: request.product.clone(),
                result,
            });
        }

        let summary = transaction.summary();
        if summary.failed == 0 {
            transaction.cleanup_state()?;
        }
        info!(
            target: "mintd::import",
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "Import finished"
        );
        Ok(ImportReport {
            imports,
            transaction,
        })
    }
}

fn remove_import(data: &Path, pointer: &Path) -> io::Result<()> {
    if data.is_dir() {
        fs::remove_dir_all(data)?;
    } else if data.exists() {
        fs::remove_file(data)?;
    }
    if pointer.exists() {
        fs::remove_file(pointer)?;
    }
    Ok(())
}
