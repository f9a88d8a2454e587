//! Ad-hoc data pull: copy one product's stage or path out of a scratch
//! clone, without recording a dependency.

use crate::enclave::fsutil;
use crate::error::{ImportError, RegistryError, ToolError};
use crate::registry::Registry;
use crate::tools::{read_remote_name, to_ssh_url, ContentTracker, SourceControl, Tool};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stage copied when neither a stage nor a path is requested
pub const DEFAULT_FETCH_STAGE: &str = "final";

/// What to copy out of a data product
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    /// Product name
    pub product: String,
    /// Pipeline stage
    pub stage: Option<String>,
    /// Path inside the product repository, instead of a stage
    pub path: Option<String>,
    /// Destination directory; `<product>_data` when absent
    pub dest: Option<PathBuf>,
}

impl FetchRequest {
    /// Request for the default stage of `product`
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            ..Self::default()
        }
    }

    fn source(&self) -> Result<String, ImportError> {
        match (&self.stage, &self.path) {
            (Some(_), Some(_)) => Err(ImportError::InvalidRequest(
                "cannot specify both --stage and --path".to_string(),
            )),
            (_, Some(path)) => Ok(path.trim_end_matches('/').to_string()),
            (stage, None) => Ok(format!(
                "data/{}",
                stage.as_deref().unwrap_or(DEFAULT_FETCH_STAGE)
            )),
        }
    }
}

/// Where the data landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Product name
    pub product: String,
    /// Path copied, relative to the product repository
    pub source: String,
    /// Destination directory
    pub dest: PathBuf,
    /// Revision of the clone the data came from
    pub source_revision: String,
}

/// Copy the requested data of a product into a local directory.
///
/// Relative destinations resolve against `cwd`. The product is cloned into
/// a scratch directory that is removed on every path; tracked data for the
/// requested source is fetched before copying. A file source is copied into
/// the destination directory, a directory source is merged into it.
pub fn fetch_product(
    registry: &dyn Registry,
    git: &dyn SourceControl,
    tracker: &dyn ContentTracker,
    cwd: &Path,
    request: &FetchRequest,
) -> Result<FetchOutcome, ImportError> {
    let product = request.product.as_str();
    if product.trim().is_empty() {
        return Err(ImportError::InvalidRequest("product name is empty".to_string()));
    }
    let source = request.source()?;

    let entry = registry.query_data_product(product)?;
    let repo_url = entry
        .str_at("repository.github_url")
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            ImportError::Registry(RegistryError::InvalidEntry {
                path: product.to_string(),
                reason: "missing repository.github_url".to_string(),
            })
        })?;
    let remote_url = entry
        .str_at("storage.dvc.remote_url")
        .filter(|u| !u.is_empty());

    let tool_err = |source: ToolError| ImportError::ContentImport {
        product: product.to_string(),
        source,
    };
    let io_err = |source: std::io::Error| tool_err(ToolError::Io { tool: Tool::Git, source });

    let scratch = tempfile::Builder::new()
        .prefix("mintd-pull-")
        .tempdir()
        .map_err(io_err)?;
    let clone = scratch.path().join(product);
    info!(target: "mintd::import", product, source = %source, "Pulling product data");
    git.clone_repo(&to_ssh_url(repo_url), &clone).map_err(tool_err)?;

    if let Some(url) = remote_url {
        let name = read_remote_name(&clone);
        tracker
            .configure_remote(&clone, &name, url, None)
            .map_err(tool_err)?;
    }
    let pointer = PathBuf::from(format!("{}.dvc", source));
    let targets = if clone.join(&pointer).is_file() {
        vec![pointer]
    } else {
        Vec::new()
    };
    tracker.pull(&clone, &targets).map_err(tool_err)?;
    let source_revision = git.head_revision(&clone).map_err(tool_err)?;

    let src = clone.join(&source);
    if !src.exists() {
        return Err(ImportError::SourceMissing {
            product: product.to_string(),
            path: source,
        });
    }

    let dest = match &request.dest {
        Some(d) => cwd.join(d),
        None => cwd.join(format!("{}_data", product)),
    };
    fs::create_dir_all(&dest).map_err(io_err)?;
    if src.is_dir() {
        fsutil::copy_dir(&src, &dest).map_err(io_err)?;
    } else if let Some(name) = src.file_name() {
        fs::copy(&src, dest.join(name)).map_err(io_err)?;
    }
    debug!(target: "mintd::import", product, dest = %dest.display(), "Copied product data");

    Ok(FetchOutcome {
        product: product.to_string(),
        source,
        dest,
        source_revision,
    })
}
