//! Error types for mintd operations
//!
//! One enum per operation family. Lower layers convert upward with `#[from]`:
//! `ToolError` → `RegistryError` → `EnclaveError` / `ImportError` /
//! `CatalogUpdateError`.
//!
//! Every error can offer a [`suggestion`](ToolError::suggestion) the CLI
//! prints under the message.

use crate::tools::Tool;
use mintd_bundle::BundleError;
use mintd_core::CoreError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "killed by signal".to_string(),
    }
}

// =============================================================================
// External tools
// =============================================================================

/// Result type for external tool calls
pub type ToolResult<T> = Result<T, ToolError>;

/// Failure of an external git / dvc / gh invocation
#[derive(Debug, Error)]
pub enum ToolError {
    /// Executable is not installed or not on `PATH`
    #[error("{tool} command not found")]
    NotFound {
        /// Which tool
        tool: Tool,
    },

    /// Command ran and exited unsuccessfully
    #[error("{tool} command failed ({}): {command}: {}", exit_label(.exit_code), .stderr.trim())]
    Failed {
        /// Which tool
        tool: Tool,
        /// Full command line
        command: String,
        /// Exit code, `None` if terminated by a signal
        exit_code: Option<i32>,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// Command exceeded its time budget and was killed
    #[error("{tool} command timed out after {}s: {command}", .timeout.as_secs())]
    Timeout {
        /// Which tool
        tool: Tool,
        /// Full command line
        command: String,
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// Command succeeded but its output could not be interpreted
    #[error("Unexpected {tool} output: {message}")]
    Output {
        /// Which tool
        tool: Tool,
        /// What was wrong
        message: String,
    },

    /// Spawning or waiting failed
    #[error("Failed to run {tool}: {source}")]
    Io {
        /// Which tool
        tool: Tool,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    /// The tool involved
    pub fn tool(&self) -> Tool {
        match self {
            ToolError::NotFound { tool }
            | ToolError::Failed { tool, .. }
            | ToolError::Timeout { tool, .. }
            | ToolError::Output { tool, .. }
            | ToolError::Io { tool, .. } => *tool,
        }
    }

    /// Guidance for the user, if any
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ToolError::NotFound { tool } => Some(tool.install_hint().to_string()),
            ToolError::Failed {
                tool: Tool::Gh,
                stderr,
                ..
            } => {
                if stderr.contains("gh auth login") || stderr.contains("GH_TOKEN") {
                    Some("GitHub CLI is not authenticated. Run: gh auth login".to_string())
                } else if stderr.to_lowercase().contains("not found") {
                    Some(Tool::Gh.install_hint().to_string())
                } else {
                    None
                }
            }
            ToolError::Timeout { .. } => {
                Some("Raise [tools] timeout_secs in ~/.mintd/config.toml".to_string())
            }
            _ => None,
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Result type for configuration handling
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Failure to read or write `config.toml`
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File exists but could not be read
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// File could not be parsed
    #[error("Failed to parse config file '{}': {message}", path.display())]
    Parse {
        /// Config path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// File could not be written
    #[error("Failed to write config file '{}': {source}", path.display())]
    Write {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Configuration could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    /// No home directory to resolve `~/.mintd` against
    #[error("Cannot locate home directory (HOME is not set)")]
    NoHome,
}

// =============================================================================
// Registry
// =============================================================================

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Failure talking to the catalog registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No registry URL configured
    #[error("Registry URL is not configured")]
    NotConfigured,

    /// Registry URL cannot be parsed into org/repo
    #[error("Invalid registry URL: {0}")]
    InvalidUrl(String),

    /// Project has no catalog entry
    #[error("Project '{name}' not found in registry")]
    NotFound {
        /// Short project name
        name: String,
    },

    /// Data product has no catalog entry
    #[error("Data product '{name}' not found in registry")]
    ProductNotFound {
        /// Product name
        name: String,
        /// Products that do exist
        available: Vec<String>,
    },

    /// Catalog entry or descriptor is structurally unusable
    #[error("Invalid catalog entry {path}: {reason}")]
    InvalidEntry {
        /// Entry path or name
        path: String,
        /// What is wrong
        reason: String,
    },

    /// External tool failed
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Local state file failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// User configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RegistryError {
    /// Guidance for the user, if any
    pub fn suggestion(&self) -> Option<String> {
        match self {
            RegistryError::NotConfigured => {
                Some("Set registry.url in ~/.mintd/config.toml".to_string())
            }
            RegistryError::NotFound { .. } => {
                Some("Run 'mintd registry register' first to register this project".to_string())
            }
            RegistryError::ProductNotFound { available, .. } if !available.is_empty() => {
                Some(format!("Available data products: {}", available.join(", ")))
            }
            RegistryError::Tool(e) => e.suggestion(),
            _ => None,
        }
    }
}

// =============================================================================
// Enclave
// =============================================================================

/// Result type for enclave operations
pub type EnclaveResult<T> = Result<T, EnclaveError>;

/// Hard failure of an enclave operation
#[derive(Debug, Error)]
pub enum EnclaveError {
    /// Repo is not in the approved list
    #[error("Repository '{repo}' not found in approved list")]
    NotApproved {
        /// Requested repo
        repo: String,
    },

    /// Several products approved and none selected
    #[error("Multiple approved products ({}). Specify a repo name or use --all", .approved.join(", "))]
    AmbiguousTarget {
        /// Approved repos
        approved: Vec<String>,
    },

    /// No approved products at all
    #[error("No approved products found in manifest")]
    NoApprovedProducts,

    /// Registry has no entry for an approved product
    #[error("Registry entry not found for: {repo}")]
    ProductNotFound {
        /// Product repo
        repo: String,
    },

    /// Registry entry lacks something the pull needs
    #[error("Registry entry for {repo} is incomplete: {reason}")]
    IncompleteEntry {
        /// Product repo
        repo: String,
        /// What is missing
        reason: String,
    },

    /// Package found nothing on disk to bundle
    #[error("No downloaded data to package")]
    NothingToPackage,

    /// Bundle path does not exist
    #[error("Transfer bundle not found: {}", .0.display())]
    BundleNotFound(PathBuf),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// Moving one version into place failed; earlier entries were committed
    #[error("Failed to install {repo}/{version}: {source}")]
    Install {
        /// Repo of the failing entry
        repo: String,
        /// Version folder of the failing entry
        version: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Registry failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// External tool failure
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Bundle read/write failure
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// Manifest failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EnclaveError {
    /// Guidance for the user, if any
    pub fn suggestion(&self) -> Option<String> {
        match self {
            EnclaveError::NotApproved { repo } => {
                Some(format!("Approve it first: mintd enclave add {}", repo))
            }
            EnclaveError::NothingToPackage => {
                Some("Pull approved products first: mintd enclave pull --all".to_string())
            }
            EnclaveError::Core(CoreError::ManifestNotFound { .. }) => {
                Some("Run this command from an enclave workspace".to_string())
            }
            EnclaveError::Core(CoreError::Locked { .. }) => {
                Some("Another mintd command is running in this workspace".to_string())
            }
            EnclaveError::Registry(e) => e.suggestion(),
            EnclaveError::Tool(e) => e.suggestion(),
            _ => None,
        }
    }
}

// =============================================================================
// Data import
// =============================================================================

/// Failure of one data-product import
#[derive(Debug, Error)]
pub enum ImportError {
    /// Registry lookup failed
    #[error("Registry lookup failed: {0}")]
    Registry(#[from] RegistryError),

    /// The content-tracked import itself failed
    #[error("Content import failed for {product}: {source}")]
    ContentImport {
        /// Product being imported
        product: String,
        /// Underlying tool error
        #[source]
        source: ToolError,
    },

    /// Data imported but the descriptor could not be updated
    #[error("Failed to update metadata.json: {0}")]
    MetadataUpdate(#[source] CoreError),

    /// Target directory is not an importing project
    #[error("Invalid project: {0}")]
    InvalidProject(String),

    /// Request is malformed
    #[error("Invalid import request: {0}")]
    InvalidRequest(String),

    /// Recovery snapshot could not be written or read
    #[error("Import state error: {0}")]
    State(#[source] CoreError),

    /// Requested stage or path does not exist in the product
    #[error("{product} has no {path}")]
    SourceMissing {
        /// Product being pulled
        product: String,
        /// Path looked for, relative to the product repository
        path: String,
    },
}

impl ImportError {
    /// Guidance for the user, if any
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ImportError::Registry(e) => e.suggestion(),
            ImportError::ContentImport { source, .. } => source.suggestion(),
            ImportError::InvalidProject(_) => Some(
                "Run this command from a project or infra repository containing metadata.json"
                    .to_string(),
            ),
            ImportError::SourceMissing { .. } => {
                Some("Check the stage name or pass --path with a path that exists".to_string())
            }
            _ => None,
        }
    }
}

// =============================================================================
// Catalog update
// =============================================================================

/// Result type for catalog updates
pub type CatalogUpdateResult<T> = Result<T, CatalogUpdateError>;

/// Failure of a catalog diff/update
#[derive(Debug, Error)]
pub enum CatalogUpdateError {
    /// Local descriptor could not be loaded
    #[error("Cannot read project descriptor: {0}")]
    Descriptor(#[from] CoreError),

    /// Local descriptor lacks what the update needs
    #[error("Invalid project descriptor: {0}")]
    InvalidDescriptor(String),

    /// Registry failure
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl CatalogUpdateError {
    /// Guidance for the user, if any
    pub fn suggestion(&self) -> Option<String> {
        match self {
            CatalogUpdateError::Registry(e) => e.suggestion(),
            CatalogUpdateError::Descriptor(CoreError::ManifestNotFound { .. }) => {
                Some("Run this command from a mintd project directory".to_string())
            }
            _ => None,
        }
    }
}
