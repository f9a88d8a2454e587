//! Per-invocation context: effective config, working directory and the
//! real external collaborators built from them.

use std::path::{Path, PathBuf};

use mintd_engine::config::{default_config_path, MintConfig};
use mintd_engine::error::{ConfigError, EnclaveResult, RegistryResult};
use mintd_engine::registry::PendingRegistrations;
use mintd_engine::tools::{Dvc, Git};
use mintd_engine::{Enclave, GitRegistry, SyncContext};

/// Everything a command needs besides its own arguments.
pub struct SessionState {
    config: MintConfig,
    config_path: Option<PathBuf>,
    dir: PathBuf,
    git: Git,
    dvc: Dvc,
}

impl SessionState {
    /// Load config from `config_path` (or the default location) and work
    /// in `dir` (or the current directory).
    pub fn new(config_path: Option<PathBuf>, dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = MintConfig::load(config_path.as_deref())?;
        let timeout = config.tool_timeout();
        Ok(Self {
            config,
            config_path,
            dir: dir.unwrap_or_else(|| PathBuf::from(".")),
            git: Git::new(timeout),
            dvc: Dvc::new(timeout),
        })
    }

    pub fn config(&self) -> &MintConfig {
        &self.config
    }

    /// Config file in effect, whether or not it exists
    pub fn config_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.config_path {
            Some(p) => Ok(p.clone()),
            None => default_config_path(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn enclave(&self) -> EnclaveResult<Enclave> {
        Enclave::open(&self.dir)
    }

    pub fn registry(&self) -> RegistryResult<GitRegistry> {
        GitRegistry::from_config(&self.config)
    }

    pub fn pending(&self) -> RegistryResult<PendingRegistrations> {
        PendingRegistrations::in_home()
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn dvc(&self) -> &Dvc {
        &self.dvc
    }

    /// Pull context over the given registry
    pub fn sync_context<'a>(&'a self, registry: &'a GitRegistry) -> SyncContext<'a> {
        SyncContext::new(registry, &self.git, &self.dvc)
            .with_storage_endpoint(self.config.storage.endpoint.clone())
    }
}
