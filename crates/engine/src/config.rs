//! User configuration via `~/.mintd/config.toml`
//!
//! A missing file means defaults. `mintd config init` writes the commented
//! default file; edit it to point at your registry and storage endpoint.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the home directory holding mintd's user state
pub const MINTD_DIR_NAME: &str = ".mintd";

/// Config file name inside [`MINTD_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "MINTD_CONFIG";

/// `[registry]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrySettings {
    /// Registry repository URL (e.g. `https://github.com/lab/registry`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Branch pull requests target
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: None,
            default_branch: default_branch(),
        }
    }
}

/// `[storage]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// Custom object-storage endpoint applied to content-tracking remotes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Object-storage region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// `[tools]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSettings {
    /// Budget for one external command, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// `[enclave]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnclaveSettings {
    /// zstd level for transfer bundles (1-22)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_compression_level() -> i32 {
    3
}

impl Default for EnclaveSettings {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
        }
    }
}

/// User configuration loaded from `config.toml`.
///
/// # Example
///
/// ```toml
/// [registry]
/// url = "https://github.com/lab/registry"
///
/// [storage]
/// endpoint = "https://s3.wasabisys.com"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MintConfig {
    /// Registry location
    #[serde(default)]
    pub registry: RegistrySettings,
    /// Object storage
    #[serde(default)]
    pub storage: StorageSettings,
    /// External tools
    #[serde(default)]
    pub tools: ToolSettings,
    /// Enclave transfers
    #[serde(default)]
    pub enclave: EnclaveSettings,
}

impl MintConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# mintd configuration

[registry]
# Repository holding the data catalog (catalog/data, catalog/projects, catalog/infra)
# url = "https://github.com/your-org/registry"
default_branch = "main"

[storage]
# Custom S3-compatible endpoint applied to content-tracking remotes
# endpoint = "https://s3.wasabisys.com"
# region = "us-east-1"

[tools]
# Seconds before a git / dvc / gh command is killed
timeout_secs = 600

[enclave]
# zstd level for transfer bundles (1-22)
compression_level = 3
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MintConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate().map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    /// Load the effective configuration.
    ///
    /// Uses `path` if given, else `$MINTD_CONFIG`, else
    /// `~/.mintd/config.toml`. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Ok(p) => p,
                Err(ConfigError::NoHome) => return Ok(Self::default()),
                Err(e) => return Err(e),
            },
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `true` if the file was created.
    pub fn write_default_if_missing(path: &Path) -> ConfigResult<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(true)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The effective configuration as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Per-command budget for external tools
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_secs)
    }

    fn validate(&self) -> Result<(), String> {
        if !(1..=22).contains(&self.enclave.compression_level) {
            return Err(format!(
                "enclave.compression_level must be between 1 and 22, got {}",
                self.enclave.compression_level
            ));
        }
        if self.tools.timeout_secs == 0 {
            return Err("tools.timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// `~/.mintd`
pub fn mintd_home() -> ConfigResult<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(MINTD_DIR_NAME))
}

/// `$MINTD_CONFIG`, else `~/.mintd/config.toml`
pub fn default_config_path() -> ConfigResult<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV_VAR) {
        if !p.is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    Ok(mintd_home()?.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_to_defaults() {
        let config: MintConfig = toml::from_str(MintConfig::default_toml()).unwrap();
        assert_eq!(config, MintConfig::default());
        assert_eq!(config.tool_timeout(), Duration::from_secs(600));
        assert_eq!(config.enclave.compression_level, 3);
        assert!(config.registry.url.is_none());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "").unwrap();
        let config = MintConfig::from_file(&path).unwrap();
        assert_eq!(config.registry.default_branch, "main");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MintConfig::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config, MintConfig::default());
    }

    #[test]
    fn unparsable_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[registry\nurl = ").unwrap();
        assert!(matches!(
            MintConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn out_of_range_compression_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[enclave]\ncompression_level = 40\n").unwrap();
        let err = MintConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("compression_level"));
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join(CONFIG_FILE_NAME);
        assert!(MintConfig::write_default_if_missing(&path).unwrap());

        std::fs::write(&path, "[tools]\ntimeout_secs = 30\n").unwrap();
        assert!(!MintConfig::write_default_if_missing(&path).unwrap());

        let config = MintConfig::from_file(&path).unwrap();
        assert_eq!(config.tools.timeout_secs, 30);
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = MintConfig::default();
        config.registry.url = Some("https://github.com/lab/registry".into());
        config.storage.endpoint = Some("https://s3.wasabisys.com".into());

        config.write_to_file(&path).unwrap();
        let loaded = MintConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!config.to_toml().unwrap().contains("region"));
    }
}
