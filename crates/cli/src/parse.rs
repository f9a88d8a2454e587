//! ArgMatches → CliAction conversion.

use std::path::PathBuf;

use clap::ArgMatches;
use mintd_engine::enclave::{CleanOptions, PackageOptions, PullTarget};
use mintd_engine::{FetchRequest, ImportRequest};

/// A parsed command.
#[derive(Debug, Clone, PartialEq)]
pub enum CliAction {
    EnclaveInit { name: Option<String> },
    EnclaveAdd { repo: String, stage: String, pull: bool },
    EnclaveList { repo: Option<String> },
    EnclavePull(PullTarget),
    EnclavePackage(PackageRequest),
    EnclaveUnpack { bundle: PathBuf, dest: Option<PathBuf> },
    EnclaveVerify { source: PathBuf },
    EnclaveClean(CleanOptions),
    DataImport(Vec<ImportRequest>),
    DataPull(FetchRequest),
    DataList { imported: bool },
    RegistryRegister,
    RegistryStatus { name: Option<String> },
    RegistryRetry,
    RegistryUpdate { project: Option<String>, dry_run: bool },
    ConfigShow,
    ConfigInit,
}

/// `enclave package` arguments; the compression level comes from config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageRequest {
    pub name: Option<String>,
    pub repos: Vec<String>,
    pub output_dir: Option<PathBuf>,
}

impl PackageRequest {
    pub fn into_options(self, compression_level: i32) -> PackageOptions {
        PackageOptions {
            name: self.name,
            repos: self.repos,
            output_dir: self.output_dir,
            compression_level,
        }
    }
}

fn string(m: &ArgMatches, id: &str) -> Option<String> {
    m.get_one::<String>(id).cloned()
}

fn path(m: &ArgMatches, id: &str) -> Option<PathBuf> {
    m.get_one::<String>(id).map(PathBuf::from)
}

fn required(m: &ArgMatches, id: &str) -> Result<String, String> {
    string(m, id).ok_or_else(|| format!("missing argument <{}>", id))
}

/// Translate parsed arguments into an action.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction, String> {
    match matches.subcommand() {
        Some(("enclave", sub)) => parse_enclave(sub),
        Some(("data", sub)) => parse_data(sub),
        Some(("registry", sub)) => parse_registry(sub),
        Some(("config", sub)) => match sub.subcommand_name() {
            Some("show") => Ok(CliAction::ConfigShow),
            Some("init") => Ok(CliAction::ConfigInit),
            other => Err(format!("unknown config command: {:?}", other)),
        },
        Some((other, _)) => Err(format!("unknown command: {}", other)),
        None => Err("no command given".to_string()),
    }
}

fn parse_enclave(matches: &ArgMatches) -> Result<CliAction, String> {
    match matches.subcommand() {
        Some(("init", m)) => Ok(CliAction::EnclaveInit {
            name: string(m, "name"),
        }),
        Some(("add", m)) => Ok(CliAction::EnclaveAdd {
            repo: required(m, "repo")?,
            stage: string(m, "stage").unwrap_or_else(|| mintd_core::DEFAULT_STAGE.to_string()),
            pull: !m.get_flag("no-pull"),
        }),
        Some(("list", m)) => Ok(CliAction::EnclaveList {
            repo: string(m, "repo"),
        }),
        Some(("pull", m)) => {
            let target = if m.get_flag("all") {
                PullTarget::All
            } else {
                match string(m, "repo") {
                    Some(repo) => PullTarget::Repo(repo),
                    None => PullTarget::Default,
                }
            };
            Ok(CliAction::EnclavePull(target))
        }
        Some(("package", m)) => Ok(CliAction::EnclavePackage(PackageRequest {
            name: string(m, "name"),
            repos: m
                .get_many::<String>("repo")
                .map(|v| v.cloned().collect())
                .unwrap_or_default(),
            output_dir: path(m, "output"),
        })),
        Some(("unpack", m)) => Ok(CliAction::EnclaveUnpack {
            bundle: PathBuf::from(required(m, "bundle")?),
            dest: path(m, "dest"),
        }),
        Some(("verify", m)) => Ok(CliAction::EnclaveVerify {
            source: PathBuf::from(required(m, "source")?),
        }),
        Some(("clean", m)) => Ok(CliAction::EnclaveClean(CleanOptions {
            keep: m.get_one::<usize>("keep").copied().unwrap_or(1),
            staging_only: m.get_flag("staging-only"),
        })),
        Some((other, _)) => Err(format!("unknown enclave command: {}", other)),
        None => Err("missing enclave command".to_string()),
    }
}

fn parse_data(matches: &ArgMatches) -> Result<CliAction, String> {
    match matches.subcommand() {
        Some(("import", m)) => {
            let products: Vec<String> = m
                .get_many::<String>("products")
                .map(|v| v.cloned().collect())
                .unwrap_or_default();
            let dest = string(m, "dest");
            if dest.is_some() && products.len() > 1 {
                return Err("--dest can only be used when importing a single product".to_string());
            }
            Ok(CliAction::DataImport(
                products
                    .into_iter()
                    .map(|product| ImportRequest {
                        product,
                        stage: string(m, "stage"),
                        source_path: string(m, "source-path"),
                        dest: dest.clone(),
                        rev: string(m, "rev"),
                    })
                    .collect(),
            ))
        }
        Some(("pull", m)) => Ok(CliAction::DataPull(FetchRequest {
            product: required(m, "product")?,
            stage: string(m, "stage"),
            path: string(m, "path"),
            dest: path(m, "destination"),
        })),
        Some(("list", m)) => Ok(CliAction::DataList {
            imported: m.get_flag("imported"),
        }),
        Some((other, _)) => Err(format!("unknown data command: {}", other)),
        None => Err("missing data command".to_string()),
    }
}

fn parse_registry(matches: &ArgMatches) -> Result<CliAction, String> {
    match matches.subcommand() {
        Some(("register", _)) => Ok(CliAction::RegistryRegister),
        Some(("status", m)) => Ok(CliAction::RegistryStatus {
            name: string(m, "name"),
        }),
        Some(("retry", _)) => Ok(CliAction::RegistryRetry),
        Some(("update", m)) => Ok(CliAction::RegistryUpdate {
            project: string(m, "project"),
            dry_run: m.get_flag("dry-run"),
        }),
        Some((other, _)) => Err(format!("unknown registry command: {}", other)),
        None => Err("missing registry command".to_string()),
    }
}
