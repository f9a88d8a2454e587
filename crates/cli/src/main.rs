//! mintd command-line interface.
//!
//! `mintd [flags] <group> <command>`: one command per invocation. Reports
//! go to stdout, logs and errors to stderr. Exit code 0 on success, 1 on a
//! failed command or when any product in a batch failed.

mod commands;
mod format;
mod parse;
mod state;

use std::path::{Path, PathBuf};
use std::process;

use mintd_core::DescriptorStore;
use mintd_engine::enclave::{unpack, Enclave, PullReport, PullTarget};
use mintd_engine::registry::{register_project, retry_pending, Registry};
use mintd_engine::{fetch_product, update_project, DataImporter, MintConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::build_cli;
use format::{
    format_add, format_catalog_update, format_clean, format_config, format_config_init,
    format_dependencies, format_error, format_fetch, format_import, format_init, format_listing,
    format_package, format_products, format_pull, format_registration, format_retry, format_status,
    format_unpack, format_verify, Failure, OutputMode,
};
use parse::{matches_to_action, CliAction};
use state::SessionState;

const LOG_ENV_VAR: &str = "MINTD_LOG";

fn main() {
    let matches = build_cli().get_matches();

    init_tracing(matches.get_count("verbose"));

    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let action = match matches_to_action(&matches) {
        Ok(action) => action,
        Err(msg) => {
            eprintln!("{}", format_error(&Failure::new(msg), mode));
            process::exit(2);
        }
    };

    let state = match SessionState::new(
        matches.get_one::<String>("config").map(PathBuf::from),
        matches.get_one::<String>("dir").map(PathBuf::from),
    ) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{}", format_error(&Failure::from(e), mode));
            process::exit(1);
        }
    };

    let code = match run(action, &state, mode) {
        Ok((output, code)) => {
            if !output.is_empty() {
                println!("{}", output);
            }
            code
        }
        Err(failure) => {
            eprintln!("{}", format_error(&failure, mode));
            1
        }
    };
    process::exit(code);
}

/// `-v`/`-vv` win over `MINTD_LOG`; the default is warnings only.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        1 => tracing_subscriber::EnvFilter::new("info"),
        _ => tracing_subscriber::EnvFilter::new("debug"),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose > 1)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

type Outcome = Result<(String, i32), Failure>;

fn ok(output: String) -> Outcome {
    Ok((output, 0))
}

fn pull_code(report: &PullReport) -> i32 {
    if report.is_success() {
        0
    } else {
        1
    }
}

fn run(action: CliAction, state: &SessionState, mode: OutputMode) -> Outcome {
    match action {
        CliAction::EnclaveInit { name } => {
            let name = name.unwrap_or_else(|| dir_name(state.dir()));
            let enclave = Enclave::init(state.dir(), &name)?;
            ok(format_init(enclave.root(), &name, mode))
        }
        CliAction::EnclaveAdd { repo, stage, pull } => {
            let enclave = state.enclave()?;
            let warning = enclave.add(&repo, &stage)?;
            let added = format_add(&repo, &stage, warning.as_ref(), mode);
            if !pull {
                return ok(added);
            }
            let registry = state.registry()?;
            let report = enclave.pull(&state.sync_context(&registry), PullTarget::Repo(repo))?;
            let code = pull_code(&report);
            Ok((format!("{}\n{}", added, format_pull(&report, mode)), code))
        }
        CliAction::EnclaveList { repo } => {
            let listing = state.enclave()?.list(repo.as_deref())?;
            ok(format_listing(&listing, mode))
        }
        CliAction::EnclavePull(target) => {
            let enclave = state.enclave()?;
            let registry = state.registry()?;
            let report = enclave.pull(&state.sync_context(&registry), target)?;
            Ok((format_pull(&report, mode), pull_code(&report)))
        }
        CliAction::EnclavePackage(request) => {
            let enclave = state.enclave()?;
            let options = request.into_options(state.config().enclave.compression_level);
            let report = enclave.package(&options)?;
            ok(format_package(&report, mode))
        }
        CliAction::EnclaveUnpack { bundle, dest } => {
            let (dest, manifest) = unpack(&bundle, dest.as_deref())?;
            ok(format_unpack(&dest, &manifest, mode))
        }
        CliAction::EnclaveVerify { source } => {
            let report = state.enclave()?.verify(&source)?;
            ok(format_verify(&report, mode))
        }
        CliAction::EnclaveClean(options) => {
            let report = state.enclave()?.clean(&options)?;
            ok(format_clean(&report, mode))
        }
        CliAction::DataImport(requests) => {
            let registry = state.registry()?;
            let importer = DataImporter::new(state.dir(), &registry, state.dvc())?;
            let report = importer.import_all(&requests)?;
            let code = if report.is_success() { 0 } else { 1 };
            Ok((format_import(&report, mode), code))
        }
        CliAction::DataPull(request) => {
            let registry = state.registry()?;
            let outcome = fetch_product(&registry, state.git(), state.dvc(), state.dir(), &request)?;
            ok(format_fetch(&outcome, mode))
        }
        CliAction::DataList { imported: true } => {
            let descriptor = DescriptorStore::for_project(state.dir()).load()?;
            ok(format_dependencies(descriptor.dependencies(), mode))
        }
        CliAction::DataList { imported: false } => {
            let products = state.registry()?.list_data_products()?;
            ok(format_products(&products, mode))
        }
        CliAction::RegistryRegister => {
            let registry = state.registry()?;
            let outcome = register_project(&registry, &state.pending()?, state.dir())?;
            ok(format_registration(&outcome, mode))
        }
        CliAction::RegistryStatus { name } => {
            let name = match name {
                Some(n) => n,
                None => DescriptorStore::for_project(state.dir()).load()?.project.name,
            };
            let status = state.registry()?.registration_status(&name)?;
            ok(format_status(&name, &status, mode))
        }
        CliAction::RegistryRetry => {
            let results = retry_pending(&state.registry()?, &state.pending()?)?;
            let code = if results.iter().all(|r| r.outcome.is_ok()) { 0 } else { 1 };
            Ok((format_retry(&results, mode), code))
        }
        CliAction::RegistryUpdate { project, dry_run } => {
            let registry = state.registry()?;
            let update = update_project(&registry, state.dir(), project.as_deref(), dry_run)?;
            ok(format_catalog_update(&update, mode))
        }
        CliAction::ConfigShow => {
            let path = state.config_path()?;
            ok(format_config(state.config(), &path, mode)?)
        }
        CliAction::ConfigInit => {
            let path = state.config_path()?;
            let written = MintConfig::write_default_if_missing(&path)?;
            ok(format_config_init(&path, written, mode))
        }
    }
}

/// Last component of `dir`, resolving `.` against the filesystem
fn dir_name(dir: &Path) -> String {
    std::fs::canonicalize(dir)
        .ok()
        .as_deref()
        .unwrap_or(dir)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "enclave".to_string())
}
