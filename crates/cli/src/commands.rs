//! Clap command tree definition.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("mintd")
        .about("Versioned data products for research projects and offline enclaves")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Config file (default: $MINTD_CONFIG or ~/.mintd/config.toml)")
                .global(true),
        )
        .arg(
            Arg::new("dir")
                .long("dir")
                .short('C')
                .value_name("PATH")
                .help("Enclave or project directory (default: current directory)")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("More log output (-v info, -vv debug)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(build_enclave())
        .subcommand(build_data())
        .subcommand(build_registry())
        .subcommand(build_config())
}

// =========================================================================
// Enclave
// =========================================================================

fn build_enclave() -> Command {
    Command::new("enclave")
        .about("Manage an enclave workspace")
        .subcommand_required(true)
        .subcommand(
            Command::new("init")
                .about("Create an enclave workspace")
                .arg(
                    Arg::new("name")
                        .long("name")
                        .help("Enclave name (default: directory name)"),
                ),
        )
        .subcommand(
            Command::new("add")
                .about("Approve a data product for this enclave")
                .arg(Arg::new("repo").required(true).help("Data product repository"))
                .arg(
                    Arg::new("stage")
                        .long("stage")
                        .default_value("final")
                        .help("Pipeline stage to pull"),
                )
                .arg(
                    Arg::new("no-pull")
                        .long("no-pull")
                        .action(ArgAction::SetTrue)
                        .help("Only approve, do not pull now"),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List approved products and received versions")
                .arg(Arg::new("repo").help("Only this product")),
        )
        .subcommand(
            Command::new("pull")
                .about("Pull and promote approved products")
                .arg(Arg::new("repo").help("Product to pull").conflicts_with("all"))
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Pull every approved product"),
                ),
        )
        .subcommand(
            Command::new("package")
                .about("Bundle promoted versions for transfer")
                .arg(
                    Arg::new("name")
                        .long("name")
                        .help("Bundle name (default: transfer-<timestamp>)"),
                )
                .arg(
                    Arg::new("repo")
                        .long("repo")
                        .action(ArgAction::Append)
                        .help("Only package this product (repeatable)"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_name("DIR")
                        .help("Output directory (default: <enclave>/transfers)"),
                ),
        )
        .subcommand(
            Command::new("unpack")
                .about("Extract a bundle without installing it")
                .arg(Arg::new("bundle").required(true).help("Bundle file"))
                .arg(
                    Arg::new("dest")
                        .long("dest")
                        .value_name("DIR")
                        .help("Extraction directory (default: tmp_<bundle name>)"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Install the versions carried by a bundle")
                .arg(
                    Arg::new("source")
                        .required(true)
                        .help("Bundle file or extracted bundle directory"),
                ),
        )
        .subcommand(
            Command::new("clean")
                .about("Remove staging clones and old versions")
                .arg(
                    Arg::new("keep")
                        .long("keep")
                        .value_parser(value_parser!(usize))
                        .default_value("1")
                        .help("Versions to keep per product"),
                )
                .arg(
                    Arg::new("staging-only")
                        .long("staging-only")
                        .action(ArgAction::SetTrue)
                        .help("Only remove staging clones"),
                ),
        )
}

// =========================================================================
// Data
// =========================================================================

fn build_data() -> Command {
    Command::new("data")
        .about("Use data products in an analysis project")
        .subcommand_required(true)
        .subcommand(
            Command::new("import")
                .about("Import data products as tracked dependencies")
                .arg(
                    Arg::new("products")
                        .required(true)
                        .num_args(1..)
                        .value_name("PRODUCT")
                        .help("Data products to import"),
                )
                .arg(
                    Arg::new("stage")
                        .long("stage")
                        .conflicts_with("source-path")
                        .help("Pipeline stage to import (default: final)"),
                )
                .arg(
                    Arg::new("source-path")
                        .long("source-path")
                        .help("Path inside the product repository"),
                )
                .arg(
                    Arg::new("dest")
                        .long("dest")
                        .help("Destination inside the project"),
                )
                .arg(Arg::new("rev").long("rev").help("Revision to pin")),
        )
        .subcommand(
            Command::new("pull")
                .about("Copy a data product's data into a local directory")
                .arg(
                    Arg::new("product")
                        .required(true)
                        .value_name("PRODUCT")
                        .help("Data product to pull"),
                )
                .arg(
                    Arg::new("destination")
                        .long("destination")
                        .short('d')
                        .help("Local destination directory (default: <PRODUCT>_data)"),
                )
                .arg(
                    Arg::new("stage")
                        .long("stage")
                        .conflicts_with("path")
                        .help("Pipeline stage to pull (default: final)"),
                )
                .arg(
                    Arg::new("path")
                        .long("path")
                        .help("Path inside the product repository"),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List registry data products")
                .arg(
                    Arg::new("imported")
                        .long("imported")
                        .short('i')
                        .action(ArgAction::SetTrue)
                        .help("List this project's imported dependencies instead"),
                ),
        )
}

// =========================================================================
// Registry
// =========================================================================

fn build_registry() -> Command {
    Command::new("registry")
        .about("Catalog registry")
        .subcommand_required(true)
        .subcommand(Command::new("register").about("Propose a catalog entry for this project"))
        .subcommand(
            Command::new("status")
                .about("Registration status")
                .arg(Arg::new("name").help("Project short name (default: this project)")),
        )
        .subcommand(
            Command::new("retry")
                .visible_alias("sync")
                .about("Re-submit registrations that failed"),
        )
        .subcommand(
            Command::new("update")
                .about("Propose local descriptor changes to the catalog entry")
                .arg(Arg::new("project").help("Project short name (default: this project)"))
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Show changes without opening a pull request"),
                ),
        )
}

// =========================================================================
// Config
// =========================================================================

fn build_config() -> Command {
    Command::new("config")
        .about("User configuration")
        .subcommand_required(true)
        .subcommand(Command::new("show").about("Print the effective configuration"))
        .subcommand(Command::new("init").about("Write a default config file if none exists"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_stage_conflicts_with_source_path() {
        let err = build_cli()
            .try_get_matches_from([
                "mintd",
                "data",
                "import",
                "data_claims",
                "--stage",
                "final",
                "--source-path",
                "data/raw",
            ])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_sync_is_retry() {
        let m = build_cli()
            .try_get_matches_from(["mintd", "registry", "sync"])
            .unwrap();
        let (_, registry) = m.subcommand().unwrap();
        assert_eq!(registry.subcommand_name(), Some("retry"));
    }

    #[test]
    fn test_verbosity_counts() {
        let m = build_cli()
            .try_get_matches_from(["mintd", "-vv", "config", "show"])
            .unwrap();
        assert_eq!(m.get_count("verbose"), 2);
    }
}
