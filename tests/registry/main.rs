//! Catalog registry: registration, status and descriptor sync, driven
//! through a git-backed registry over fake git and gh.

#[path = "../common/mod.rs"]
mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::{FakeGit, FakeRegistry};
use mintd_core::{CatalogValue, PROJECT_DESCRIPTOR_FILE};
use mintd_engine::registry::{register_project, retry_pending, RegistrationOutcome};
use mintd_engine::testing::FakeHosting;
use mintd_engine::{
    update_project, CatalogUpdate, GitRegistry, PendingRegistrations, Registry, RegistrationStatus,
};
use tempfile::TempDir;

const REGISTRY_URL: &str = "https://github.com/lab/registry";
const ENTRY_FILE: &str = "catalog/projects/readmit.yaml";

const DESCRIPTOR: &str = r#"{
  "project": {"name": "readmit", "type": "project", "full_name": "prj_readmit"},
  "metadata": {"description": "Readmission risk study"},
  "ownership": {"created_by": "mz"},
  "access_control": {"teams": [{"name": "outcomes", "permission": "admin"}]},
  "status": {"lifecycle": "active"}
}"#;

const REGISTERED: &str = "\
project:
  name: readmit
  type: project
  full_name: prj_readmit
metadata:
  description: Readmission risk study
ownership:
  created_by: mz
access_control:
  teams:
  - name: outcomes
    permission: admin
status:
  lifecycle: active
review:
  approved_by: data-governance
";

struct Fixture {
    tmp: TempDir,
    project: PathBuf,
    registry: GitRegistry<FakeGit, FakeHosting>,
}

impl Fixture {
    /// Registry origin with `files`, and a project with `descriptor`
    fn new(files: &[(&str, &str)], descriptor: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let origin = tmp.path().join("registry");
        fs::create_dir_all(&origin).unwrap();
        fs::write(origin.join("README.md"), "# Lab registry\n").unwrap();
        for (rel, body) in files {
            let path = origin.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        let project = tmp.path().join("readmit");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join(PROJECT_DESCRIPTOR_FILE), descriptor).unwrap();

        let git = FakeGit::new();
        git.add_remote("git@github.com:lab/registry.git", &origin);
        let registry = GitRegistry::new(REGISTRY_URL, "main", git, FakeHosting::new()).unwrap();
        Self {
            tmp,
            project,
            registry,
        }
    }

    fn project(&self) -> &Path {
        &self.project
    }
}

fn parse(yaml: &str) -> CatalogValue {
    serde_yaml::from_str(yaml).unwrap()
}

// ============================================================================
// Catalog update
// ============================================================================

#[test]
fn identical_descriptor_is_a_no_op() {
    let registered = REGISTERED.replace("review:\n  approved_by: data-governance\n", "");
    let f = Fixture::new(&[(ENTRY_FILE, &registered)], DESCRIPTOR);

    let update = update_project(&f.registry, f.project(), None, false).unwrap();
    assert!(matches!(update, CatalogUpdate::NoChanges));
    assert!(f.registry.source_control().commits().is_empty());
    assert!(f.registry.hosting().created().is_empty());
}

#[test]
fn dry_run_reports_changes_without_writing() {
    let f = Fixture::new(
        &[(ENTRY_FILE, REGISTERED)],
        &DESCRIPTOR.replace("Readmission risk study", "30-day readmission risk"),
    );

    let update = update_project(&f.registry, f.project(), None, true).unwrap();
    let paths: Vec<_> = update.changes().iter().map(|c| c.path.as_str()).collect();
    assert!(paths.contains(&"metadata.description"));
    assert!(matches!(update, CatalogUpdate::DryRun { .. }));
    assert!(f.registry.source_control().commits().is_empty());
    assert!(f.registry.source_control().pushed().is_empty());
}

#[test]
fn changes_are_proposed_as_a_pull_request() {
    let f = Fixture::new(
        &[(ENTRY_FILE, REGISTERED)],
        &DESCRIPTOR.replace("Readmission risk study", "30-day readmission risk"),
    );

    let update = update_project(&f.registry, f.project(), Some("readmit"), false).unwrap();
    let CatalogUpdate::Proposed { branch, pr_url, .. } = update else {
        panic!("expected a proposal");
    };
    assert!(branch.starts_with("update-readmit-"));
    assert_eq!(pr_url, "https://github.com/lab/registry/pull/1");

    let git = f.registry.source_control();
    assert_eq!(git.pushed(), vec![branch.clone()]);
    let commits = git.commits();
    let commit = &commits[0];
    assert_eq!(commit.branch, branch);

    let written = parse(&commit.files[ENTRY_FILE]);
    assert_eq!(written.str_at("metadata.description"), Some("30-day readmission risk"));
    // registry-only sections survive the merge
    assert_eq!(written.str_at("review.approved_by"), Some("data-governance"));
    assert!(written.str_at("status.last_updated").is_some());

    let prs = f.registry.hosting().created();
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].base, "main");
    assert!(prs[0].body.contains("metadata.description"));
}

#[test]
fn updating_an_unregistered_project_fails() {
    let f = Fixture::new(&[], DESCRIPTOR);
    let err = update_project(&f.registry, f.project(), None, false).unwrap_err();
    assert!(err.suggestion().unwrap().contains("registry register"));
}

// ============================================================================
// Registration and status
// ============================================================================

#[test]
fn register_opens_a_pull_request_with_defaults() {
    let f = Fixture::new(&[], DESCRIPTOR);
    let pending = PendingRegistrations::new(f.tmp.path().join("pending"));

    let outcome = register_project(&f.registry, &pending, f.project()).unwrap();
    assert!(matches!(outcome, RegistrationOutcome::Submitted { .. }));

    let git = f.registry.source_control();
    assert_eq!(git.pushed(), vec!["register-readmit".to_string()]);
    let entry = parse(&git.commits()[0].files[ENTRY_FILE]);
    assert_eq!(entry.str_at("storage.dvc.bucket"), Some("lab-projects"));
    assert!(entry.get_path("metadata.data_dependencies").is_some());
    assert!(pending.list().unwrap().is_empty());
}

#[test]
fn status_reflects_registry_and_open_pull_requests() {
    let f = Fixture::new(&[(ENTRY_FILE, REGISTERED)], DESCRIPTOR);
    match f.registry.registration_status("readmit").unwrap() {
        RegistrationStatus::Registered { full_name, url, .. } => {
            assert_eq!(full_name, "project_readmit");
            assert_eq!(url, format!("{}/blob/main/{}", REGISTRY_URL, ENTRY_FILE));
        }
        other => panic!("expected registered, got {:?}", other),
    }

    f.registry.hosting().add_open_pr(
        "Register new project project: cohort",
        "https://github.com/lab/registry/pull/7",
        "register-cohort",
    );
    assert_eq!(
        f.registry.registration_status("cohort").unwrap(),
        RegistrationStatus::PendingReview {
            pr_url: "https://github.com/lab/registry/pull/7".into(),
            pr_title: "Register new project project: cohort".into(),
        }
    );
    assert_eq!(
        f.registry.registration_status("other").unwrap(),
        RegistrationStatus::NotFound
    );
}

#[test]
fn failed_registration_is_deferred_then_retried() {
    let f = Fixture::new(&[], DESCRIPTOR);
    let pending = PendingRegistrations::new(f.tmp.path().join("pending"));
    let registry = FakeRegistry::new();
    registry.fail_submissions(true);

    let outcome = register_project(&registry, &pending, f.project()).unwrap();
    let RegistrationOutcome::Deferred { pending_file, .. } = outcome else {
        panic!("expected deferral");
    };
    assert!(pending_file.is_file());
    assert_eq!(pending.list().unwrap().len(), 1);

    let still_failing = retry_pending(&registry, &pending).unwrap();
    assert!(still_failing[0].outcome.is_err());
    assert_eq!(pending.list().unwrap().len(), 1);

    registry.fail_submissions(false);
    let retried = retry_pending(&registry, &pending).unwrap();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].full_name, "prj_readmit");
    assert!(retried[0].outcome.is_ok());
    assert!(pending.list().unwrap().is_empty());
    assert_eq!(registry.submitted()[0].branch, "register-readmit");
}

#[test]
fn incomplete_descriptor_is_a_hard_error() {
    let f = Fixture::new(&[], r#"{"project": {"name": "readmit", "type": "project"}}"#);
    let pending = PendingRegistrations::new(f.tmp.path().join("pending"));
    assert!(register_project(&f.registry, &pending, f.project()).is_err());
    assert!(pending.list().unwrap().is_empty());
}
