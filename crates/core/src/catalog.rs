//! Typed catalog tree, structural diff and section merge
//!
//! Registry catalog entries and project descriptors are both free-form
//! documents. They are modelled as a [`CatalogValue`] tree (scalars,
//! ordered sequences, key-ordered mappings) so that diffing is a plain tree
//! walk instead of ad-hoc key probing.
//!
//! ## Diff rules
//!
//! For every key present on either side of two mappings:
//! - both values are mappings: recurse with the key appended to the path
//! - otherwise, if the values differ: emit one [`CatalogChange`] leaf
//!
//! Sequences are compared as whole values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Top-level sections a local descriptor overrides when merged into a
/// registry entry. Sections outside this list keep their registry value.
pub const SYNCED_SECTIONS: &[&str] = &[
    "project",
    "metadata",
    "ownership",
    "access_control",
    "repository",
    "storage",
];

/// A node of a catalog document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogValue {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Integer(i64),
    /// Floating-point number
    Float(f64),
    /// String
    String(String),
    /// Ordered sequence
    Sequence(Vec<CatalogValue>),
    /// Key-ordered mapping
    Mapping(BTreeMap<String, CatalogValue>),
}

impl Default for CatalogValue {
    fn default() -> Self {
        CatalogValue::Mapping(BTreeMap::new())
    }
}

impl CatalogValue {
    /// Child mapping, if this node is a mapping
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, CatalogValue>> {
        match self {
            CatalogValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// String content, if this node is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CatalogValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Value at a key in a mapping node
    pub fn get(&self, key: &str) -> Option<&CatalogValue> {
        self.as_mapping()?.get(key)
    }

    /// Value at a dotted path (`repository.github_url`)
    pub fn get_path(&self, path: &str) -> Option<&CatalogValue> {
        path.split('.').try_fold(self, |node, key| node.get(key))
    }

    /// String at a dotted path
    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.get_path(path)?.as_str()
    }

    /// Set a value at a dotted path, creating intermediate mappings and
    /// replacing non-mapping nodes in the way.
    pub fn set_path(&mut self, path: &str, value: CatalogValue) {
        let mut keys = path.split('.').peekable();
        let mut node = self;
        while let Some(key) = keys.next() {
            if !matches!(node, CatalogValue::Mapping(_)) {
                *node = CatalogValue::Mapping(BTreeMap::new());
            }
            let CatalogValue::Mapping(map) = node else {
                return;
            };
            if keys.peek().is_none() {
                map.insert(key.to_string(), value);
                return;
            }
            node = map
                .entry(key.to_string())
                .or_insert_with(|| CatalogValue::Mapping(BTreeMap::new()));
        }
    }

    /// Compact single-line rendering used in change listings
    pub fn render(&self) -> String {
        match self {
            CatalogValue::String(s) => format!("'{}'", s),
            other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
        }
    }
}

impl From<&str> for CatalogValue {
    fn from(s: &str) -> Self {
        CatalogValue::String(s.to_string())
    }
}

impl From<String> for CatalogValue {
    fn from(s: String) -> Self {
        CatalogValue::String(s)
    }
}

/// One leaf difference between two catalog trees
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogChange {
    /// Dotted key path of the leaf
    pub path: String,
    /// Value in the old tree, `None` if the key was absent
    pub old: Option<CatalogValue>,
    /// Value in the new tree, `None` if the key was absent
    pub new: Option<CatalogValue>,
}

fn render_side(v: &Option<CatalogValue>) -> String {
    match v {
        Some(v) => v.render(),
        None => "None".to_string(),
    }
}

impl fmt::Display for CatalogChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} → {}",
            self.path,
            render_side(&self.old),
            render_side(&self.new)
        )
    }
}

/// Structural diff of two trees. Non-mapping roots are compared as a single
/// leaf with an empty path.
pub fn diff(old: &CatalogValue, new: &CatalogValue) -> Vec<CatalogChange> {
    let mut changes = Vec::new();
    match (old, new) {
        (CatalogValue::Mapping(a), CatalogValue::Mapping(b)) => diff_mappings(a, b, "", &mut changes),
        _ if old != new => changes.push(CatalogChange {
            path: String::new(),
            old: Some(old.clone()),
            new: Some(new.clone()),
        }),
        _ => {}
    }
    changes
}

fn diff_mappings(
    old: &BTreeMap<String, CatalogValue>,
    new: &BTreeMap<String, CatalogValue>,
    prefix: &str,
    out: &mut Vec<CatalogChange>,
) {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for key in keys {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let (a, b) = (old.get(key), new.get(key));
        if a == b {
            continue;
        }
        match (a, b) {
            (Some(CatalogValue::Mapping(ma)), Some(CatalogValue::Mapping(mb))) => {
                diff_mappings(ma, mb, &path, out)
            }
            _ => out.push(CatalogChange {
                path,
                old: a.cloned(),
                new: b.cloned(),
            }),
        }
    }
}

/// Merge a local descriptor into a registry entry.
///
/// Starts from `remote`; every section named in `sections` that the local
/// tree carries replaces the remote one wholesale. Everything else is kept
/// from the remote entry.
pub fn merge_sections(remote: &CatalogValue, local: &CatalogValue, sections: &[&str]) -> CatalogValue {
    let mut merged = match remote {
        CatalogValue::Mapping(m) => m.clone(),
        _ => BTreeMap::new(),
    };
    if let Some(local) = local.as_mapping() {
        for section in sections {
            if let Some(value) = local.get(*section) {
                merged.insert((*section).to_string(), value.clone());
            }
        }
    }
    CatalogValue::Mapping(merged)
}

/// Registry catalog subdirectory for each project kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Data products (`catalog/data`)
    Data,
    /// Analysis projects (`catalog/projects`)
    Project,
    /// Infrastructure projects (`catalog/infra`)
    Infra,
}

impl EntryKind {
    /// All kinds, in lookup order
    pub const ALL: [EntryKind; 3] = [EntryKind::Data, EntryKind::Project, EntryKind::Infra];

    /// Parse a descriptor's `project.type`
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "data" => Some(EntryKind::Data),
            "project" | "prj" => Some(EntryKind::Project),
            "infra" => Some(EntryKind::Infra),
            _ => None,
        }
    }

    /// The `project.type` value
    pub fn type_name(self) -> &'static str {
        match self {
            EntryKind::Data => "data",
            EntryKind::Project => "project",
            EntryKind::Infra => "infra",
        }
    }

    /// Directory under `catalog/`
    pub fn dir_name(self) -> &'static str {
        match self {
            EntryKind::Data => "data",
            EntryKind::Project => "projects",
            EntryKind::Infra => "infra",
        }
    }

    /// Relative path of an entry inside the registry repository
    pub fn entry_path(self, name: &str) -> String {
        format!("catalog/{}/{}.yaml", self.dir_name(), name)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
