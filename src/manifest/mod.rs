//! Sub-spec manifest produced by `ralph decompose`.
//!
//! The manifest is written by an external step, so two spellings are accepted
//! for the sub-spec list (`sub_specs`/`subSpecs`), entry identifiers
//! (`name`/`id`) and dependency lists (`dependencies`/`deps`). Whichever
//! spelling the file uses is written back unchanged, and fields this crate
//! does not know about are preserved across rewrites.

pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use store::{ManifestError, ManifestStore};

/// Scheduling status of a sub-spec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubSpecStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
    MergeConflict,
}

impl SubSpecStatus {
    /// Stable label, matching the manifest encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubSpecStatus::Pending => "pending",
            SubSpecStatus::InProgress => "in_progress",
            SubSpecStatus::Complete => "complete",
            SubSpecStatus::Failed => "failed",
            SubSpecStatus::MergeConflict => "merge_conflict",
        }
    }

    /// Whether the node can make no further progress in this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubSpecStatus::Complete | SubSpecStatus::Failed | SubSpecStatus::MergeConflict
        )
    }
}

impl fmt::Display for SubSpecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional `complete`/`total` summary kept for display tooling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub complete: usize,
    #[serde(default)]
    pub total: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the manifest's sub-spec list, as written on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubSpecEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubSpecStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubSpecEntry {
    /// Create an entry using the `name`/`dependencies` spelling.
    pub fn new(name: impl Into<String>, dependencies: &[&str]) -> Self {
        Self {
            name: Some(name.into()),
            dependencies: Some(dependencies.iter().map(|d| d.to_string()).collect()),
            ..Self::default()
        }
    }

    /// The entry's identifier: `name`, falling back to `id`. Blank values
    /// count as absent.
    pub fn resolved_name(&self) -> Option<&str> {
        [self.name.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|n| !n.is_empty())
    }

    /// Declared dependencies: `dependencies`, falling back to `deps`.
    pub fn declared_dependencies(&self) -> &[String] {
        self.dependencies
            .as_deref()
            .or(self.deps.as_deref())
            .unwrap_or(&[])
    }

    /// Stored status, `pending` when absent.
    pub fn resolved_status(&self) -> SubSpecStatus {
        self.status.unwrap_or_default()
    }
}

/// The persisted decomposition of one spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_specs: Option<Vec<SubSpecEntry>>,
    #[serde(default, rename = "subSpecs", skip_serializing_if = "Option::is_none")]
    pub sub_specs_camel: Option<Vec<SubSpecEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Build a manifest from entries, using the `sub_specs` spelling.
    pub fn from_entries(entries: Vec<SubSpecEntry>) -> Self {
        Self {
            sub_specs: Some(entries),
            ..Self::default()
        }
    }

    /// Sub-spec entries in decomposition order. `sub_specs` wins when both
    /// spellings are present.
    pub fn entries(&self) -> &[SubSpecEntry] {
        self.sub_specs
            .as_deref()
            .or(self.sub_specs_camel.as_deref())
            .unwrap_or(&[])
    }

    pub fn entries_mut(&mut self) -> &mut [SubSpecEntry] {
        if self.sub_specs.is_some() {
            self.sub_specs.as_deref_mut().unwrap_or_default()
        } else {
            self.sub_specs_camel.as_deref_mut().unwrap_or_default()
        }
    }

    /// Look up the stored status of an entry by resolved name.
    pub fn status_of(&self, name: &str) -> Option<SubSpecStatus> {
        self.entries()
            .iter()
            .find(|e| e.resolved_name() == Some(name))
            .map(SubSpecEntry::resolved_status)
    }

    /// Write the given statuses back into matching entries and refresh the
    /// progress summary. Entries without a resolvable name are left alone.
    pub fn apply_statuses<'a, I>(&mut self, statuses: I)
    where
        I: IntoIterator<Item = (&'a str, SubSpecStatus)>,
    {
        for (name, status) in statuses {
            for entry in self.entries_mut() {
                if entry.resolved_name() == Some(name) {
                    entry.status = Some(status);
                }
            }
        }

        let total = self.entries().len();
        let complete = self
            .entries()
            .iter()
            .filter(|e| e.resolved_status() == SubSpecStatus::Complete)
            .count();
        let progress = self.progress.get_or_insert_with(Progress::default);
        progress.complete = complete;
        progress.total = total;
    }
}
