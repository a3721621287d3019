//! Version and schema-evolution bookkeeping: the metadata an archive keeps
//! alongside its row stream (spec.md §3's `version_index`, §6's schema
//! evolution). Grounded on `kv_rs::mvcc::mod`'s `type Version = u64` plus
//! `kv_rs::mvcc::transaction::TransactionState`'s struct-of-metadata idiom.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::Column;

/// A committed version identifier. Strictly increasing by 1, starting at 0
/// (spec.md §5's ordering guarantee).
pub type Version = u64;

/// Metadata recorded for one committed version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionMeta {
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub label: Option<String>,
    pub description: Option<String>,
}

impl VersionMeta {
    pub fn new(version: Version, created_at: DateTime<Utc>) -> Self {
        Self { version, created_at, label: None, description: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The active schema (column set) as of one version, and the full history
/// of schemas across all committed versions (spec.md §6 schema evolution:
/// adding a column appends to the history; removing one drops it from the
/// active schema while prior versions retain their historic cells).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaHistory {
    entries: Vec<(Version, Vec<Column>)>,
}

impl SchemaHistory {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Records the active schema as of `version`. Versions must be recorded
    /// in increasing order, matching how commits are applied.
    pub fn push(&mut self, version: Version, columns: Vec<Column>) {
        if let Some((_, previous)) = self.entries.last() {
            let added: Vec<&str> = columns.iter().filter(|c| !previous.iter().any(|p| p.colid == c.colid)).map(|c| c.name.as_str()).collect();
            let removed: Vec<&str> = previous.iter().filter(|c| !columns.iter().any(|n| n.colid == c.colid)).map(|c| c.name.as_str()).collect();
            if !added.is_empty() || !removed.is_empty() {
                log::debug!("schema changed at version {}: added {:?}, removed {:?}", version, added, removed);
            }
        }
        self.entries.push((version, columns));
    }

    /// The schema in effect at `version`: the columns recorded for the
    /// latest entry at or before `version`.
    pub fn columns_at(&self, version: Version) -> Option<&[Column]> {
        self.entries
            .iter()
            .rev()
            .find(|(v, _)| *v <= version)
            .map(|(_, columns)| columns.as_slice())
    }

    /// The most recently recorded schema, i.e. the active schema for the
    /// next commit.
    pub fn latest(&self) -> Option<&[Column]> {
        self.entries.last().map(|(_, columns)| columns.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
