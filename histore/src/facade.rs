//! The archive façade (C7): the single entry point a caller uses to read
//! and write an archive, binding versions to snapshots and driving the
//! sort + merge + commit pipeline.
//!
//! Grounded on `original_source/histore/archive.py` (a thin façade over
//! merge + store) and `kv_rs::mvcc::mvcc::MVCC<E: Engine>`'s shape: a
//! generic wrapper around a storage backend that owns no mutable state of
//! its own beyond what the backend provides.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::archive::{ArchiveRow, ArchiveStore, ArchiveWriter, ValidatingArchiveWriter};
use crate::document::{Document, DocumentReader, KeyStrategy};
use crate::error::{CResult, Error};
use crate::key::{Column, Key};
use crate::merge;
use crate::sort::SortEngine;
use crate::value::Value;
use crate::version::{Version, VersionMeta};

/// Matches the 16 MiB buffer used in the sort-robustness scenario; a
/// reasonable default for callers with no particular memory budget.
pub const DEFAULT_SORT_BUFFERSIZE: usize = 16 * 1024 * 1024;

/// One archive row as it exists at a particular version: a key, its
/// position in that version, and its per-column cell values.
#[derive(Clone, Debug)]
pub struct ProjectedRow {
    pub key: Key,
    pub position: u64,
    pub values: BTreeMap<u64, Value>,
}

fn project(row: &ArchiveRow, version: Version) -> Option<ProjectedRow> {
    let position = row.position_at(version)?;
    let mut values = BTreeMap::new();
    for &colid in row.values.keys() {
        if let Some(value) = row.value_at(colid, version) {
            values.insert(colid, value.clone());
        }
    }
    Some(ProjectedRow { key: row.key.clone(), position, values })
}

/// One row's change between two versions, as returned by [`Archive::diff`].
#[derive(Clone, Debug)]
pub enum RowDiff {
    Added(ProjectedRow),
    Removed(ProjectedRow),
    Modified { key: Key, before: ProjectedRow, after: ProjectedRow },
}

fn rows_differ(before: &ProjectedRow, after: &ProjectedRow) -> bool {
    if before.position != after.position || before.values.len() != after.values.len() {
        return true;
    }
    before.values.iter().any(|(colid, value)| match after.values.get(colid) {
        Some(other) => !value.cell_eq(other),
        None => true,
    })
}

/// The archive façade: binds versions to snapshots of the rows held by
/// `store`, and drives `sort` + `merge` + commit/rollback for new versions.
pub struct Archive<S: ArchiveStore> {
    store: S,
    sort_buffersize: usize,
}

impl<S: ArchiveStore> Archive<S> {
    pub fn new(store: S, sort_buffersize: usize) -> Self {
        Self { store, sort_buffersize }
    }

    pub fn with_default_buffersize(store: S) -> Self {
        Self::new(store, DEFAULT_SORT_BUFFERSIZE)
    }

    /// The metadata of every committed version, oldest first.
    pub fn snapshots(&self) -> CResult<Vec<VersionMeta>> {
        Ok(self.store.get_reader()?.version_index)
    }

    /// The columns active as of `version`, if any version has been
    /// committed at or before it.
    pub fn columns_at(&self, version: Version) -> CResult<Option<Vec<Column>>> {
        let reader = self.store.get_reader()?;
        Ok(reader.schema_history.columns_at(version).map(|c| c.to_vec()))
    }

    /// A reader over the rows present at `version`, each projected to its
    /// position and cell values as of that version (spec.md §4.7). The
    /// reader reflects the archive as of this call; later commits do not
    /// affect it (spec.md §5 snapshot isolation).
    pub fn checkout(&self, version: Version) -> CResult<Box<dyn Iterator<Item = CResult<ProjectedRow>>>> {
        let rows = self.store.get_reader()?.into_rows();
        Ok(Box::new(rows.filter_map(move |row| match row {
            Err(err) => Some(Err(err)),
            Ok(row) => project(&row, version).map(Ok),
        })))
    }

    /// Rows that were added, removed, or had a cell or position change
    /// between `v1` and `v2`.
    pub fn diff(&self, v1: Version, v2: Version) -> CResult<Vec<RowDiff>> {
        let rows = self.store.get_reader()?.into_rows();
        let mut diffs = Vec::new();
        for row in rows {
            let row = row?;
            match (project(&row, v1), project(&row, v2)) {
                (None, Some(after)) => diffs.push(RowDiff::Added(after)),
                (Some(before), None) => diffs.push(RowDiff::Removed(before)),
                (Some(before), Some(after)) => {
                    if rows_differ(&before, &after) {
                        diffs.push(RowDiff::Modified { key: row.key.clone(), before, after });
                    }
                }
                (None, None) => {}
            }
        }
        Ok(diffs)
    }

    /// Commits `document` as the next version: sorts it (when `key_columns`
    /// is given) or takes it as already ordered by row id (when `None`,
    /// matching the default reader's assumption that a document's natural
    /// order already tracks insertion position), merges it against the
    /// current archive, and installs the result. On any failure the
    /// store's pending writer is rolled back and no version id is
    /// consumed.
    pub fn commit(
        &self,
        document: &dyn Document,
        key_columns: Option<Vec<usize>>,
        label: Option<String>,
        description: Option<String>,
    ) -> CResult<Version> {
        let reader = self.store.get_reader()?;
        let next_version = reader.version_index.last().map(|v| v.version + 1).unwrap_or(0);
        let schema_history = reader.schema_history.clone();

        if let Some(cols) = &key_columns {
            for &idx in cols {
                if idx >= document.columns().len() {
                    return Err(Error::SchemaMismatch(format!(
                        "key column index {} out of range for a document with {} columns",
                        idx,
                        document.columns().len()
                    )));
                }
            }
            if let Some(existing) = schema_history.latest() {
                for &idx in cols {
                    let colid = document.columns()[idx].colid;
                    if !existing.iter().any(|c| c.colid == colid) {
                        return Err(Error::SchemaMismatch(format!(
                            "key column id {} is not part of the archive's current schema",
                            colid
                        )));
                    }
                }
            }
        }

        let archive_rows = reader.into_rows();
        let writer = self.store.get_writer()?;
        let mut writer = ValidatingArchiveWriter::new(writer);

        // Any failure from here on (sort, key derivation, or the merge
        // itself) must still release the writer lock via rollback, so every
        // fallible step is confined to this closure rather than using `?`
        // directly against `commit`'s own return type.
        let merge_result: CResult<()> = (|| match &key_columns {
            Some(cols) => {
                let sorted = SortEngine::new(self.sort_buffersize).sort(document, cols)?;
                let document_rows = DocumentReader::open(&sorted, KeyStrategy::Annotated(cols.clone()))?;
                let result = merge::merge(archive_rows, document_rows, next_version, &mut writer);
                sorted.close()?;
                result
            }
            None => {
                let document_rows = DocumentReader::open(document, KeyStrategy::Default(next_version))?;
                merge::merge(archive_rows, document_rows, next_version, &mut writer)
            }
        })();

        match merge_result {
            Ok(()) => {
                let mut version_meta = VersionMeta::new(next_version, Utc::now());
                if let Some(label) = label {
                    version_meta = version_meta.with_label(label);
                }
                if let Some(description) = description {
                    version_meta = version_meta.with_description(description);
                }
                let schema = document.columns().to_vec();
                Box::new(writer).commit(version_meta, schema)?;
                log::debug!("committed version {}", next_version);
                Ok(next_version)
            }
            Err(err) => {
                log::warn!("commit of version {} failed, rolling back: {}", next_version, err);
                Box::new(writer).rollback()?;
                Err(err)
            }
        }
    }
}
