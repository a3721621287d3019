//! The `ArchiveStore` abstraction (spec.md §4.5): an object-safe reader/
//! writer pair over a row stream, plus the `ValidatingArchiveWriter` that
//! any concrete writer can be wrapped in to enforce ascending-key order.

use std::cmp::Ordering;

use super::ArchiveRow;
use crate::error::{CResult, Error};
use crate::key::Column;
use crate::version::{SchemaHistory, VersionMeta};

/// A forward-only view over one committed archive generation: its row
/// stream plus the schema and version metadata in effect when the reader
/// was opened (spec.md §5's snapshot isolation — a reader observes the
/// state as of `get_reader()`, unaffected by later commits).
pub struct ArchiveReader {
    pub schema_history: SchemaHistory,
    pub version_index: Vec<VersionMeta>,
    rows: Box<dyn Iterator<Item = CResult<ArchiveRow>>>,
}

impl ArchiveReader {
    pub fn new(
        schema_history: SchemaHistory,
        version_index: Vec<VersionMeta>,
        rows: Box<dyn Iterator<Item = CResult<ArchiveRow>>>,
    ) -> Self {
        Self { schema_history, version_index, rows }
    }

    /// Consumes the reader, yielding its row stream.
    pub fn into_rows(self) -> Box<dyn Iterator<Item = CResult<ArchiveRow>>> {
        self.rows
    }
}

/// A write handle for a pending commit. Accepts archive rows in ascending
/// key order (enforce that with [`ValidatingArchiveWriter`] if the source
/// isn't already known to be ordered), then either `commit`s them as the
/// new current archive generation or `rollback`s, discarding them.
pub trait ArchiveWriter {
    fn write(&mut self, row: ArchiveRow) -> CResult<()>;

    /// Atomically installs the written rows as the new current archive,
    /// recording `version` and the schema in effect as of this commit.
    fn commit(self: Box<Self>, version: VersionMeta, schema: Vec<Column>) -> CResult<()>;

    /// Discards the written rows and releases the writer lock.
    fn rollback(self: Box<Self>) -> CResult<()>;
}

/// Persists and streams archive rows in key order (spec.md §4.5). A store
/// enforces at most one writer at a time (spec.md §5); `get_writer` returns
/// `WriterBusy` while another writer is pending.
pub trait ArchiveStore {
    fn get_reader(&self) -> CResult<ArchiveReader>;
    fn get_writer(&self) -> CResult<Box<dyn ArchiveWriter>>;
}

/// Wraps any [`ArchiveWriter`], rejecting keys that do not strictly
/// increase. A write with a key equal to the previous one is treated as a
/// permitted duplicate emission and silently dropped rather than passed
/// through (spec.md §4.5 (ii)).
pub struct ValidatingArchiveWriter {
    inner: Box<dyn ArchiveWriter>,
    last_key: Option<crate::key::Key>,
}

impl ValidatingArchiveWriter {
    pub fn new(inner: Box<dyn ArchiveWriter>) -> Self {
        Self { inner, last_key: None }
    }
}

impl ArchiveWriter for ValidatingArchiveWriter {
    fn write(&mut self, row: ArchiveRow) -> CResult<()> {
        if let Some(last) = &self.last_key {
            match row.key.cmp(last) {
                Ordering::Less => {
                    return Err(Error::OutOfOrderWrite(format!(
                        "key {} is not greater than previously written key {}",
                        row.key, last
                    )))
                }
                Ordering::Equal => return Ok(()),
                Ordering::Greater => {}
            }
        }
        self.last_key = Some(row.key.clone());
        self.inner.write(row)
    }

    fn commit(self: Box<Self>, version: VersionMeta, schema: Vec<Column>) -> CResult<()> {
        self.inner.commit(version, schema)
    }

    fn rollback(self: Box<Self>) -> CResult<()> {
        self.inner.rollback()
    }
}
