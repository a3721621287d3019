//! The document source (C3): restartable, lazily-opened row streams, plus
//! the two key-derivation strategies a caller may apply on top of a raw
//! stream (spec.md §4.3).
//!
//! A [`Document`] only ever hands back [`RawRow`]s — position, a caller- or
//! source-supplied row id, and a list of cell values in column order. Key
//! derivation is a separate concern, applied by wrapping the raw stream in
//! a [`DocumentReader`]. This mirrors the split between a storage engine's
//! raw scan and the row-keying layer built on top of it.

pub mod json;

use std::collections::BTreeMap;

use crate::error::CResult;
use crate::key::{to_composite_key, to_key, Column, Key};
use crate::value::Value;

/// A row as produced by a [`Document`], before any key has been derived.
#[derive(Clone, Debug)]
pub struct RawRow {
    /// Zero-based position of this row within the document. Stable across
    /// repeated `open()` calls, and used as the identifier source for
    /// `Null`/`NewRow` keys so that restarted streams derive identical keys.
    pub position: u64,
    pub rowid: RowId,
    /// Cell values in column order (aligned with [`Document::columns`]).
    pub values: Vec<Value>,
}

/// The row identifier a document source attaches to a raw row, used by
/// [`KeyStrategy::Default`]. A document with no natural identifier reports
/// [`RowId::New`] for every row.
#[derive(Clone, Debug, PartialEq)]
pub enum RowId {
    Number(f64),
    Composite(Vec<f64>),
    New,
}

/// A row with its key derived, ready to be merged against an archive.
#[derive(Clone, Debug)]
pub struct DocumentRow {
    pub position: u64,
    pub key: Key,
    /// Cell values keyed by column id.
    pub values: BTreeMap<u64, Value>,
}

/// The two ways a raw row stream is turned into keyed rows (spec.md §4.3).
#[derive(Clone, Debug)]
pub enum KeyStrategy {
    /// Derive the key from each row's [`RowId`]: a plain row id becomes a
    /// `Number` key, a tuple-shaped id becomes a `Composite` of `Number`
    /// keys, and `RowId::New` becomes a `NewRow` key scoped to the carried
    /// version, so that a row materialized fresh in one commit can never
    /// collide with a `NewRow` key derived for a later commit at the same
    /// position (spec.md §4.6 requires `NewRow` rows to always materialize).
    Default(u64),
    /// Derive the key from the cell values at the given column positions,
    /// classifying each with [`to_key`]. A single column yields a scalar
    /// key; more than one yields a `Composite`.
    Annotated(Vec<usize>),
}

/// Builds the `NewRow` key for a row with no natural identifier, salted by
/// the version it is being derived for. Two rows from different commits at
/// the same position must never produce the same key, or the second
/// commit's merge would wrongly take the `update` branch against the first
/// commit's materialized row instead of `materialize_new`.
fn new_row_key(version: u64, position: u64) -> Key {
    Key::NewRow(version.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(position))
}

/// Classifies one raw row into a [`Key`] per the given strategy.
pub fn derive_key(raw: &RawRow, strategy: &KeyStrategy) -> CResult<Key> {
    match strategy {
        KeyStrategy::Default(version) => match &raw.rowid {
            RowId::New => Ok(new_row_key(*version, raw.position)),
            RowId::Number(n) => Ok(Key::Number(*n)),
            RowId::Composite(parts) => {
                Ok(Key::composite(parts.iter().map(|n| Key::Number(*n)).collect()))
            }
        },
        KeyStrategy::Annotated(key_columns) => {
            let cells: Vec<Value> = key_columns
                .iter()
                .map(|&i| raw.values.get(i).cloned().unwrap_or(Value::Null))
                .collect();
            if cells.len() == 1 {
                to_key(&cells[0], raw.position)
            } else {
                to_composite_key(&cells, raw.position)
            }
        }
    }
}

/// A restartable source of raw rows. `open()` must be callable more than
/// once and yield the same sequence each time (spec.md §4.3's restartability
/// requirement), since the external sorter and the nested merger each need
/// their own pass over a document.
pub trait Document {
    fn columns(&self) -> &[Column];

    fn open(&self) -> CResult<Box<dyn Iterator<Item = CResult<RawRow>> + '_>>;

    /// Releases any resources held by the document (e.g. deletes a backing
    /// temp file). The default implementation does nothing.
    fn close(&self) -> CResult<()> {
        Ok(())
    }
}

/// Wraps a document's raw row stream, applying a [`KeyStrategy`] to produce
/// keyed [`DocumentRow`]s.
pub struct DocumentReader<'a> {
    columns: Vec<Column>,
    iterator: Box<dyn Iterator<Item = CResult<RawRow>> + 'a>,
    strategy: KeyStrategy,
}

impl<'a> DocumentReader<'a> {
    pub fn new(
        columns: Vec<Column>,
        iterator: Box<dyn Iterator<Item = CResult<RawRow>> + 'a>,
        strategy: KeyStrategy,
    ) -> Self {
        Self { columns, iterator, strategy }
    }

    /// Opens `document` and wraps it with `strategy`.
    pub fn open(document: &'a dyn Document, strategy: KeyStrategy) -> CResult<Self> {
        let columns = document.columns().to_vec();
        let iterator = document.open()?;
        Ok(Self::new(columns, iterator, strategy))
    }

    fn keyed(&self, raw: RawRow) -> CResult<DocumentRow> {
        let key = derive_key(&raw, &self.strategy)?;
        let values = self
            .columns
            .iter()
            .zip(raw.values.into_iter())
            .map(|(col, val)| (col.colid, val))
            .collect();
        Ok(DocumentRow { position: raw.position, key, values })
    }
}

impl<'a> Iterator for DocumentReader<'a> {
    type Item = CResult<DocumentRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.iterator.next()? {
            Ok(raw) => Some(self.keyed(raw)),
            Err(err) => Some(Err(err)),
        }
    }
}

/// A document backed entirely by an in-memory row vector. Used for small
/// documents and in tests; mirrors [`crate::archive::memory::MemoryArchiveStore`]'s
/// role as the in-memory counterpart to the file-backed implementation.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDocument {
    columns: Vec<Column>,
    rows: Vec<RawRow>,
}

impl InMemoryDocument {
    pub fn new(columns: Vec<Column>, rows: Vec<RawRow>) -> Self {
        Self { columns, rows }
    }
}

impl Document for InMemoryDocument {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn open(&self) -> CResult<Box<dyn Iterator<Item = CResult<RawRow>> + '_>> {
        Ok(Box::new(self.rows.iter().cloned().map(Ok)))
    }
}
