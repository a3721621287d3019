//! The nested merger (C6): a single synchronized pass over a sorted archive
//! row stream and a sorted document row stream, producing the archive row
//! stream for the next version.
//!
//! Grounded on `original_source/histore/merge.py`'s `merge_positions` and
//! the three-way branch on `comp` in its tree-walking merge, re-expressed
//! over the row-oriented archive (the original's recursive tree-node merge
//! is dropped — see DESIGN.md).

use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::archive::{ArchiveRow, ArchiveWriter};
use crate::document::DocumentRow;
use crate::error::{CResult, Error};
use crate::key::Key;
use crate::timestamp::Timestamp;
use crate::value::Value;

trait Keyed {
    fn key(&self) -> &Key;
}

impl Keyed for ArchiveRow {
    fn key(&self) -> &Key {
        &self.key
    }
}

impl Keyed for DocumentRow {
    fn key(&self) -> &Key {
        &self.key
    }
}

/// Wraps a row iterator, failing fast with `StreamUnordered` the moment a
/// key does not strictly exceed the previous one (spec.md §4.6's failure
/// semantics).
struct OrderedStream<I, T> {
    iter: I,
    last: Option<Key>,
    label: &'static str,
    _marker: PhantomData<T>,
}

impl<I, T> OrderedStream<I, T>
where
    I: Iterator<Item = CResult<T>>,
    T: Keyed,
{
    fn new(iter: I, label: &'static str) -> Self {
        Self { iter, last: None, label, _marker: PhantomData }
    }

    fn next(&mut self) -> CResult<Option<T>> {
        match self.iter.next() {
            None => Ok(None),
            Some(Err(err)) => Err(err),
            Some(Ok(item)) => {
                if let Some(last) = &self.last {
                    if item.key() <= last {
                        return Err(Error::StreamUnordered(format!(
                            "{} stream is not strictly ascending at key {}",
                            self.label,
                            item.key()
                        )));
                    }
                }
                self.last = Some(item.key().clone());
                Ok(Some(item))
            }
        }
    }
}

/// Emits `a` unchanged: its presence timestamp is not extended, marking the
/// row absent in the new version.
fn carry_forward(a: ArchiveRow) -> ArchiveRow {
    a
}

/// Creates a fresh archive row for a document row with no counterpart in
/// the archive: present only in `version`.
fn materialize_new(d: DocumentRow, version: u64) -> CResult<ArchiveRow> {
    ArchiveRow::materialize(d.key, d.position, d.values, version)
}

/// Extends `a`'s position history with `d`'s position for `version`: if the
/// most recent position already equals `d`'s, its timestamp is extended
/// (coalescing); otherwise a new positional entry is appended.
fn merge_positions(mut positions: Vec<(u64, Timestamp)>, new_position: u64, version: u64) -> CResult<Vec<(u64, Timestamp)>> {
    if let Some((last_position, _)) = positions.last() {
        if *last_position == new_position {
            let (position, ts) = positions.pop().expect("checked non-empty above");
            positions.push((position, ts.append(version)?));
            return Ok(positions);
        }
    }
    positions.push((new_position, Timestamp::new().append(version)?));
    Ok(positions)
}

/// Reconciles an existing archive row with the document row sharing its
/// key: each of `d`'s cells either extends the archive's most recent value
/// entry (when unchanged, per cell equality) or starts a new one; columns
/// present in `a` but absent from `d` are left untouched.
fn update(a: ArchiveRow, d: DocumentRow, version: u64) -> CResult<ArchiveRow> {
    let mut values = a.values;
    for (colid, new_value) in &d.values {
        let entries = values.entry(*colid).or_insert_with(Vec::new);
        let extends_last = matches!(entries.last(), Some((v, _)) if v.cell_eq(new_value));
        if extends_last {
            let (v, ts): (Value, Timestamp) = entries.pop().expect("checked non-empty above");
            entries.push((v, ts.append(version)?));
        } else {
            entries.push((new_value.clone(), Timestamp::new().append(version)?));
        }
    }

    let positions = merge_positions(a.positions, d.position, version)?;
    Ok(ArchiveRow { key: a.key, positions, values })
}

/// Runs the nested merge: a single pass over `archive` (ascending by key)
/// and `document` (ascending by key), writing the next archive generation
/// to `writer`. Fails fast with `StreamUnordered` if either stream is not
/// strictly ascending.
pub fn merge(
    archive: impl Iterator<Item = CResult<ArchiveRow>>,
    document: impl Iterator<Item = CResult<DocumentRow>>,
    version: u64,
    writer: &mut dyn ArchiveWriter,
) -> CResult<()> {
    let mut archive = OrderedStream::new(archive, "archive");
    let mut document = OrderedStream::new(document, "document");

    let mut a_head = archive.next()?;
    let mut d_head = document.next()?;

    loop {
        match (a_head.take(), d_head.take()) {
            (Some(a), Some(d)) => match a.key.cmp(&d.key) {
                Ordering::Less => {
                    writer.write(carry_forward(a))?;
                    d_head = Some(d);
                    a_head = archive.next()?;
                }
                Ordering::Greater => {
                    writer.write(materialize_new(d, version)?)?;
                    a_head = Some(a);
                    d_head = document.next()?;
                }
                Ordering::Equal => {
                    writer.write(update(a, d, version)?)?;
                    a_head = archive.next()?;
                    d_head = document.next()?;
                }
            },
            (Some(a), None) => {
                writer.write(carry_forward(a))?;
                a_head = archive.next()?;
            }
            (None, Some(d)) => {
                writer.write(materialize_new(d, version)?)?;
                d_head = document.next()?;
            }
            (None, None) => break,
        }
    }

    Ok(())
}
