//! The external mergesort (C4): sorts a [`Document`] by a list of key
//! columns without requiring the whole document to fit in memory.
//!
//! Two phases, grounded on `storage::log::Log`'s buffered file-handling
//! idiom: `split` drains the input into sorted runs bounded by
//! `buffersize`, spilling each run to its own temp file once the estimated
//! buffered byte size is exceeded; the merge phase does a stable k-way
//! merge of the spilled runs (plus whatever remained buffered) into a
//! single sorted output file.

use std::path::{Path, PathBuf};

use crate::document::json::{JsonDocument, JsonDocumentWriter};
use crate::document::{derive_key, Document, KeyStrategy, RawRow};
use crate::encoding::encode_value;
use crate::error::CResult;
use crate::key::{Column, Key};

struct BufferedRow {
    key: Key,
    raw: RawRow,
}

fn estimate_size(raw: &RawRow) -> usize {
    raw.values.iter().map(|v| serde_json::to_string(&encode_value(v)).map(|s| s.len()).unwrap_or(0)).sum::<usize>() + 16
}

/// Sorts documents by a set of key columns, spilling to disk when the
/// buffered rows exceed `buffersize` bytes.
pub struct SortEngine {
    buffersize: usize,
}

impl SortEngine {
    pub fn new(buffersize: usize) -> Self {
        Self { buffersize }
    }

    /// Returns a document whose rows are `document`'s rows reordered by
    /// ascending key, where the key is derived from `keys` (column
    /// positions) using the annotated key strategy. The result is backed
    /// by a temp file that is removed when the returned document is
    /// closed.
    pub fn sort(&self, document: &dyn Document, keys: &[usize]) -> CResult<JsonDocument> {
        let columns = document.columns().to_vec();
        let strategy = KeyStrategy::Annotated(keys.to_vec());

        let run_dir = tempfile::tempdir()?;
        let mut buffer = Vec::new();
        let mut buffered_size = 0usize;
        let mut run_paths = Vec::new();

        for raw in document.open()? {
            let raw = raw?;
            let key = derive_key(&raw, &strategy)?;
            buffered_size += estimate_size(&raw);
            buffer.push(BufferedRow { key, raw });

            if buffered_size >= self.buffersize {
                buffer.sort_by(|a, b| a.key.cmp(&b.key));
                let run_path = run_dir.path().join(format!("run-{}.ndjson", run_paths.len()));
                log::debug!("spilling sort run {} ({} rows, ~{} bytes) to {:?}", run_paths.len(), buffer.len(), buffered_size, run_path);
                write_run(&run_path, &columns, &buffer)?;
                buffer.clear();
                buffered_size = 0;
                run_paths.push(run_path);
            }
        }
        buffer.sort_by(|a, b| a.key.cmp(&b.key));

        if run_paths.is_empty() {
            log::debug!("sort input fit entirely in the buffer ({} rows); skipping the merge pass", buffer.len());
        }
        let output_path = fresh_temp_path()?;
        self.mergesort(buffer, &run_paths, &columns, &strategy, &output_path)?;

        JsonDocument::new(output_path, false, true)
    }

    /// Merges the still-buffered rows and the spilled run files into a
    /// single sorted output file, preserving original row order among rows
    /// that compare equal (runs are merged in the order they were spilled,
    /// which is also original-position order).
    fn mergesort(
        &self,
        buffer: Vec<BufferedRow>,
        run_paths: &[PathBuf],
        columns: &[Column],
        strategy: &KeyStrategy,
        output_path: &Path,
    ) -> CResult<()> {
        let mut runs: Vec<RunCursor> = Vec::with_capacity(run_paths.len() + 1);
        if !buffer.is_empty() {
            runs.push(RunCursor::Buffered(buffer.into_iter()));
        }
        let mut open_docs = Vec::with_capacity(run_paths.len());
        for path in run_paths {
            open_docs.push(JsonDocument::new(path, false, false)?);
        }
        for doc in &open_docs {
            let iter = doc.open()?;
            runs.push(RunCursor::File { iter, strategy });
        }

        let mut heads: Vec<Option<BufferedRow>> = Vec::with_capacity(runs.len());
        for run in &mut runs {
            heads.push(run.next()?);
        }

        let mut writer = JsonDocumentWriter::create(output_path, columns, false)?;
        loop {
            // Ties break on original position (spec.md §4.4's stability
            // requirement), never on which cursor happens to be checked
            // first — the buffered tail holds the *most recent* input rows,
            // so it must not win ties against an earlier, already-spilled run.
            let mut best: Option<usize> = None;
            for (i, head) in heads.iter().enumerate() {
                if let Some(row) = head {
                    match best {
                        None => best = Some(i),
                        Some(b) => {
                            let current = heads[b].as_ref().unwrap();
                            let better = match row.key.cmp(&current.key) {
                                std::cmp::Ordering::Less => true,
                                std::cmp::Ordering::Equal => row.raw.position < current.raw.position,
                                std::cmp::Ordering::Greater => false,
                            };
                            if better {
                                best = Some(i);
                            }
                        }
                    }
                }
            }
            let Some(i) = best else { break };
            let row = heads[i].take().unwrap();
            writer.write_row(row.raw.position, &row.raw.rowid, &row.raw.values)?;
            heads[i] = runs[i].next()?;
        }
        writer.close()?;

        for doc in &open_docs {
            doc.close()?;
        }
        Ok(())
    }
}

enum RunCursor<'a> {
    Buffered(std::vec::IntoIter<BufferedRow>),
    File { iter: Box<dyn Iterator<Item = CResult<RawRow>> + 'a>, strategy: &'a KeyStrategy },
}

impl<'a> RunCursor<'a> {
    fn next(&mut self) -> CResult<Option<BufferedRow>> {
        match self {
            RunCursor::Buffered(it) => Ok(it.next()),
            RunCursor::File { iter, strategy } => match iter.next() {
                None => Ok(None),
                Some(Err(err)) => Err(err),
                Some(Ok(raw)) => {
                    let key = derive_key(&raw, strategy)?;
                    Ok(Some(BufferedRow { key, raw }))
                }
            },
        }
    }
}

fn write_run(path: &Path, columns: &[Column], buffer: &[BufferedRow]) -> CResult<()> {
    let mut writer = JsonDocumentWriter::create(path, columns, false)?;
    for row in buffer {
        writer.write_row(row.raw.position, &row.raw.rowid, &row.raw.values)?;
    }
    writer.close()
}

fn fresh_temp_path() -> CResult<PathBuf> {
    let file = tempfile::Builder::new().prefix("histore-sort-").suffix(".ndjson").tempfile()?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{InMemoryDocument, RowId};
    use crate::value::Value;

    fn sample() -> InMemoryDocument {
        let columns = vec![Column::new(0, "year"), Column::new(1, "sex"), Column::new(2, "count")];
        let rows = vec![
            RawRow { position: 0, rowid: RowId::Number(0.0), values: vec![Value::Int(2018), Value::Str("Male".into()), Value::Int(98)] },
            RawRow { position: 1, rowid: RowId::Number(1.0), values: vec![Value::Int(2018), Value::Str("Female".into()), Value::Int(69)] },
            RawRow { position: 2, rowid: RowId::Number(2.0), values: vec![Value::Int(2017), Value::Str("Male".into()), Value::Int(89)] },
            RawRow { position: 3, rowid: RowId::Number(3.0), values: vec![Value::Int(2017), Value::Str("Female".into()), Value::Int(70)] },
        ];
        InMemoryDocument::new(columns, rows)
    }

    #[test]
    fn sorts_in_memory_when_buffer_never_spills() {
        let doc = sample();
        let sort = SortEngine::new(16 * 1024 * 1024);
        let sorted = sort.sort(&doc, &[1, 0]).unwrap();
        let rows: Vec<RawRow> = sorted.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
        let names: Vec<String> = rows.iter().map(|r| format!("{}", r.values[1])).collect();
        assert_eq!(names, vec!["Female", "Female", "Male", "Male"]);
        sorted.close().unwrap();
    }

    #[test]
    fn sorts_with_forced_run_spills() {
        let doc = sample();
        let sort = SortEngine::new(8);
        let sorted = sort.sort(&doc, &[1, 0]).unwrap();
        let rows: Vec<RawRow> = sorted.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
        assert_eq!(rows.len(), 4);
        let years: Vec<i64> = rows
            .iter()
            .map(|r| match r.values[0] {
                Value::Int(y) => y,
                _ => panic!("expected int"),
            })
            .collect();
        assert_eq!(years, vec![2017, 2018, 2017, 2018]);
        sorted.close().unwrap();
    }

    #[test]
    fn s4_sort_is_robust_to_buffersize() {
        let doc = sample();
        let reference = sort_in_memory(&doc, &[1, 0]);
        for buffersize in [20usize, 200, 16 * 1024 * 1024] {
            let sort = SortEngine::new(buffersize);
            let sorted = sort.sort(&doc, &[1, 0]).unwrap();
            let rows: Vec<RawRow> = sorted.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
            let got: Vec<(i64, String)> = rows
                .iter()
                .map(|r| {
                    let year = match r.values[0] {
                        Value::Int(y) => y,
                        _ => panic!("expected int"),
                    };
                    (year, format!("{}", r.values[1]))
                })
                .collect();
            assert_eq!(got, reference, "buffersize {} disagreed with the in-memory reference sort", buffersize);
            sorted.close().unwrap();
        }
    }

    fn sort_in_memory(doc: &InMemoryDocument, keys: &[usize]) -> Vec<(i64, String)> {
        let mut rows: Vec<RawRow> = doc.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
        let strategy = KeyStrategy::Annotated(keys.to_vec());
        rows.sort_by(|a, b| {
            let ka = derive_key(a, &strategy).unwrap();
            let kb = derive_key(b, &strategy).unwrap();
            ka.cmp(&kb).then(a.position.cmp(&b.position))
        });
        rows.iter()
            .map(|r| {
                let year = match r.values[0] {
                    Value::Int(y) => y,
                    _ => panic!("expected int"),
                };
                (year, format!("{}", r.values[1]))
            })
            .collect()
    }

    #[test]
    fn ties_break_on_original_position_across_a_spilled_run_boundary() {
        // Buffersize 8 forces a spill after nearly every row, so the last
        // (highest-position) row is left in the retained in-memory buffer
        // while earlier duplicate-keyed rows sit in already-flushed runs.
        // The merge must still emit them in original-position order.
        let columns = vec![Column::new(0, "k"), Column::new(1, "tag")];
        let rows = vec![
            RawRow { position: 0, rowid: RowId::Number(0.0), values: vec![Value::Int(1), Value::Str("first".into())] },
            RawRow { position: 1, rowid: RowId::Number(1.0), values: vec![Value::Int(1), Value::Str("second".into())] },
            RawRow { position: 2, rowid: RowId::Number(2.0), values: vec![Value::Int(1), Value::Str("third".into())] },
        ];
        let doc = InMemoryDocument::new(columns, rows);
        let sort = SortEngine::new(8);
        let sorted = sort.sort(&doc, &[0]).unwrap();
        let got: Vec<RawRow> = sorted.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
        let tags: Vec<String> = got.iter().map(|r| format!("{}", r.values[1])).collect();
        assert_eq!(tags, vec!["first", "second", "third"]);
        sorted.close().unwrap();
    }

    #[test]
    fn empty_document_sorts_to_empty_output() {
        let columns = vec![Column::new(0, "a")];
        let doc = InMemoryDocument::new(columns, vec![]);
        let sort = SortEngine::new(1024);
        let sorted = sort.sort(&doc, &[0]).unwrap();
        let rows: Vec<RawRow> = sorted.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
        assert!(rows.is_empty());
        sorted.close().unwrap();
    }
}
