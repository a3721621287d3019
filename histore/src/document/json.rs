//! A [`Document`] backed by a newline-delimited JSON file on disk, with an
//! accompanying writer. Grounded on the file-lifecycle idiom of
//! `kv_rs::storage::log::Log` (open-or-create, staged writes,
//! `delete_on_close` cleanup) and on the original writer's row shape: a
//! header line of column names followed by one `[position, rowid, values]`
//! array per row, with a negative `rowid` marking a new, unkeyed row.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde_json::Value as Json;

use super::{Document, RawRow, RowId};
use crate::encoding::{decode_value, encode_value, open_reader, open_writer};
use crate::error::{CResult, Error};
use crate::key::Column;
use crate::value::Value;

fn encode_rowid(rowid: &RowId) -> Json {
    match rowid {
        RowId::Number(n) => serde_json::json!(n),
        RowId::Composite(parts) => serde_json::json!(parts),
        RowId::New => serde_json::json!(-1),
    }
}

fn decode_rowid(json: &Json) -> CResult<RowId> {
    match json {
        Json::Number(n) => {
            let v = n.as_f64().ok_or_else(|| Error::Encoding(format!("invalid rowid: {}", n)))?;
            if v < 0.0 {
                Ok(RowId::New)
            } else {
                Ok(RowId::Number(v))
            }
        }
        Json::Array(parts) => {
            let parts = parts
                .iter()
                .map(|p| p.as_f64().ok_or_else(|| Error::Encoding(format!("invalid composite rowid part: {}", p))))
                .collect::<CResult<Vec<_>>>()?;
            Ok(RowId::Composite(parts))
        }
        other => Err(Error::Encoding(format!("invalid rowid shape: {:?}", other))),
    }
}

/// A document whose rows live in a newline-delimited JSON file. The file is
/// read lazily: `open()` re-reads the file from scratch each time, so a
/// `JsonDocument` is restartable for as long as the file is not mutated
/// between calls.
pub struct JsonDocument {
    filename: PathBuf,
    compressed: bool,
    delete_on_close: bool,
    columns: Vec<Column>,
}

impl JsonDocument {
    /// Opens `filename`, reading its header line (if the file exists) to
    /// populate [`Document::columns`]. A missing file is treated as an
    /// empty document with no columns, matching the original's behavior.
    pub fn new(filename: impl AsRef<Path>, compressed: bool, delete_on_close: bool) -> CResult<Self> {
        let filename = filename.as_ref().to_path_buf();
        let columns = if filename.is_file() {
            let reader = open_reader(&filename, compressed)?;
            match reader.lines().next() {
                Some(line) => {
                    let names: Vec<String> = serde_json::from_str(&line?)?;
                    names.into_iter().enumerate().map(|(i, name)| Column::new(i as u64, name)).collect()
                }
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };
        Ok(Self { filename, compressed, delete_on_close, columns })
    }
}

impl Document for JsonDocument {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn open(&self) -> CResult<Box<dyn Iterator<Item = CResult<RawRow>> + '_>> {
        if !self.filename.is_file() {
            return Ok(Box::new(std::iter::empty()));
        }
        let reader = open_reader(&self.filename, self.compressed)?;
        let mut lines = reader.lines();
        lines.next();
        Ok(Box::new(lines.map(|line| -> CResult<RawRow> {
            let line = line?;
            let (position, rowid_json, values_json): (u64, Json, Vec<Json>) = serde_json::from_str(&line)?;
            let rowid = decode_rowid(&rowid_json)?;
            let values = values_json.iter().map(decode_value).collect::<CResult<Vec<_>>>()?;
            Ok(RawRow { position, rowid, values })
        })))
    }

    fn close(&self) -> CResult<()> {
        if self.delete_on_close && self.filename.is_file() {
            fs::remove_file(&self.filename)?;
        }
        Ok(())
    }
}

/// Writer for [`JsonDocument`] files: one header line of column names, then
/// one row per line in the order written.
pub struct JsonDocumentWriter {
    writer: Box<dyn Write>,
}

impl JsonDocumentWriter {
    pub fn create(filename: impl AsRef<Path>, columns: &[Column], compressed: bool) -> CResult<Self> {
        let mut writer = open_writer(filename.as_ref(), compressed)?;
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        writeln!(writer, "{}", serde_json::to_string(&names)?)?;
        Ok(Self { writer })
    }

    /// Appends a row at `position`. The caller supplies the position rather
    /// than it being assigned sequentially, so that re-sorting a document
    /// (which writes rows out of their original order) preserves each row's
    /// original 0-based insertion position (spec.md §3's Document row).
    pub fn write_row(&mut self, position: u64, rowid: &RowId, values: &[Value]) -> CResult<()> {
        let rowid_json = encode_rowid(rowid);
        let values_json: Vec<Json> = values.iter().map(encode_value).collect();
        let line = serde_json::to_string(&(position, rowid_json, values_json))?;
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    pub fn close(mut self) -> CResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::KeyStrategy;
    use tempfile::tempdir;

    fn write_sample(path: &Path) {
        let columns = vec![Column::new(0, "Name"), Column::new(1, "Age")];
        let mut writer = JsonDocumentWriter::create(path, &columns, false).unwrap();
        writer.write_row(0, &RowId::Number(0.0), &[Value::Str("Alice".into()), Value::Int(23)]).unwrap();
        writer.write_row(1, &RowId::Number(1.0), &[Value::Str("Bob".into()), Value::Int(43)]).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn reads_back_written_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_sample(&path);

        let doc = JsonDocument::new(&path, false, false).unwrap();
        assert_eq!(doc.columns().len(), 2);
        let rows: Vec<RawRow> = doc.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].position, 0);
        assert!(rows[0].values[0].cell_eq(&Value::Str("Alice".into())));
        doc.close().unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn delete_on_close_removes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_sample(&path);

        let doc = JsonDocument::new(&path, false, true).unwrap();
        let _rows: Vec<RawRow> = doc.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
        doc.close().unwrap();
        assert!(!path.is_file());
    }

    #[test]
    fn missing_file_is_an_empty_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodata.json");
        let doc = JsonDocument::new(&path, false, false).unwrap();
        assert!(doc.columns().is_empty());
        let rows: Vec<RawRow> = doc.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn round_trips_through_a_document_reader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_sample(&path);
        let doc = JsonDocument::new(&path, false, false).unwrap();
        let reader = crate::document::DocumentReader::open(&doc, KeyStrategy::Default(0)).unwrap();
        let keys: Vec<_> = reader.map(|r| r.unwrap().key).collect();
        assert_eq!(keys, vec![crate::key::Key::Number(0.0), crate::key::Key::Number(1.0)]);
    }

    #[test]
    fn gzip_compressed_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json.gz");
        let columns = vec![Column::new(0, "Name"), Column::new(1, "Age")];
        let mut writer = JsonDocumentWriter::create(&path, &columns, true).unwrap();
        writer.write_row(0, &RowId::Number(0.0), &[Value::Str("Alice".into()), Value::Int(23)]).unwrap();
        writer.close().unwrap();

        let doc = JsonDocument::new(&path, true, false).unwrap();
        let rows: Vec<RawRow> = doc.open().unwrap().collect::<CResult<Vec<_>>>().unwrap();
        assert_eq!(rows.len(), 1);
    }
}
