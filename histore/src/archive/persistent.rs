//! An on-disk archive store, laid out per spec.md §6:
//!
//! ```text
//! <root>/
//!   META.json         # version metadata list
//!   SCHEMA.json       # schema history keyed by version
//!   rows.ndjson(.gz)  # current archive row stream
//!   tmp/              # per-commit temp files; removed on commit/rollback
//! ```
//!
//! Grounded on `kv_rs::storage::log::Log`: an `fs4` advisory exclusive lock
//! enforces the single-writer policy (spec.md §5), and a pending commit is
//! staged under `tmp/` and installed by rename, mirroring the log's
//! durable-write-then-rename idiom.

use std::fs::{self, File};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use fs4::FileExt;
use serde_json::Value as Json;

use super::{decode_archive_row, encode_archive_row, ArchiveReader, ArchiveRow, ArchiveStore, ArchiveWriter};
use crate::encoding::{open_reader, open_writer};
use crate::error::{CResult, Error};
use crate::key::Column;
use crate::version::{SchemaHistory, VersionMeta};

/// An `ArchiveStore` backed by a directory on the file system.
pub struct PersistentArchiveStore {
    root: PathBuf,
    compressed: bool,
}

impl PersistentArchiveStore {
    /// Opens (creating if necessary) an archive store rooted at `root`.
    /// `compressed` selects whether the row stream is gzip-compressed.
    pub fn new(root: impl Into<PathBuf>, compressed: bool) -> CResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, compressed })
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join("META.json")
    }

    fn schema_path(&self) -> PathBuf {
        self.root.join("SCHEMA.json")
    }

    fn rows_file_name(&self) -> &'static str {
        if self.compressed {
            "rows.ndjson.gz"
        } else {
            "rows.ndjson"
        }
    }

    fn rows_path(&self) -> PathBuf {
        self.root.join(self.rows_file_name())
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn read_version_index(&self) -> CResult<Vec<VersionMeta>> {
        let path = self.meta_path();
        if !path.is_file() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    fn read_schema_history(&self) -> CResult<SchemaHistory> {
        let path = self.schema_path();
        if !path.is_file() {
            return Ok(SchemaHistory::new());
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

impl ArchiveStore for PersistentArchiveStore {
    fn get_reader(&self) -> CResult<ArchiveReader> {
        let schema_history = self.read_schema_history()?;
        let version_index = self.read_version_index()?;
        let rows_path = self.rows_path();

        let rows: Box<dyn Iterator<Item = CResult<ArchiveRow>>> = if rows_path.is_file() {
            let reader = open_reader(&rows_path, self.compressed)?;
            Box::new(reader.lines().map(|line| -> CResult<ArchiveRow> {
                let line = line?;
                let json: Json = serde_json::from_str(&line)?;
                decode_archive_row(&json)
            }))
        } else {
            Box::new(std::iter::empty())
        };

        Ok(ArchiveReader::new(schema_history, version_index, rows))
    }

    fn get_writer(&self) -> CResult<Box<dyn ArchiveWriter>> {
        fs::create_dir_all(&self.root)?;
        let lock_file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(self.lock_path())?;
        lock_file.try_lock_exclusive().map_err(|_| {
            log::warn!("archive at {:?} already has an active writer; commit rejected", self.root);
            Error::WriterBusy(format!("archive at {:?} already has an active writer", self.root))
        })?;

        let tmp_dir = self.tmp_dir();
        if tmp_dir.is_dir() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        let tmp_rows_path = tmp_dir.join(self.rows_file_name());
        let writer = open_writer(&tmp_rows_path, self.compressed)?;

        Ok(Box::new(PersistentArchiveWriter {
            root: self.root.clone(),
            rows_file_name: self.rows_file_name(),
            lock_file,
            tmp_dir,
            tmp_rows_path,
            writer: Some(writer),
            schema_history: self.read_schema_history()?,
            version_index: self.read_version_index()?,
        }))
    }
}

struct PersistentArchiveWriter {
    root: PathBuf,
    rows_file_name: &'static str,
    lock_file: File,
    tmp_dir: PathBuf,
    tmp_rows_path: PathBuf,
    writer: Option<Box<dyn Write>>,
    schema_history: SchemaHistory,
    version_index: Vec<VersionMeta>,
}

impl PersistentArchiveWriter {
    fn release_lock_and_cleanup(&self) -> CResult<()> {
        FileExt::unlock(&self.lock_file)?;
        if self.tmp_dir.is_dir() {
            fs::remove_dir_all(&self.tmp_dir)?;
        }
        Ok(())
    }
}

impl ArchiveWriter for PersistentArchiveWriter {
    fn write(&mut self, row: ArchiveRow) -> CResult<()> {
        let json = encode_archive_row(&row);
        let writer = self.writer.as_mut().expect("writer used after commit/rollback");
        writeln!(writer, "{}", serde_json::to_string(&json)?)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>, version: VersionMeta, schema: Vec<Column>) -> CResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.schema_history.push(version.version, schema);
        self.version_index.push(version);

        fs::write(self.root.join("META.json"), serde_json::to_string_pretty(&self.version_index)?)?;
        fs::write(self.root.join("SCHEMA.json"), serde_json::to_string_pretty(&self.schema_history)?)?;
        fs::rename(&self.tmp_rows_path, self.root.join(self.rows_file_name))?;

        self.release_lock_and_cleanup()
    }

    fn rollback(mut self: Box<Self>) -> CResult<()> {
        self.writer.take();
        self.release_lock_and_cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn commit_persists_rows_and_metadata_across_store_instances() {
        let dir = tempdir().unwrap();
        let store = PersistentArchiveStore::new(dir.path(), false).unwrap();

        let mut writer = store.get_writer().unwrap();
        let mut cells = BTreeMap::new();
        cells.insert(0u64, crate::value::Value::Str("Alice".to_string()));
        writer.write(ArchiveRow::materialize(Key::String("alice".to_string()), 0, cells, 0).unwrap()).unwrap();
        writer.commit(VersionMeta::new(0, Utc::now()), vec![Column::new(0, "name")]).unwrap();

        let reopened = PersistentArchiveStore::new(dir.path(), false).unwrap();
        let reader = reopened.get_reader().unwrap();
        assert_eq!(reader.version_index.len(), 1);
        let rows = reader.into_rows().collect::<CResult<Vec<_>>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!dir.path().join("tmp").is_dir());
    }

    #[test]
    fn concurrent_writers_are_rejected_with_writer_busy() {
        let dir = tempdir().unwrap();
        let store = PersistentArchiveStore::new(dir.path(), false).unwrap();
        let _writer = store.get_writer().unwrap();
        assert!(matches!(store.get_writer(), Err(Error::WriterBusy(_))));
    }

    #[test]
    fn rollback_leaves_no_committed_rows_and_releases_the_lock() {
        let dir = tempdir().unwrap();
        let store = PersistentArchiveStore::new(dir.path(), false).unwrap();

        let mut writer = store.get_writer().unwrap();
        writer.write(ArchiveRow::materialize(Key::Number(1.0), 0, BTreeMap::new(), 0).unwrap()).unwrap();
        writer.rollback().unwrap();

        assert!(!dir.path().join("rows.ndjson").is_file());
        assert!(!dir.path().join("tmp").is_dir());
        assert!(store.get_writer().is_ok());
    }

    #[test]
    fn gzip_compressed_store_round_trips() {
        let dir = tempdir().unwrap();
        let store = PersistentArchiveStore::new(dir.path(), true).unwrap();
        let mut writer = store.get_writer().unwrap();
        writer.write(ArchiveRow::materialize(Key::Number(1.0), 0, BTreeMap::new(), 0).unwrap()).unwrap();
        writer.commit(VersionMeta::new(0, Utc::now()), vec![]).unwrap();

        assert!(dir.path().join("rows.ndjson.gz").is_file());
        let reader = store.get_reader().unwrap();
        assert_eq!(reader.into_rows().collect::<CResult<Vec<_>>>().unwrap().len(), 1);
    }
}
