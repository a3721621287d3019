//! A volatile, in-process archive store. Grounded on
//! `kv_rs::storage::memory::Memory` (a `BTreeMap`/`Vec`-backed engine with no
//! durability) and on `kv_rs::mvcc::mvcc::MVCC`'s `Arc<Mutex<E>>` wrapper for
//! the single-writer concurrency model of spec.md §5.

use std::sync::{Arc, Mutex};

use super::{ArchiveReader, ArchiveRow, ArchiveStore, ArchiveWriter};
use crate::error::{CResult, Error};
use crate::key::Column;
use crate::version::{SchemaHistory, VersionMeta};

struct State {
    rows: Vec<ArchiveRow>,
    schema_history: SchemaHistory,
    version_index: Vec<VersionMeta>,
    writer_active: bool,
}

fn poisoned() -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "archive store lock poisoned"))
}

/// An `ArchiveStore` that keeps its current row stream entirely in memory.
/// Useful for tests and for small archives that don't need persistence.
#[derive(Clone)]
pub struct MemoryArchiveStore {
    state: Arc<Mutex<State>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                rows: Vec::new(),
                schema_history: SchemaHistory::new(),
                version_index: Vec::new(),
                writer_active: false,
            })),
        }
    }
}

impl Default for MemoryArchiveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveStore for MemoryArchiveStore {
    fn get_reader(&self) -> CResult<ArchiveReader> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        let rows = state.rows.clone();
        Ok(ArchiveReader::new(
            state.schema_history.clone(),
            state.version_index.clone(),
            Box::new(rows.into_iter().map(Ok)),
        ))
    }

    fn get_writer(&self) -> CResult<Box<dyn ArchiveWriter>> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if state.writer_active {
            return Err(Error::WriterBusy("memory archive store already has an active writer".to_string()));
        }
        state.writer_active = true;
        Ok(Box::new(MemoryArchiveWriter { state: self.state.clone(), pending: Vec::new() }))
    }
}

struct MemoryArchiveWriter {
    state: Arc<Mutex<State>>,
    pending: Vec<ArchiveRow>,
}

impl ArchiveWriter for MemoryArchiveWriter {
    fn write(&mut self, row: ArchiveRow) -> CResult<()> {
        self.pending.push(row);
        Ok(())
    }

    fn commit(self: Box<Self>, version: VersionMeta, schema: Vec<Column>) -> CResult<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.rows = self.pending;
        state.schema_history.push(version.version, schema);
        state.version_index.push(version);
        state.writer_active = false;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> CResult<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.writer_active = false;
        Ok(())
    }
}
