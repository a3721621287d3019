//! `histore` is an append-only history store for tabular dataset snapshots:
//! every committed version is retained, and a new version is produced by
//! aligning an incoming snapshot against the archive's key ordering and
//! streaming a single synchronized merge over both.
//!
//! The engine is built from seven pieces, leaves first: a timestamp algebra
//! ([`timestamp`]) representing the set of versions a row is present in; a
//! totally ordered row key ([`key`]); a restartable document row source
//! ([`document`]); an external mergesort ([`sort`]) that aligns an unsorted
//! snapshot to the archive's key order under a bounded memory budget; an
//! archive store ([`archive`]) that persists and streams archive rows in key
//! order; the nested merger ([`merge`]) that produces the next archive
//! generation in one pass; and the façade ([`facade`]) that ties commit,
//! checkout, and diff together over any [`archive::ArchiveStore`].
//!
//! ## Getting started
//!
//! ```rust
//! use histore::archive::memory::MemoryArchiveStore;
//! use histore::document::{InMemoryDocument, RawRow, RowId};
//! use histore::facade::Archive;
//! use histore::key::Column;
//! use histore::value::Value;
//!
//! fn run() -> histore::error::CResult<()> {
//!     let archive = Archive::with_default_buffersize(MemoryArchiveStore::new());
//!     let columns = vec![Column::new(0, "name"), Column::new(1, "age")];
//!
//!     let v0 = InMemoryDocument::new(columns.clone(), vec![
//!         RawRow { position: 0, rowid: RowId::New, values: vec![Value::Str("alice".into()), Value::Int(23)] },
//!     ]);
//!     let version0 = archive.commit(&v0, Some(vec![0]), None, None)?;
//!     assert_eq!(version0, 0);
//!
//!     let v1 = InMemoryDocument::new(columns, vec![
//!         RawRow { position: 0, rowid: RowId::New, values: vec![Value::Str("alice".into()), Value::Int(24)] },
//!     ]);
//!     let version1 = archive.commit(&v1, Some(vec![0]), None, None)?;
//!     assert_eq!(version1, 1);
//!
//!     let rows: Vec<_> = archive.checkout(0)?.collect::<histore::error::CResult<Vec<_>>>()?;
//!     assert_eq!(rows.len(), 1);
//!     Ok(())
//! }
//!
//! run().unwrap();
//! ```

pub mod archive;
pub mod document;
pub mod encoding;
pub mod error;
pub mod facade;
pub mod key;
pub mod merge;
pub mod sort;
pub mod timestamp;
pub mod value;
pub mod version;
