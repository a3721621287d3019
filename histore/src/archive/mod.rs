//! The archive store (C5): `ArchiveRow`, the store abstraction with its
//! volatile ([`memory`]) and persistent ([`persistent`]) implementations,
//! and the [`ValidatingArchiveWriter`] both share.
//!
//! Grounded on `kv_rs::storage`'s `Engine` trait shape (a generic,
//! per-backend iterator type plus an object-safe boxed fallback) and on
//! `kv_rs::storage::log::Log`'s advisory-locking, rename-on-commit
//! durability pattern.

pub mod memory;
pub mod persistent;
pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::encoding::{decode_key, decode_value, encode_key, encode_value};
use crate::error::{CResult, Error};
use crate::key::Key;
use crate::timestamp::Timestamp;
use crate::value::Value;

/// One row of an archive: a key, its positional history, and its per-column
/// value history (spec.md §3's Archive row).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveRow {
    pub key: Key,
    /// `(position, timestamp)` pairs; the row's position in version `v` is
    /// the entry whose timestamp contains `v`.
    pub positions: Vec<(u64, Timestamp)>,
    /// Per-column `(value, timestamp)` histories, keyed by `colid`.
    pub values: BTreeMap<u64, Vec<(Value, Timestamp)>>,
}

impl ArchiveRow {
    /// A freshly materialized row: present only in `version`.
    pub fn materialize(key: Key, position: u64, cells: BTreeMap<u64, Value>, version: u64) -> crate::error::CResult<Self> {
        let ts = Timestamp::new().append(version)?;
        let mut values = BTreeMap::new();
        for (colid, value) in cells {
            values.insert(colid, vec![(value, ts.clone())]);
        }
        Ok(Self { key, positions: vec![(position, ts)], values })
    }

    /// True iff this row is present in `version` (spec.md §4.7 projection).
    pub fn is_present_at(&self, version: u64) -> bool {
        self.positions.iter().any(|(_, ts)| ts.contains(version))
    }

    /// The row's position in `version`, if present.
    pub fn position_at(&self, version: u64) -> Option<u64> {
        self.positions.iter().find(|(_, ts)| ts.contains(version)).map(|(p, _)| *p)
    }

    /// The value of column `colid` in `version`, if the row is present and
    /// the column has a value at that version.
    pub fn value_at(&self, colid: u64, version: u64) -> Option<&Value> {
        self.values.get(&colid)?.iter().find(|(_, ts)| ts.contains(version)).map(|(v, _)| v)
    }
}

pub use store::{ArchiveStore, ArchiveWriter, ArchiveReader, ValidatingArchiveWriter};

/// Encodes one archive row into the line format of spec.md §6: an object
/// with `key`, `pos` (list of `[position, timestamp-string]` pairs) and
/// `cells` (object from string `colid` to a list of
/// `[value, timestamp-string]` pairs).
pub fn encode_archive_row(row: &ArchiveRow) -> Json {
    let pos: Vec<Json> = row.positions.iter().map(|(p, ts)| json!([p, ts.to_string()])).collect();
    let mut cells = serde_json::Map::new();
    for (colid, entries) in &row.values {
        let arr: Vec<Json> = entries.iter().map(|(v, ts)| json!([encode_value(v), ts.to_string()])).collect();
        cells.insert(colid.to_string(), Json::Array(arr));
    }
    json!({"key": encode_key(&row.key), "pos": pos, "cells": Json::Object(cells)})
}

/// Inverse of [`encode_archive_row`].
pub fn decode_archive_row(json: &Json) -> CResult<ArchiveRow> {
    let obj = json.as_object().ok_or_else(|| Error::Encoding("archive row must be a JSON object".to_string()))?;

    let key_json = obj.get("key").ok_or_else(|| Error::Encoding("archive row missing 'key'".to_string()))?;
    let key = decode_key(key_json)?;

    let pos_json = obj.get("pos").and_then(Json::as_array).ok_or_else(|| Error::Encoding("archive row missing 'pos'".to_string()))?;
    let mut positions = Vec::with_capacity(pos_json.len());
    for entry in pos_json {
        let pair = entry.as_array().filter(|p| p.len() == 2).ok_or_else(|| Error::Encoding("invalid 'pos' entry".to_string()))?;
        let position = pair[0].as_u64().ok_or_else(|| Error::Encoding("invalid position value".to_string()))?;
        let ts_str = pair[1].as_str().ok_or_else(|| Error::Encoding("invalid position timestamp".to_string()))?;
        let ts: Timestamp = ts_str.parse()?;
        positions.push((position, ts));
    }

    let cells_json = obj.get("cells").and_then(Json::as_object).ok_or_else(|| Error::Encoding("archive row missing 'cells'".to_string()))?;
    let mut values = BTreeMap::new();
    for (colid_str, arr) in cells_json {
        let colid: u64 = colid_str.parse().map_err(|_| Error::Encoding(format!("invalid column id {:?}", colid_str)))?;
        let arr = arr.as_array().ok_or_else(|| Error::Encoding("invalid 'cells' entry".to_string()))?;
        let mut entries = Vec::with_capacity(arr.len());
        for entry in arr {
            let pair = entry.as_array().filter(|p| p.len() == 2).ok_or_else(|| Error::Encoding("invalid cell history entry".to_string()))?;
            let value = decode_value(&pair[0])?;
            let ts_str = pair[1].as_str().ok_or_else(|| Error::Encoding("invalid cell timestamp".to_string()))?;
            let ts: Timestamp = ts_str.parse()?;
            entries.push((value, ts));
        }
        values.insert(colid, entries);
    }

    Ok(ArchiveRow { key, positions, values })
}
