//! Wire encoding for document and archive rows: a tagged-JSON cell codec
//! (`$datetime`/`$date`/`$time`/`$null`/`$new`) plus gzip-aware file helpers.
//!
//! Line-delimited JSON is the on-disk row format (spec.md §6); this module
//! is the single place that knows how a [`Value`] or [`Key`] round-trips
//! through a `serde_json::Value`.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value as Json};

use crate::error::{CResult, Error};
use crate::key::Key;
use crate::value::Value;

/// Encodes a cell value as a `serde_json::Value`, tagging date/time values
/// the way the original writer does (`{"$datetime": "<iso>"}` and friends)
/// so a plain JSON `null` stays distinguishable from these tagged shapes.
pub fn encode_value(value: &Value) -> Json {
    match value {
        Value::Int(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Bool(v) => json!(v),
        Value::Str(v) => json!(v),
        Value::Null => Json::Null,
        Value::NewRow => json!({"$new": true}),
        Value::DateTime(v) => json!({"$datetime": v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()}),
        Value::Date(v) => json!({"$date": v.format("%Y-%m-%d").to_string()}),
        Value::Time(v) => json!({"$time": v.format("%H:%M:%S%.f").to_string()}),
        Value::Array(items) => Json::Array(items.iter().map(encode_value).collect()),
    }
}

/// Inverse of [`encode_value`].
pub fn decode_value(json: &Json) -> CResult<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(v) => Ok(Value::Bool(*v)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(Error::Encoding(format!("unrepresentable number: {}", n)))
            }
        }
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Array(items) => {
            Ok(Value::Array(items.iter().map(decode_value).collect::<CResult<Vec<_>>>()?))
        }
        Json::Object(map) => {
            if let Some(Json::String(s)) = map.get("$datetime") {
                let dt = parse_datetime(s)?;
                Ok(Value::DateTime(dt))
            } else if let Some(Json::String(s)) = map.get("$date") {
                let d = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|e| Error::Encoding(format!("invalid $date {:?}: {}", s, e)))?;
                Ok(Value::Date(d))
            } else if let Some(Json::String(s)) = map.get("$time") {
                let t = parse_time(s)?;
                Ok(Value::Time(t))
            } else if map.get("$new").is_some() {
                Ok(Value::NewRow)
            } else {
                Err(Error::Encoding(format!("unrecognized tagged value: {:?}", map)))
            }
        }
    }
}

/// Encodes a row key for the parts of the wire format that need one
/// (archive row serialization): plain scalars pass through, while `Null`
/// and `NewRow` keys are tagged with their stable identifier so they
/// decode back to the same key rather than colliding into a bare `null`.
pub fn encode_key(key: &Key) -> Json {
    match key {
        Key::Number(v) => json!(v),
        Key::String(v) => json!(v),
        Key::Null(id) => json!({"$null": id}),
        Key::NewRow(id) => json!({"$new": id}),
        Key::Composite(parts) => Json::Array(parts.iter().map(encode_key).collect()),
    }
}

/// Inverse of [`encode_key`].
pub fn decode_key(json: &Json) -> CResult<Key> {
    match json {
        Json::Number(n) => {
            let v = n.as_f64().ok_or_else(|| Error::Encoding(format!("invalid key number: {}", n)))?;
            Ok(Key::Number(v))
        }
        Json::String(s) => Ok(Key::String(s.clone())),
        Json::Array(parts) => Ok(Key::composite(parts.iter().map(decode_key).collect::<CResult<Vec<_>>>()?)),
        Json::Object(map) => {
            if let Some(id) = map.get("$null").and_then(Json::as_u64) {
                Ok(Key::Null(id))
            } else if let Some(id) = map.get("$new").and_then(Json::as_u64) {
                Ok(Key::NewRow(id))
            } else {
                Err(Error::Encoding(format!("unrecognized tagged key: {:?}", map)))
            }
        }
        Json::Null => Err(Error::Encoding("key cannot be a bare null".to_string())),
        Json::Bool(_) => Err(Error::Encoding("key cannot be a bool".to_string())),
    }
}

fn parse_datetime(s: &str) -> CResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| Error::Encoding(format!("invalid $datetime {:?}: {}", s, e)))
}

fn parse_time(s: &str) -> CResult<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| Error::Encoding(format!("invalid $time {:?}: {}", s, e)))
}

/// Opens `path` for line-by-line reading, transparently decompressing if
/// `compressed` is set (spec.md §6's optional gzip mode).
pub fn open_reader(path: &Path, compressed: bool) -> CResult<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if compressed {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Opens `path` for line-by-line writing (truncating any existing file),
/// transparently compressing if `compressed` is set.
pub fn open_writer(path: &Path, compressed: bool) -> CResult<Box<dyn Write>> {
    let file = File::create(path)?;
    if compressed {
        Ok(Box::new(GzEncoder::new(file, Compression::default())))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}
