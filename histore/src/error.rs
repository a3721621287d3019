use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type CResult<T> = Result<T, Error>;

/// Errors produced by the history store.
///
/// Variants map directly to the error kinds of the nested-merge archive
/// engine: timestamp/key construction errors, writer-ordering violations,
/// merge-phase failures, and I/O failures from the archive store and
/// external sort.
#[derive(Debug)]
pub enum Error {
    /// A timestamp was constructed from overlapping, adjacent, or
    /// inverted intervals.
    InvalidInterval(String),

    /// `Timestamp::append` was called with a value that does not strictly
    /// increase the timestamp.
    NonMonotonic(String),

    /// A value could not be classified into a row key (e.g. an unordered
    /// container, or a NaN numeric value).
    UnkeyableValue(String),

    /// A `ValidatingArchiveWriter` observed a key that is not greater than
    /// the previously written key.
    OutOfOrderWrite(String),

    /// The nested merger observed a stream (archive or document) whose keys
    /// were not strictly ascending.
    StreamUnordered(String),

    /// The archive and the incoming document disagree on a required key
    /// column.
    SchemaMismatch(String),

    /// Another writer already holds the archive's advisory commit lock.
    WriterBusy(String),

    /// A version id was requested that has not been committed.
    VersionNotFound(u64),

    /// Underlying I/O failure (file, temp-run, archive-store access).
    Io(io::Error),

    /// A cell or row could not be encoded/decoded in the wire format.
    Encoding(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInterval(msg) => write!(f, "invalid interval: {}", msg),
            Error::NonMonotonic(msg) => write!(f, "non-monotonic timestamp append: {}", msg),
            Error::UnkeyableValue(msg) => write!(f, "value cannot be used as a row key: {}", msg),
            Error::OutOfOrderWrite(msg) => write!(f, "out-of-order archive write: {}", msg),
            Error::StreamUnordered(msg) => write!(f, "input stream is not sorted by key: {}", msg),
            Error::SchemaMismatch(msg) => write!(f, "schema mismatch: {}", msg),
            Error::WriterBusy(msg) => write!(f, "archive already has an active writer: {}", msg),
            Error::VersionNotFound(v) => write!(f, "version not found: {}", v),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Encoding(msg) => write!(f, "encoding error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}
