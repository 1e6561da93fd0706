//! Error type shared by every record codec.
//!
//! Decoding distinguishes a stream that had nothing to offer at the start of
//! a record ([`FormatError::NoData`]) from one that ended part-way through
//! ([`FormatError::Truncated`]).  Container readers rely on that split to
//! tell "no more records" apart from corruption.

use std::io;
use thiserror::Error;

/// Coarse classification of a [`FormatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The stream ended before a field or payload was complete.
    Truncated,
    /// A declared length, count, offset or reserved field disagrees with the data.
    Consistency,
    /// The underlying source or sink failed, or stopped accepting bytes.
    Io,
    /// A value exceeds a bound defined by the format.
    Range,
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("No {record} data available")]
    NoData { record: &'static str },

    #[error("Truncated {record}: {field} needs {expected} bytes, got {actual}")]
    Truncated {
        record:   &'static str,
        field:    &'static str,
        expected: u64,
        actual:   u64,
    },

    #[error("Invalid magic number: 0x{0:08X}")]
    InvalidMagic(u32),

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("{record}: reserved field must be zero, got {value}")]
    ReservedNonZero { record: &'static str, value: u64 },

    #[error("{record}: {field} mismatch: declared {declared}, actual {actual}")]
    LengthMismatch {
        record:   &'static str,
        field:    &'static str,
        declared: u64,
        actual:   u64,
    },

    #[error("{record}: {field} cannot be empty")]
    Empty { record: &'static str, field: &'static str },

    #[error("{record}: {field} must be set")]
    Unset { record: &'static str, field: &'static str },

    #[error("File ID at index {index} cannot be zero")]
    ZeroFileId { index: usize },

    #[error("Duplicate file ID {file_id} at indices {first} and {second}")]
    DuplicateFileId { file_id: u64, first: usize, second: usize },

    #[error("{record}: {field} is not valid UTF-8")]
    InvalidUtf8 { record: &'static str, field: &'static str },

    #[error("Comment contains embedded null character at position {position}")]
    EmbeddedNul { position: usize },

    #[error("Comment is not null-terminated")]
    MissingTerminator,

    #[error("{field} value {value} exceeds maximum {max}")]
    OutOfRange { field: &'static str, value: u64, max: u64 },

    #[error("{section} offset {offset} points before already consumed byte {consumed}")]
    OffsetOverlap { section: &'static str, offset: u64, consumed: u64 },

    #[error("Short write of {record} {field}: sink accepted fewer than {expected} bytes")]
    ShortWrite {
        record:   &'static str,
        field:    &'static str,
        expected: u64,
    },

    #[error("File ID {0} is not in the index")]
    FileNotFound(u64),

    #[error("{record} checksum mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    ChecksumMismatch { record: &'static str, expected: u32, actual: u32 },

    #[error("Package writer is unusable after an earlier write failure")]
    WriterFailed,

    #[error("Invalid {record} at index {index}: {source}")]
    InvalidChild {
        record: &'static str,
        index:  usize,
        #[source]
        source: Box<FormatError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FormatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormatError::NoData { .. } | FormatError::Truncated { .. } => ErrorKind::Truncated,
            FormatError::OutOfRange { .. } => ErrorKind::Range,
            FormatError::ShortWrite { .. } | FormatError::WriterFailed | FormatError::Io(_) => ErrorKind::Io,
            FormatError::InvalidChild { source, .. } => source.kind(),
            _ => ErrorKind::Consistency,
        }
    }

    /// True when the stream held no bytes at all where a record should start.
    pub fn is_no_data(&self) -> bool {
        matches!(self, FormatError::NoData { .. })
    }

    pub(crate) fn child(record: &'static str, index: usize, source: FormatError) -> Self {
        FormatError::InvalidChild { record, index, source: Box::new(source) }
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;
