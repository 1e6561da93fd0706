//! Decoder configuration.

use serde::{Deserialize, Serialize};

/// Default ceiling on padding skipped between file-entry sections: 64 KiB.
pub const DEFAULT_MAX_PADDING: u64 = 64 * 1024;

/// Knobs for decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Largest gap the file-entry decoder will skip to reach a declared
    /// section offset.  Larger gaps are rejected as out of range.
    pub max_padding: u64,
    /// Accept a stream that ends exactly on a record boundary inside the
    /// optional-data section, provided at least one optional-data record
    /// was already read.  Off by default: a declared optional-data length
    /// must be fully backed by records.
    pub lenient_optional_tail: bool,
    /// Check `stored_checksum` when the container reader hands out file data.
    pub verify_checksums: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_padding:           DEFAULT_MAX_PADDING,
            lenient_optional_tail: false,
            verify_checksums:      true,
        }
    }
}

impl DecodeOptions {
    /// Options that reproduce the historical, permissive optional-data handling.
    pub fn lenient() -> Self {
        Self { lenient_optional_tail: true, ..Self::default() }
    }
}
