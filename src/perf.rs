//! Batch helpers for independent file entries.
//!
//! Field order inside one record is part of the wire contract, so a single
//! entry is always encoded sequentially.  Separate entries share nothing and
//! can be encoded or decoded side by side; with the `parallel` feature the
//! batch runs on Rayon's global pool, otherwise it falls back to a plain
//! loop.  Output order always equals input order.

use crate::config::DecodeOptions;
use crate::entry::FileEntry;
use crate::error::Result;

fn encode_one(entry: &mut FileEntry) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(entry.size());
    entry.write(&mut buf)?;
    Ok(buf)
}

/// Encodes each entry into its own buffer, recomputing layout fields in
/// place.  The first failure is returned.
pub fn encode_entries(entries: &mut [FileEntry]) -> Result<Vec<Vec<u8>>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        entries.par_iter_mut().map(encode_one).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        entries.iter_mut().map(encode_one).collect()
    }
}

/// Decodes one entry from each buffer.
pub fn decode_entries(buffers: &[Vec<u8>], opts: &DecodeOptions) -> Result<Vec<FileEntry>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        buffers.par_iter().map(|b| FileEntry::read_with(b.as_slice(), opts)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        buffers.iter().map(|b| FileEntry::read_with(b.as_slice(), opts)).collect()
    }
}
