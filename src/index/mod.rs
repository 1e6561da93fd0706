//! File index: maps file IDs to the byte offsets of their file entries.
//!
//! ```text
//! entry_count        u32
//! reserved           u32   must be 0
//! first_entry_offset u64
//! entry_count × { file_id u64, offset u64 }
//! ```

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};

use crate::error::{FormatError, Result};
use crate::wire;

pub const FILE_INDEX_HEADER_SIZE: usize = 16;
pub const INDEX_ENTRY_SIZE: usize = 16;

/// Entries reserved up front while decoding, regardless of the declared count.
const PREALLOC_ENTRIES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file_id: u64,
    /// Offset of the file entry from the start of the container.
    pub offset:  u64,
}

impl IndexEntry {
    pub fn new(file_id: u64, offset: u64) -> Self {
        Self { file_id, offset }
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_id == 0 {
            return Err(FormatError::Unset { record: "index entry", field: "file ID" });
        }
        Ok(())
    }

    fn encode(&self) -> [u8; INDEX_ENTRY_SIZE] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.file_id);
        LittleEndian::write_u64(&mut buf[8..16], self.offset);
        buf
    }

    fn decode(buf: &[u8; INDEX_ENTRY_SIZE]) -> Self {
        Self {
            file_id: LittleEndian::read_u64(&buf[0..8]),
            offset:  LittleEndian::read_u64(&buf[8..16]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileIndex {
    pub entry_count:        u32,
    pub reserved:           u32,
    pub first_entry_offset: u64,
    pub entries:            Vec<IndexEntry>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        FILE_INDEX_HEADER_SIZE + INDEX_ENTRY_SIZE * self.entries.len()
    }

    /// Appends a mapping and keeps `entry_count` in step.
    pub fn push(&mut self, file_id: u64, offset: u64) {
        self.entries.push(IndexEntry::new(file_id, offset));
        self.entry_count = self.entries.len().min(u32::MAX as usize) as u32;
    }

    pub fn find(&self, file_id: u64) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.file_id == file_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rejects a non-zero reserved field, a count that disagrees with the
    /// list, zero file IDs, and the first duplicated file ID in list order.
    pub fn validate(&self) -> Result<()> {
        if self.reserved != 0 {
            return Err(FormatError::ReservedNonZero {
                record: "file index",
                value:  self.reserved as u64,
            });
        }
        if self.entry_count as usize != self.entries.len() {
            return Err(FormatError::LengthMismatch {
                record:   "file index",
                field:    "entry count",
                declared: self.entry_count as u64,
                actual:   self.entries.len() as u64,
            });
        }
        if let Some(index) = self.entries.iter().position(|e| e.file_id == 0) {
            return Err(FormatError::ZeroFileId { index });
        }
        let mut seen: HashMap<u64, usize> = HashMap::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            if let Some(&first) = seen.get(&entry.file_id) {
                return Err(FormatError::DuplicateFileId {
                    file_id: entry.file_id,
                    first,
                    second: i,
                });
            }
            seen.insert(entry.file_id, i);
        }
        Ok(())
    }

    /// Writes the index with `entry_count` recomputed from the entry list.
    pub fn write<W: Write>(&mut self, mut writer: W) -> Result<u64> {
        self.entry_count = wire::narrow(self.entries.len(), "file index entry count", u32::MAX)?;

        let mut head = [0u8; FILE_INDEX_HEADER_SIZE];
        LittleEndian::write_u32(&mut head[0..4], self.entry_count);
        LittleEndian::write_u32(&mut head[4..8], self.reserved);
        LittleEndian::write_u64(&mut head[8..16], self.first_entry_offset);
        wire::put(&mut writer, &head, "file index", "header")?;

        for entry in &self.entries {
            wire::put(&mut writer, &entry.encode(), "file index", "entry")?;
        }
        tracing::trace!(entries = self.entries.len(), "file index written");
        Ok(self.size() as u64)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let head: [u8; FILE_INDEX_HEADER_SIZE] = wire::read_head(&mut reader, "file index")?;
        let entry_count = LittleEndian::read_u32(&head[0..4]);
        let reserved = LittleEndian::read_u32(&head[4..8]);
        let first_entry_offset = LittleEndian::read_u64(&head[8..16]);

        let mut entries = Vec::with_capacity((entry_count as usize).min(PREALLOC_ENTRIES));
        for _ in 0..entry_count {
            let buf: [u8; INDEX_ENTRY_SIZE] = wire::read_array(&mut reader, "file index", "entry")?;
            entries.push(IndexEntry::decode(&buf));
        }
        tracing::trace!(entries = entries.len(), "file index read");

        Ok(Self { entry_count, reserved, first_entry_offset, entries })
    }
}
