//! File entry: the metadata record for one logical file.
//!
//! A 64-byte fixed section is followed by three variable sections:
//!
//! ```text
//! path_count × PathEntry
//! hash_count × HashEntry            starts at hash_data_offset
//! OptionalDataEntry records         starts at optional_data_offset,
//!                                   totals optional_data_len bytes
//! ```
//!
//! Offsets are relative to the end of the fixed section.  Encoding runs a
//! sizing pass over the children first ([`FileEntry::sync_layout`]) so the
//! fixed section can be emitted before any variable data.

pub mod hash;
pub mod optional;
pub mod path;

pub use hash::{HashEntry, HASH_ENTRY_PREFIX_SIZE};
pub use optional::{OptionalDataEntry, OPTIONAL_DATA_PREFIX_SIZE};
pub use path::{PathEntry, PATH_METADATA_SIZE};

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::config::DecodeOptions;
use crate::error::{FormatError, Result};
use crate::marker::{CompressionType, EncryptionType, HashPurpose};
use crate::wire;

const RECORD: &str = "file entry";
pub const FILE_ENTRY_FIXED_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileEntry {
    pub file_id:              u64,
    pub original_size:        u64,
    pub stored_size:          u64,
    pub raw_checksum:         u32,
    pub stored_checksum:      u32,
    pub file_version:         u32,
    pub metadata_version:     u32,
    pub path_count:           u16,
    pub file_type:            u16,
    pub compression_type:     CompressionType,
    pub compression_level:    u8,
    pub encryption_type:      EncryptionType,
    pub hash_count:           u8,
    pub hash_data_offset:     u32,
    pub hash_data_len:        u16,
    pub optional_data_len:    u16,
    pub optional_data_offset: u32,
    pub reserved:             u32,

    pub paths:         Vec<PathEntry>,
    pub hashes:        Vec<HashEntry>,
    pub optional_data: Vec<OptionalDataEntry>,
}

impl FileEntry {
    pub fn new(file_id: u64) -> Self {
        Self {
            file_id,
            file_version: 1,
            metadata_version: 1,
            ..Self::default()
        }
    }

    // ── Children ────────────────────────────────────────────────────────────

    pub fn add_path(&mut self, path: PathEntry) {
        self.paths.push(path);
        self.path_count = self.paths.len().min(u16::MAX as usize) as u16;
    }

    pub fn add_hash(&mut self, hash: HashEntry) {
        self.hashes.push(hash);
        self.hash_count = self.hashes.len().min(u8::MAX as usize) as u8;
    }

    pub fn add_optional_data(&mut self, entry: OptionalDataEntry) {
        self.optional_data.push(entry);
    }

    pub fn primary_path(&self) -> Option<&str> {
        self.paths.first().map(|p| p.path.as_str())
    }

    /// First hash tagged with `purpose`, in list order.
    pub fn hash_for(&self, purpose: HashPurpose) -> Option<&HashEntry> {
        self.hashes.iter().find(|h| h.hash_purpose == purpose)
    }

    /// Records sizes and CRC32 checksums of the raw and stored payloads.
    pub fn set_checksums(&mut self, raw: &[u8], stored: &[u8]) {
        self.original_size = raw.len() as u64;
        self.stored_size = stored.len() as u64;
        self.raw_checksum = crc32fast::hash(raw);
        self.stored_checksum = crc32fast::hash(stored);
    }

    // ── Sizing ──────────────────────────────────────────────────────────────

    pub fn fixed_size(&self) -> usize {
        FILE_ENTRY_FIXED_SIZE
    }

    fn paths_size(&self) -> usize {
        self.paths.iter().map(PathEntry::size).sum()
    }

    fn hashes_size(&self) -> usize {
        self.hashes.iter().map(HashEntry::size).sum()
    }

    fn optional_size(&self) -> usize {
        self.optional_data.iter().map(OptionalDataEntry::size).sum()
    }

    pub fn variable_size(&self) -> usize {
        self.paths_size() + self.hashes_size() + self.optional_size()
    }

    pub fn size(&self) -> usize {
        self.fixed_size() + self.variable_size()
    }

    /// Recomputes counts, offsets and section lengths from the child lists.
    ///
    /// Children whose length field disagrees with their payload, and
    /// sections too large for their wire width, are rejected before any
    /// field is changed.
    pub fn sync_layout(&mut self) -> Result<()> {
        for (i, p) in self.paths.iter().enumerate() {
            p.check_length().map_err(|e| FormatError::child("path entry", i, e))?;
        }
        for (i, h) in self.hashes.iter().enumerate() {
            h.check_length().map_err(|e| FormatError::child("hash entry", i, e))?;
        }
        for (i, o) in self.optional_data.iter().enumerate() {
            o.check_length().map_err(|e| FormatError::child("optional data entry", i, e))?;
        }

        let paths = self.paths_size();
        let hashes = self.hashes_size();
        let optional = self.optional_size();

        let path_count = wire::narrow(self.paths.len(), "path count", u16::MAX)?;
        let hash_count = wire::narrow(self.hashes.len(), "hash count", u8::MAX)?;
        let hash_data_offset = wire::narrow(paths, "hash data offset", u32::MAX)?;
        let hash_data_len = wire::narrow(hashes, "hash data length", u16::MAX)?;
        let optional_data_offset = wire::narrow(paths + hashes, "optional data offset", u32::MAX)?;
        let optional_data_len = wire::narrow(optional, "optional data length", u16::MAX)?;

        self.path_count = path_count;
        self.hash_count = hash_count;
        self.hash_data_offset = hash_data_offset;
        self.hash_data_len = hash_data_len;
        self.optional_data_offset = optional_data_offset;
        self.optional_data_len = optional_data_len;
        Ok(())
    }

    // ── Validation ──────────────────────────────────────────────────────────

    pub fn validate(&self) -> Result<()> {
        if self.file_id == 0 {
            return Err(FormatError::Unset { record: RECORD, field: "file ID" });
        }
        if self.reserved != 0 {
            return Err(FormatError::ReservedNonZero { record: RECORD, value: self.reserved as u64 });
        }
        if self.path_count as usize != self.paths.len() {
            return Err(FormatError::LengthMismatch {
                record:   RECORD,
                field:    "path count",
                declared: self.path_count as u64,
                actual:   self.paths.len() as u64,
            });
        }
        if self.hash_count as usize != self.hashes.len() {
            return Err(FormatError::LengthMismatch {
                record:   RECORD,
                field:    "hash count",
                declared: self.hash_count as u64,
                actual:   self.hashes.len() as u64,
            });
        }
        for (i, p) in self.paths.iter().enumerate() {
            p.validate().map_err(|e| FormatError::child("path entry", i, e))?;
        }
        for (i, h) in self.hashes.iter().enumerate() {
            h.validate().map_err(|e| FormatError::child("hash entry", i, e))?;
        }
        for (i, o) in self.optional_data.iter().enumerate() {
            o.validate().map_err(|e| FormatError::child("optional data entry", i, e))?;
        }
        Ok(())
    }

    // ── Encoding ────────────────────────────────────────────────────────────

    fn encode_fixed(&self) -> [u8; FILE_ENTRY_FIXED_SIZE] {
        let mut buf = [0u8; FILE_ENTRY_FIXED_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.file_id);
        LittleEndian::write_u64(&mut buf[8..16], self.original_size);
        LittleEndian::write_u64(&mut buf[16..24], self.stored_size);
        LittleEndian::write_u32(&mut buf[24..28], self.raw_checksum);
        LittleEndian::write_u32(&mut buf[28..32], self.stored_checksum);
        LittleEndian::write_u32(&mut buf[32..36], self.file_version);
        LittleEndian::write_u32(&mut buf[36..40], self.metadata_version);
        LittleEndian::write_u16(&mut buf[40..42], self.path_count);
        LittleEndian::write_u16(&mut buf[42..44], self.file_type);
        buf[44] = self.compression_type.into();
        buf[45] = self.compression_level;
        buf[46] = self.encryption_type.into();
        buf[47] = self.hash_count;
        LittleEndian::write_u32(&mut buf[48..52], self.hash_data_offset);
        LittleEndian::write_u16(&mut buf[52..54], self.hash_data_len);
        LittleEndian::write_u16(&mut buf[54..56], self.optional_data_len);
        LittleEndian::write_u32(&mut buf[56..60], self.optional_data_offset);
        LittleEndian::write_u32(&mut buf[60..64], self.reserved);
        buf
    }

    /// Writes the entry after recomputing its layout fields.
    pub fn write<W: Write>(&mut self, mut writer: W) -> Result<u64> {
        self.sync_layout()?;
        wire::put(&mut writer, &self.encode_fixed(), RECORD, "fixed section")?;
        for p in &self.paths {
            p.write(&mut writer)?;
        }
        for h in &self.hashes {
            h.write(&mut writer)?;
        }
        for o in &self.optional_data {
            o.write(&mut writer)?;
        }
        tracing::trace!(
            file_id = self.file_id,
            paths = self.paths.len(),
            hashes = self.hashes.len(),
            optional = self.optional_data.len(),
            "file entry written"
        );
        Ok(self.size() as u64)
    }

    // ── Decoding ────────────────────────────────────────────────────────────

    pub fn read<R: Read>(reader: R) -> Result<Self> {
        Self::read_with(reader, &DecodeOptions::default())
    }

    pub fn read_with<R: Read>(mut reader: R, opts: &DecodeOptions) -> Result<Self> {
        let buf: [u8; FILE_ENTRY_FIXED_SIZE] = wire::read_head(&mut reader, RECORD)?;
        let mut entry = Self {
            file_id:              LittleEndian::read_u64(&buf[0..8]),
            original_size:        LittleEndian::read_u64(&buf[8..16]),
            stored_size:          LittleEndian::read_u64(&buf[16..24]),
            raw_checksum:         LittleEndian::read_u32(&buf[24..28]),
            stored_checksum:      LittleEndian::read_u32(&buf[28..32]),
            file_version:         LittleEndian::read_u32(&buf[32..36]),
            metadata_version:     LittleEndian::read_u32(&buf[36..40]),
            path_count:           LittleEndian::read_u16(&buf[40..42]),
            file_type:            LittleEndian::read_u16(&buf[42..44]),
            compression_type:     CompressionType::from(buf[44]),
            compression_level:    buf[45],
            encryption_type:      EncryptionType::from(buf[46]),
            hash_count:           buf[47],
            hash_data_offset:     LittleEndian::read_u32(&buf[48..52]),
            hash_data_len:        LittleEndian::read_u16(&buf[52..54]),
            optional_data_len:    LittleEndian::read_u16(&buf[54..56]),
            optional_data_offset: LittleEndian::read_u32(&buf[56..60]),
            reserved:             LittleEndian::read_u32(&buf[60..64]),
            paths:                Vec::new(),
            hashes:               Vec::new(),
            optional_data:        Vec::new(),
        };

        // Bytes consumed from the variable area so far.
        let mut consumed: u64 = 0;

        entry.paths.reserve(entry.path_count as usize);
        for i in 0..entry.path_count as usize {
            let p = PathEntry::read(&mut reader)
                .map_err(|e| FormatError::child("path entry", i, within_entry(e, "path entry")))?;
            consumed += p.size() as u64;
            entry.paths.push(p);
        }

        if entry.hash_count > 0 {
            seek_section(&mut reader, entry.hash_data_offset as u64, &mut consumed, "hash data", opts)?;
        }
        let mut hash_bytes: u64 = 0;
        entry.hashes.reserve(entry.hash_count as usize);
        for i in 0..entry.hash_count as usize {
            let h = HashEntry::read(&mut reader)
                .map_err(|e| FormatError::child("hash entry", i, within_entry(e, "hash entry")))?;
            hash_bytes += h.size() as u64;
            entry.hashes.push(h);
        }
        if hash_bytes != entry.hash_data_len as u64 {
            return Err(FormatError::LengthMismatch {
                record:   RECORD,
                field:    "hash data length",
                declared: entry.hash_data_len as u64,
                actual:   hash_bytes,
            });
        }
        consumed += hash_bytes;

        let declared = entry.optional_data_len as u64;
        if declared > 0 {
            seek_section(&mut reader, entry.optional_data_offset as u64, &mut consumed, "optional data", opts)?;
        }
        let mut optional_bytes: u64 = 0;
        while optional_bytes < declared {
            let i = entry.optional_data.len();
            match OptionalDataEntry::read(&mut reader) {
                Ok(o) => {
                    optional_bytes += o.size() as u64;
                    if optional_bytes > declared {
                        return Err(FormatError::LengthMismatch {
                            record:   RECORD,
                            field:    "optional data length",
                            declared,
                            actual:   optional_bytes,
                        });
                    }
                    entry.optional_data.push(o);
                }
                Err(e) if e.is_no_data() && opts.lenient_optional_tail && i > 0 => {
                    tracing::warn!(
                        file_id = entry.file_id,
                        declared,
                        read = optional_bytes,
                        "optional data ended before its declared length"
                    );
                    break;
                }
                Err(e) => {
                    return Err(FormatError::child(
                        "optional data entry",
                        i,
                        within_entry(e, "optional data entry"),
                    ));
                }
            }
        }

        tracing::trace!(file_id = entry.file_id, bytes = entry.size(), "file entry read");
        Ok(entry)
    }
}

/// A child that finds no bytes at all is still a truncation of the entry.
fn within_entry(err: FormatError, field: &'static str) -> FormatError {
    match err {
        FormatError::NoData { .. } => FormatError::Truncated { record: RECORD, field, expected: 1, actual: 0 },
        other => other,
    }
}

/// Moves the reader to a declared section offset.  Zero means "right here";
/// a forward gap is skipped as padding up to `opts.max_padding` bytes.
fn seek_section<R: Read>(
    reader: &mut R,
    offset: u64,
    consumed: &mut u64,
    section: &'static str,
    opts: &DecodeOptions,
) -> Result<()> {
    if offset == 0 || offset == *consumed {
        return Ok(());
    }
    if offset < *consumed {
        return Err(FormatError::OffsetOverlap { section, offset, consumed: *consumed });
    }
    let gap = offset - *consumed;
    if gap > opts.max_padding {
        return Err(FormatError::OutOfRange { field: "section padding", value: gap, max: opts.max_padding });
    }
    tracing::debug!(section, gap, "skipping padding in file entry");
    wire::skip(reader, gap, RECORD, "section padding")?;
    *consumed = offset;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::marker::{HashType, OptionalDataType};
    use crate::wire::testutil::LimitedSink;
    use std::io::Cursor;

    /// Two paths, one hash, no optional data.
    fn two_paths_one_hash() -> FileEntry {
        let mut e = FileEntry::new(7);
        e.add_path(PathEntry::new("bin/tool").with_owner(0o755, 0, 0));
        e.add_path(PathEntry::new("usr/bin/tool").with_times(10, 20, 30));
        e.add_hash(HashEntry::new(HashType::Sha256, HashPurpose::ContentVerification, vec![0x11; 32]));
        e
    }

    fn encode(entry: &mut FileEntry) -> Vec<u8> {
        let mut bytes = Vec::new();
        entry.write(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn layout_offsets_follow_sections() {
        let mut e = two_paths_one_hash();
        let bytes = encode(&mut e);

        let paths = (2 + 8 + 36) + (2 + 12 + 36);
        assert_eq!(e.hash_data_offset as usize, paths);
        assert_eq!(e.hash_data_len, 36);
        assert_eq!(e.optional_data_offset as usize, paths + 36);
        assert_eq!(e.optional_data_len, 0);
        assert_eq!(bytes.len(), e.size());

        let back = FileEntry::read(Cursor::new(&bytes)).unwrap();
        assert_eq!(back, e);
        back.validate().unwrap();
        assert_eq!(back.primary_path(), Some("bin/tool"));
    }

    #[test]
    fn write_recomputes_counts() {
        let mut e = two_paths_one_hash();
        e.paths.push(PathEntry::new("opt/tool"));
        e.path_count = 0;
        e.hash_count = 9;
        encode(&mut e);
        assert_eq!(e.path_count, 3);
        assert_eq!(e.hash_count, 1);
    }

    #[test]
    fn optional_data_round_trip() {
        let mut e = two_paths_one_hash();
        e.add_optional_data(OptionalDataEntry::new(OptionalDataType::Tags, b"lang=en".to_vec()));
        e.add_optional_data(OptionalDataEntry::new(OptionalDataType::FileSystemFlags, vec![1, 0, 0, 0]));
        let bytes = encode(&mut e);
        assert_eq!(e.optional_data_len as usize, (3 + 7) + (3 + 4));

        let back = FileEntry::read(Cursor::new(&bytes)).unwrap();
        assert_eq!(back.optional_data, e.optional_data);
    }

    #[test]
    fn padding_before_hashes_is_skipped() {
        let mut e = two_paths_one_hash();
        let bytes = encode(&mut e);
        let split = FILE_ENTRY_FIXED_SIZE + e.hash_data_offset as usize;

        let mut padded = bytes[..split].to_vec();
        padded.extend_from_slice(&[0u8; 8]);
        padded.extend_from_slice(&bytes[split..]);
        let new_offset = e.hash_data_offset + 8;
        LittleEndian::write_u32(&mut padded[48..52], new_offset);

        let back = FileEntry::read(Cursor::new(&padded)).unwrap();
        assert_eq!(back.hashes, e.hashes);
        assert_eq!(back.hash_data_offset, new_offset);
    }

    #[test]
    fn padding_limit_and_overlap() {
        let mut e = two_paths_one_hash();
        let mut bytes = encode(&mut e);

        LittleEndian::write_u32(&mut bytes[48..52], 4);
        let err = FileEntry::read(Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, FormatError::OffsetOverlap { offset: 4, .. }));

        LittleEndian::write_u32(&mut bytes[48..52], e.hash_data_offset + 100);
        let opts = DecodeOptions { max_padding: 16, ..DecodeOptions::default() };
        let err = FileEntry::read_with(Cursor::new(&bytes), &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
    }

    #[test]
    fn hash_length_must_match_records() {
        let mut e = two_paths_one_hash();
        let mut bytes = encode(&mut e);
        LittleEndian::write_u16(&mut bytes[52..54], 40);
        assert!(matches!(
            FileEntry::read(Cursor::new(&bytes)),
            Err(FormatError::LengthMismatch { field: "hash data length", .. })
        ));
    }

    #[test]
    fn optional_tail_strict_by_default_lenient_on_request() {
        let mut e = FileEntry::new(3);
        e.add_path(PathEntry::new("a"));
        e.add_optional_data(OptionalDataEntry::new(OptionalDataType::Tags, b"x".to_vec()));
        let mut bytes = encode(&mut e);
        // Declare a second record that is not there.
        LittleEndian::write_u16(&mut bytes[54..56], e.optional_data_len + 10);

        let err = FileEntry::read(Cursor::new(&bytes)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated);

        let back = FileEntry::read_with(Cursor::new(&bytes), &DecodeOptions::lenient()).unwrap();
        assert_eq!(back.optional_data.len(), 1);
    }

    #[test]
    fn lenient_tail_still_needs_one_record() {
        let mut e = FileEntry::new(3);
        e.add_path(PathEntry::new("a"));
        let mut bytes = encode(&mut e);
        LittleEndian::write_u16(&mut bytes[54..56], 4);
        let err = FileEntry::read_with(Cursor::new(&bytes), &DecodeOptions::lenient()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated);
    }

    #[test]
    fn optional_record_overrun_rejected() {
        let mut e = FileEntry::new(3);
        e.add_path(PathEntry::new("a"));
        e.add_optional_data(OptionalDataEntry::new(OptionalDataType::Acl, vec![1, 2, 3, 4]));
        let mut bytes = encode(&mut e);
        LittleEndian::write_u16(&mut bytes[54..56], 5);
        assert!(matches!(
            FileEntry::read(Cursor::new(&bytes)),
            Err(FormatError::LengthMismatch { field: "optional data length", .. })
        ));
    }

    #[test]
    fn every_prefix_fails() {
        let mut e = two_paths_one_hash();
        e.add_optional_data(OptionalDataEntry::new(OptionalDataType::SolidGroupId, vec![9; 4]));
        let bytes = encode(&mut e);
        assert!(FileEntry::read(Cursor::new(Vec::new())).unwrap_err().is_no_data());
        for k in 1..bytes.len() {
            let err = FileEntry::read(Cursor::new(&bytes[..k])).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Truncated, "prefix {k}: {err}");
        }
    }

    #[test]
    fn validate_rules() {
        let mut e = two_paths_one_hash();
        e.validate().unwrap();

        e.file_id = 0;
        assert!(matches!(e.validate(), Err(FormatError::Unset { field: "file ID", .. })));

        let mut e = two_paths_one_hash();
        e.reserved = 1;
        assert!(matches!(e.validate(), Err(FormatError::ReservedNonZero { .. })));

        let mut e = two_paths_one_hash();
        e.path_count = 5;
        assert!(matches!(e.validate(), Err(FormatError::LengthMismatch { field: "path count", .. })));

        let mut e = two_paths_one_hash();
        e.hashes[0].data.clear();
        assert!(matches!(
            e.validate(),
            Err(FormatError::InvalidChild { record: "hash entry", index: 0, .. })
        ));
    }

    #[test]
    fn inconsistent_child_writes_nothing() {
        let mut e = two_paths_one_hash();
        e.paths[1].path_length = 1;
        let mut bytes = Vec::new();
        assert!(e.write(&mut bytes).is_err());
        assert!(bytes.is_empty());
    }

    #[test]
    fn oversized_sections_are_out_of_range() {
        let mut e = FileEntry::new(1);
        for _ in 0..=u8::MAX as usize {
            e.hashes.push(HashEntry::new(HashType::Crc32, HashPurpose::ErrorDetection, vec![0; 4]));
        }
        let err = e.write(Vec::new()).unwrap_err();
        assert!(matches!(err, FormatError::OutOfRange { field: "hash count", .. }));
    }

    #[test]
    fn checksums_and_lookup() {
        let mut e = two_paths_one_hash();
        e.set_checksums(b"hello", b"hello");
        assert_eq!(e.raw_checksum, crc32fast::hash(b"hello"));
        assert_eq!(e.stored_size, 5);
        assert!(e.hash_for(HashPurpose::ContentVerification).is_some());
        assert!(e.hash_for(HashPurpose::Deduplication).is_none());
    }

    #[test]
    fn short_sink_fails() {
        let mut sink = LimitedSink::new(70);
        let err = two_paths_one_hash().write(&mut sink).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
