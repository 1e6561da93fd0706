//! Path entry: one path alias of a file plus POSIX-style metadata.
//!
//! ```text
//! path_length u16
//! path        [u8; path_length]   UTF-8, no terminator
//! mode        u32
//! uid         u32
//! gid         u32
//! mtime       u64
//! ctime       u64
//! atime       u64
//! ```

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::{FormatError, Result};
use crate::wire;

const RECORD: &str = "path entry";

/// Bytes of metadata that follow the path string.
pub const PATH_METADATA_SIZE: usize = 36;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathEntry {
    pub path_length: u16,
    pub path:        String,
    pub mode:        u32,
    pub uid:         u32,
    pub gid:         u32,
    pub mtime:       u64,
    pub ctime:       u64,
    pub atime:       u64,
}

impl PathEntry {
    /// Builds an entry whose length field matches `path`.  Paths longer than
    /// `u16::MAX` bytes are kept, and rejected later by `validate`/`write`.
    pub fn new(path: impl Into<String>) -> Self {
        let mut entry = Self::default();
        entry.set_path(path);
        entry
    }

    pub fn with_owner(mut self, mode: u32, uid: u32, gid: u32) -> Self {
        self.mode = mode;
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn with_times(mut self, mtime: u64, ctime: u64, atime: u64) -> Self {
        self.mtime = mtime;
        self.ctime = ctime;
        self.atime = atime;
        self
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
        self.path_length = self.path.len().min(u16::MAX as usize) as u16;
    }

    pub fn size(&self) -> usize {
        2 + self.path_length as usize + PATH_METADATA_SIZE
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(FormatError::Empty { record: RECORD, field: "path" });
        }
        self.check_length()
    }

    pub(crate) fn check_length(&self) -> Result<()> {
        if self.path_length as usize != self.path.len() {
            return Err(FormatError::LengthMismatch {
                record:   RECORD,
                field:    "path length",
                declared: self.path_length as u64,
                actual:   self.path.len() as u64,
            });
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<u64> {
        self.check_length()?;
        wire::put(&mut writer, &self.path_length.to_le_bytes(), RECORD, "path length")?;
        wire::put(&mut writer, self.path.as_bytes(), RECORD, "path")?;

        let mut meta = [0u8; PATH_METADATA_SIZE];
        LittleEndian::write_u32(&mut meta[0..4], self.mode);
        LittleEndian::write_u32(&mut meta[4..8], self.uid);
        LittleEndian::write_u32(&mut meta[8..12], self.gid);
        LittleEndian::write_u64(&mut meta[12..20], self.mtime);
        LittleEndian::write_u64(&mut meta[20..28], self.ctime);
        LittleEndian::write_u64(&mut meta[28..36], self.atime);
        wire::put(&mut writer, &meta, RECORD, "metadata")?;
        Ok(self.size() as u64)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let len: [u8; 2] = wire::read_head(&mut reader, RECORD)?;
        let path_length = u16::from_le_bytes(len);
        let raw = wire::read_bytes(&mut reader, path_length as u64, RECORD, "path")?;
        let path = String::from_utf8(raw)
            .map_err(|_| FormatError::InvalidUtf8 { record: RECORD, field: "path" })?;

        let meta: [u8; PATH_METADATA_SIZE] = wire::read_array(&mut reader, RECORD, "metadata")?;
        Ok(Self {
            path_length,
            path,
            mode:  LittleEndian::read_u32(&meta[0..4]),
            uid:   LittleEndian::read_u32(&meta[4..8]),
            gid:   LittleEndian::read_u32(&meta[8..12]),
            mtime: LittleEndian::read_u64(&meta[12..20]),
            ctime: LittleEndian::read_u64(&meta[20..28]),
            atime: LittleEndian::read_u64(&meta[28..36]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::testutil::LimitedSink;
    use std::io::Cursor;

    #[test]
    fn round_trip_with_metadata() {
        let entry = PathEntry::new("assets/textures/stone.png")
            .with_owner(0o100644, 1000, 100)
            .with_times(11, 22, 33);
        let mut bytes = Vec::new();
        assert_eq!(entry.write(&mut bytes).unwrap(), entry.size() as u64);
        assert_eq!(bytes.len(), 2 + 25 + 36);

        let back = PathEntry::read(Cursor::new(bytes)).unwrap();
        assert_eq!(back, entry);
        back.validate().unwrap();
    }

    #[test]
    fn multibyte_path_length_is_bytes() {
        let entry = PathEntry::new("données/é.txt");
        assert_eq!(entry.path_length as usize, "données/é.txt".len());
        entry.validate().unwrap();
    }

    #[test]
    fn validate_rejects_empty_and_mismatch() {
        assert!(matches!(PathEntry::new("").validate(), Err(FormatError::Empty { .. })));
        let mut entry = PathEntry::new("a.txt");
        entry.path_length = 9;
        assert!(matches!(entry.validate(), Err(FormatError::LengthMismatch { .. })));
        assert!(matches!(entry.write(Vec::new()), Err(FormatError::LengthMismatch { .. })));
    }

    #[test]
    fn every_truncation_fails() {
        let mut bytes = Vec::new();
        PathEntry::new("dir/file.bin").write(&mut bytes).unwrap();
        assert!(PathEntry::read(Cursor::new(Vec::new())).unwrap_err().is_no_data());
        for k in 1..bytes.len() {
            assert!(matches!(
                PathEntry::read(Cursor::new(bytes[..k].to_vec())),
                Err(FormatError::Truncated { .. })
            ));
        }
    }

    #[test]
    fn invalid_utf8_rejected() {
        let mut bytes = vec![2, 0, 0xFF, 0xFE];
        bytes.extend_from_slice(&[0u8; PATH_METADATA_SIZE]);
        assert!(matches!(
            PathEntry::read(Cursor::new(bytes)),
            Err(FormatError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn short_sink_fails() {
        let mut sink = LimitedSink::new(10);
        assert!(matches!(
            PathEntry::new("some/long/path.txt").write(&mut sink),
            Err(FormatError::ShortWrite { field: "path", .. })
        ));
    }
}
