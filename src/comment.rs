//! Package comment: an optional free-text annotation.
//!
//! ```text
//! comment_length u32          includes the terminator; 0 means no comment
//! comment        [u8; comment_length]   UTF-8, null-terminated
//! reserved       [u8; 3]      must be 0, present even when length is 0
//! ```

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::{FormatError, Result};
use crate::wire;

const RECORD: &str = "package comment";

/// Largest accepted `comment_length`, terminator included.
pub const MAX_COMMENT_LENGTH: u32 = (1 << 20) - 1;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageComment {
    pub comment_length: u32,
    /// Raw comment bytes including the trailing null.
    pub comment:        Vec<u8>,
    pub reserved:       [u8; 3],
}

impl PackageComment {
    pub fn new(text: &str) -> Result<Self> {
        let mut comment = Self::default();
        comment.set_comment(text)?;
        Ok(comment)
    }

    pub fn size(&self) -> usize {
        4 + self.comment_length as usize + 3
    }

    pub fn is_empty(&self) -> bool {
        self.comment_length == 0
    }

    pub fn clear(&mut self) {
        self.comment.clear();
        self.comment_length = 0;
        self.reserved = [0; 3];
    }

    pub fn set_comment(&mut self, text: &str) -> Result<()> {
        self.set_comment_bytes(text.as_bytes())
    }

    /// Replaces the comment with `raw`, which must be UTF-8 without
    /// embedded nulls.  One trailing null in `raw` is tolerated and the
    /// stored form always ends with exactly one terminator.
    pub fn set_comment_bytes(&mut self, raw: &[u8]) -> Result<()> {
        let body = raw.strip_suffix(&[0]).unwrap_or(raw);
        if std::str::from_utf8(body).is_err() {
            return Err(FormatError::InvalidUtf8 { record: RECORD, field: "comment" });
        }
        if let Some(position) = body.iter().position(|&b| b == 0) {
            return Err(FormatError::EmbeddedNul { position });
        }
        let length = body.len() as u64 + 1;
        if length > MAX_COMMENT_LENGTH as u64 {
            return Err(FormatError::OutOfRange {
                field: "comment length",
                value: length,
                max:   MAX_COMMENT_LENGTH as u64,
            });
        }

        let mut stored = Vec::with_capacity(body.len() + 1);
        stored.extend_from_slice(body);
        stored.push(0);
        self.comment = stored;
        self.comment_length = length as u32;
        self.reserved = [0; 3];
        Ok(())
    }

    /// The comment text without its terminator; empty when unset.
    pub fn comment(&self) -> Result<&str> {
        let body = self.comment.strip_suffix(&[0]).unwrap_or(&self.comment[..]);
        std::str::from_utf8(body).map_err(|_| FormatError::InvalidUtf8 { record: RECORD, field: "comment" })
    }

    pub fn validate(&self) -> Result<()> {
        if self.reserved != [0; 3] {
            let value = u32::from_le_bytes([self.reserved[0], self.reserved[1], self.reserved[2], 0]);
            return Err(FormatError::ReservedNonZero { record: RECORD, value: value as u64 });
        }
        self.check_length()?;
        if self.comment.is_empty() {
            return Ok(());
        }
        let Some(body) = self.comment.strip_suffix(&[0]) else {
            return Err(FormatError::MissingTerminator);
        };
        if let Some(position) = body.iter().position(|&b| b == 0) {
            return Err(FormatError::EmbeddedNul { position });
        }
        if std::str::from_utf8(body).is_err() {
            return Err(FormatError::InvalidUtf8 { record: RECORD, field: "comment" });
        }
        Ok(())
    }

    fn check_length(&self) -> Result<()> {
        if self.comment_length > MAX_COMMENT_LENGTH {
            return Err(FormatError::OutOfRange {
                field: "comment length",
                value: self.comment_length as u64,
                max:   MAX_COMMENT_LENGTH as u64,
            });
        }
        if self.comment_length as usize != self.comment.len() {
            return Err(FormatError::LengthMismatch {
                record:   RECORD,
                field:    "comment length",
                declared: self.comment_length as u64,
                actual:   self.comment.len() as u64,
            });
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<u64> {
        self.check_length()?;
        wire::put(&mut writer, &self.comment_length.to_le_bytes(), RECORD, "comment length")?;
        wire::put(&mut writer, &self.comment, RECORD, "comment")?;
        wire::put(&mut writer, &self.reserved, RECORD, "reserved")?;
        Ok(self.size() as u64)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let head: [u8; 4] = wire::read_head(&mut reader, RECORD)?;
        let comment_length = u32::from_le_bytes(head);
        if comment_length > MAX_COMMENT_LENGTH {
            return Err(FormatError::OutOfRange {
                field: "comment length",
                value: comment_length as u64,
                max:   MAX_COMMENT_LENGTH as u64,
            });
        }
        let comment = wire::read_bytes(&mut reader, comment_length as u64, RECORD, "comment")?;
        let reserved: [u8; 3] = wire::read_array(&mut reader, RECORD, "reserved")?;
        Ok(Self { comment_length, comment, reserved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::wire::testutil::LimitedSink;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let comment = PackageComment::new("Release build 2.4").unwrap();
        assert_eq!(comment.comment_length, 18);
        let mut bytes = Vec::new();
        assert_eq!(comment.write(&mut bytes).unwrap(), 25);
        assert_eq!(bytes.len(), comment.size());

        let back = PackageComment::read(Cursor::new(bytes)).unwrap();
        assert_eq!(back, comment);
        back.validate().unwrap();
        assert_eq!(back.comment().unwrap(), "Release build 2.4");
    }

    #[test]
    fn empty_text_is_just_a_terminator() {
        let comment = PackageComment::new("").unwrap();
        assert_eq!(comment.comment_length, 1);
        assert_eq!(comment.comment, vec![0]);
        comment.validate().unwrap();
        assert_eq!(comment.comment().unwrap(), "");
        assert!(!comment.is_empty());
    }

    #[test]
    fn absent_comment_still_has_reserved_bytes() {
        let comment = PackageComment::default();
        assert!(comment.is_empty());
        let mut bytes = Vec::new();
        comment.write(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0; 7]);
        assert_eq!(PackageComment::read(Cursor::new(bytes)).unwrap(), comment);
    }

    #[test]
    fn trailing_null_is_not_doubled() {
        let mut comment = PackageComment::default();
        comment.set_comment("notes\0").unwrap();
        assert_eq!(comment.comment, b"notes\0".to_vec());
        assert_eq!(comment.comment_length, 6);
    }

    #[test]
    fn embedded_null_rejected() {
        let mut comment = PackageComment::default();
        assert!(matches!(comment.set_comment("a\0b"), Err(FormatError::EmbeddedNul { position: 1 })));

        comment.comment = b"a\0b\0".to_vec();
        comment.comment_length = 4;
        assert!(matches!(comment.validate(), Err(FormatError::EmbeddedNul { position: 1 })));
    }

    #[test]
    fn invalid_utf8_rejected() {
        let mut comment = PackageComment::default();
        assert!(matches!(
            comment.set_comment_bytes(&[0xFF, 0xFE]),
            Err(FormatError::InvalidUtf8 { .. })
        ));
        comment.comment = vec![0xFF, 0];
        comment.comment_length = 2;
        assert!(matches!(comment.validate(), Err(FormatError::InvalidUtf8 { .. })));
    }

    #[test]
    fn length_boundary() {
        let at_max = "x".repeat(MAX_COMMENT_LENGTH as usize - 1);
        let comment = PackageComment::new(&at_max).unwrap();
        assert_eq!(comment.comment_length, MAX_COMMENT_LENGTH);
        comment.validate().unwrap();

        let over = "x".repeat(MAX_COMMENT_LENGTH as usize);
        let err = PackageComment::new(&over).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
    }

    #[test]
    fn oversized_length_rejected_before_reading() {
        let bytes = (MAX_COMMENT_LENGTH + 1).to_le_bytes().to_vec();
        let err = PackageComment::read(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, FormatError::OutOfRange { .. }));
    }

    #[test]
    fn validate_catches_structure() {
        let mut comment = PackageComment::new("hi").unwrap();
        comment.reserved = [0, 1, 0];
        assert!(matches!(comment.validate(), Err(FormatError::ReservedNonZero { value: 256, .. })));

        let mut comment = PackageComment::new("hi").unwrap();
        comment.comment.pop();
        comment.comment_length = 2;
        assert!(matches!(comment.validate(), Err(FormatError::MissingTerminator)));

        let mut comment = PackageComment::new("hi").unwrap();
        comment.comment_length = 9;
        assert!(matches!(comment.validate(), Err(FormatError::LengthMismatch { .. })));
        assert!(comment.write(Vec::new()).is_err());
    }

    #[test]
    fn clear_resets() {
        let mut comment = PackageComment::new("temporary").unwrap();
        comment.clear();
        assert!(comment.is_empty());
        assert_eq!(comment.size(), 7);
        comment.validate().unwrap();
    }

    #[test]
    fn every_prefix_fails() {
        let mut bytes = Vec::new();
        PackageComment::new("abc").unwrap().write(&mut bytes).unwrap();
        assert!(PackageComment::read(Cursor::new(Vec::new())).unwrap_err().is_no_data());
        for k in 1..bytes.len() {
            let err = PackageComment::read(Cursor::new(bytes[..k].to_vec())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Truncated, "prefix {k}");
        }
    }

    #[test]
    fn short_sink_fails() {
        let mut sink = LimitedSink::new(5);
        let err = PackageComment::new("abc").unwrap().write(&mut sink).unwrap_err();
        assert!(matches!(err, FormatError::ShortWrite { .. }));
    }
}
