//! Signature block: one container-level signature, carried as opaque bytes.
//!
//! ```text
//! signature_type      u32
//! signature_size      u32
//! signature_flags     u32
//! signature_timestamp u32    Unix seconds
//! comment_length      u16
//! comment             [u8; comment_length]   UTF-8
//! signature_data      [u8; signature_size]
//! ```

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::{FormatError, Result};
use crate::marker::SignatureType;
use crate::wire;

const RECORD: &str = "signature";
pub const SIGNATURE_PREFIX_SIZE: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    pub signature_type:      SignatureType,
    pub signature_size:      u32,
    pub signature_flags:     u32,
    pub signature_timestamp: u32,
    pub comment_length:      u16,
    pub comment:             String,
    pub data:                Vec<u8>,
}

impl Signature {
    pub fn new(signature_type: SignatureType, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            signature_type,
            signature_size: data.len().min(u32::MAX as usize) as u32,
            data,
            ..Self::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self.comment_length = self.comment.len().min(u16::MAX as usize) as u16;
        self
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.signature_timestamp = at.timestamp().clamp(0, u32::MAX as i64) as u32;
        self
    }

    pub fn size(&self) -> usize {
        SIGNATURE_PREFIX_SIZE + self.comment_length as usize + self.signature_size as usize
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.signature_flags & flag == flag
    }

    pub fn set_flag(&mut self, flag: u32) {
        self.signature_flags |= flag;
    }

    pub fn clear_flag(&mut self, flag: u32) {
        self.signature_flags &= !flag;
    }

    /// `None` when no timestamp was recorded.
    pub fn timestamp_at(&self) -> Option<DateTime<Utc>> {
        if self.signature_timestamp == 0 {
            return None;
        }
        DateTime::from_timestamp(self.signature_timestamp as i64, 0)
    }

    pub fn algorithm(&self) -> &'static str {
        self.signature_type.name()
    }

    pub fn validate(&self) -> Result<()> {
        if self.signature_type.raw() == 0 {
            return Err(FormatError::Unset { record: RECORD, field: "signature type" });
        }
        if self.data.is_empty() {
            return Err(FormatError::Empty { record: RECORD, field: "signature data" });
        }
        if self.signature_size as usize != self.data.len() {
            return Err(FormatError::LengthMismatch {
                record:   RECORD,
                field:    "signature size",
                declared: self.signature_size as u64,
                actual:   self.data.len() as u64,
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

    /// Writes the block with `comment_length` and `signature_size`
    /// recomputed from the comment and data.
    pub fn write<W: Write>(&mut self, mut writer: W) -> Result<u64> {
        self.comment_length = wire::narrow(self.comment.len(), "signature comment length", u16::MAX)?;
        self.signature_size = wire::narrow(self.data.len(), "signature size", u32::MAX)?;

        let mut prefix = [0u8; SIGNATURE_PREFIX_SIZE];
        LittleEndian::write_u32(&mut prefix[0..4], self.signature_type.into());
        LittleEndian::write_u32(&mut prefix[4..8], self.signature_size);
        LittleEndian::write_u32(&mut prefix[8..12], self.signature_flags);
        LittleEndian::write_u32(&mut prefix[12..16], self.signature_timestamp);
        LittleEndian::write_u16(&mut prefix[16..18], self.comment_length);
        wire::put(&mut writer, &prefix, RECORD, "prefix")?;
        wire::put(&mut writer, self.comment.as_bytes(), RECORD, "comment")?;
        wire::put(&mut writer, &self.data, RECORD, "signature data")?;
        Ok(self.size() as u64)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let prefix: [u8; SIGNATURE_PREFIX_SIZE] = wire::read_head(&mut reader, RECORD)?;
        let signature_size = LittleEndian::read_u32(&prefix[4..8]);
        let comment_length = LittleEndian::read_u16(&prefix[16..18]);

        let raw = wire::read_bytes(&mut reader, comment_length as u64, RECORD, "comment")?;
        let comment = String::from_utf8(raw)
            .map_err(|_| FormatError::InvalidUtf8 { record: RECORD, field: "comment" })?;
        let data = wire::read_bytes(&mut reader, signature_size as u64, RECORD, "signature data")?;

        Ok(Self {
            signature_type:      SignatureType::from(LittleEndian::read_u32(&prefix[0..4])),
            signature_size,
            signature_flags:     LittleEndian::read_u32(&prefix[8..12]),
            signature_timestamp: LittleEndian::read_u32(&prefix[12..16]),
            comment_length,
            comment,
            data,
        })
    }
}

/// Summary of one signature block as found in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub index:          usize,
    pub signature_type: SignatureType,
    pub size:           u32,
    /// Absolute offset of the block within the container.
    pub offset:         u64,
    pub flags:          u32,
    pub timestamp:      u32,
    pub comment:        String,
    pub algorithm:      String,
}

impl SignatureInfo {
    pub fn from_signature(index: usize, offset: u64, sig: &Signature) -> Self {
        Self {
            index,
            signature_type: sig.signature_type,
            size:           sig.signature_size,
            offset,
            flags:          sig.signature_flags,
            timestamp:      sig.signature_timestamp,
            comment:        sig.comment.clone(),
            algorithm:      sig.algorithm().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::wire::testutil::LimitedSink;
    use chrono::TimeZone;
    use std::io::Cursor;

    #[test]
    fn ml_dsa_without_comment() {
        let mut sig = Signature::new(SignatureType::MlDsa, vec![0x5A; 64]);
        assert_eq!(sig.size(), 82);
        let mut bytes = Vec::new();
        assert_eq!(sig.write(&mut bytes).unwrap(), 82);
        assert_eq!(bytes.len(), 82);

        let back = Signature::read(Cursor::new(&bytes)).unwrap();
        assert_eq!(back, sig);
        back.validate().unwrap();

        let err = Signature::read(Cursor::new(&bytes[..81])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated);
    }

    #[test]
    fn comment_round_trip() {
        let mut sig = Signature::new(SignatureType::Pgp, vec![1, 2, 3])
            .with_comment("release key")
            .with_timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let mut bytes = Vec::new();
        sig.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 18 + 11 + 3);

        let back = Signature::read(Cursor::new(bytes)).unwrap();
        assert_eq!(back.comment, "release key");
        assert_eq!(back.timestamp_at(), Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single());
        assert_eq!(back.algorithm(), "pgp");
    }

    #[test]
    fn write_recomputes_lengths() {
        let mut sig = Signature::new(SignatureType::X509, vec![9; 10]);
        sig.data.truncate(4);
        sig.comment = "ca".into();
        sig.write(Vec::new()).unwrap();
        assert_eq!(sig.signature_size, 4);
        assert_eq!(sig.comment_length, 2);
    }

    #[test]
    fn validate_rules() {
        let sig = Signature::new(SignatureType::default(), vec![1]);
        assert!(matches!(sig.validate(), Err(FormatError::Unset { .. })));

        let sig = Signature::new(SignatureType::SlhDsa, Vec::<u8>::new());
        assert!(matches!(sig.validate(), Err(FormatError::Empty { .. })));

        let mut sig = Signature::new(SignatureType::SlhDsa, vec![1, 2]);
        sig.signature_size = 3;
        assert!(matches!(sig.validate(), Err(FormatError::LengthMismatch { field: "signature size", .. })));

        let mut sig = Signature::new(SignatureType::SlhDsa, vec![1, 2]).with_comment("x");
        sig.comment_length = 0;
        assert!(matches!(sig.validate(), Err(FormatError::LengthMismatch { field: "comment length", .. })));
    }

    #[test]
    fn unknown_type_preserved() {
        let mut sig = Signature::new(SignatureType::Unknown(0x77), vec![1]);
        let mut bytes = Vec::new();
        sig.write(&mut bytes).unwrap();
        let back = Signature::read(Cursor::new(bytes)).unwrap();
        assert_eq!(back.signature_type, SignatureType::Unknown(0x77));
        back.validate().unwrap();
    }

    #[test]
    fn flags() {
        let mut sig = Signature::new(SignatureType::MlDsa, vec![1]);
        sig.set_flag(0b101);
        assert!(sig.has_flag(0b100));
        sig.clear_flag(0b100);
        assert!(!sig.has_flag(0b100));
        assert!(sig.has_flag(0b001));
    }

    #[test]
    fn every_prefix_fails() {
        let mut bytes = Vec::new();
        Signature::new(SignatureType::MlDsa, vec![7; 5]).with_comment("c").write(&mut bytes).unwrap();
        assert!(Signature::read(Cursor::new(Vec::new())).unwrap_err().is_no_data());
        for k in 1..bytes.len() {
            assert!(Signature::read(Cursor::new(&bytes[..k])).is_err(), "prefix {k}");
        }
    }

    #[test]
    fn info_summary() {
        let sig = Signature::new(SignatureType::MlDsa, vec![0; 4]).with_comment("ci");
        let info = SignatureInfo::from_signature(0, 4096, &sig);
        assert_eq!(info.algorithm, "ml-dsa");
        assert_eq!(info.size, 4);
        assert_eq!(info.offset, 4096);
    }

    #[test]
    fn short_sink_fails() {
        let mut sink = LimitedSink::new(20);
        let err = Signature::new(SignatureType::MlDsa, vec![0; 8]).write(&mut sink).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
