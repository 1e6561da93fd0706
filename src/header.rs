//! Package header: the fixed 112-byte preamble at offset 0.
//!
//! # Layout (little-endian)
//! ```text
//! 0   magic              u32   0x4E56504B
//! 4   format_version     u32
//! 8   flags              u32   bits 0-7 features, 8-15 compression, 16-31 reserved
//! 12  package_data_ver   u32
//! 16  metadata_ver       u32
//! 20  package_crc        u32
//! 24  created_time       u64   Unix nanoseconds
//! 32  modified_time      u64   Unix nanoseconds
//! 40  locale_id          u32
//! 44  reserved           u32   must be 0
//! 48  app_id             u64
//! 56  vendor_id          u32
//! 60  creator_id         u32
//! 64  index_start        u64
//! 72  index_size         u64
//! 80  archive_chain_id   u64
//! 88  archive_part_info  u32   hi16 = part, lo16 = total
//! 92  comment_size       u32
//! 96  comment_start      u64
//! 104 signature_offset   u64
//! ```

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::{FormatError, Result};
use crate::marker::CompressionType;
use crate::wire;

/// "NVPK" read as a little-endian u32.
pub const NVPK_MAGIC: u32 = 0x4E56_504B;
pub const FORMAT_VERSION: u32 = 1;
pub const PACKAGE_HEADER_SIZE: usize = 112;

pub const FLAGS_MASK_FEATURES: u32 = 0x0000_00FF;
pub const FLAGS_MASK_COMPRESSION: u32 = 0x0000_FF00;
pub const FLAGS_SHIFT_COMPRESSION: u32 = 8;
pub const FLAGS_MASK_RESERVED: u32 = 0xFFFF_0000;

// Storefront / platform identifiers (four ASCII characters, big-endian packed).
pub const VENDOR_ID_NONE: u32 = 0x0000_0000;
pub const VENDOR_ID_STEAM: u32 = 0x5354_4541;
pub const VENDOR_ID_EPIC: u32 = 0x4550_4943;
pub const VENDOR_ID_GOG: u32 = 0x474F_4720;
pub const VENDOR_ID_ITCH: u32 = 0x4954_4348;
pub const VENDOR_ID_HUMBLE: u32 = 0x4855_4D42;
pub const VENDOR_ID_MICROSOFT: u32 = 0x4D49_4352;
pub const VENDOR_ID_PLAYSTATION: u32 = 0x5053_4E59;
pub const VENDOR_ID_XBOX: u32 = 0x5842_4F58;
pub const VENDOR_ID_NINTENDO: u32 = 0x4E54_444F;
pub const VENDOR_ID_UNITY: u32 = 0x554E_4954;
pub const VENDOR_ID_UNREAL: u32 = 0x554E_5245;
pub const VENDOR_ID_GITHUB: u32 = 0x4749_5448;
pub const VENDOR_ID_GITLAB: u32 = 0x4749_544C;

bitflags! {
    /// Package-level feature bits (flags bits 0-7).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PackageFeatures: u8 {
        const HAS_SIGNATURES       = 1 << 0;
        const HAS_COMPRESSED_FILES = 1 << 1;
        const HAS_ENCRYPTED_FILES  = 1 << 2;
        const HAS_EXTENDED_ATTRS   = 1 << 3;
        const HAS_PACKAGE_COMMENT  = 1 << 4;
        const HAS_PER_FILE_TAGS    = 1 << 5;
        const HAS_SPECIAL_METADATA = 1 << 6;
        const METADATA_ONLY        = 1 << 7;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageHeader {
    pub magic:                u32,
    pub format_version:       u32,
    pub flags:                u32,
    pub package_data_version: u32,
    pub metadata_version:     u32,
    /// CRC32 of everything between the header and the signature block (0 = not computed).
    pub package_crc:          u32,
    pub created_time:         u64,
    pub modified_time:        u64,
    pub locale_id:            u32,
    pub reserved:             u32,
    pub app_id:               u64,
    pub vendor_id:            u32,
    pub creator_id:           u32,
    pub index_start:          u64,
    pub index_size:           u64,
    pub archive_chain_id:     u64,
    pub archive_part_info:    u32,
    pub comment_size:         u32,
    pub comment_start:        u64,
    pub signature_offset:     u64,
}

impl PackageHeader {
    /// Canonical header for a fresh package: version counters at 1, part 1 of 1.
    pub fn new() -> Self {
        let mut header = Self {
            magic:                NVPK_MAGIC,
            format_version:       FORMAT_VERSION,
            package_data_version: 1,
            metadata_version:     1,
            ..Self::default()
        };
        header.set_archive_part_info(1, 1);
        header
    }

    pub fn size(&self) -> usize {
        PACKAGE_HEADER_SIZE
    }

    /// Checks magic, format version and the reserved field.  Offsets cannot
    /// be checked here because the container length is not known.
    pub fn validate(&self) -> Result<()> {
        if self.magic != NVPK_MAGIC {
            return Err(FormatError::InvalidMagic(self.magic));
        }
        if self.format_version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(self.format_version));
        }
        if self.reserved != 0 {
            return Err(FormatError::ReservedNonZero {
                record: "package header",
                value:  self.reserved as u64,
            });
        }
        Ok(())
    }

    // ── Flags ────────────────────────────────────────────────────────────────

    pub fn compression_type(&self) -> CompressionType {
        CompressionType::from(((self.flags & FLAGS_MASK_COMPRESSION) >> FLAGS_SHIFT_COMPRESSION) as u8)
    }

    /// Replaces bits 8-15, leaving feature and reserved bits untouched.
    pub fn set_compression_type(&mut self, compression: CompressionType) {
        self.flags &= !FLAGS_MASK_COMPRESSION;
        self.flags |= (u8::from(compression) as u32) << FLAGS_SHIFT_COMPRESSION;
    }

    /// Feature bits; bits outside the known set are retained.
    pub fn features(&self) -> PackageFeatures {
        PackageFeatures::from_bits_retain((self.flags & FLAGS_MASK_FEATURES) as u8)
    }

    pub fn has_feature(&self, feature: PackageFeatures) -> bool {
        self.features().contains(feature)
    }

    pub fn set_feature(&mut self, feature: PackageFeatures) {
        self.flags |= feature.bits() as u32;
    }

    pub fn clear_feature(&mut self, feature: PackageFeatures) {
        self.flags &= !(feature.bits() as u32);
    }

    // ── Archive part info ────────────────────────────────────────────────────

    pub fn archive_part(&self) -> u16 {
        (self.archive_part_info >> 16) as u16
    }

    pub fn archive_total(&self) -> u16 {
        (self.archive_part_info & 0xFFFF) as u16
    }

    pub fn set_archive_part_info(&mut self, part: u16, total: u16) {
        self.archive_part_info = ((part as u32) << 16) | total as u32;
    }

    // ── Derived state ────────────────────────────────────────────────────────

    pub fn is_signed(&self) -> bool {
        self.signature_offset > 0
    }

    pub fn has_comment(&self) -> bool {
        self.comment_size > 0
    }

    // ── Timestamps ───────────────────────────────────────────────────────────

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        from_unix_nanos(self.created_time)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        from_unix_nanos(self.modified_time)
    }

    pub fn set_created(&mut self, at: DateTime<Utc>) {
        self.created_time = to_unix_nanos(at);
    }

    pub fn set_modified(&mut self, at: DateTime<Utc>) {
        self.modified_time = to_unix_nanos(at);
    }

    /// Stamps the modification time with the current clock.
    pub fn touch(&mut self) {
        self.set_modified(Utc::now());
    }

    // ── Wire codec ───────────────────────────────────────────────────────────

    pub fn write<W: Write>(&self, mut writer: W) -> Result<u64> {
        let mut buf = [0u8; PACKAGE_HEADER_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.magic);
        LittleEndian::write_u32(&mut buf[4..8], self.format_version);
        LittleEndian::write_u32(&mut buf[8..12], self.flags);
        LittleEndian::write_u32(&mut buf[12..16], self.package_data_version);
        LittleEndian::write_u32(&mut buf[16..20], self.metadata_version);
        LittleEndian::write_u32(&mut buf[20..24], self.package_crc);
        LittleEndian::write_u64(&mut buf[24..32], self.created_time);
        LittleEndian::write_u64(&mut buf[32..40], self.modified_time);
        LittleEndian::write_u32(&mut buf[40..44], self.locale_id);
        LittleEndian::write_u32(&mut buf[44..48], self.reserved);
        LittleEndian::write_u64(&mut buf[48..56], self.app_id);
        LittleEndian::write_u32(&mut buf[56..60], self.vendor_id);
        LittleEndian::write_u32(&mut buf[60..64], self.creator_id);
        LittleEndian::write_u64(&mut buf[64..72], self.index_start);
        LittleEndian::write_u64(&mut buf[72..80], self.index_size);
        LittleEndian::write_u64(&mut buf[80..88], self.archive_chain_id);
        LittleEndian::write_u32(&mut buf[88..92], self.archive_part_info);
        LittleEndian::write_u32(&mut buf[92..96], self.comment_size);
        LittleEndian::write_u64(&mut buf[96..104], self.comment_start);
        LittleEndian::write_u64(&mut buf[104..112], self.signature_offset);
        wire::put(&mut writer, &buf, "package header", "fixed section")?;
        Ok(PACKAGE_HEADER_SIZE as u64)
    }

    /// Reads the full 112 bytes, then rejects a bad magic or format version
    /// before handing anything back.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let buf: [u8; PACKAGE_HEADER_SIZE] = wire::read_head(&mut reader, "package header")?;
        let magic = LittleEndian::read_u32(&buf[0..4]);
        if magic != NVPK_MAGIC {
            return Err(FormatError::InvalidMagic(magic));
        }
        let format_version = LittleEndian::read_u32(&buf[4..8]);
        if format_version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(format_version));
        }
        Ok(Self {
            magic,
            format_version,
            flags:                LittleEndian::read_u32(&buf[8..12]),
            package_data_version: LittleEndian::read_u32(&buf[12..16]),
            metadata_version:     LittleEndian::read_u32(&buf[16..20]),
            package_crc:          LittleEndian::read_u32(&buf[20..24]),
            created_time:         LittleEndian::read_u64(&buf[24..32]),
            modified_time:        LittleEndian::read_u64(&buf[32..40]),
            locale_id:            LittleEndian::read_u32(&buf[40..44]),
            reserved:             LittleEndian::read_u32(&buf[44..48]),
            app_id:               LittleEndian::read_u64(&buf[48..56]),
            vendor_id:            LittleEndian::read_u32(&buf[56..60]),
            creator_id:           LittleEndian::read_u32(&buf[60..64]),
            index_start:          LittleEndian::read_u64(&buf[64..72]),
            index_size:           LittleEndian::read_u64(&buf[72..80]),
            archive_chain_id:     LittleEndian::read_u64(&buf[80..88]),
            archive_part_info:    LittleEndian::read_u32(&buf[88..92]),
            comment_size:         LittleEndian::read_u32(&buf[92..96]),
            comment_start:        LittleEndian::read_u64(&buf[96..104]),
            signature_offset:     LittleEndian::read_u64(&buf[104..112]),
        })
    }
}

fn from_unix_nanos(nanos: u64) -> Option<DateTime<Utc>> {
    if nanos == 0 {
        return None;
    }
    // Values above i64::MAX are not representable as a chrono timestamp.
    i64::try_from(nanos).ok().map(|n| Utc.timestamp_nanos(n))
}

fn to_unix_nanos(at: DateTime<Utc>) -> u64 {
    at.timestamp_nanos_opt().map_or(0, |n| n.max(0) as u64)
}
