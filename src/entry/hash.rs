//! Hash entry: one tagged digest attached to a file.
//!
//! ```text
//! hash_type    u8
//! hash_purpose u8
//! hash_length  u16
//! data         [u8; hash_length]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

use crate::error::{FormatError, Result};
use crate::marker::{HashPurpose, HashType};
use crate::wire;

const RECORD: &str = "hash entry";
pub const HASH_ENTRY_PREFIX_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEntry {
    pub hash_type:    HashType,
    pub hash_purpose: HashPurpose,
    pub hash_length:  u16,
    pub data:         Vec<u8>,
}

impl HashEntry {
    pub fn new(hash_type: HashType, hash_purpose: HashPurpose, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            hash_type,
            hash_purpose,
            hash_length: data.len().min(u16::MAX as usize) as u16,
            data,
        }
    }

    pub fn size(&self) -> usize {
        HASH_ENTRY_PREFIX_SIZE + self.hash_length as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(FormatError::Empty { record: RECORD, field: "hash data" });
        }
        self.check_length()
    }

    pub(crate) fn check_length(&self) -> Result<()> {
        if self.hash_length as usize != self.data.len() {
            return Err(FormatError::LengthMismatch {
                record:   RECORD,
                field:    "hash length",
                declared: self.hash_length as u64,
                actual:   self.data.len() as u64,
            });
        }
        Ok(())
    }

    /// Lower-case hex rendering of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<u64> {
        self.check_length()?;
        let mut prefix = [0u8; HASH_ENTRY_PREFIX_SIZE];
        prefix[0] = self.hash_type.into();
        prefix[1] = self.hash_purpose.into();
        prefix[2..4].copy_from_slice(&self.hash_length.to_le_bytes());
        wire::put(&mut writer, &prefix, RECORD, "prefix")?;
        wire::put(&mut writer, &self.data, RECORD, "hash data")?;
        Ok(self.size() as u64)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let prefix: [u8; HASH_ENTRY_PREFIX_SIZE] = wire::read_head(&mut reader, RECORD)?;
        let hash_length = u16::from_le_bytes([prefix[2], prefix[3]]);
        let data = wire::read_bytes(&mut reader, hash_length as u64, RECORD, "hash data")?;
        Ok(Self {
            hash_type: HashType::from(prefix[0]),
            hash_purpose: HashPurpose::from(prefix[1]),
            hash_length,
            data,
        })
    }
}

impl fmt::Display for HashEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.hash_type, self.hash_purpose, self.to_hex())
    }
}
