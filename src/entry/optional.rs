//! Optional-data entry: one typed, rarely used attribute blob.
//!
//! ```text
//! data_type   u8
//! data_length u16
//! data        [u8; data_length]
//! ```

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::{FormatError, Result};
use crate::marker::OptionalDataType;
use crate::wire;

const RECORD: &str = "optional data entry";
pub const OPTIONAL_DATA_PREFIX_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalDataEntry {
    pub data_type:   OptionalDataType,
    pub data_length: u16,
    pub data:        Vec<u8>,
}

impl OptionalDataEntry {
    pub fn new(data_type: OptionalDataType, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            data_type,
            data_length: data.len().min(u16::MAX as usize) as u16,
            data,
        }
    }

    pub fn size(&self) -> usize {
        OPTIONAL_DATA_PREFIX_SIZE + self.data_length as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(FormatError::Empty { record: RECORD, field: "data" });
        }
        self.check_length()
    }

    pub(crate) fn check_length(&self) -> Result<()> {
        if self.data_length as usize != self.data.len() {
            return Err(FormatError::LengthMismatch {
                record:   RECORD,
                field:    "data length",
                declared: self.data_length as u64,
                actual:   self.data.len() as u64,
            });
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<u64> {
        self.check_length()?;
        let mut prefix = [0u8; OPTIONAL_DATA_PREFIX_SIZE];
        prefix[0] = self.data_type.into();
        prefix[1..3].copy_from_slice(&self.data_length.to_le_bytes());
        wire::put(&mut writer, &prefix, RECORD, "prefix")?;
        wire::put(&mut writer, &self.data, RECORD, "data")?;
        Ok(self.size() as u64)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let prefix: [u8; OPTIONAL_DATA_PREFIX_SIZE] = wire::read_head(&mut reader, RECORD)?;
        let data_length = u16::from_le_bytes([prefix[1], prefix[2]]);
        let data = wire::read_bytes(&mut reader, data_length as u64, RECORD, "data")?;
        Ok(Self {
            data_type: OptionalDataType::from(prefix[0]),
            data_length,
            data,
        })
    }
}
