//! Container streaming: writer and reader.
//!
//! # Writer
//! [`PackageWriter`] reserves the 112-byte header, then appends each file
//! entry immediately followed by its stored bytes.  `finalize()` writes the
//! file index, the comment and the signature block, and patches the header
//! in place at offset 0.
//!
//! After a failed write the writer refuses every later `add_file` and
//! `finalize` with [`FormatError::WriterFailed`].
//!
//! # Reader
//! [`PackageReader`] reads the header (magic and format version are checked
//! before anything else), then seeks to `index_start` to load the file
//! index.  Everything else is decoded on demand at header/index offsets.
//!
//! # Package CRC
//! `package_crc` covers every byte after the header and before the
//! signature block: entries, file data, index and comment.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::comment::PackageComment;
use crate::config::DecodeOptions;
use crate::entry::FileEntry;
use crate::error::{FormatError, Result};
use crate::header::{PackageFeatures, PackageHeader, PACKAGE_HEADER_SIZE};
use crate::index::FileIndex;
use crate::marker::{CompressionType, EncryptionType, OptionalDataType};
use crate::signature::{Signature, SignatureInfo};
use crate::wire;

/// Chunk size used when re-reading a byte range for its CRC.
const CRC_CHUNK_SIZE: usize = 64 * 1024;

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct PackageWriter<W: Write + Seek> {
    writer:         W,
    pub header:     PackageHeader,
    pub index:      FileIndex,
    pub comment:    Option<PackageComment>,
    pub signatures: Vec<Signature>,
    crc:            crc32fast::Hasher,
    failed:         bool,
}

impl<W: Write + Seek> PackageWriter<W> {
    pub fn new(writer: W) -> Result<Self> {
        let mut header = PackageHeader::new();
        header.set_created(chrono::Utc::now());
        header.modified_time = header.created_time;
        Self::with_header(writer, header)
    }

    /// Starts a package from a caller-populated header.  Navigation fields
    /// (index, comment, signature offsets and the package CRC) are
    /// overwritten on `finalize()`.
    pub fn with_header(mut writer: W, header: PackageHeader) -> Result<Self> {
        header.validate()?;
        writer.seek(SeekFrom::Start(0))?;
        // Reserved; overwritten on finalize.
        wire::put(&mut writer, &[0u8; PACKAGE_HEADER_SIZE], "package header", "placeholder")?;

        let mut index = FileIndex::new();
        index.first_entry_offset = PACKAGE_HEADER_SIZE as u64;

        Ok(Self {
            writer,
            header,
            index,
            comment:    None,
            signatures: Vec::new(),
            crc:        crc32fast::Hasher::new(),
            failed:     false,
        })
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.failed {
            return Err(FormatError::WriterFailed);
        }
        Ok(())
    }

    /// Latches the writer as failed when `result` is an error.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    /// True once a write has failed; the package on the sink is unusable.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn emit(&mut self, bytes: &[u8], record: &'static str) -> Result<()> {
        wire::put(&mut self.writer, bytes, record, "body")?;
        self.crc.update(bytes);
        Ok(())
    }

    /// Appends `entry` followed by `stored` (the bytes as kept in the
    /// package, after any compression or encryption done by the caller).
    ///
    /// A zero `stored_size` is filled in from `stored`, together with
    /// `stored_checksum`.  Returns the entry's offset.
    pub fn add_file(&mut self, mut entry: FileEntry, stored: &[u8]) -> Result<u64> {
        self.ensure_usable()?;
        if let Some(first) = self.index.iter().position(|e| e.file_id == entry.file_id) {
            return Err(FormatError::DuplicateFileId {
                file_id: entry.file_id,
                first,
                second: self.index.len(),
            });
        }
        if entry.stored_size == 0 && !stored.is_empty() {
            entry.stored_size = stored.len() as u64;
            entry.stored_checksum = crc32fast::hash(stored);
        }
        if entry.stored_size != stored.len() as u64 {
            return Err(FormatError::LengthMismatch {
                record:   "file entry",
                field:    "stored size",
                declared: entry.stored_size,
                actual:   stored.len() as u64,
            });
        }
        entry.sync_layout()?;
        entry.validate()?;

        let mut encoded = Vec::with_capacity(entry.size());
        entry.write(&mut encoded)?;

        let appended = self.append(&encoded, stored);
        let offset = self.guard(appended)?;
        self.index.push(entry.file_id, offset);
        self.note_features(&entry);

        tracing::debug!(
            file_id = entry.file_id,
            offset,
            stored = stored.len(),
            path = entry.primary_path().unwrap_or(""),
            "file added"
        );
        Ok(offset)
    }

    fn append(&mut self, entry: &[u8], stored: &[u8]) -> Result<u64> {
        let offset = self.writer.stream_position()?;
        self.emit(entry, "file entry")?;
        self.emit(stored, "file data")?;
        Ok(offset)
    }

    fn note_features(&mut self, entry: &FileEntry) {
        if entry.compression_type != CompressionType::None {
            self.header.set_feature(PackageFeatures::HAS_COMPRESSED_FILES);
        }
        if entry.encryption_type != EncryptionType::None {
            self.header.set_feature(PackageFeatures::HAS_ENCRYPTED_FILES);
        }
        for o in &entry.optional_data {
            match o.data_type.canonical() {
                OptionalDataType::Tags => self.header.set_feature(PackageFeatures::HAS_PER_FILE_TAGS),
                OptionalDataType::ExtendedAttributes => {
                    self.header.set_feature(PackageFeatures::HAS_EXTENDED_ATTRS)
                }
                _ => {}
            }
        }
    }

    pub fn set_comment(&mut self, text: &str) -> Result<()> {
        self.comment = Some(PackageComment::new(text)?);
        Ok(())
    }

    pub fn add_signature(&mut self, signature: Signature) -> Result<()> {
        signature.validate()?;
        self.signatures.push(signature);
        Ok(())
    }

    /// Writes index, comment and signatures, then patches the header.
    pub fn finalize(&mut self) -> Result<()> {
        self.ensure_usable()?;
        let finished = self.finish();
        self.guard(finished)
    }

    fn finish(&mut self) -> Result<()> {
        let index_start = self.writer.stream_position()?;
        let mut encoded = Vec::with_capacity(self.index.size());
        self.index.write(&mut encoded)?;
        self.emit(&encoded, "file index")?;
        self.header.index_start = index_start;
        self.header.index_size = encoded.len() as u64;

        let comment = match &self.comment {
            Some(comment) => {
                let mut encoded = Vec::with_capacity(comment.size());
                comment.write(&mut encoded)?;
                Some(encoded)
            }
            None => None,
        };
        match comment {
            Some(encoded) => {
                let comment_start = self.writer.stream_position()?;
                self.emit(&encoded, "package comment")?;
                self.header.comment_start = comment_start;
                self.header.comment_size = wire::narrow(encoded.len(), "comment size", u32::MAX)?;
                self.header.set_feature(PackageFeatures::HAS_PACKAGE_COMMENT);
            }
            None => {
                self.header.comment_start = 0;
                self.header.comment_size = 0;
                self.header.clear_feature(PackageFeatures::HAS_PACKAGE_COMMENT);
            }
        }

        self.header.package_crc = self.crc.clone().finalize();

        if self.signatures.is_empty() {
            self.header.signature_offset = 0;
            self.header.clear_feature(PackageFeatures::HAS_SIGNATURES);
        } else {
            self.header.signature_offset = self.writer.stream_position()?;
            for sig in &mut self.signatures {
                sig.write(&mut self.writer)?;
            }
            self.header.set_feature(PackageFeatures::HAS_SIGNATURES);
        }

        self.header.touch();
        self.writer.seek(SeekFrom::Start(0))?;
        self.header.write(&mut self.writer)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;

        tracing::debug!(
            files = self.index.len(),
            index_start,
            signatures = self.signatures.len(),
            crc = self.header.package_crc,
            "package finalized"
        );
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct PackageReader<R: Read + Seek> {
    reader:     R,
    pub header: PackageHeader,
    pub index:  FileIndex,
    pub opts:   DecodeOptions,
}

impl<R: Read + Seek> PackageReader<R> {
    pub fn open(reader: R) -> Result<Self> {
        Self::open_with(reader, DecodeOptions::default())
    }

    pub fn open_with(mut reader: R, opts: DecodeOptions) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header = PackageHeader::read(&mut reader)?;
        header.validate()?;
        if header.index_start == 0 {
            return Err(FormatError::Unset { record: "package header", field: "index start" });
        }

        reader.seek(SeekFrom::Start(header.index_start))?;
        let index = FileIndex::read(&mut reader)?;
        index.validate()?;
        if header.index_size != 0 && header.index_size != index.size() as u64 {
            return Err(FormatError::LengthMismatch {
                record:   "package header",
                field:    "index size",
                declared: header.index_size,
                actual:   index.size() as u64,
            });
        }

        tracing::debug!(files = index.len(), signed = header.is_signed(), "package opened");
        Ok(Self { reader, header, index, opts })
    }

    pub fn file_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.index.iter().map(|e| e.file_id)
    }

    fn seek_entry(&mut self, file_id: u64) -> Result<()> {
        let offset = self
            .index
            .find(file_id)
            .map(|e| e.offset)
            .ok_or(FormatError::FileNotFound(file_id))?;
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn entry(&mut self, file_id: u64) -> Result<FileEntry> {
        self.seek_entry(file_id)?;
        FileEntry::read_with(&mut self.reader, &self.opts)
    }

    /// Decodes the entry and the stored bytes that follow it.
    pub fn read_file(&mut self, file_id: u64) -> Result<(FileEntry, Vec<u8>)> {
        let entry = self.entry(file_id)?;
        let data = wire::read_bytes(&mut self.reader, entry.stored_size, "file data", "stored bytes")?;
        if self.opts.verify_checksums && entry.stored_checksum != 0 {
            let actual = crc32fast::hash(&data);
            if actual != entry.stored_checksum {
                tracing::warn!(file_id, expected = entry.stored_checksum, actual, "stored checksum mismatch");
                return Err(FormatError::ChecksumMismatch {
                    record:   "file data",
                    expected: entry.stored_checksum,
                    actual,
                });
            }
        }
        Ok((entry, data))
    }

    pub fn read_file_data(&mut self, file_id: u64) -> Result<Vec<u8>> {
        self.read_file(file_id).map(|(_, data)| data)
    }

    pub fn comment(&mut self) -> Result<Option<PackageComment>> {
        if !self.header.has_comment() {
            return Ok(None);
        }
        self.reader.seek(SeekFrom::Start(self.header.comment_start))?;
        let comment = PackageComment::read(&mut self.reader)?;
        comment.validate()?;
        Ok(Some(comment))
    }

    /// Signature blocks from `signature_offset` to the end of the stream.
    pub fn signatures(&mut self) -> Result<Vec<Signature>> {
        Ok(self.scan_signatures()?.into_iter().map(|(_, sig)| sig).collect())
    }

    pub fn signature_infos(&mut self) -> Result<Vec<SignatureInfo>> {
        Ok(self
            .scan_signatures()?
            .iter()
            .enumerate()
            .map(|(i, (offset, sig))| SignatureInfo::from_signature(i, *offset, sig))
            .collect())
    }

    fn scan_signatures(&mut self) -> Result<Vec<(u64, Signature)>> {
        let mut found = Vec::new();
        if !self.header.is_signed() {
            return Ok(found);
        }
        self.reader.seek(SeekFrom::Start(self.header.signature_offset))?;
        loop {
            let offset = self.reader.stream_position()?;
            match Signature::read(&mut self.reader) {
                Ok(sig) => found.push((offset, sig)),
                Err(e) if e.is_no_data() => break,
                Err(e) => return Err(FormatError::child("signature", found.len(), e)),
            }
        }
        Ok(found)
    }

    /// Recomputes `package_crc` over the stream and compares.  A stored
    /// value of zero means the writer did not compute one.
    pub fn verify_package_crc(&mut self) -> Result<()> {
        if self.header.package_crc == 0 {
            return Ok(());
        }
        let end = if self.header.is_signed() {
            self.header.signature_offset
        } else {
            self.reader.seek(SeekFrom::End(0))?
        };
        let start = PACKAGE_HEADER_SIZE as u64;
        let len = end.saturating_sub(start);

        self.reader.seek(SeekFrom::Start(start))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut chunk = vec![0u8; CRC_CHUNK_SIZE];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(CRC_CHUNK_SIZE as u64) as usize;
            let got = wire::fill(&mut self.reader, &mut chunk[..want])?;
            if got < want {
                return Err(FormatError::Truncated {
                    record:   "package",
                    field:    "checksummed range",
                    expected: len,
                    actual:   len - remaining + got as u64,
                });
            }
            hasher.update(&chunk[..got]);
            remaining -= got as u64;
        }

        let actual = hasher.finalize();
        if actual != self.header.package_crc {
            return Err(FormatError::ChecksumMismatch {
                record:   "package",
                expected: self.header.package_crc,
                actual,
            });
        }
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
