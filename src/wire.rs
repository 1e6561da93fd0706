//! Low-level read/write helpers shared by the record codecs.
//!
//! Fixed sections are pulled into a stack buffer in one pass and then parsed
//! with `byteorder`, so a short stream is always reported with the record and
//! field it broke in.  Variable payloads are read through `Read::take` so a
//! hostile length never causes a large up-front allocation.

use std::io::{self, Read, Write};

use crate::error::{FormatError, Result};

/// Upper bound on the capacity reserved ahead of a variable-length read.
const PREALLOC_LIMIT: usize = 64 * 1024;

/// Reads until `buf` is full or the source reports end of stream.
/// Returns the number of bytes placed in `buf`.
pub(crate) fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads the leading fixed section of a record.
///
/// Zero available bytes yields [`FormatError::NoData`]; anything short of
/// `N` yields [`FormatError::Truncated`].
pub(crate) fn read_head<const N: usize, R: Read>(
    reader: &mut R,
    record: &'static str,
) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    let got = fill(reader, &mut buf)?;
    if got == 0 && N > 0 {
        return Err(FormatError::NoData { record });
    }
    if got < N {
        return Err(FormatError::Truncated {
            record,
            field: "fixed section",
            expected: N as u64,
            actual: got as u64,
        });
    }
    Ok(buf)
}

/// Reads a fixed-width field that sits after the start of a record.
/// Any shortfall, including zero bytes, is a truncation.
pub(crate) fn read_array<const N: usize, R: Read>(
    reader: &mut R,
    record: &'static str,
    field: &'static str,
) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    let got = fill(reader, &mut buf)?;
    if got < N {
        return Err(FormatError::Truncated {
            record,
            field,
            expected: N as u64,
            actual: got as u64,
        });
    }
    Ok(buf)
}

/// Reads exactly `len` payload bytes or fails.
pub(crate) fn read_bytes<R: Read>(
    reader: &mut R,
    len: u64,
    record: &'static str,
    field: &'static str,
) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity((len as usize).min(PREALLOC_LIMIT));
    let got = reader.by_ref().take(len).read_to_end(&mut buf)? as u64;
    if got != len {
        return Err(FormatError::Truncated { record, field, expected: len, actual: got });
    }
    Ok(buf)
}

/// Discards exactly `len` bytes of padding or fails.
pub(crate) fn skip<R: Read>(
    reader: &mut R,
    len: u64,
    record: &'static str,
    field: &'static str,
) -> Result<()> {
    let got = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
    if got != len {
        return Err(FormatError::Truncated { record, field, expected: len, actual: got });
    }
    Ok(())
}

/// Writes every byte of `bytes`; a sink that stops accepting data is a
/// [`FormatError::ShortWrite`].
pub(crate) fn put<W: Write>(
    writer: &mut W,
    bytes: &[u8],
    record: &'static str,
    field: &'static str,
) -> Result<()> {
    writer.write_all(bytes).map_err(|e| {
        if e.kind() == io::ErrorKind::WriteZero {
            FormatError::ShortWrite { record, field, expected: bytes.len() as u64 }
        } else {
            FormatError::Io(e)
        }
    })
}

/// Converts a collection length into a narrower wire field.
pub(crate) fn narrow<T: TryFrom<usize>>(value: usize, field: &'static str, max: T) -> Result<T>
where
    T: Into<u64> + Copy,
{
    T::try_from(value).map_err(|_| FormatError::OutOfRange {
        field,
        value: value as u64,
        max: max.into(),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn head_distinguishes_empty_from_partial() {
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(matches!(
            read_head::<4, _>(&mut empty, "probe"),
            Err(FormatError::NoData { record: "probe" })
        ));

        let mut partial = Cursor::new(vec![1u8, 2]);
        assert!(matches!(
            read_head::<4, _>(&mut partial, "probe"),
            Err(FormatError::Truncated { expected: 4, actual: 2, .. })
        ));
    }

    #[test]
    fn array_treats_empty_as_truncation() {
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(matches!(
            read_array::<2, _>(&mut empty, "probe", "len"),
            Err(FormatError::Truncated { actual: 0, .. })
        ));
    }

    #[test]
    fn read_bytes_rejects_short_payload() {
        let mut src = Cursor::new(vec![7u8; 3]);
        let err = read_bytes(&mut src, 5, "probe", "payload").unwrap_err();
        assert!(matches!(err, FormatError::Truncated { expected: 5, actual: 3, .. }));
    }

    #[test]
    fn huge_declared_length_does_not_preallocate() {
        let mut src = Cursor::new(vec![0u8; 8]);
        let err = read_bytes(&mut src, u32::MAX as u64, "probe", "payload").unwrap_err();
        assert!(matches!(err, FormatError::Truncated { actual: 8, .. }));
    }

    #[test]
    fn put_reports_short_write() {
        let mut sink = testutil::LimitedSink::new(3);
        let err = put(&mut sink, b"abcdef", "probe", "payload").unwrap_err();
        assert!(matches!(err, FormatError::ShortWrite { expected: 6, .. }));
        assert_eq!(sink.data, b"abc");
    }

    #[test]
    fn narrow_rejects_overflow() {
        assert_eq!(narrow::<u8>(255, "hash count", u8::MAX).unwrap(), 255);
        assert!(matches!(
            narrow::<u8>(256, "hash count", u8::MAX),
            Err(FormatError::OutOfRange { value: 256, max: 255, .. })
        ));
    }
}
