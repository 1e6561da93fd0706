pub mod error;
pub mod config;
pub mod marker;
pub mod header;
pub mod index;
pub mod entry;
pub mod comment;
pub mod signature;
pub mod io_stream;
pub mod perf;

mod wire;

pub use error::{ErrorKind, FormatError, Result};
pub use config::DecodeOptions;
pub use marker::{CompressionType, EncryptionType, HashPurpose, HashType, OptionalDataType, SignatureType};
pub use header::{PackageFeatures, PackageHeader, NVPK_MAGIC, FORMAT_VERSION, PACKAGE_HEADER_SIZE};
pub use index::{FileIndex, IndexEntry};
pub use entry::{FileEntry, HashEntry, OptionalDataEntry, PathEntry};
pub use comment::{PackageComment, MAX_COMMENT_LENGTH};
pub use signature::{Signature, SignatureInfo};
pub use io_stream::{PackageReader, PackageWriter};
