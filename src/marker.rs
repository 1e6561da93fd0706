//! Enumerated wire markers.
//!
//! Every marker is a closed set of known values plus an `Unknown` variant
//! that carries the raw on-disk integer.  Decoding never rejects an unknown
//! marker and re-encoding writes it back verbatim, so files produced by a
//! newer writer survive a round trip through this crate unchanged.
//!
//! `Unknown(raw)` holding a value that has a named variant is the same
//! marker as that variant: equality, hashing, naming and serde all go
//! through the raw value.
//!
//! `name()` is for diagnostics only and is never written to disk.

use serde::{Deserialize, Serialize};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident($raw:ty) {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value this build does not recognise, preserved verbatim.
            Unknown($raw),
        }

        impl From<$raw> for $name {
            fn from(raw: $raw) -> Self {
                match raw {
                    $( $value => $name::$variant, )+
                    other => $name::Unknown(other),
                }
            }
        }

        impl From<$name> for $raw {
            fn from(marker: $name) -> Self {
                match marker {
                    $( $name::$variant => $value, )+
                    $name::Unknown(other) => other,
                }
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.raw() == other.raw()
            }
        }

        impl Eq for $name {}

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                std::hash::Hash::hash(&self.raw(), state);
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                self.raw().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                <$raw>::deserialize(deserializer).map($name::from)
            }
        }

        impl $name {
            /// Raw on-disk value.
            #[inline]
            pub fn raw(self) -> $raw {
                self.into()
            }

            /// The named variant for this raw value, or `Unknown` if none.
            #[inline]
            pub fn canonical(self) -> Self {
                $name::from(self.raw())
            }

            /// Whether this build knows the marker.
            pub fn is_known(self) -> bool {
                !matches!(self.canonical(), $name::Unknown(_))
            }

            /// Human-readable name (diagnostics only).
            pub fn name(self) -> &'static str {
                match self.canonical() {
                    $( $name::$variant => $label, )+
                    $name::Unknown(_) => "unknown",
                }
            }

            /// Parse a diagnostic name back into a known marker.
            pub fn from_name(s: &str) -> Option<Self> {
                match s.to_lowercase().as_str() {
                    $( $label => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.canonical() {
                    $name::Unknown(raw) => write!(f, "unknown({raw})"),
                    known => f.write_str(known.name()),
                }
            }
        }
    };
}

wire_enum! {
    /// Compression algorithm applied to a file or to the whole package.
    CompressionType(u8) {
        None = 0 => "none",
        Zstd = 1 => "zstd",
        Lz4  = 2 => "lz4",
        Lzma = 3 => "lzma",
    }
}

wire_enum! {
    /// Encryption applied to a file's stored bytes.
    EncryptionType(u8) {
        None        = 0 => "none",
        Aes256Gcm   = 1 => "aes-256-gcm",
        /// ML-KEM key encapsulation with ML-DSA authentication.
        QuantumSafe = 2 => "quantum-safe",
    }
}

wire_enum! {
    /// Algorithm that produced a hash entry.
    HashType(u8) {
        Sha256  = 0 => "sha-256",
        Sha512  = 1 => "sha-512",
        Blake3  = 2 => "blake3",
        Xxh3    = 3 => "xxh3",
        Blake2b = 4 => "blake2b",
        Blake2s = 5 => "blake2s",
        Sha3_256 = 6 => "sha3-256",
        Sha3_512 = 7 => "sha3-512",
        Crc32   = 8 => "crc32",
        Crc64   = 9 => "crc64",
    }
}

impl HashType {
    /// Conventional digest length in bytes, if the algorithm is known.
    pub fn digest_len(self) -> Option<usize> {
        match self.canonical() {
            HashType::Sha256 | HashType::Blake3 | HashType::Blake2s | HashType::Sha3_256 => Some(32),
            HashType::Sha512 | HashType::Blake2b | HashType::Sha3_512 => Some(64),
            HashType::Xxh3 | HashType::Crc64 => Some(8),
            HashType::Crc32 => Some(4),
            HashType::Unknown(_) => None,
        }
    }
}

wire_enum! {
    /// What a hash entry is used for.
    HashPurpose(u8) {
        ContentVerification = 0 => "content-verification",
        Deduplication       = 1 => "deduplication",
        Integrity           = 2 => "integrity",
        FastLookup          = 3 => "fast-lookup",
        ErrorDetection      = 4 => "error-detection",
    }
}

wire_enum! {
    /// Kind of attribute carried by an optional-data entry.
    OptionalDataType(u8) {
        Tags                  = 0 => "tags",
        PathEncoding          = 1 => "path-encoding",
        PathFlags             = 2 => "path-flags",
        CompressionDictionary = 3 => "compression-dictionary",
        SolidGroupId          = 4 => "solid-group-id",
        FileSystemFlags       = 5 => "filesystem-flags",
        WindowsAttributes     = 6 => "windows-attributes",
        ExtendedAttributes    = 7 => "extended-attributes",
        Acl                   = 8 => "acl",
    }
}

wire_enum! {
    /// Signature scheme of a signature block.  Zero means "unset".
    SignatureType(u32) {
        MlDsa  = 1 => "ml-dsa",
        SlhDsa = 2 => "slh-dsa",
        Pgp    = 3 => "pgp",
        X509   = 4 => "x.509",
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        CompressionType::None
    }
}

impl Default for EncryptionType {
    fn default() -> Self {
        EncryptionType::None
    }
}

impl Default for SignatureType {
    fn default() -> Self {
        SignatureType::Unknown(0)
    }
}
