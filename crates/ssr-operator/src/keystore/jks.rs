//! Minimal reader for the Java KeyStore (JKS) container format
//!
//! Only the entry table is decoded: aliases, entry kinds and certificate
//! chain lengths. Key material stays opaque and the trailing integrity
//! digest is not verified (that needs the store password).

use thiserror::Error;

/// Magic number opening every JKS file
pub const JKS_MAGIC: u32 = 0xFEED_FEED;

const TAG_PRIVATE_KEY: u32 = 1;
const TAG_TRUSTED_CERT: u32 = 2;

/// Errors decoding a JKS file
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JksError {
    /// Input ended before a complete field was read
    #[error("truncated store: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset where the read started
        offset: usize,
        /// Bytes the field required
        needed: usize,
    },

    /// The file does not start with the JKS magic number
    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),

    /// Unsupported format version
    #[error("unsupported JKS version {0}")]
    UnsupportedVersion(u32),

    /// Unknown entry tag
    #[error("unknown entry tag {tag} at offset {offset}")]
    UnknownTag {
        /// The tag value
        tag: u32,
        /// Offset of the tag
        offset: usize,
    },

    /// An alias or certificate type string was not valid UTF-8
    #[error("invalid string at offset {0}")]
    InvalidString(usize),
}

/// Kind of a store entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JksEntryKind {
    /// Protected private key plus its certificate chain
    PrivateKey {
        /// Number of certificates in the chain
        chain_length: usize,
    },
    /// A trusted certificate
    TrustedCertificate,
}

/// One entry in a JKS store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JksEntry {
    /// Entry alias (keytool lowercases aliases)
    pub alias: String,
    /// What the entry holds
    pub kind: JksEntryKind,
}

/// Whether `bytes` starts with the JKS magic number
pub fn has_jks_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == JKS_MAGIC
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], JksError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(JksError::Truncated {
                offset: self.pos,
                needed: n,
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, JksError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, JksError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip(&mut self, n: usize) -> Result<(), JksError> {
        self.take(n).map(|_| ())
    }

    fn utf(&mut self) -> Result<String, JksError> {
        let start = self.pos;
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| JksError::InvalidString(start))
    }

    fn blob(&mut self) -> Result<(), JksError> {
        let len = self.u32()? as usize;
        self.skip(len)
    }

    fn certificate(&mut self, version: u32) -> Result<(), JksError> {
        if version == 2 {
            self.utf()?;
        }
        self.blob()
    }
}

/// List the entries of a JKS store
pub fn inspect(bytes: &[u8]) -> Result<Vec<JksEntry>, JksError> {
    let mut cur = Cursor { bytes, pos: 0 };

    let magic = cur.u32()?;
    if magic != JKS_MAGIC {
        return Err(JksError::BadMagic(magic));
    }
    let version = cur.u32()?;
    if version != 1 && version != 2 {
        return Err(JksError::UnsupportedVersion(version));
    }
    let count = cur.u32()?;

    let mut entries = Vec::new();
    for _ in 0..count {
        let tag_offset = cur.pos;
        let tag = cur.u32()?;
        if tag != TAG_PRIVATE_KEY && tag != TAG_TRUSTED_CERT {
            return Err(JksError::UnknownTag {
                tag,
                offset: tag_offset,
            });
        }
        let alias = cur.utf()?;
        // creation timestamp, millis since epoch
        cur.skip(8)?;

        let kind = match tag {
            TAG_PRIVATE_KEY => {
                cur.blob()?;
                let chain_length = cur.u32()? as usize;
                for _ in 0..chain_length {
                    cur.certificate(version)?;
                }
                JksEntryKind::PrivateKey { chain_length }
            }
            _ => {
                cur.certificate(version)?;
                JksEntryKind::TrustedCertificate
            }
        };
        entries.push(JksEntry { alias, kind });
    }

    Ok(entries)
}
