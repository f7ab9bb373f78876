//! Global index header.
//!
//! The header occupies the first `GLOBAL_HEADER_SIZE` bytes of the store,
//! before the record slot of node id 0. It holds the index identity and the
//! manager state needed to reopen the index.

#![allow(clippy::cast_possible_truncation)]

use crate::index::node::NodeId;

/// Magic number identifying a string index store: "STRINDEX"
pub const MAGIC: [u8; 8] = *b"STRINDEX";

/// Current header format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the global header region in bytes.
pub const GLOBAL_HEADER_SIZE: usize = 64;

/// Maximum UTF-8 length of an index label in bytes.
pub const MAX_LABEL_LEN: usize = 16;

/// Header field offsets.
mod offsets {
    pub const MAGIC: usize = 0;
    pub const FORMAT_VERSION: usize = 8;
    pub const INDEX_ID: usize = 12;
    pub const FANOUT: usize = 16;
    pub const HEIGHT: usize = 20;
    pub const ROOT: usize = 24;
    pub const NEXT_ID: usize = 28;
    pub const BRANCH_COUNT: usize = 32;
    pub const LEAF_COUNT: usize = 36;
    pub const LABEL_LEN: usize = 40;
    pub const LABEL: usize = 44;
    pub const CHECKSUM: usize = 60;
}

/// Persisted index metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    /// Identity of the index.
    pub index_id: u32,
    /// Index label (at most `MAX_LABEL_LEN` bytes).
    pub label: String,
    /// Maximum keys per node.
    pub fanout: u32,
    /// Number of levels in the tree (0 when empty).
    pub height: u32,
    /// Root node id, 0 when the index is empty.
    pub root: NodeId,
    /// Next node id to allocate.
    pub next_id: NodeId,
    /// Number of branch nodes ever created.
    pub branch_count: u32,
    /// Number of leaf nodes ever created.
    pub leaf_count: u32,
}

impl IndexHeader {
    /// Serialize the header, including its checksum.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; GLOBAL_HEADER_SIZE] {
        let mut buf = [0u8; GLOBAL_HEADER_SIZE];

        buf[offsets::MAGIC..offsets::MAGIC + 8].copy_from_slice(&MAGIC);
        write_u32(&mut buf, offsets::FORMAT_VERSION, FORMAT_VERSION);
        write_u32(&mut buf, offsets::INDEX_ID, self.index_id);
        write_u32(&mut buf, offsets::FANOUT, self.fanout);
        write_u32(&mut buf, offsets::HEIGHT, self.height);
        write_u32(&mut buf, offsets::ROOT, self.root);
        write_u32(&mut buf, offsets::NEXT_ID, self.next_id);
        write_u32(&mut buf, offsets::BRANCH_COUNT, self.branch_count);
        write_u32(&mut buf, offsets::LEAF_COUNT, self.leaf_count);

        let label = self.label.as_bytes();
        let label_len = label.len().min(MAX_LABEL_LEN);
        write_u32(&mut buf, offsets::LABEL_LEN, label_len as u32);
        buf[offsets::LABEL..offsets::LABEL + label_len].copy_from_slice(&label[..label_len]);

        let checksum = crc32fast::hash(&buf[..offsets::CHECKSUM]);
        write_u32(&mut buf, offsets::CHECKSUM, checksum);

        buf
    }

    /// Deserialize and validate a header.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < GLOBAL_HEADER_SIZE {
            return Err(HeaderError::Truncated(buf.len()));
        }
        if buf[offsets::MAGIC..offsets::MAGIC + 8] != MAGIC {
            return Err(HeaderError::BadMagic);
        }

        let version = read_u32(buf, offsets::FORMAT_VERSION);
        if version != FORMAT_VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }

        let stored = read_u32(buf, offsets::CHECKSUM);
        let computed = crc32fast::hash(&buf[..offsets::CHECKSUM]);
        if stored != computed {
            return Err(HeaderError::ChecksumMismatch { stored, computed });
        }

        let label_len = read_u32(buf, offsets::LABEL_LEN) as usize;
        if label_len > MAX_LABEL_LEN {
            return Err(HeaderError::LabelTooLong(label_len));
        }
        let label = String::from_utf8(buf[offsets::LABEL..offsets::LABEL + label_len].to_vec())
            .map_err(|_| HeaderError::InvalidLabel)?;

        Ok(Self {
            index_id: read_u32(buf, offsets::INDEX_ID),
            label,
            fanout: read_u32(buf, offsets::FANOUT),
            height: read_u32(buf, offsets::HEIGHT),
            root: read_u32(buf, offsets::ROOT),
            next_id: read_u32(buf, offsets::NEXT_ID),
            branch_count: read_u32(buf, offsets::BRANCH_COUNT),
            leaf_count: read_u32(buf, offsets::LEAF_COUNT),
        })
    }
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// Errors that can occur when reading the global header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Fewer than `GLOBAL_HEADER_SIZE` bytes were available.
    Truncated(usize),
    /// Magic number does not match.
    BadMagic,
    /// Header was written by an unknown format version.
    UnsupportedVersion(u32),
    /// Stored checksum does not match the header contents.
    ChecksumMismatch { stored: u32, computed: u32 },
    /// Label length exceeds `MAX_LABEL_LEN`.
    LabelTooLong(usize),
    /// Label is not valid UTF-8.
    InvalidLabel,
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated(len) => write!(f, "header truncated: {len} bytes"),
            Self::BadMagic => write!(f, "invalid magic number"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version {v}"),
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            ),
            Self::LabelTooLong(len) => {
                write!(f, "label too long: {len} bytes (max {MAX_LABEL_LEN})")
            }
            Self::InvalidLabel => write!(f, "label is not valid UTF-8"),
        }
    }
}

impl std::error::Error for HeaderError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexHeader {
        IndexHeader {
            index_id: 3,
            label: "users".to_string(),
            fanout: 12,
            height: 2,
            root: 17,
            next_id: 40,
            branch_count: 4,
            leaf_count: 35,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..8], b"STRINDEX");
        assert_eq!(IndexHeader::from_bytes(&bytes).expect("parse"), header);
    }

    #[test]
    fn test_header_detects_bit_flip() {
        let mut bytes = sample().to_bytes();
        bytes[offsets::ROOT] ^= 0x01;

        assert!(matches!(
            IndexHeader::from_bytes(&bytes),
            Err(HeaderError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert_eq!(IndexHeader::from_bytes(&bytes), Err(HeaderError::BadMagic));
    }

    #[test]
    fn test_header_rejects_unknown_version() {
        let mut bytes = sample().to_bytes();
        write_u32(&mut bytes, offsets::FORMAT_VERSION, 99);
        assert_eq!(
            IndexHeader::from_bytes(&bytes),
            Err(HeaderError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn test_header_rejects_truncated() {
        let bytes = sample().to_bytes();
        assert_eq!(
            IndexHeader::from_bytes(&bytes[..32]),
            Err(HeaderError::Truncated(32))
        );
    }

    #[test]
    fn test_header_error_display() {
        let e = HeaderError::ChecksumMismatch {
            stored: 1,
            computed: 2,
        };
        assert!(e.to_string().contains("0x00000001"));
    }
}
