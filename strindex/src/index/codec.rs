//! Fixed-size binary records for index nodes.
//!
//! Every node is encoded into a record whose size depends only on the index
//! fanout `F`, never on how many slots are occupied. Empty slots are written
//! as zero-length strings inside their fixed field budget.
//!
//! # Record Layout
//!
//! All integers are little-endian.
//!
//! ```text
//! Header (28 bytes):
//!   [0..8]    tag: "AA 1.0.0" (magic + version)
//!   [8]       kind: 0 = branch, 1 = leaf
//!   [9..12]   reserved (zero)
//!   [12..16]  fanout: u32
//!   [16..20]  occupancy: u32
//!   [20..24]  prev leaf id: u32 (0 for branches)
//!   [24..28]  next leaf id: u32 (0 for branches)
//!
//! Branch: header | child ids: (F+1) x u32 | keys: F x key field
//! Leaf:   header | keys: F x key field    | values: F x value field
//!
//! Key field (36 bytes):   len: u32 | up to 32 bytes UTF-8 | zero padding
//! Value field (56 bytes): len: u32 | up to 52 bytes UTF-8 | zero padding
//! ```

#![allow(clippy::cast_possible_truncation)]

use crate::index::node::{BranchNode, LeafEntry, LeafNode, NO_NODE, Node, NodeId};

/// Record tag: magic "AA" followed by the record format version.
pub const RECORD_TAG: [u8; 8] = *b"AA 1.0.0";

/// Size of the per-node record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 28;

/// Size of a key field (length prefix + payload budget).
pub const KEY_FIELD_SIZE: usize = 36;

/// Maximum UTF-8 length of a key in bytes.
pub const MAX_KEY_LEN: usize = KEY_FIELD_SIZE - LEN_PREFIX_SIZE;

/// Size of a value field (length prefix + payload budget).
pub const VALUE_FIELD_SIZE: usize = 56;

/// Maximum UTF-8 length of a value in bytes.
pub const MAX_VALUE_LEN: usize = VALUE_FIELD_SIZE - LEN_PREFIX_SIZE;

/// Size of a child id field.
pub const CHILD_ID_SIZE: usize = 4;

/// Largest supported fanout. Keeps every record size well inside a `u32`.
pub const MAX_FANOUT: usize = 4096;

const LEN_PREFIX_SIZE: usize = 4;

mod offsets {
    pub const TAG: usize = 0;
    pub const KIND: usize = 8;
    pub const FANOUT: usize = 12;
    pub const OCCUPANCY: usize = 16;
    pub const PREV: usize = 20;
    pub const NEXT: usize = 24;
}

/// Node kind discriminant stored in the record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    Branch = 0,
    Leaf = 1,
}

impl TryFrom<u8> for NodeKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Branch),
            1 => Ok(Self::Leaf),
            _ => Err(value),
        }
    }
}

/// Encoded size of a branch record.
#[must_use]
pub const fn branch_record_size(fanout: usize) -> usize {
    RECORD_HEADER_SIZE + fanout * KEY_FIELD_SIZE + (fanout + 1) * CHILD_ID_SIZE
}

/// Encoded size of a leaf record.
#[must_use]
pub const fn leaf_record_size(fanout: usize) -> usize {
    RECORD_HEADER_SIZE + fanout * KEY_FIELD_SIZE + fanout * VALUE_FIELD_SIZE
}

/// Size of the uniform slot every node occupies in the store.
///
/// Branch and leaf records differ in size; addressing uses the larger of the
/// two so that a node's offset is a pure function of its id.
#[must_use]
pub const fn record_size(fanout: usize) -> usize {
    let branch = branch_record_size(fanout);
    let leaf = leaf_record_size(fanout);
    if branch > leaf { branch } else { leaf }
}

/// Check that a key fits its field budget.
pub const fn check_key(key: &str) -> Result<(), CodecError> {
    if key.len() > MAX_KEY_LEN {
        return Err(CodecError::KeyTooLong(key.len()));
    }
    Ok(())
}

/// Check that a value fits its field budget.
pub const fn check_value(value: &str) -> Result<(), CodecError> {
    if value.len() > MAX_VALUE_LEN {
        return Err(CodecError::ValueTooLong(value.len()));
    }
    Ok(())
}

/// Read the node kind of an encoded record without decoding it.
pub fn peek_kind(buf: &[u8]) -> Result<NodeKind, CodecError> {
    check_header(buf)?;
    NodeKind::try_from(buf[offsets::KIND])
        .map_err(|k| CodecError::CorruptRecord(format!("unknown node kind {k}")))
}

/// Encode a node into a record of exactly its kind's size.
///
/// # Panics
///
/// Panics if the node holds more than `fanout` keys or a branch holds more
/// than `fanout + 1` children. Both indicate a bug in the caller.
pub fn encode(node: &Node, fanout: usize) -> Result<Vec<u8>, CodecError> {
    match node {
        Node::Branch(branch) => encode_branch(branch, fanout),
        Node::Leaf(leaf) => encode_leaf(leaf, fanout),
    }
}

/// Encode a branch node.
pub fn encode_branch(node: &BranchNode, fanout: usize) -> Result<Vec<u8>, CodecError> {
    assert!(node.keys.len() <= fanout, "branch holds more than fanout keys");
    assert!(
        node.children.len() <= fanout + 1,
        "branch holds more than fanout + 1 children"
    );

    let mut buf = vec![0u8; branch_record_size(fanout)];
    write_header(&mut buf, NodeKind::Branch, fanout, node.keys.len(), NO_NODE, NO_NODE);

    let mut offset = RECORD_HEADER_SIZE;
    for i in 0..=fanout {
        let child = node.children.get(i).copied().unwrap_or(NO_NODE);
        write_u32(&mut buf, offset, child);
        offset += CHILD_ID_SIZE;
    }

    for key in &node.keys {
        check_key(key)?;
        write_string(&mut buf, offset, key);
        offset += KEY_FIELD_SIZE;
    }

    Ok(buf)
}

/// Encode a leaf node.
pub fn encode_leaf(node: &LeafNode, fanout: usize) -> Result<Vec<u8>, CodecError> {
    assert!(node.entries.len() <= fanout, "leaf holds more than fanout entries");

    let mut buf = vec![0u8; leaf_record_size(fanout)];
    write_header(
        &mut buf,
        NodeKind::Leaf,
        fanout,
        node.entries.len(),
        node.prev,
        node.next,
    );

    let keys_start = RECORD_HEADER_SIZE;
    let values_start = keys_start + fanout * KEY_FIELD_SIZE;

    for (i, entry) in node.entries.iter().enumerate() {
        check_key(&entry.key)?;
        check_value(&entry.value)?;
        write_string(&mut buf, keys_start + i * KEY_FIELD_SIZE, &entry.key);
        write_string(&mut buf, values_start + i * VALUE_FIELD_SIZE, &entry.value);
    }

    Ok(buf)
}

/// Decode a record into a node with the given id.
///
/// The buffer may be longer than the record (trailing slot padding is
/// ignored). Nothing is returned unless the whole record is valid.
pub fn decode(id: NodeId, buf: &[u8], fanout: usize) -> Result<Node, CodecError> {
    match peek_kind(buf)? {
        NodeKind::Branch => decode_branch(id, buf, fanout).map(Node::Branch),
        NodeKind::Leaf => decode_leaf(id, buf, fanout).map(Node::Leaf),
    }
}

/// Decode a branch record.
pub fn decode_branch(id: NodeId, buf: &[u8], fanout: usize) -> Result<BranchNode, CodecError> {
    if peek_kind(buf)? != NodeKind::Branch {
        return Err(CodecError::WrongNodeType);
    }
    let occupancy = check_body(buf, fanout, branch_record_size(fanout))?;

    let mut offset = RECORD_HEADER_SIZE;
    let mut children = Vec::with_capacity(occupancy + 1);
    for _ in 0..=fanout {
        let child = read_u32(buf, offset);
        if child == NO_NODE {
            break;
        }
        children.push(child);
        offset += CHILD_ID_SIZE;
    }
    if !children.is_empty() && children.len() != occupancy + 1 {
        return Err(CodecError::CorruptRecord(format!(
            "branch {id} has {} children for {occupancy} keys",
            children.len()
        )));
    }

    let keys_start = RECORD_HEADER_SIZE + (fanout + 1) * CHILD_ID_SIZE;
    let keys = (0..occupancy)
        .map(|i| read_string(buf, keys_start + i * KEY_FIELD_SIZE, MAX_KEY_LEN, "key"))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BranchNode { id, keys, children })
}

/// Decode a leaf record.
pub fn decode_leaf(id: NodeId, buf: &[u8], fanout: usize) -> Result<LeafNode, CodecError> {
    if peek_kind(buf)? != NodeKind::Leaf {
        return Err(CodecError::WrongNodeType);
    }
    let occupancy = check_body(buf, fanout, leaf_record_size(fanout))?;

    let keys_start = RECORD_HEADER_SIZE;
    let values_start = keys_start + fanout * KEY_FIELD_SIZE;

    let mut entries = Vec::with_capacity(occupancy);
    for i in 0..occupancy {
        let key = read_string(buf, keys_start + i * KEY_FIELD_SIZE, MAX_KEY_LEN, "key")?;
        let value = read_string(
            buf,
            values_start + i * VALUE_FIELD_SIZE,
            MAX_VALUE_LEN,
            "value",
        )?;
        entries.push(LeafEntry { key, value });
    }

    Ok(LeafNode {
        id,
        entries,
        prev: read_u32(buf, offsets::PREV),
        next: read_u32(buf, offsets::NEXT),
    })
}

fn check_header(buf: &[u8]) -> Result<(), CodecError> {
    if buf.len() < RECORD_HEADER_SIZE {
        return Err(CodecError::CorruptRecord(format!(
            "record too short: {} bytes",
            buf.len()
        )));
    }
    if buf[offsets::TAG..offsets::TAG + RECORD_TAG.len()] != RECORD_TAG {
        return Err(CodecError::CorruptRecord("record tag mismatch".to_string()));
    }
    Ok(())
}

/// Validate the size and header counts of a record, returning its occupancy.
fn check_body(buf: &[u8], fanout: usize, size: usize) -> Result<usize, CodecError> {
    if buf.len() < size {
        return Err(CodecError::CorruptRecord(format!(
            "record truncated: {} of {size} bytes",
            buf.len()
        )));
    }

    let stored_fanout = read_u32(buf, offsets::FANOUT) as usize;
    if stored_fanout != fanout {
        return Err(CodecError::CorruptRecord(format!(
            "record fanout {stored_fanout} does not match index fanout {fanout}"
        )));
    }

    let occupancy = read_u32(buf, offsets::OCCUPANCY) as usize;
    if occupancy > fanout {
        return Err(CodecError::CorruptRecord(format!(
            "occupancy {occupancy} exceeds fanout {fanout}"
        )));
    }

    Ok(occupancy)
}

fn write_header(
    buf: &mut [u8],
    kind: NodeKind,
    fanout: usize,
    occupancy: usize,
    prev: NodeId,
    next: NodeId,
) {
    buf[offsets::TAG..offsets::TAG + RECORD_TAG.len()].copy_from_slice(&RECORD_TAG);
    buf[offsets::KIND] = kind as u8;
    write_u32(buf, offsets::FANOUT, fanout as u32);
    write_u32(buf, offsets::OCCUPANCY, occupancy as u32);
    write_u32(buf, offsets::PREV, prev);
    write_u32(buf, offsets::NEXT, next);
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// Write a length-prefixed string. The caller has checked the budget.
fn write_string(buf: &mut [u8], offset: usize, s: &str) {
    write_u32(buf, offset, s.len() as u32);
    let start = offset + LEN_PREFIX_SIZE;
    buf[start..start + s.len()].copy_from_slice(s.as_bytes());
}

fn read_string(
    buf: &[u8],
    offset: usize,
    max_len: usize,
    field: &str,
) -> Result<String, CodecError> {
    let len = read_u32(buf, offset) as usize;
    if len > max_len {
        return Err(CodecError::CorruptRecord(format!(
            "{field} length {len} exceeds budget of {max_len} bytes"
        )));
    }

    let start = offset + LEN_PREFIX_SIZE;
    String::from_utf8(buf[start..start + len].to_vec())
        .map_err(|_| CodecError::CorruptRecord(format!("{field} is not valid UTF-8")))
}

/// Errors that can occur when encoding or decoding records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Record header or contents do not form a valid record.
    CorruptRecord(String),
    /// Key's UTF-8 encoding exceeds `MAX_KEY_LEN` bytes.
    KeyTooLong(usize),
    /// Value's UTF-8 encoding exceeds `MAX_VALUE_LEN` bytes.
    ValueTooLong(usize),
    /// Record holds a different node kind than requested.
    WrongNodeType,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CorruptRecord(reason) => write!(f, "corrupt record: {reason}"),
            Self::KeyTooLong(len) => {
                write!(f, "key too long: {len} bytes (max {MAX_KEY_LEN})")
            }
            Self::ValueTooLong(len) => {
                write!(f, "value too long: {len} bytes (max {MAX_VALUE_LEN})")
            }
            Self::WrongNodeType => write!(f, "wrong node type for operation"),
        }
    }
}

impl std::error::Error for CodecError {}
