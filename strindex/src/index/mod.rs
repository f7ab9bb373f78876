//! B+tree string index.
//!
//! An ordered map from string keys to string values, persisted as
//! fixed-size node records in a [`ByteStore`](crate::store::ByteStore).
//!
//! # Store Layout
//!
//! - Bytes 0..64: global header (identity, fanout, height, root, counters)
//! - Then one slot of `record_size(fanout)` bytes per node id, starting at id 0
//!
//! Id 0 is never allocated; its slot stays unused.
//!
//! # Usage
//!
//! ```ignore
//! use strindex::index::{Index, IndexOptions};
//! use strindex::store::MemoryStore;
//!
//! let mut index = Index::create(MemoryStore::new(), IndexOptions::with_fanout(12))?;
//! index.insert("alice", "1")?;
//! assert_eq!(index.search("alice")?, Some("1".to_string()));
//! ```

mod codec;
mod header;
mod node;
mod tree;

pub use codec::{
    CodecError, KEY_FIELD_SIZE, MAX_FANOUT, MAX_KEY_LEN, MAX_VALUE_LEN, NodeKind,
    RECORD_HEADER_SIZE, RECORD_TAG, VALUE_FIELD_SIZE, branch_record_size, decode, encode,
    leaf_record_size, peek_kind, record_size,
};
pub use header::{GLOBAL_HEADER_SIZE, HeaderError, IndexHeader, MAX_LABEL_LEN};
pub use node::{BranchNode, LeafEntry, LeafNode, NO_NODE, Node, NodeId};
pub use tree::{
    Cursor, DEFAULT_FANOUT, INDEX_VERSION, Index, IndexError, IndexOptions, IndexStats,
    InvariantViolation, offset_of,
};
