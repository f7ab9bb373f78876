//! Index manager.
//!
//! The manager owns the tree shape (fanout, height, node counters, root id)
//! and maps node ids to fixed offsets in a [`ByteStore`]:
//!
//! ```text
//! offset(id) = GLOBAL_HEADER_SIZE + id * record_size(fanout)
//! ```
//!
//! Insertion splits proactively on the way down: before descending into a
//! child, a full child is split and its median promoted into the current
//! node, which is guaranteed to have room. A split therefore never has to
//! travel back up the tree.

#![allow(clippy::cast_possible_truncation)]

use crate::index::codec::{self, CodecError, MAX_FANOUT};
use crate::index::header::{GLOBAL_HEADER_SIZE, HeaderError, IndexHeader, MAX_LABEL_LEN};
use crate::index::node::{BranchNode, LeafNode, NO_NODE, Node, NodeId, lower_bound};
use crate::store::{ByteStore, StoreError};

/// Default fanout (maximum keys per node).
pub const DEFAULT_FANOUT: usize = 12;

/// Index version string, matching the record tag suffix.
pub const INDEX_VERSION: &str = "1.0.0";

/// Options for creating a new index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    /// Identity of the index.
    pub id: u32,
    /// Human-readable label (at most 16 UTF-8 bytes).
    pub label: String,
    /// Maximum keys per node, in `2..=MAX_FANOUT`.
    pub fanout: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            id: 0,
            label: String::new(),
            fanout: DEFAULT_FANOUT,
        }
    }
}

impl IndexOptions {
    /// Options with the given fanout and default identity.
    #[must_use]
    pub fn with_fanout(fanout: usize) -> Self {
        Self {
            fanout,
            ..Self::default()
        }
    }
}

/// Shape statistics of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub fanout: usize,
    /// Number of levels (0 when empty, 1 for a single leaf).
    pub height: u32,
    pub branch_count: u32,
    pub leaf_count: u32,
    pub node_count: u32,
    pub root: Option<NodeId>,
}

/// An ordered string index stored in a byte store.
///
/// The index hands out node ids from a single counter shared by both node
/// kinds. Ids start at 1 and are never reused.
pub struct Index<S: ByteStore> {
    store: S,
    id: u32,
    label: String,
    fanout: usize,
    height: u32,
    root: Option<NodeId>,
    next_id: NodeId,
    branch_count: u32,
    leaf_count: u32,
}

impl<S: ByteStore> Index<S> {
    /// Create a new empty index in `store`, writing its global header.
    ///
    /// Pass `&mut store` to keep ownership of the store with the caller.
    pub fn create(store: S, options: IndexOptions) -> Result<Self, IndexError> {
        if !(2..=MAX_FANOUT).contains(&options.fanout) {
            return Err(IndexError::InvalidFanout(options.fanout));
        }
        if options.label.len() > MAX_LABEL_LEN {
            return Err(IndexError::Header(HeaderError::LabelTooLong(
                options.label.len(),
            )));
        }

        let mut index = Self {
            store,
            id: options.id,
            label: options.label,
            fanout: options.fanout,
            height: 0,
            root: None,
            next_id: 1,
            branch_count: 0,
            leaf_count: 0,
        };
        index.write_header()?;

        tracing::info!(
            "Created index {}:'{}' with fanout {}",
            index.id,
            index.label,
            index.fanout
        );

        Ok(index)
    }

    /// Open an existing index from its global header.
    pub fn open(store: S) -> Result<Self, IndexError> {
        let extent = store.extent();
        if extent < GLOBAL_HEADER_SIZE as u64 {
            return Err(IndexError::Header(HeaderError::Truncated(extent as usize)));
        }

        let bytes = store.read(0, GLOBAL_HEADER_SIZE as u32)?;
        let header = IndexHeader::from_bytes(&bytes)?;

        let fanout = header.fanout as usize;
        if !(2..=MAX_FANOUT).contains(&fanout) {
            return Err(IndexError::InvalidFanout(fanout));
        }

        tracing::info!(
            "Opened index {}:'{}' (fanout {}, height {}, {} nodes)",
            header.index_id,
            header.label,
            fanout,
            header.height,
            header.branch_count + header.leaf_count
        );

        Ok(Self {
            store,
            id: header.index_id,
            label: header.label,
            fanout,
            height: header.height,
            root: (header.root != NO_NODE).then_some(header.root),
            next_id: header.next_id,
            branch_count: header.branch_count,
            leaf_count: header.leaf_count,
        })
    }

    /// Identity of the index.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Label of the index.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Version string of the on-store format.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub const fn version(&self) -> &'static str {
        INDEX_VERSION
    }

    /// Maximum keys per node.
    #[must_use]
    pub const fn fanout(&self) -> usize {
        self.fanout
    }

    /// Number of levels in the tree.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Root node id, `None` while the index is empty.
    #[must_use]
    pub const fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of branch nodes created.
    #[must_use]
    pub const fn branch_count(&self) -> u32 {
        self.branch_count
    }

    /// Number of leaf nodes created.
    #[must_use]
    pub const fn leaf_count(&self) -> u32 {
        self.leaf_count
    }

    /// Total number of nodes created.
    #[must_use]
    pub const fn node_count(&self) -> u32 {
        self.branch_count + self.leaf_count
    }

    /// Shape statistics.
    #[must_use]
    pub const fn stats(&self) -> IndexStats {
        IndexStats {
            fanout: self.fanout,
            height: self.height,
            branch_count: self.branch_count,
            leaf_count: self.leaf_count,
            node_count: self.node_count(),
            root: self.root,
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Make all writes durable.
    pub fn sync(&mut self) -> Result<(), IndexError> {
        self.store.sync()?;
        Ok(())
    }

    // ========== Identity & Addressing ==========

    const fn allocate_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Create an empty branch node with a fresh id.
    pub fn create_branch(&mut self) -> BranchNode {
        self.branch_count += 1;
        BranchNode::new(self.allocate_id())
    }

    /// Create an empty, unlinked leaf node with a fresh id.
    pub fn create_leaf(&mut self) -> LeafNode {
        self.leaf_count += 1;
        LeafNode::new(self.allocate_id())
    }

    /// Size of the slot every node occupies in the store.
    #[must_use]
    pub const fn record_size(&self) -> usize {
        codec::record_size(self.fanout)
    }

    /// Store offset of the record for node `id`.
    #[must_use]
    pub const fn offset_of(&self, id: NodeId) -> u64 {
        offset_of(id, self.fanout)
    }

    // ========== Node I/O ==========

    /// Load a node from its record.
    pub fn load_node(&self, id: NodeId) -> Result<Node, IndexError> {
        let offset = self.offset_of(id);
        let buf = self.store.read(offset, self.record_size() as u32)?;
        tracing::trace!("Loaded node {} from offset {}", id, offset);
        Ok(codec::decode(id, &buf, self.fanout)?)
    }

    /// Load a node that must be a leaf.
    pub fn load_leaf(&self, id: NodeId) -> Result<LeafNode, IndexError> {
        match self.load_node(id)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Branch(_) => Err(IndexError::Codec(CodecError::WrongNodeType)),
        }
    }

    /// Persist a node at its fixed offset.
    pub fn save_node(&mut self, node: &Node) -> Result<(), IndexError> {
        let buf = codec::encode(node, self.fanout)?;
        self.write_record(node.id(), buf)
    }

    fn save_branch(&mut self, node: &BranchNode) -> Result<(), IndexError> {
        let buf = codec::encode_branch(node, self.fanout)?;
        self.write_record(node.id, buf)
    }

    fn save_leaf(&mut self, node: &LeafNode) -> Result<(), IndexError> {
        let buf = codec::encode_leaf(node, self.fanout)?;
        self.write_record(node.id, buf)
    }

    fn write_record(&mut self, id: NodeId, mut buf: Vec<u8>) -> Result<(), IndexError> {
        // Pad to the uniform slot so any record can be read at full slot size.
        buf.resize(self.record_size(), 0);
        let offset = self.offset_of(id);
        self.store.write(offset, &buf)?;
        tracing::trace!("Saved node {} at offset {}", id, offset);
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), IndexError> {
        let header = IndexHeader {
            index_id: self.id,
            label: self.label.clone(),
            fanout: self.fanout as u32,
            height: self.height,
            root: self.root.unwrap_or(NO_NODE),
            next_id: self.next_id,
            branch_count: self.branch_count,
            leaf_count: self.leaf_count,
        };
        self.store.write(0, &header.to_bytes())?;
        Ok(())
    }

    // ========== Search ==========

    /// Look up the value stored under `key`.
    ///
    /// Returns `None` when the key is absent. If the key was inserted several
    /// times, one of its values is returned; use [`Index::search_all`] for all.
    pub fn search(&self, key: &str) -> Result<Option<String>, IndexError> {
        let Some(leaf) = self.find_leaf(key, Bound::Upper)? else {
            return Ok(None);
        };
        Ok(leaf.get(key).map(str::to_string))
    }

    /// Same as [`Index::search`].
    pub fn get(&self, key: &str) -> Result<Option<String>, IndexError> {
        self.search(key)
    }

    /// Check whether `key` is present.
    pub fn contains(&self, key: &str) -> Result<bool, IndexError> {
        Ok(self.search(key)?.is_some())
    }

    /// Every value stored under `key`, in insertion order.
    pub fn search_all(&self, key: &str) -> Result<Vec<String>, IndexError> {
        let mut values = Vec::new();
        let mut cursor = self.iter_from(key)?;
        while let Some((k, v)) = cursor.next_entry()? {
            if k != key {
                break;
            }
            values.push(v);
        }
        Ok(values)
    }

    /// Descend from the root to the leaf responsible for `key`.
    fn find_leaf(&self, key: &str, bound: Bound) -> Result<Option<LeafNode>, IndexError> {
        let Some(mut id) = self.root else {
            return Ok(None);
        };

        loop {
            match self.load_node(id)? {
                Node::Leaf(leaf) => return Ok(Some(leaf)),
                Node::Branch(branch) => {
                    let slot = match bound {
                        Bound::Upper => branch.find_child_index(key),
                        Bound::Lower => lower_bound(&branch.keys, key),
                    };
                    id = child_at(&branch, slot)?;
                }
            }
        }
    }

    /// Descend along the first or last child of every branch.
    fn edge_leaf(&self, last: bool) -> Result<Option<LeafNode>, IndexError> {
        let Some(mut id) = self.root else {
            return Ok(None);
        };

        loop {
            match self.load_node(id)? {
                Node::Leaf(leaf) => return Ok(Some(leaf)),
                Node::Branch(branch) => {
                    let slot = if last { branch.keys.len() } else { 0 };
                    id = child_at(&branch, slot)?;
                }
            }
        }
    }

    // ========== Insert ==========

    /// Insert a key-value pair.
    ///
    /// Keys may repeat: each insert adds a new entry to the right of any
    /// entries with an equal key, nothing is overwritten.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), IndexError> {
        codec::check_key(key)?;
        codec::check_value(value)?;

        let root_id = if let Some(id) = self.root {
            id
        } else {
            let leaf = self.create_leaf();
            self.save_leaf(&leaf)?;
            self.root = Some(leaf.id);
            self.height = 1;
            leaf.id
        };

        let mut node = self.load_node(root_id)?;

        if node.is_full(self.fanout) {
            // Grow a new level so the descent always starts from a non-full node.
            let mut new_root = self.create_branch();
            new_root.children.push(root_id);
            match node {
                Node::Leaf(mut old_root) => {
                    self.split_leaf(&mut new_root, &mut old_root)?;
                }
                Node::Branch(mut old_root) => {
                    self.split_branch(&mut new_root, &mut old_root)?;
                }
            }
            self.root = Some(new_root.id);
            self.height += 1;
            tracing::debug!(
                "Grew root {} -> {} (height {})",
                root_id,
                new_root.id,
                self.height
            );
            node = Node::Branch(new_root);
        }

        loop {
            match node {
                Node::Leaf(mut leaf) => {
                    leaf.insert(key.to_string(), value.to_string());
                    self.save_leaf(&leaf)?;
                    break;
                }
                Node::Branch(mut branch) => {
                    let slot = branch.find_child_index(key);
                    let child = self.load_node(child_at(&branch, slot)?)?;

                    node = if child.is_full(self.fanout) {
                        let goes_right = |parent: &BranchNode| key >= parent.keys[slot].as_str();
                        match child {
                            Node::Leaf(mut left) => {
                                let right = self.split_leaf(&mut branch, &mut left)?;
                                Node::Leaf(if goes_right(&branch) { right } else { left })
                            }
                            Node::Branch(mut left) => {
                                let right = self.split_branch(&mut branch, &mut left)?;
                                Node::Branch(if goes_right(&branch) { right } else { left })
                            }
                        }
                    } else {
                        child
                    };
                }
            }
        }

        self.write_header()
    }

    /// Insert every pair from `pairs`, returning how many were inserted.
    pub fn extend<I, K, V>(&mut self, pairs: I) -> Result<usize, IndexError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut count = 0;
        for (key, value) in pairs {
            self.insert(key.as_ref(), value.as_ref())?;
            count += 1;
        }
        Ok(count)
    }

    /// Position of `child` within `parent`, checking the split preconditions.
    fn split_position(&self, parent: &BranchNode, child: NodeId, child_full: bool) -> usize {
        assert!(
            !parent.is_full(self.fanout),
            "split into full parent {}",
            parent.id
        );
        assert!(child_full, "split of non-full node {child}");
        parent
            .child_position(child)
            .unwrap_or_else(|| panic!("node {child} is not a child of {}", parent.id))
    }

    /// Split a full branch `child` of `parent`, returning the new right sibling.
    ///
    /// The median key of `child` moves up into `parent`; the sibling is linked
    /// immediately to its right. All three nodes are persisted.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is full, `child` is not full, or `child` is not a
    /// child of `parent`.
    pub fn split_branch(
        &mut self,
        parent: &mut BranchNode,
        child: &mut BranchNode,
    ) -> Result<BranchNode, IndexError> {
        let position = self.split_position(parent, child.id, child.is_full(self.fanout));

        let mut sibling = self.create_branch();
        let median = child.split_into(&mut sibling);
        parent.insert_separator(position, median, sibling.id);

        self.save_branch(&sibling)?;
        self.save_branch(child)?;
        self.save_branch(parent)?;

        tracing::debug!(
            "Split branch {} -> {} under {}",
            child.id,
            sibling.id,
            parent.id
        );

        Ok(sibling)
    }

    /// Split a full leaf `child` of `parent`, returning the new right sibling.
    ///
    /// The sibling keeps the median entry; a copy of its key becomes the
    /// separator in `parent`. The sibling is spliced into the leaf chain
    /// between `child` and its old successor. All touched nodes are persisted.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is full, `child` is not full, or `child` is not a
    /// child of `parent`.
    pub fn split_leaf(
        &mut self,
        parent: &mut BranchNode,
        child: &mut LeafNode,
    ) -> Result<LeafNode, IndexError> {
        let position = self.split_position(parent, child.id, child.is_full(self.fanout));

        let mut sibling = self.create_leaf();
        child.split_into(&mut sibling);
        let separator = sibling.entries[0].key.clone();
        parent.insert_separator(position, separator, sibling.id);

        if sibling.next != NO_NODE {
            let mut successor = self.load_leaf(sibling.next)?;
            successor.prev = sibling.id;
            self.save_leaf(&successor)?;
        }

        self.save_leaf(&sibling)?;
        self.save_leaf(child)?;
        self.save_branch(parent)?;

        tracing::debug!(
            "Split leaf {} -> {} under {}",
            child.id,
            sibling.id,
            parent.id
        );

        Ok(sibling)
    }

    // ========== Scans ==========

    /// Cursor over all entries in ascending key order.
    pub fn cursor(&self) -> Result<Cursor<'_, S>, IndexError> {
        let leaf = self.edge_leaf(false)?;
        Ok(Cursor {
            index: self,
            leaf,
            position: 0,
            direction: Direction::Forward,
        })
    }

    /// Cursor over all entries in descending key order.
    pub fn cursor_rev(&self) -> Result<Cursor<'_, S>, IndexError> {
        let leaf = self.edge_leaf(true)?;
        let position = leaf.as_ref().map_or(0, LeafNode::occupancy);
        Ok(Cursor {
            index: self,
            leaf,
            position,
            direction: Direction::Backward,
        })
    }

    /// Ascending cursor starting at the first entry with a key `>= start`.
    pub fn iter_from(&self, start: &str) -> Result<Cursor<'_, S>, IndexError> {
        let leaf = self.find_leaf(start, Bound::Lower)?;
        let position = leaf.as_ref().map_or(0, |l| l.lower_bound(start));
        Ok(Cursor {
            index: self,
            leaf,
            position,
            direction: Direction::Forward,
        })
    }

    /// Entries with keys in `[start, end)`, in ascending order.
    pub fn range(&self, start: &str, end: &str) -> Result<Vec<(String, String)>, IndexError> {
        let mut entries = Vec::new();
        let mut cursor = self.iter_from(start)?;
        while let Some((key, value)) = cursor.next_entry()? {
            if key.as_str() >= end {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Count the entries by walking the leaf chain.
    pub fn len(&self) -> Result<usize, IndexError> {
        let mut count = 0;
        let mut current = self.edge_leaf(false)?;
        while let Some(leaf) = current {
            count += leaf.occupancy();
            current = if leaf.next == NO_NODE {
                None
            } else {
                Some(self.load_leaf(leaf.next)?)
            };
        }
        Ok(count)
    }

    /// Whether the index holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    // ========== Verification ==========

    /// Walk the whole tree and report every structural invariant that does
    /// not hold. An empty result means the tree is well formed.
    pub fn check_invariants(&self) -> Result<Vec<InvariantViolation>, IndexError> {
        let mut walk = Walk::default();
        if let Some(root) = self.root {
            self.walk(root, 1, None, None, &mut walk)?;
        } else if self.height != 0 {
            walk.violations.push(InvariantViolation::UnevenDepth {
                leaf: NO_NODE,
                depth: 0,
                height: self.height,
            });
        }

        let Walk {
            mut violations,
            leaves,
            branches,
        } = walk;

        for (i, leaf) in leaves.iter().enumerate() {
            let expected_prev = if i == 0 { NO_NODE } else { leaves[i - 1].0 };
            let expected_next = leaves.get(i + 1).map_or(NO_NODE, |l| l.0);
            if leaf.1 != expected_prev || leaf.2 != expected_next {
                violations.push(InvariantViolation::BrokenChain {
                    leaf: leaf.0,
                    prev: leaf.1,
                    next: leaf.2,
                });
            }
        }

        // Each leaf's last key must not exceed the next leaf's first key.
        let mut previous_max: Option<&str> = None;
        for leaf in &leaves {
            if let (Some(max), Some(min)) = (previous_max, leaf.3.as_deref()) {
                if max > min {
                    violations.push(InvariantViolation::ChainOutOfOrder { leaf: leaf.0 });
                }
            }
            if leaf.4.is_some() {
                previous_max = leaf.4.as_deref();
            }
        }

        if branches != self.branch_count {
            violations.push(InvariantViolation::CountMismatch {
                kind: "branch",
                counted: branches,
                recorded: self.branch_count,
            });
        }
        let leaf_total = leaves.len() as u32;
        if leaf_total != self.leaf_count {
            violations.push(InvariantViolation::CountMismatch {
                kind: "leaf",
                counted: leaf_total,
                recorded: self.leaf_count,
            });
        }

        Ok(violations)
    }

    fn walk(
        &self,
        id: NodeId,
        depth: u32,
        low: Option<&str>,
        high: Option<&str>,
        walk: &mut Walk,
    ) -> Result<(), IndexError> {
        let node = self.load_node(id)?;
        let keys: Vec<&str> = match &node {
            Node::Branch(b) => b.keys.iter().map(String::as_str).collect(),
            Node::Leaf(l) => l.keys().collect(),
        };

        if keys.len() > self.fanout {
            walk.violations.push(InvariantViolation::Overfull { node: id });
        }
        if keys.windows(2).any(|w| w[0] > w[1]) {
            walk.violations.push(InvariantViolation::UnsortedKeys { node: id });
        }
        for key in &keys {
            if low.is_some_and(|l| *key < l) || high.is_some_and(|h| *key > h) {
                walk.violations.push(InvariantViolation::KeyOutOfBounds {
                    node: id,
                    key: (*key).to_string(),
                });
            }
        }

        match &node {
            Node::Leaf(leaf) => {
                if depth != self.height {
                    walk.violations.push(InvariantViolation::UnevenDepth {
                        leaf: id,
                        depth,
                        height: self.height,
                    });
                }
                walk.leaves.push((
                    id,
                    leaf.prev,
                    leaf.next,
                    leaf.entries.first().map(|e| e.key.clone()),
                    leaf.entries.last().map(|e| e.key.clone()),
                ));
            }
            Node::Branch(branch) => {
                walk.branches += 1;
                if branch.children.len() != branch.keys.len() + 1 {
                    walk.violations.push(InvariantViolation::ChildCountMismatch {
                        node: id,
                        keys: branch.keys.len(),
                        children: branch.children.len(),
                    });
                    return Ok(());
                }
                for (i, &child) in branch.children.iter().enumerate() {
                    let child_low = if i == 0 { low } else { Some(keys[i - 1]) };
                    let child_high = if i == keys.len() { high } else { Some(keys[i]) };
                    self.walk(child, depth + 1, child_low, child_high, walk)?;
                }
            }
        }

        Ok(())
    }
}

/// Store offset of the record for node `id` in an index with `fanout`.
#[must_use]
pub const fn offset_of(id: NodeId, fanout: usize) -> u64 {
    GLOBAL_HEADER_SIZE as u64 + id as u64 * codec::record_size(fanout) as u64
}

fn child_at(branch: &BranchNode, slot: usize) -> Result<NodeId, IndexError> {
    branch.children.get(slot).copied().ok_or_else(|| {
        IndexError::Codec(CodecError::CorruptRecord(format!(
            "branch {} has no child in slot {slot}",
            branch.id
        )))
    })
}

/// Which bound a descent follows at branch nodes.
#[derive(Debug, Clone, Copy)]
enum Bound {
    /// First key strictly greater: where a key is inserted or found.
    Upper,
    /// First key greater or equal: where a scan from a key starts.
    Lower,
}

/// Accumulated state of an invariant walk.
#[derive(Default)]
struct Walk {
    violations: Vec<InvariantViolation>,
    /// (id, prev, next, first key, last key) in tree order.
    leaves: Vec<(NodeId, NodeId, NodeId, Option<String>, Option<String>)>,
    branches: u32,
}

/// A structural invariant that does not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Keys within a node are not in ascending order.
    UnsortedKeys { node: NodeId },
    /// A key lies outside the separator bounds of its subtree.
    KeyOutOfBounds { node: NodeId, key: String },
    /// Node holds more keys than the fanout.
    Overfull { node: NodeId },
    /// Branch does not hold exactly one more child than keys.
    ChildCountMismatch {
        node: NodeId,
        keys: usize,
        children: usize,
    },
    /// Leaf is not at the depth given by the index height.
    UnevenDepth { leaf: NodeId, depth: u32, height: u32 },
    /// Leaf sibling links disagree with the tree order.
    BrokenChain {
        leaf: NodeId,
        prev: NodeId,
        next: NodeId,
    },
    /// Leaf starts with a key smaller than its predecessor's last key.
    ChainOutOfOrder { leaf: NodeId },
    /// Reachable node count differs from the recorded counter.
    CountMismatch {
        kind: &'static str,
        counted: u32,
        recorded: u32,
    },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsortedKeys { node } => write!(f, "node {node}: keys out of order"),
            Self::KeyOutOfBounds { node, key } => {
                write!(f, "node {node}: key '{key}' outside separator bounds")
            }
            Self::Overfull { node } => write!(f, "node {node}: more keys than fanout"),
            Self::ChildCountMismatch {
                node,
                keys,
                children,
            } => write!(f, "branch {node}: {children} children for {keys} keys"),
            Self::UnevenDepth {
                leaf,
                depth,
                height,
            } => write!(f, "leaf {leaf}: depth {depth} but height {height}"),
            Self::BrokenChain { leaf, prev, next } => {
                write!(f, "leaf {leaf}: bad sibling links (prev {prev}, next {next})")
            }
            Self::ChainOutOfOrder { leaf } => {
                write!(f, "leaf {leaf}: first key below previous leaf's last key")
            }
            Self::CountMismatch {
                kind,
                counted,
                recorded,
            } => write!(f, "{kind} count: {counted} reachable, {recorded} recorded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Cursor over index entries, following the leaf chain.
pub struct Cursor<'a, S: ByteStore> {
    index: &'a Index<S>,
    leaf: Option<LeafNode>,
    /// Forward: next slot to yield. Backward: one past the next slot to yield.
    position: usize,
    direction: Direction,
}

impl<S: ByteStore> Cursor<'_, S> {
    /// Get the next entry.
    pub fn next_entry(&mut self) -> Result<Option<(String, String)>, IndexError> {
        loop {
            let Some(leaf) = self.leaf.as_ref() else {
                return Ok(None);
            };

            match self.direction {
                Direction::Forward => {
                    if let Some(entry) = leaf.entries.get(self.position) {
                        self.position += 1;
                        return Ok(Some((entry.key.clone(), entry.value.clone())));
                    }
                    let next = leaf.next;
                    self.leaf = if next == NO_NODE {
                        None
                    } else {
                        Some(self.index.load_leaf(next)?)
                    };
                    self.position = 0;
                }
                Direction::Backward => {
                    if self.position > 0 {
                        self.position -= 1;
                        let entry = &leaf.entries[self.position];
                        return Ok(Some((entry.key.clone(), entry.value.clone())));
                    }
                    let prev = leaf.prev;
                    self.leaf = if prev == NO_NODE {
                        None
                    } else {
                        Some(self.index.load_leaf(prev)?)
                    };
                    self.position = self.leaf.as_ref().map_or(0, LeafNode::occupancy);
                }
            }
        }
    }
}

impl<S: ByteStore> Iterator for Cursor<'_, S> {
    type Item = Result<(String, String), IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.leaf = None;
                Some(Err(e))
            }
        }
    }
}

/// Errors that can occur during index operations.
#[derive(Debug)]
pub enum IndexError {
    /// Byte store error.
    Store(StoreError),
    /// Record encoding or decoding error.
    Codec(CodecError),
    /// Global header error.
    Header(HeaderError),
    /// Fanout outside `2..=MAX_FANOUT`.
    InvalidFanout(usize),
    /// A lock guarding a shared index was poisoned.
    LockPoisoned,
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Header(e) => write!(f, "header error: {e}"),
            Self::InvalidFanout(fanout) => {
                write!(f, "invalid fanout {fanout} (must be 2..={MAX_FANOUT})")
            }
            Self::LockPoisoned => write!(f, "index lock poisoned"),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Header(e) => Some(e),
            Self::InvalidFanout(_) | Self::LockPoisoned => None,
        }
    }
}

impl From<StoreError> for IndexError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<CodecError> for IndexError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<HeaderError> for IndexError {
    fn from(e: HeaderError) -> Self {
        Self::Header(e)
    }
}
