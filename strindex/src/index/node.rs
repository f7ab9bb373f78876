//! Index node types.
//!
//! The index has two node shapes:
//! - Branch nodes: store separator keys and child node ids
//! - Leaf nodes: store key-value pairs, doubly-linked for range scans
//!
//! Nodes reference each other by [`NodeId`], never by pointer. A node's id is
//! also its address: the manager maps ids to fixed offsets in the byte store.

/// Node identifier. Id 0 is reserved as the "no node" sentinel.
pub type NodeId = u32;

/// Sentinel id for a missing sibling link.
pub const NO_NODE: NodeId = 0;

/// Index of the first key strictly greater than `key`.
///
/// Used both to pick the child to descend into and to find the insertion
/// slot for a key, which places duplicates to the right of equal keys.
#[must_use]
pub fn upper_bound<K: AsRef<str>>(keys: &[K], key: &str) -> usize {
    keys.partition_point(|k| k.as_ref() <= key)
}

/// Index of the first key greater than or equal to `key`.
#[must_use]
pub fn lower_bound<K: AsRef<str>>(keys: &[K], key: &str) -> usize {
    keys.partition_point(|k| k.as_ref() < key)
}

/// A branch (interior) node.
///
/// Stores N keys and N+1 child ids.
/// `children[i]` holds keys in `[keys[i-1], keys[i])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNode {
    pub id: NodeId,
    /// Keys in sorted order.
    pub keys: Vec<String>,
    /// Child ids. `children.len()` == `keys.len()` + 1 once the node is linked.
    pub children: Vec<NodeId>,
}

impl BranchNode {
    /// Create a new empty branch node.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::new() is not const-stable
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Number of occupied key slots.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn occupancy(&self) -> usize {
        self.keys.len()
    }

    /// Check if the node holds `fanout` keys.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_full(&self, fanout: usize) -> bool {
        self.keys.len() >= fanout
    }

    /// Find the child slot for a given key.
    #[must_use]
    pub fn find_child_index(&self, key: &str) -> usize {
        upper_bound(&self.keys, key)
    }

    /// Position of a child id within this node.
    #[must_use]
    pub fn child_position(&self, child: NodeId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Split a full node, moving its upper half into the empty `right` node.
    ///
    /// Keys after the median and their children move to `right`. The median
    /// itself leaves both halves and is returned for the caller to promote
    /// into the parent.
    pub fn split_into(&mut self, right: &mut Self) -> String {
        debug_assert!(right.keys.is_empty() && right.children.is_empty());
        let mid = self.keys.len() / 2;

        right.keys = self.keys.drain(mid + 1..).collect();
        right.children = self.children.drain(mid + 1..).collect();

        self.keys
            .pop()
            .unwrap_or_else(|| unreachable!("split of an empty branch"))
    }

    /// Link a split-off sibling: `key` goes to `position`, `sibling` right after it.
    pub fn insert_separator(&mut self, position: usize, key: String, sibling: NodeId) {
        self.keys.insert(position, key);
        self.children.insert(position + 1, sibling);
    }
}

/// A key-value entry in a leaf node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: String,
    pub value: String,
}

/// A leaf node.
///
/// Stores key-value pairs in key order and links to sibling leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub id: NodeId,
    /// Entries in sorted order by key.
    pub entries: Vec<LeafEntry>,
    /// Previous leaf in key order, [`NO_NODE`] if none.
    pub prev: NodeId,
    /// Next leaf in key order, [`NO_NODE`] if none.
    pub next: NodeId,
}

impl LeafNode {
    /// Create a new empty, unlinked leaf node.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::new() is not const-stable
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            entries: Vec::new(),
            prev: NO_NODE,
            next: NO_NODE,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn occupancy(&self) -> usize {
        self.entries.len()
    }

    /// Check if the node holds `fanout` entries.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_full(&self, fanout: usize) -> bool {
        self.entries.len() >= fanout
    }

    /// Iterate over the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Index of the first entry with a key strictly greater than `key`.
    #[must_use]
    pub fn upper_bound(&self, key: &str) -> usize {
        self.entries.partition_point(|e| e.key.as_str() <= key)
    }

    /// Index of the first entry with a key greater than or equal to `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &str) -> usize {
        self.entries.partition_point(|e| e.key.as_str() < key)
    }

    /// Get the value of the first entry stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let i = self.lower_bound(key);
        self.entries
            .get(i)
            .filter(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Insert an entry after any entries with an equal key.
    ///
    /// Returns the slot the entry landed in.
    pub fn insert(&mut self, key: String, value: String) -> usize {
        let i = self.upper_bound(&key);
        self.entries.insert(i, LeafEntry { key, value });
        i
    }

    /// Split a full node, moving its upper half into the empty `right` node.
    ///
    /// `right` takes the entries from the median onwards, so its first key
    /// doubles as the separator. `right` is linked between `self` and its old
    /// next sibling; the old next sibling's `prev` is left to the caller.
    pub fn split_into(&mut self, right: &mut Self) {
        debug_assert!(right.entries.is_empty());
        let mid = self.entries.len() / 2;

        right.entries = self.entries.drain(mid..).collect();
        right.prev = self.id;
        right.next = self.next;
        self.next = right.id;
    }
}

/// Either node shape, as loaded from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Branch(BranchNode),
    Leaf(LeafNode),
}

impl Node {
    /// Id of the node.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        match self {
            Self::Branch(b) => b.id,
            Self::Leaf(l) => l.id,
        }
    }

    /// Number of occupied key slots.
    #[must_use]
    pub fn occupancy(&self) -> usize {
        match self {
            Self::Branch(b) => b.occupancy(),
            Self::Leaf(l) => l.occupancy(),
        }
    }

    /// Check if the node holds `fanout` keys.
    #[must_use]
    pub fn is_full(&self, fanout: usize) -> bool {
        self.occupancy() >= fanout
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn leaf_with(id: NodeId, keys: &[&str]) -> LeafNode {
        let mut leaf = LeafNode::new(id);
        for k in keys {
            leaf.insert((*k).to_string(), format!("v{k}"));
        }
        leaf
    }

    #[test]
    fn test_upper_bound_positions() {
        let keys = ["b", "d", "d", "f"];

        assert_eq!(upper_bound(&keys, "a"), 0);
        assert_eq!(upper_bound(&keys, "b"), 1);
        assert_eq!(upper_bound(&keys, "c"), 1);
        assert_eq!(upper_bound(&keys, "d"), 3);
        assert_eq!(upper_bound(&keys, "f"), 4);
        // Greater than all present keys -> occupancy
        assert_eq!(upper_bound(&keys, "z"), keys.len());
        assert_eq!(upper_bound::<&str>(&[], "a"), 0);
    }

    #[test]
    fn test_lower_bound_positions() {
        let keys = ["b", "d", "d", "f"];

        assert_eq!(lower_bound(&keys, "a"), 0);
        assert_eq!(lower_bound(&keys, "d"), 1);
        assert_eq!(lower_bound(&keys, "e"), 3);
        assert_eq!(lower_bound(&keys, "z"), 4);
    }

    #[test]
    fn test_upper_bound_is_monotonic() {
        let keys = ["Key1", "Key2", "Key2", "Key5", "one", "z"];
        let queries = ["", "A", "Key1", "Key10", "Key2", "Key3", "Key5", "a", "one", "z", "zz"];

        let positions: Vec<usize> = queries.iter().map(|q| upper_bound(&keys, q)).collect();
        assert!(positions.windows(2).all(|w| w[0] <= w[1]), "{positions:?}");
        assert_eq!(*positions.last().expect("non-empty"), keys.len());
    }

    #[test]
    fn test_bounds_on_random_sorted_keys() {
        let mut rng = StdRng::seed_from_u64(7);
        let alphabet = ['A', 'a', 'b', 'k', 'z', '0'];
        let random_key = |rng: &mut StdRng| -> String {
            let len = rng.random_range(0..4);
            (0..len)
                .map(|_| alphabet[rng.random_range(0..alphabet.len())])
                .collect()
        };

        for _ in 0..200 {
            let len = rng.random_range(0..12);
            let mut keys: Vec<String> = (0..len).map(|_| random_key(&mut rng)).collect();
            keys.sort();

            let mut queries: Vec<String> = (0..20).map(|_| random_key(&mut rng)).collect();
            queries.sort();

            let mut previous = 0;
            for query in &queries {
                let upper = upper_bound(&keys, query);
                let lower = lower_bound(&keys, query);

                assert!(upper >= previous, "upper bound went backwards for {query:?}");
                assert!(lower <= upper);
                assert!(keys[..lower].iter().all(|k| k.as_str() < query.as_str()));
                assert!(keys[lower..upper].iter().all(|k| k == query));
                assert!(keys[upper..].iter().all(|k| k.as_str() > query.as_str()));
                previous = upper;
            }
        }
    }

    #[test]
    fn test_comparison_is_case_sensitive_bytewise() {
        // Uppercase sorts before lowercase.
        let keys = ["B", "a"];
        assert_eq!(upper_bound(&keys, "Z"), 1);
        assert_eq!(upper_bound(&keys, "b"), 2);
    }

    #[test]
    fn test_leaf_insert_sorted_and_right_biased() {
        let mut leaf = LeafNode::new(1);
        assert_eq!(leaf.insert("b".to_string(), "1".to_string()), 0);
        assert_eq!(leaf.insert("a".to_string(), "2".to_string()), 0);
        assert_eq!(leaf.insert("b".to_string(), "3".to_string()), 2);
        assert_eq!(leaf.insert("c".to_string(), "4".to_string()), 3);

        let keys: Vec<&str> = leaf.keys().collect();
        assert_eq!(keys, vec!["a", "b", "b", "c"]);
        // Duplicate landed to the right of the existing equal key.
        assert_eq!(leaf.entries[1].value, "1");
        assert_eq!(leaf.entries[2].value, "3");
    }

    #[test]
    fn test_leaf_get() {
        let leaf = leaf_with(1, &["a", "c", "e"]);

        assert_eq!(leaf.get("c"), Some("vc"));
        assert_eq!(leaf.get("b"), None);
        assert_eq!(leaf.get("z"), None);
    }

    #[test]
    fn test_leaf_split_keeps_median_in_right() {
        let mut leaf = leaf_with(1, &["a", "b", "c", "d", "e"]);
        leaf.next = 9;

        let mut right = LeafNode::new(7);
        leaf.split_into(&mut right);

        let left_keys: Vec<&str> = leaf.keys().collect();
        let right_keys: Vec<&str> = right.keys().collect();
        assert_eq!(left_keys, vec!["a", "b"]);
        assert_eq!(right_keys, vec!["c", "d", "e"]);
        assert_eq!(leaf.occupancy() + right.occupancy(), 5);
        assert_eq!(right.prev, 1);
        assert_eq!(right.next, 9);
        assert_eq!(leaf.next, 7);
    }

    #[test]
    fn test_branch_split_promotes_median() {
        let mut node = BranchNode::new(1);
        node.keys = vec!["b".into(), "d".into(), "f".into()];
        node.children = vec![10, 20, 30, 40];

        let mut right = BranchNode::new(2);
        let median = node.split_into(&mut right);

        assert_eq!(median, "d");
        assert_eq!(node.keys, vec!["b".to_string()]);
        assert_eq!(node.children, vec![10, 20]);
        assert_eq!(right.keys, vec!["f".to_string()]);
        assert_eq!(right.children, vec![30, 40]);
        assert_eq!(node.occupancy() + right.occupancy() + 1, 3);
    }

    #[test]
    fn test_branch_split_even_fanout() {
        let mut node = BranchNode::new(1);
        node.keys = vec!["b".into(), "d".into(), "f".into(), "h".into()];
        node.children = vec![10, 20, 30, 40, 50];

        let mut right = BranchNode::new(2);
        let median = node.split_into(&mut right);

        assert_eq!(median, "f");
        assert_eq!(node.children.len(), node.keys.len() + 1);
        assert_eq!(right.children.len(), right.keys.len() + 1);
        assert_eq!(right.children, vec![40, 50]);
    }

    #[test]
    fn test_branch_find_child() {
        let mut node = BranchNode::new(1);
        node.keys = vec!["10".into(), "20".into(), "30".into()];
        node.children = vec![100, 200, 300, 400];

        // Key less than first key -> first child
        assert_eq!(node.find_child_index("05"), 0);
        // Key equal to first key -> second child
        assert_eq!(node.find_child_index("10"), 1);
        // Key between first and second -> second child
        assert_eq!(node.find_child_index("15"), 1);
        // Key greater than all -> last child
        assert_eq!(node.find_child_index("35"), 3);
    }

    #[test]
    fn test_branch_insert_separator() {
        let mut node = BranchNode::new(1);
        node.keys = vec!["m".into()];
        node.children = vec![10, 20];

        node.insert_separator(0, "f".into(), 15);

        assert_eq!(node.keys, vec!["f".to_string(), "m".to_string()]);
        assert_eq!(node.children, vec![10, 15, 20]);
        assert_eq!(node.child_position(20), Some(2));
        assert_eq!(node.child_position(99), None);
    }

    #[test]
    fn test_node_fullness() {
        let leaf = Node::Leaf(leaf_with(3, &["a", "b", "c"]));
        assert!(leaf.is_full(3));
        assert!(!leaf.is_full(4));
        assert!(matches!(leaf, Node::Leaf(_)));
        assert_eq!(leaf.id(), 3);

        let branch = Node::Branch(BranchNode::new(4));
        assert!(!branch.is_full(2));
        assert!(matches!(branch, Node::Branch(_)));
    }
}
