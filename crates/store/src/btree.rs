//! Copy-on-write B+ tree holding one table's committed entries.
//!
//! Nodes are reference counted. Cloning a tree copies only its root pointer,
//! and a mutation copies just the nodes on the root-to-leaf path that are
//! still shared with another tree. Every snapshot a commit publishes therefore
//! shares all untouched nodes with its predecessor, and a commit costs
//! `O(changes * log n)` node copies regardless of table size.
//!
//! ```text
//!   snapshot N                     snapshot N+1 (one key changed)
//!      [R]                              [R']
//!     /   \                            /    \
//!   [B1]  [B2]   <- shared ---------- [B1]  [B2']
//!   / \    / \                              /  \
//!  L1 L2  L3 L4  <- shared ---------------- L3  L4'
//! ```
//!
//! ## Splitting
//!
//! A leaf that grows past [`MAX_LEAF_ENTRIES`] splits in half and promotes the
//! first key of its right half as a separator. A branch that grows past
//! [`MAX_BRANCH_CHILDREN`] splits around its median separator, which moves up
//! rather than being copied.
//!
//! ## Deletion
//!
//! Deletion is non-rebalancing: a leaf may become underfull, and only empty
//! nodes are unlinked from their parent. A root branch left with a single
//! child is collapsed so lookups never walk a chain of one-child branches.

use std::{ops::Bound, sync::Arc};

use crate::db::Slot;

/// Entries a leaf holds before it splits.
pub(crate) const MAX_LEAF_ENTRIES: usize = 64;

/// Children a branch holds before it splits.
pub(crate) const MAX_BRANCH_CHILDREN: usize = 64;

type Entry = (Vec<u8>, Slot);

#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<Entry>),
    Branch(Branch),
}

/// Interior node. `separators[i]` is the smallest key reachable through
/// `children[i + 1]`, so there is always one separator fewer than children.
#[derive(Debug, Clone)]
struct Branch {
    separators: Vec<Vec<u8>>,
    children: Vec<Arc<Node>>,
}

impl Branch {
    /// Index of the child whose key range contains `key`.
    fn route(&self, key: &[u8]) -> usize {
        self.separators.partition_point(|separator| separator.as_slice() <= key)
    }

    /// Index of the child where a walk starting at `bound` begins.
    fn route_bound(&self, bound: Bound<&[u8]>, forward: bool) -> usize {
        match bound {
            Bound::Included(key) | Bound::Excluded(key) => self.route(key),
            Bound::Unbounded if forward => 0,
            Bound::Unbounded => self.children.len().saturating_sub(1),
        }
    }
}

impl Node {
    fn is_empty(&self) -> bool {
        match self {
            Node::Leaf(entries) => entries.is_empty(),
            Node::Branch(branch) => branch.children.is_empty(),
        }
    }
}

/// Result of an insert that overflowed a node: the separator to promote and
/// the new right sibling.
type Split = (Vec<u8>, Arc<Node>);

/// Ordered map from byte keys to [`Slot`]s with structural sharing.
#[derive(Debug, Clone, Default)]
pub(crate) struct BTree {
    root: Option<Arc<Node>>,
    len: usize,
}

impl BTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns the slot stored under `key`.
    pub(crate) fn get(&self, key: &[u8]) -> Option<&Slot> {
        let mut node = self.root.as_deref()?;
        loop {
            match node {
                Node::Branch(branch) => node = branch.children[branch.route(key)].as_ref(),
                Node::Leaf(entries) => {
                    let index = entries.binary_search_by(|(k, _)| k.as_slice().cmp(key)).ok()?;
                    return Some(&entries[index].1);
                },
            }
        }
    }

    /// Whether `key` is present.
    pub(crate) fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Stores `slot` under `key`, returning the slot it replaced.
    pub(crate) fn insert(&mut self, key: Vec<u8>, slot: Slot) -> Option<Slot> {
        let Some(root) = self.root.as_mut() else {
            self.root = Some(Arc::new(Node::Leaf(vec![(key, slot)])));
            self.len = 1;
            return None;
        };

        let (replaced, split) = insert_into(root, key, slot);
        if let Some((separator, right)) = split {
            let left = Arc::clone(root);
            *root = Arc::new(Node::Branch(Branch {
                separators: vec![separator],
                children: vec![left, right],
            }));
        }
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    /// Removes `key`, returning the slot it held.
    pub(crate) fn remove(&mut self, key: &[u8]) -> Option<Slot> {
        // Bail out before `make_mut` copies a path for a key that isn't there.
        if !self.contains_key(key) {
            return None;
        }
        let root = self.root.as_mut()?;
        let removed = remove_from(root, key);
        if removed.is_some() {
            self.len -= 1;
        }

        while let Some(root) = &self.root {
            let collapsed = match root.as_ref() {
                node if node.is_empty() => None,
                Node::Branch(branch) if branch.children.len() == 1 => {
                    Some(Arc::clone(&branch.children[0]))
                },
                _ => break,
            };
            self.root = collapsed;
        }
        removed
    }

    /// Entries whose key lies within `start..`, in ascending key order.
    pub(crate) fn range_from<'a>(&'a self, start: Bound<&[u8]>) -> Ascending<'a> {
        let mut iter = Ascending { stack: Vec::new(), entries: &[], position: 0 };
        let Some(mut node) = self.root.as_deref() else {
            return iter;
        };
        loop {
            match node {
                Node::Branch(branch) => {
                    let index = branch.route_bound(start, true);
                    iter.stack.push((branch.children.as_slice(), index));
                    node = branch.children[index].as_ref();
                },
                Node::Leaf(entries) => {
                    iter.entries = entries;
                    iter.position = match start {
                        Bound::Included(key) => {
                            entries.partition_point(|(k, _)| k.as_slice() < key)
                        },
                        Bound::Excluded(key) => {
                            entries.partition_point(|(k, _)| k.as_slice() <= key)
                        },
                        Bound::Unbounded => 0,
                    };
                    return iter;
                },
            }
        }
    }

    /// Entries whose key lies within `..end`, in descending key order.
    pub(crate) fn range_to<'a>(&'a self, end: Bound<&[u8]>) -> Descending<'a> {
        let mut iter = Descending { stack: Vec::new(), entries: &[], remaining: 0 };
        let Some(mut node) = self.root.as_deref() else {
            return iter;
        };
        loop {
            match node {
                Node::Branch(branch) => {
                    let index = branch.route_bound(end, false);
                    iter.stack.push((branch.children.as_slice(), index));
                    node = branch.children[index].as_ref();
                },
                Node::Leaf(entries) => {
                    iter.entries = entries;
                    iter.remaining = match end {
                        Bound::Included(key) => {
                            entries.partition_point(|(k, _)| k.as_slice() <= key)
                        },
                        Bound::Excluded(key) => {
                            entries.partition_point(|(k, _)| k.as_slice() < key)
                        },
                        Bound::Unbounded => entries.len(),
                    };
                    return iter;
                },
            }
        }
    }

    /// Number of levels from the root to the leaves (0 when empty).
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self.root.as_deref();
        while let Some(current) = node {
            depth += 1;
            node = match current {
                Node::Branch(branch) => branch.children.first().map(Arc::as_ref),
                Node::Leaf(_) => None,
            };
        }
        depth
    }

    /// Nodes referenced by this tree alone, i.e. not shared with any other tree.
    #[cfg(test)]
    pub(crate) fn exclusive_nodes(&self) -> usize {
        fn walk(node: &Arc<Node>) -> usize {
            let own = usize::from(Arc::strong_count(node) == 1);
            match node.as_ref() {
                Node::Branch(branch) => own + branch.children.iter().map(walk).sum::<usize>(),
                Node::Leaf(_) => own,
            }
        }
        self.root.as_ref().map_or(0, walk)
    }
}

fn insert_into(node: &mut Arc<Node>, key: Vec<u8>, slot: Slot) -> (Option<Slot>, Option<Split>) {
    match Arc::make_mut(node) {
        Node::Leaf(entries) => {
            match entries.binary_search_by(|(k, _)| k.as_slice().cmp(key.as_slice())) {
                Ok(index) => (Some(std::mem::replace(&mut entries[index].1, slot)), None),
                Err(index) => {
                    entries.insert(index, (key, slot));
                    if entries.len() <= MAX_LEAF_ENTRIES {
                        return (None, None);
                    }
                    let right = entries.split_off(entries.len() / 2);
                    let separator = right[0].0.clone();
                    (None, Some((separator, Arc::new(Node::Leaf(right)))))
                },
            }
        },
        Node::Branch(branch) => {
            let index = branch.route(&key);
            let (replaced, split) = insert_into(&mut branch.children[index], key, slot);
            let Some((separator, right)) = split else {
                return (replaced, None);
            };
            branch.separators.insert(index, separator);
            branch.children.insert(index + 1, right);
            if branch.children.len() <= MAX_BRANCH_CHILDREN {
                return (replaced, None);
            }

            let mid = branch.children.len() / 2;
            let children = branch.children.split_off(mid);
            let mut separators = branch.separators.split_off(mid - 1);
            let promoted = separators.remove(0);
            let right = Arc::new(Node::Branch(Branch { separators, children }));
            (replaced, Some((promoted, right)))
        },
    }
}

fn remove_from(node: &mut Arc<Node>, key: &[u8]) -> Option<Slot> {
    match Arc::make_mut(node) {
        Node::Leaf(entries) => {
            let index = entries.binary_search_by(|(k, _)| k.as_slice().cmp(key)).ok()?;
            Some(entries.remove(index).1)
        },
        Node::Branch(branch) => {
            let index = branch.route(key);
            let removed = remove_from(&mut branch.children[index], key);
            if branch.children[index].is_empty() {
                branch.children.remove(index);
                if index > 0 {
                    branch.separators.remove(index - 1);
                } else if !branch.separators.is_empty() {
                    branch.separators.remove(0);
                }
            }
            removed
        },
    }
}

// ============================================================================
// Iteration
// ============================================================================

/// Ascending walk over a [`BTree`]. See [`BTree::range_from`].
pub(crate) struct Ascending<'a> {
    /// Branch children and the index taken at each level above the leaf.
    stack: Vec<(&'a [Arc<Node>], usize)>,
    entries: &'a [Entry],
    position: usize,
}

impl<'a> Iterator for Ascending<'a> {
    type Item = (&'a [u8], &'a Slot);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, slot)) = self.entries.get(self.position) {
                self.position += 1;
                return Some((key.as_slice(), slot));
            }

            // Climb to the nearest level with a right sibling, then take its leftmost leaf.
            let mut node = loop {
                let (children, index) = self.stack.last_mut()?;
                let children: &'a [Arc<Node>] = *children;
                *index += 1;
                if let Some(child) = children.get(*index) {
                    break child.as_ref();
                }
                self.stack.pop();
            };
            loop {
                match node {
                    Node::Branch(branch) => {
                        self.stack.push((branch.children.as_slice(), 0));
                        node = branch.children[0].as_ref();
                    },
                    Node::Leaf(entries) => {
                        self.entries = entries;
                        self.position = 0;
                        break;
                    },
                }
            }
        }
    }
}

/// Descending walk over a [`BTree`]. See [`BTree::range_to`].
pub(crate) struct Descending<'a> {
    stack: Vec<(&'a [Arc<Node>], usize)>,
    entries: &'a [Entry],
    /// Entries of the current leaf not yet yielded, counted from its start.
    remaining: usize,
}

impl<'a> Iterator for Descending<'a> {
    type Item = (&'a [u8], &'a Slot);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining > 0 {
                self.remaining -= 1;
                let (key, slot) = &self.entries[self.remaining];
                return Some((key.as_slice(), slot));
            }

            let mut node = loop {
                let (children, index) = self.stack.last_mut()?;
                let children: &'a [Arc<Node>] = *children;
                if *index > 0 {
                    *index -= 1;
                    break children[*index].as_ref();
                }
                self.stack.pop();
            };
            loop {
                match node {
                    Node::Branch(branch) => {
                        let last = branch.children.len() - 1;
                        self.stack.push((branch.children.as_slice(), last));
                        node = branch.children[last].as_ref();
                    },
                    Node::Leaf(entries) => {
                        self.entries = entries;
                        self.remaining = entries.len();
                        break;
                    },
                }
            }
        }
    }
}
