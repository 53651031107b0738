//! AVL tree of read identifiers over an index-addressed node arena.
//!
//! One [`NodeArena`] can host any number of trees: a tree is just a root
//! [`NodeRef`] owned by the caller and updated in place when a rotation
//! replaces it. The hash table keeps one such root per bucket; [`IdTree`]
//! wraps a single root for the tree-only index.
//!
//! Every traversal walks an explicit stack rather than recursing, so an
//! adversarial insertion order cannot blow the call stack.

use std::cmp::Ordering;

use crate::bignum::BigNum;
use crate::error::{Error, Result};

// =============================================================================
// Node handles
// =============================================================================

/// Handle to a node inside a [`NodeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef(u32);

impl NodeRef {
    /// The empty tree / missing child.
    pub const NULL: NodeRef = NodeRef(u32::MAX);

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    fn index(self) -> usize {
        debug_assert!(!self.is_null());
        self.0 as usize
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::NULL
    }
}

/// Outcome of [`NodeArena::insert_distinct`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insertion {
    /// The node was linked into the tree.
    Inserted(NodeRef),
    /// An equal identifier is already present; the offered node was not linked
    /// and still belongs to the caller.
    Duplicate(NodeRef),
}

#[derive(Clone)]
struct Node {
    id: BigNum,
    left: NodeRef,
    right: NodeRef,
    /// Leaf = 0; a missing child counts as -1.
    height: i32,
}

#[derive(Clone, Copy)]
struct PathFrame {
    node: NodeRef,
    /// Whether the descent continued into the left child.
    went_left: bool,
}

// =============================================================================
// Node Arena
// =============================================================================

/// Node storage shared by every tree built from it, with a free list for
/// released slots.
#[derive(Clone, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
    free: Vec<NodeRef>,
    live: usize,
    /// Scratch ancestor stack reused across insertions.
    path: Vec<PathFrame>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut arena = Self::new();
        arena
            .nodes
            .try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory("identifier tree"))?;
        Ok(arena)
    }

    /// Nodes currently owned by some tree (or held by a caller).
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn memory_usage(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<Node>()
            + self.free.capacity() * std::mem::size_of::<NodeRef>()
            + self.path.capacity() * std::mem::size_of::<PathFrame>()
            + self.nodes.iter().map(|n| n.id.memory_usage()).sum::<usize>()
    }

    /// Allocate an unlinked leaf holding `id`.
    pub fn alloc(&mut self, id: BigNum) -> Result<NodeRef> {
        let node = Node {
            id,
            left: NodeRef::NULL,
            right: NodeRef::NULL,
            height: 0,
        };

        let r = if let Some(r) = self.free.pop() {
            self.nodes[r.index()] = node;
            r
        } else {
            if self.nodes.len() >= NodeRef::NULL.0 as usize {
                return Err(Error::OutOfMemory("identifier tree"));
            }
            self.nodes
                .try_reserve(1)
                .map_err(|_| Error::OutOfMemory("identifier tree"))?;
            let r = NodeRef(self.nodes.len() as u32);
            self.nodes.push(node);
            r
        };

        self.live += 1;
        Ok(r)
    }

    /// Return an unlinked node's slot to the free list and drop its identifier.
    /// Releasing a node that is still linked into a tree corrupts that tree.
    pub(crate) fn release(&mut self, r: NodeRef) {
        let node = &mut self.nodes[r.index()];
        node.id = BigNum::new();
        node.left = NodeRef::NULL;
        node.right = NodeRef::NULL;
        node.height = 0;
        self.free.push(r);
        self.live -= 1;
    }

    #[inline]
    pub fn id(&self, r: NodeRef) -> &BigNum {
        &self.nodes[r.index()].id
    }

    #[inline]
    pub(crate) fn left(&self, r: NodeRef) -> NodeRef {
        self.nodes[r.index()].left
    }

    #[inline]
    pub(crate) fn right(&self, r: NodeRef) -> NodeRef {
        self.nodes[r.index()].right
    }

    /// Stored height tag; `-1` for the empty tree.
    #[inline]
    pub fn height(&self, r: NodeRef) -> i32 {
        if r.is_null() {
            -1
        } else {
            self.nodes[r.index()].height
        }
    }

    #[inline]
    fn balance(&self, r: NodeRef) -> i32 {
        let node = &self.nodes[r.index()];
        self.height(node.left) - self.height(node.right)
    }

    #[inline]
    fn update_height(&mut self, r: NodeRef) {
        let node = &self.nodes[r.index()];
        let h = 1 + self.height(node.left).max(self.height(node.right));
        self.nodes[r.index()].height = h;
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Find `id` in the tree rooted at `root` without touching it.
    pub fn search(&self, root: NodeRef, id: &BigNum) -> Option<NodeRef> {
        let mut current = root;
        while !current.is_null() {
            let node = &self.nodes[current.index()];
            current = match id.cmp(&node.id) {
                Ordering::Equal => return Some(current),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        None
    }

    // -------------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------------

    /// Link the unlinked node `node` into the tree at `root`.
    ///
    /// On [`Insertion::Duplicate`] the tree is unchanged and `node` is still
    /// owned by the caller.
    pub fn insert_distinct(&mut self, root: &mut NodeRef, node: NodeRef) -> Insertion {
        debug_assert_eq!(self.height(node), 0);
        if root.is_null() {
            *root = node;
            return Insertion::Inserted(node);
        }

        let mut path = std::mem::take(&mut self.path);
        path.clear();

        let mut current = *root;
        loop {
            let ord = self.nodes[node.index()]
                .id
                .cmp(&self.nodes[current.index()].id);
            let went_left = match ord {
                Ordering::Equal => {
                    self.path = path;
                    return Insertion::Duplicate(current);
                }
                Ordering::Less => true,
                Ordering::Greater => false,
            };
            path.push(PathFrame {
                node: current,
                went_left,
            });

            let slot = &mut self.nodes[current.index()];
            let next = if went_left { slot.left } else { slot.right };
            if next.is_null() {
                if went_left {
                    slot.left = node;
                } else {
                    slot.right = node;
                }
                break;
            }
            current = next;
        }

        self.rebalance(root, &path);
        self.path = path;
        Insertion::Inserted(node)
    }

    /// Insert `id` unless an equal identifier exists; either way return the
    /// node holding that identifier. The first-seen node wins.
    pub fn find_or_insert(&mut self, root: &mut NodeRef, id: BigNum) -> Result<NodeRef> {
        let node = self.alloc(id)?;
        match self.insert_distinct(root, node) {
            Insertion::Inserted(r) => Ok(r),
            Insertion::Duplicate(existing) => {
                self.release(node);
                Ok(existing)
            }
        }
    }

    /// Walk the ancestor stack bottom-up fixing heights. The first unbalanced
    /// node gets a single or double rotation, after which the subtree is back
    /// at its pre-insert height and the ancestors need no change.
    fn rebalance(&mut self, root: &mut NodeRef, path: &[PathFrame]) {
        for depth in (0..path.len()).rev() {
            let node = path[depth].node;
            let old_height = self.height(node);
            self.update_height(node);

            let balance = self.balance(node);
            if balance > 1 {
                let left = self.left(node);
                if self.balance(left) < 0 {
                    // left-right
                    let new_left = self.rotate_left(left);
                    self.nodes[node.index()].left = new_left;
                }
                // left-left
                let sub = self.rotate_right(node);
                self.relink(root, path, depth, sub);
                return;
            }
            if balance < -1 {
                let right = self.right(node);
                if self.balance(right) > 0 {
                    // right-left
                    let new_right = self.rotate_right(right);
                    self.nodes[node.index()].right = new_right;
                }
                // right-right
                let sub = self.rotate_left(node);
                self.relink(root, path, depth, sub);
                return;
            }

            if self.height(node) == old_height {
                return;
            }
        }
    }

    /// Point the parent of `path[depth]` (or the root) at `sub`.
    fn relink(&mut self, root: &mut NodeRef, path: &[PathFrame], depth: usize, sub: NodeRef) {
        if depth == 0 {
            *root = sub;
            return;
        }
        let parent = path[depth - 1];
        let slot = &mut self.nodes[parent.node.index()];
        if parent.went_left {
            slot.left = sub;
        } else {
            slot.right = sub;
        }
    }

    fn rotate_left(&mut self, x: NodeRef) -> NodeRef {
        let y = self.right(x);
        debug_assert!(!y.is_null());
        self.nodes[x.index()].right = self.left(y);
        self.nodes[y.index()].left = x;
        self.update_height(x);
        self.update_height(y);
        y
    }

    fn rotate_right(&mut self, x: NodeRef) -> NodeRef {
        let y = self.left(x);
        debug_assert!(!y.is_null());
        self.nodes[x.index()].left = self.right(y);
        self.nodes[y.index()].right = x;
        self.update_height(x);
        self.update_height(y);
        y
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Release every node of the tree at `root` and leave it empty.
    /// Returns the number of nodes released.
    pub fn free_all(&mut self, root: &mut NodeRef) -> usize {
        let mut freed = 0;
        let mut stack = std::mem::take(&mut self.path);
        stack.clear();
        if !root.is_null() {
            stack.push(PathFrame {
                node: *root,
                went_left: false,
            });
        }
        while let Some(frame) = stack.pop() {
            let (left, right) = (self.left(frame.node), self.right(frame.node));
            for child in [left, right] {
                if !child.is_null() {
                    stack.push(PathFrame {
                        node: child,
                        went_left: false,
                    });
                }
            }
            self.release(frame.node);
            freed += 1;
        }
        self.path = stack;
        *root = NodeRef::NULL;
        freed
    }

    /// Drop every node of every tree at once. All outstanding roots must be
    /// discarded by the caller.
    pub(crate) fn reset(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.live = 0;
    }

    /// In-order iterator over the tree at `root`.
    pub fn iter(&self, root: NodeRef) -> Iter<'_> {
        let mut iter = Iter {
            arena: self,
            stack: Vec::new(),
        };
        iter.push_left_spine(root);
        iter
    }
}

/// In-order iterator over one tree of a [`NodeArena`].
pub struct Iter<'a> {
    arena: &'a NodeArena,
    stack: Vec<NodeRef>,
}

impl<'a> Iter<'a> {
    fn push_left_spine(&mut self, mut r: NodeRef) {
        while !r.is_null() {
            self.stack.push(r);
            r = self.arena.left(r);
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a BigNum;

    fn next(&mut self) -> Option<Self::Item> {
        let r = self.stack.pop()?;
        self.push_left_spine(self.arena.right(r));
        Some(self.arena.id(r))
    }
}

// =============================================================================
// IdTree
// =============================================================================

/// A set of identifiers backed by a single AVL tree.
#[derive(Clone, Default)]
pub struct IdTree {
    arena: NodeArena,
    root: NodeRef,
    /// Identifiers linked under `root`.
    len: usize,
}

impl IdTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            arena: NodeArena::with_capacity(capacity)?,
            root: NodeRef::NULL,
            len: 0,
        })
    }

    /// Build from a list, keeping the first of any duplicates.
    pub fn from_ids<I: IntoIterator<Item = BigNum>>(ids: I) -> Result<Self> {
        let mut tree = Self::new();
        for id in ids {
            tree.insert(id)?;
        }
        Ok(tree)
    }

    /// Identifiers in the tree. Nodes from [`IdTree::make_node`] count once
    /// they are linked.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tree, `-1` when empty.
    pub fn height(&self) -> i32 {
        self.arena.height(self.root)
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Insert `id`; `false` if it was already present.
    pub fn insert(&mut self, id: BigNum) -> Result<bool> {
        let node = self.arena.alloc(id)?;
        match self.insert_distinct(node) {
            Insertion::Inserted(_) => Ok(true),
            Insertion::Duplicate(_) => {
                self.arena.release(node);
                Ok(false)
            }
        }
    }

    pub fn find_or_insert(&mut self, id: BigNum) -> Result<NodeRef> {
        let live = self.arena.live();
        let node = self.arena.find_or_insert(&mut self.root, id)?;
        if self.arena.live() > live {
            self.len += 1;
        }
        Ok(node)
    }

    /// Allocate an unlinked node for [`IdTree::insert_distinct`].
    pub fn make_node(&mut self, id: BigNum) -> Result<NodeRef> {
        self.arena.alloc(id)
    }

    pub fn insert_distinct(&mut self, node: NodeRef) -> Insertion {
        let outcome = self.arena.insert_distinct(&mut self.root, node);
        if let Insertion::Inserted(_) = outcome {
            self.len += 1;
        }
        outcome
    }

    /// Discard an unlinked node, such as one rejected as a duplicate.
    pub fn discard(&mut self, node: NodeRef) {
        debug_assert_ne!(
            self.arena.search(self.root, self.arena.id(node)),
            Some(node),
            "discarding a node that is linked into the tree"
        );
        self.arena.release(node);
    }

    pub fn search(&self, id: &BigNum) -> Option<NodeRef> {
        self.arena.search(self.root, id)
    }

    pub fn get(&self, node: NodeRef) -> &BigNum {
        self.arena.id(node)
    }

    #[inline]
    pub fn contains(&self, id: &BigNum) -> bool {
        self.search(id).is_some()
    }

    pub fn clear(&mut self) {
        self.arena.free_all(&mut self.root);
        self.len = 0;
    }

    pub fn iter(&self) -> Iter<'_> {
        self.arena.iter(self.root)
    }

    pub fn memory_usage(&self) -> usize {
        self.arena.memory_usage()
    }
}

impl std::fmt::Debug for IdTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
