//! Sparse dirty-tile set
//!
//! A quadtree of flags marking which tiles need rendering this run. Any
//! subtree that is uniformly dirty collapses into a single [`Node::Full`], so
//! memory tracks the number of distinct dirty regions rather than the size of
//! the tree.
//!
//! ```text
//!                  Mixed
//!        ┌───────┬───┴───┬───────┐
//!      Empty   Full    Mixed   Empty
//!                    ┌──┬─┴┬──┐
//!                    F  E  E  F
//! ```
//!
//! Iteration expands collapsed subtrees on the fly with an explicit stack, so
//! a fully dirty tree of depth 20 can be walked without allocating 4^20 nodes.

mod iter;

pub use iter::DirtyIter;

use crate::coord::TilePath;

/// One node of the dirty-set quadtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nothing below is dirty.
    Empty,
    /// Everything below is dirty.
    Full,
    /// Children in quadrant order. Never all `Empty` and never all `Full`.
    Mixed(Box<[Node; 4]>),
}

/// Shared stand-in for the children of a collapsed subtree.
pub(crate) static FULL: Node = Node::Full;

impl Node {
    fn mixed() -> Self {
        Node::Mixed(Box::new([Node::Empty, Node::Empty, Node::Empty, Node::Empty]))
    }

    /// Returns the child in `quadrant` if anything below it is dirty.
    pub(crate) fn dirty_child(&self, quadrant: u8) -> Option<&Node> {
        match self {
            Node::Empty => None,
            Node::Full => Some(&FULL),
            Node::Mixed(children) => match &children[quadrant as usize] {
                Node::Empty => None,
                child => Some(child),
            },
        }
    }

    fn add(&mut self, digits: &[u8]) {
        let Some((&quadrant, rest)) = digits.split_first() else {
            *self = Node::Full;
            return;
        };

        match self {
            Node::Full => return,
            Node::Empty => *self = Node::mixed(),
            Node::Mixed(_) => {}
        }

        let collapse = match self {
            Node::Mixed(children) => {
                children[quadrant as usize].add(rest);
                children.iter().all(|c| matches!(c, Node::Full))
            }
            _ => false,
        };
        if collapse {
            *self = Node::Full;
        }
    }

    fn count_leaves(&self, levels_below: u32) -> u128 {
        match self {
            Node::Empty => 0,
            Node::Full => 4u128.pow(levels_below),
            Node::Mixed(children) => children
                .iter()
                .map(|c| c.count_leaves(levels_below - 1))
                .sum(),
        }
    }

    fn count_all(&self, levels_below: u32) -> u128 {
        match self {
            Node::Empty => 0,
            // 1 + 4 + ... + 4^levels_below
            Node::Full => (4u128.pow(levels_below + 1) - 1) / 3,
            Node::Mixed(children) => {
                1 + children
                    .iter()
                    .map(|c| c.count_all(levels_below - 1))
                    .sum::<u128>()
            }
        }
    }

    fn node_count(&self) -> usize {
        match self {
            Node::Mixed(children) => 1 + children.iter().map(Node::node_count).sum::<usize>(),
            _ => 1,
        }
    }
}

/// Set of dirty tile paths in a quadtree of fixed depth.
#[derive(Debug, Clone)]
pub struct DirtySet {
    depth: u32,
    root: Node,
}

impl DirtySet {
    /// Creates an empty set for a tree of the given depth.
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            root: Node::Empty,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.root, Node::Empty)
    }

    /// Marks a tile dirty.
    ///
    /// A full-length path marks one render-tile. A shorter path marks the
    /// whole subtree under it. Digits past the tree depth are ignored.
    pub fn add(&mut self, path: &TilePath) {
        let digits = path.digits();
        debug_assert!(digits.len() <= self.depth as usize);
        let len = digits.len().min(self.depth as usize);
        self.root.add(&digits[..len]);
    }

    /// Marks every tile in the tree dirty.
    pub fn mark_all(&mut self) {
        self.root = Node::Full;
    }

    /// Returns true if `path` or anything below it is dirty.
    ///
    /// A collapsed ancestor answers for every address under it.
    pub fn query(&self, path: &TilePath) -> bool {
        let mut node = &self.root;
        for &quadrant in path.digits() {
            match node {
                Node::Empty => return false,
                Node::Full => return true,
                Node::Mixed(children) => node = &children[quadrant as usize],
            }
        }
        !matches!(node, Node::Empty)
    }

    /// Iterates dirty paths of length `level` (the tree depth when `None`).
    ///
    /// With `round_robin` the four top quadrants take turns, so progress is
    /// spread over the whole map instead of finishing one corner first.
    pub fn iterate(&self, level: Option<u32>, round_robin: bool) -> DirtyIter<'_> {
        let level = level.unwrap_or(self.depth).min(self.depth) as usize;
        DirtyIter::new(&self.root, level, false, round_robin)
    }

    /// Iterates every dirty path at any level in post-order.
    ///
    /// Children come before their parent and the root comes last, so a
    /// consumer can render in the order given without tracking dependencies.
    pub fn post_traversal(&self, round_robin: bool) -> DirtyIter<'_> {
        DirtyIter::new(&self.root, self.depth as usize, true, round_robin)
    }

    /// Number of dirty render-tiles.
    pub fn count(&self) -> u64 {
        saturate(self.root.count_leaves(self.depth))
    }

    /// Number of dirty paths at every level, equal to the length of
    /// [`post_traversal`](Self::post_traversal).
    pub fn count_all(&self) -> u64 {
        saturate(self.root.count_all(self.depth))
    }

    /// Number of allocated tree nodes.
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }
}

fn saturate(n: u128) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}
