//! Stack-based walks over the dirty-set tree.

use super::Node;
use crate::coord::TilePath;

struct Frame<'a> {
    node: &'a Node,
    next: u8,
}

/// Depth-first walk from one node.
///
/// Stops descending at `max_len` and yields the paths found there. With
/// `yield_inner` every shallower dirty node is also yielded, after all of its
/// children.
struct Walk<'a> {
    stack: Vec<Frame<'a>>,
    path: TilePath,
    max_len: usize,
    yield_inner: bool,
}

impl<'a> Walk<'a> {
    fn new(node: &'a Node, prefix: TilePath, max_len: usize, yield_inner: bool) -> Self {
        let mut stack = Vec::new();
        if !matches!(node, Node::Empty) {
            stack.push(Frame { node, next: 0 });
        }
        Self {
            stack,
            path: prefix,
            max_len,
            yield_inner,
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = TilePath;

    fn next(&mut self) -> Option<TilePath> {
        loop {
            let at_bottom = self.path.len() >= self.max_len;
            let top = self.stack.last_mut()?;

            if !at_bottom && top.next < 4 {
                let quadrant = top.next;
                top.next += 1;
                let node: &'a Node = top.node;
                if let Some(child) = node.dirty_child(quadrant) {
                    self.path.push(quadrant);
                    self.stack.push(Frame {
                        node: child,
                        next: 0,
                    });
                }
                continue;
            }

            self.stack.pop();
            let out = (at_bottom || self.yield_inner).then(|| self.path.clone());
            self.path.pop();
            if out.is_some() {
                return out;
            }
        }
    }
}

/// Iterator over dirty paths returned by
/// [`DirtySet::iterate`](super::DirtySet::iterate) and
/// [`DirtySet::post_traversal`](super::DirtySet::post_traversal).
pub struct DirtyIter<'a> {
    walks: Vec<Walk<'a>>,
    turn: usize,
    /// Root path, yielded once every quadrant is done.
    tail: Option<TilePath>,
}

impl<'a> DirtyIter<'a> {
    pub(super) fn new(root: &'a Node, level: usize, yield_inner: bool, round_robin: bool) -> Self {
        if !round_robin || level == 0 || matches!(root, Node::Empty) {
            return Self {
                walks: vec![Walk::new(root, TilePath::root(), level, yield_inner)],
                turn: 0,
                tail: None,
            };
        }

        let walks = (0..4u8)
            .filter_map(|q| {
                root.dirty_child(q)
                    .map(|child| Walk::new(child, TilePath::root().child(q), level, yield_inner))
            })
            .collect();
        Self {
            walks,
            turn: 0,
            tail: yield_inner.then(TilePath::root),
        }
    }
}

impl Iterator for DirtyIter<'_> {
    type Item = TilePath;

    fn next(&mut self) -> Option<TilePath> {
        while !self.walks.is_empty() {
            let idx = self.turn % self.walks.len();
            match self.walks[idx].next() {
                Some(path) => {
                    self.turn = idx + 1;
                    return Some(path);
                }
                None => {
                    self.walks.remove(idx);
                    self.turn = idx;
                }
            }
        }
        self.tail.take()
    }
}
