//! Ordered entry index: an AVL tree threaded through slot-stored nodes.
//!
//! Nodes carry their own left/right/height fields (via [`TreeNode`]), so the
//! index owns no storage and never copies a key; it orders whatever lives in
//! the pool. The sort key is `(key_hash, key_len, key_bytes)`: the hash is
//! the primary key for cheap comparisons, and colliding hashes fall back to
//! a length-then-bytes compare so collisions still form a total order and
//! exact lookup stays O(log n) instead of degrading to a chain scan.
//!
//! Duplicate keys are not supported; callers look up before inserting.

use std::cmp::Ordering;

use crate::ds::slots::{SlotId, SlotPool};

/// Intrusive tree fields embedded in an indexed node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeLinks {
    pub(crate) left: Option<SlotId>,
    pub(crate) right: Option<SlotId>,
    pub(crate) height: u8,
}

/// Implemented by node types that embed [`TreeLinks`] and expose their key.
pub trait TreeNode {
    fn key_hash(&self) -> u32;
    fn key_bytes(&self) -> &[u8];
    fn tree(&self) -> &TreeLinks;
    fn tree_mut(&mut self) -> &mut TreeLinks;
}

/// AVL index over nodes stored in a [`SlotPool`].
#[derive(Debug, Default)]
pub struct OrderedIndex {
    root: Option<SlotId>,
    len: usize,
}

impl OrderedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exact-match lookup by hash and key bytes.
    pub fn get<T: TreeNode>(&self, pool: &SlotPool<T>, hash: u32, key: &[u8]) -> Option<SlotId> {
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = pool.get(id)?;
            cur = match cmp_probe(hash, key, node) {
                Ordering::Equal => return Some(id),
                Ordering::Less => node.tree().left,
                Ordering::Greater => node.tree().right,
            };
        }
        None
    }

    /// Inserts a node already stored in the pool. The node's key must not
    /// collide with an existing member.
    pub fn insert<T: TreeNode>(&mut self, pool: &mut SlotPool<T>, id: SlotId) {
        if let Some(node) = pool.get_mut(id) {
            *node.tree_mut() = TreeLinks {
                left: None,
                right: None,
                height: 1,
            };
        } else {
            return;
        }
        self.root = Some(insert_at(pool, self.root, id));
        self.len += 1;
    }

    /// Removes a member node; returns `false` if it was not in the tree.
    pub fn remove<T: TreeNode>(&mut self, pool: &mut SlotPool<T>, id: SlotId) -> bool {
        let (root, removed) = remove_at(pool, self.root, id);
        self.root = root;
        if removed {
            self.len -= 1;
            if let Some(node) = pool.get_mut(id) {
                *node.tree_mut() = TreeLinks::default();
            }
        }
        removed
    }

    /// Drops all membership without touching node fields. Only valid when
    /// the pool itself is being cleared.
    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants<T: TreeNode>(&self, pool: &SlotPool<T>) {
        fn walk<T: TreeNode>(
            pool: &SlotPool<T>,
            id: Option<SlotId>,
            count: &mut usize,
            last: &mut Option<(u32, usize, Vec<u8>)>,
        ) -> u8 {
            let Some(id) = id else { return 0 };
            let node = pool.get(id).expect("tree node missing from pool");
            let (left, right, height) =
                (node.tree().left, node.tree().right, node.tree().height);

            let lh = walk(pool, left, count, last);

            let node = pool.get(id).expect("tree node missing from pool");
            let key = (
                node.key_hash(),
                node.key_bytes().len(),
                node.key_bytes().to_vec(),
            );
            if let Some(prev) = last {
                assert!(*prev < key, "in-order traversal out of order");
            }
            *last = Some(key);
            *count += 1;

            let rh = walk(pool, right, count, last);
            assert_eq!(height, 1 + lh.max(rh), "stale height");
            assert!(lh.abs_diff(rh) <= 1, "unbalanced node");
            height
        }

        let mut count = 0;
        let mut last = None;
        walk(pool, self.root, &mut count, &mut last);
        assert_eq!(count, self.len);
    }
}

/// Probe key versus node key: hash first, then length, then bytes.
fn cmp_probe<T: TreeNode>(hash: u32, key: &[u8], node: &T) -> Ordering {
    hash.cmp(&node.key_hash())
        .then_with(|| key.len().cmp(&node.key_bytes().len()))
        .then_with(|| key.cmp(node.key_bytes()))
}

fn cmp_ids<T: TreeNode>(pool: &SlotPool<T>, a: SlotId, b: SlotId) -> Ordering {
    match (pool.get(a), pool.get(b)) {
        (Some(a), Some(b)) => cmp_probe(a.key_hash(), a.key_bytes(), b),
        _ => Ordering::Equal,
    }
}

fn links<T: TreeNode>(pool: &SlotPool<T>, id: SlotId) -> (Option<SlotId>, Option<SlotId>) {
    match pool.get(id) {
        Some(node) => (node.tree().left, node.tree().right),
        None => (None, None),
    }
}

fn height<T: TreeNode>(pool: &SlotPool<T>, id: Option<SlotId>) -> u8 {
    id.and_then(|id| pool.get(id)).map_or(0, |n| n.tree().height)
}

fn update_height<T: TreeNode>(pool: &mut SlotPool<T>, id: SlotId) {
    let (left, right) = links(pool, id);
    let h = 1 + height(pool, left).max(height(pool, right));
    if let Some(node) = pool.get_mut(id) {
        node.tree_mut().height = h;
    }
}

fn balance<T: TreeNode>(pool: &SlotPool<T>, id: SlotId) -> i32 {
    let (left, right) = links(pool, id);
    i32::from(height(pool, left)) - i32::from(height(pool, right))
}

fn set_left<T: TreeNode>(pool: &mut SlotPool<T>, id: SlotId, child: Option<SlotId>) {
    if let Some(node) = pool.get_mut(id) {
        node.tree_mut().left = child;
    }
}

fn set_right<T: TreeNode>(pool: &mut SlotPool<T>, id: SlotId, child: Option<SlotId>) {
    if let Some(node) = pool.get_mut(id) {
        node.tree_mut().right = child;
    }
}

//      y            x
//     / \          / \
//    x   C  =>    A   y
//   / \              / \
//  A   B            B   C
fn rotate_right<T: TreeNode>(pool: &mut SlotPool<T>, y: SlotId) -> SlotId {
    let (left, _) = links(pool, y);
    let Some(x) = left else { return y };
    let (_, b) = links(pool, x);
    set_left(pool, y, b);
    set_right(pool, x, Some(y));
    update_height(pool, y);
    update_height(pool, x);
    x
}

fn rotate_left<T: TreeNode>(pool: &mut SlotPool<T>, x: SlotId) -> SlotId {
    let (_, right) = links(pool, x);
    let Some(y) = right else { return x };
    let (b, _) = links(pool, y);
    set_right(pool, x, b);
    set_left(pool, y, Some(x));
    update_height(pool, x);
    update_height(pool, y);
    y
}

fn rebalance<T: TreeNode>(pool: &mut SlotPool<T>, id: SlotId) -> SlotId {
    update_height(pool, id);
    let bf = balance(pool, id);
    if bf > 1 {
        let (left, _) = links(pool, id);
        if let Some(l) = left {
            if balance(pool, l) < 0 {
                let new_left = rotate_left(pool, l);
                set_left(pool, id, Some(new_left));
            }
        }
        rotate_right(pool, id)
    } else if bf < -1 {
        let (_, right) = links(pool, id);
        if let Some(r) = right {
            if balance(pool, r) > 0 {
                let new_right = rotate_right(pool, r);
                set_right(pool, id, Some(new_right));
            }
        }
        rotate_left(pool, id)
    } else {
        id
    }
}

fn insert_at<T: TreeNode>(pool: &mut SlotPool<T>, node: Option<SlotId>, id: SlotId) -> SlotId {
    let Some(cur) = node else { return id };
    match cmp_ids(pool, id, cur) {
        Ordering::Less => {
            let (left, _) = links(pool, cur);
            let new_left = insert_at(pool, left, id);
            set_left(pool, cur, Some(new_left));
        }
        // Equal cannot occur for distinct live keys; keep a total order by
        // sending it right.
        Ordering::Greater | Ordering::Equal => {
            let (_, right) = links(pool, cur);
            let new_right = insert_at(pool, right, id);
            set_right(pool, cur, Some(new_right));
        }
    }
    rebalance(pool, cur)
}

fn remove_at<T: TreeNode>(
    pool: &mut SlotPool<T>,
    node: Option<SlotId>,
    id: SlotId,
) -> (Option<SlotId>, bool) {
    let Some(cur) = node else { return (None, false) };

    let ord = if cur == id {
        Ordering::Equal
    } else {
        match cmp_ids(pool, id, cur) {
            // same key, different slot: keep descending the insert path
            Ordering::Equal => Ordering::Greater,
            ord => ord,
        }
    };

    match ord {
        Ordering::Less => {
            let (left, _) = links(pool, cur);
            let (new_left, removed) = remove_at(pool, left, id);
            if !removed {
                return (Some(cur), false);
            }
            set_left(pool, cur, new_left);
            (Some(rebalance(pool, cur)), true)
        }
        Ordering::Greater => {
            let (_, right) = links(pool, cur);
            let (new_right, removed) = remove_at(pool, right, id);
            if !removed {
                return (Some(cur), false);
            }
            set_right(pool, cur, new_right);
            (Some(rebalance(pool, cur)), true)
        }
        Ordering::Equal => {
            let (left, right) = links(pool, cur);
            let replacement = match (left, right) {
                (None, None) => None,
                (Some(l), None) => Some(l),
                (None, Some(r)) => Some(r),
                (Some(l), Some(r)) => {
                    let (new_right, successor) = take_min(pool, r);
                    set_left(pool, successor, Some(l));
                    set_right(pool, successor, new_right);
                    Some(rebalance(pool, successor))
                }
            };
            (replacement, true)
        }
    }
}

/// Detaches the minimum node of the subtree rooted at `node`; returns the
/// rebalanced remainder and the detached id.
fn take_min<T: TreeNode>(pool: &mut SlotPool<T>, node: SlotId) -> (Option<SlotId>, SlotId) {
    let (left, right) = links(pool, node);
    match left {
        None => (right, node),
        Some(l) => {
            let (new_left, min) = take_min(pool, l);
            set_left(pool, node, new_left);
            (Some(rebalance(pool, node)), min)
        }
    }
}
