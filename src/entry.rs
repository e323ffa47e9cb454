//! Stored records: entries and list elements.
//!
//! An entry owns its key bytes and either a scalar payload (value bytes
//! stored inline) or a list payload (head/tail of a nested element list
//! plus the element count). Index order, recency order, and nested list
//! order are all threaded through the records themselves via intrusive
//! links, so one slot per record is the only storage an entry needs.
//!
//! Charged sizes model the fixed per-record header footprint of the
//! backing arena plus the variable key/value bytes; they are what the
//! byte budget accounts in.

use crate::ds::{Linked, LinkedList, Links, TreeLinks, TreeNode};
use crate::value::ScalarKind;

/// Fixed overhead charged per entry (record header, index and recency
/// link fields).
pub(crate) const ENTRY_OVERHEAD: usize = 72;

/// Extra overhead charged for a list entry's nested list head.
pub(crate) const LIST_HEAD_OVERHEAD: usize = 16;

/// Fixed overhead charged per list element.
pub(crate) const ELEM_OVERHEAD: usize = 24;

/// Payload of an entry: inline scalar bytes or a nested element list.
#[derive(Debug)]
pub(crate) enum Payload {
    Scalar { kind: ScalarKind, bytes: Box<[u8]> },
    List { elems: LinkedList, len: u32 },
}

/// One stored key with its value, deadline, and intrusive link fields.
#[derive(Debug)]
pub(crate) struct Entry {
    pub key_hash: u32,
    pub key: Box<[u8]>,
    /// Deadline in clock milliseconds; 0 means no expiry.
    pub expires_at_ms: u64,
    /// Opaque caller-owned word, stored and returned verbatim.
    pub user_flags: u32,
    pub payload: Payload,
    pub lru: Links,
    pub tree: TreeLinks,
}

impl Entry {
    pub fn new_scalar(
        key_hash: u32,
        key: Box<[u8]>,
        kind: ScalarKind,
        bytes: Box<[u8]>,
        user_flags: u32,
    ) -> Self {
        Self {
            key_hash,
            key,
            expires_at_ms: 0,
            user_flags,
            payload: Payload::Scalar { kind, bytes },
            lru: Links::default(),
            tree: TreeLinks::default(),
        }
    }

    pub fn new_list(key_hash: u32, key: Box<[u8]>) -> Self {
        Self {
            key_hash,
            key,
            expires_at_ms: 0,
            user_flags: 0,
            payload: Payload::List {
                elems: LinkedList::new(),
                len: 0,
            },
            lru: Links::default(),
            tree: TreeLinks::default(),
        }
    }

    pub fn is_stale(&self, now_ms: u64) -> bool {
        self.expires_at_ms != 0 && self.expires_at_ms <= now_ms
    }

    pub fn is_list(&self) -> bool {
        matches!(self.payload, Payload::List { .. })
    }

    /// Bytes this entry is charged against the arena budget, excluding any
    /// list elements (those are charged individually).
    pub fn charged_size(&self) -> usize {
        ENTRY_OVERHEAD
            + self.key.len()
            + match &self.payload {
                Payload::Scalar { bytes, .. } => bytes.len(),
                Payload::List { .. } => LIST_HEAD_OVERHEAD,
            }
    }

    /// Charged size of a scalar entry before it is built.
    pub fn scalar_charge(key_len: usize, value_len: usize) -> usize {
        ENTRY_OVERHEAD + key_len + value_len
    }

    /// Charged size of a list entry before it is built.
    pub fn list_charge(key_len: usize) -> usize {
        ENTRY_OVERHEAD + key_len + LIST_HEAD_OVERHEAD
    }
}

impl Linked for Entry {
    fn links(&self) -> &Links {
        &self.lru
    }
    fn links_mut(&mut self) -> &mut Links {
        &mut self.lru
    }
}

impl TreeNode for Entry {
    fn key_hash(&self) -> u32 {
        self.key_hash
    }
    fn key_bytes(&self) -> &[u8] {
        &self.key
    }
    fn tree(&self) -> &TreeLinks {
        &self.tree
    }
    fn tree_mut(&mut self) -> &mut TreeLinks {
        &mut self.tree
    }
}

/// One element of a list-typed entry.
#[derive(Debug)]
pub(crate) struct ListElem {
    pub kind: ScalarKind,
    pub bytes: Box<[u8]>,
    pub links: Links,
}

impl ListElem {
    pub fn new(kind: ScalarKind, bytes: Box<[u8]>) -> Self {
        Self {
            kind,
            bytes,
            links: Links::default(),
        }
    }

    pub fn charged_size(&self) -> usize {
        ELEM_OVERHEAD + self.bytes.len()
    }

    pub fn charge(value_len: usize) -> usize {
        ELEM_OVERHEAD + value_len
    }
}

impl Linked for ListElem {
    fn links(&self) -> &Links {
        &self.links
    }
    fn links_mut(&mut self) -> &mut Links {
        &mut self.links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_needs_a_deadline() {
        let mut entry = Entry::new_scalar(1, b"k".to_vec().into(), ScalarKind::Bool, Box::new([1]), 0);
        assert!(!entry.is_stale(u64::MAX));

        entry.expires_at_ms = 100;
        assert!(!entry.is_stale(99));
        assert!(entry.is_stale(100));
        assert!(entry.is_stale(101));
    }

    #[test]
    fn charged_sizes_follow_payload() {
        let scalar = Entry::new_scalar(
            1,
            b"key".to_vec().into(),
            ScalarKind::Str,
            b"value".to_vec().into(),
            0,
        );
        assert_eq!(scalar.charged_size(), ENTRY_OVERHEAD + 3 + 5);
        assert_eq!(Entry::scalar_charge(3, 5), scalar.charged_size());

        let list = Entry::new_list(1, b"key".to_vec().into());
        assert_eq!(list.charged_size(), ENTRY_OVERHEAD + 3 + LIST_HEAD_OVERHEAD);
        assert_eq!(Entry::list_charge(3), list.charged_size());

        let elem = ListElem::new(ScalarKind::Number, Box::new(1.0f64.to_le_bytes()));
        assert_eq!(elem.charged_size(), ELEM_OVERHEAD + 8);
        assert_eq!(ListElem::charge(8), elem.charged_size());
    }
}
