//! Single-threaded zone engine: index + recency list + byte budget.
//!
//! ## Architecture
//!
//! ```text
//!   ┌────────────────────────────────────────────────────────────────┐
//!   │                          ZoneCore                              │
//!   │                                                                │
//!   │  entries: SlotPool<Entry>       elems: SlotPool<ListElem>      │
//!   │  ┌──────────────────────┐       ┌─────────────────────────┐    │
//!   │  │ key, payload,        │       │ kind, bytes, links      │    │
//!   │  │ deadline, tree, lru  │       └─────────────────────────┘    │
//!   │  └──────────────────────┘                                      │
//!   │        ▲          ▲                                            │
//!   │        │          │                                            │
//!   │  index (AVL    lru (intrusive list,                            │
//!   │  by hash/key)  head = MRU, tail = LRU)                         │
//!   │                                                                │
//!   │  arena: ByteArena (fixed byte budget, eviction trigger)        │
//!   └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutating operation starts with a bounded lazy reclaim of the
//! recency tail; allocation failure on the store/incr paths falls back to
//! up to 30 forced tail evictions. The core is not thread-safe; the
//! [`Zone`](super::Zone) wrapper serializes access with one mutex.

use std::hash::Hasher;

use rustc_hash::FxHasher;
use tracing::{debug, error};

use crate::arena::{ArenaStats, ByteArena};
use crate::ds::{LinkedList, OrderedIndex, SlotId, SlotPool};
use crate::entry::{Entry, ListElem, Payload};
use crate::error::{Error, Result};
use crate::value::{decode_scalar, encode_scalar, ScalarKind, StoreFlags, TtlPolicy, Value};

use super::TtlStatus;

/// Hashes key bytes to the 32-bit index key.
pub(crate) fn hash_key(key: &[u8]) -> u32 {
    let mut hasher = FxHasher::default();
    hasher.write(key);
    hasher.finish() as u32
}

/// Result of an exact-match lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Found {
    /// Entry exists and its deadline (if any) has not passed.
    Live(SlotId),
    /// Entry exists but its deadline has passed; not yet removed.
    Stale(SlotId),
    Absent,
}

/// Maximum forced evictions attempted to satisfy one allocation.
const MAX_FORCED_EVICTIONS: usize = 30;

/// Maximum stale tail entries removed per lazy reclaim.
const MAX_LAZY_REMOVALS: usize = 2;

pub(crate) struct ZoneCore {
    pub(super) entries: SlotPool<Entry>,
    pub(super) elems: SlotPool<ListElem>,
    pub(super) index: OrderedIndex,
    pub(super) lru: LinkedList,
    pub(super) arena: ByteArena,
}

impl ZoneCore {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: SlotPool::new(),
            elems: SlotPool::new(),
            index: OrderedIndex::new(),
            lru: LinkedList::new(),
            arena: ByteArena::new(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    pub(crate) fn free_bytes(&self) -> usize {
        self.arena.free_bytes()
    }

    // -- lookup -----------------------------------------------------------

    /// Exact-match lookup. Any hit, stale or live, is moved to the recency
    /// head; callers decide what a stale hit means.
    pub(super) fn find(&mut self, now: u64, hash: u32, key: &[u8]) -> Found {
        let Some(id) = self.index.get(&self.entries, hash, key) else {
            return Found::Absent;
        };
        self.lru.move_to_front(&mut self.entries, id);
        let stale = self.entries.get(id).is_some_and(|e| e.is_stale(now));
        if stale {
            Found::Stale(id)
        } else {
            Found::Live(id)
        }
    }

    /// Lookup that never perturbs recency order and ignores staleness.
    /// Reading or resetting a deadline must not protect an entry from
    /// eviction.
    pub(super) fn peek(&self, hash: u32, key: &[u8]) -> Option<SlotId> {
        self.index.get(&self.entries, hash, key)
    }

    // -- removal & reclaim ------------------------------------------------

    /// Unindexes and frees one entry, nested list elements first.
    pub(super) fn destroy(&mut self, id: SlotId) {
        let nested = match self.entries.get(id) {
            Some(entry) => match &entry.payload {
                Payload::List { elems, .. } => Some(*elems),
                Payload::Scalar { .. } => None,
            },
            None => return,
        };
        if let Some(mut list) = nested {
            while let Some(elem_id) = list.pop_front(&mut self.elems) {
                if let Some(elem) = self.elems.remove(elem_id) {
                    self.arena.release(elem.charged_size());
                }
            }
        }
        self.lru.unlink(&mut self.entries, id);
        self.index.remove(&mut self.entries, id);
        if let Some(entry) = self.entries.remove(id) {
            self.arena.release(entry.charged_size());
        }
    }

    /// Removes stale entries from the recency tail, at most
    /// [`MAX_LAZY_REMOVALS`] per call. Expired-but-hot entries are not
    /// found this way; they are collected when directly looked up.
    pub(super) fn reclaim_lazy(&mut self, now: u64) {
        for _ in 0..MAX_LAZY_REMOVALS {
            let Some(tail) = self.lru.tail() else { return };
            if !self.entries.get(tail).is_some_and(|e| e.is_stale(now)) {
                return;
            }
            self.destroy(tail);
        }
    }

    /// Evicts the least recently used entry regardless of its deadline.
    /// Returns whether anything was evicted.
    pub(super) fn reclaim_forced(&mut self) -> bool {
        match self.lru.tail() {
            Some(tail) => {
                self.destroy(tail);
                true
            }
            None => false,
        }
    }

    /// Charges `bytes` against the budget, forcing out LRU entries when
    /// exhausted (unless `safe`). `Ok(true)` means a live entry was evicted
    /// to make room.
    fn reserve(&mut self, bytes: usize, safe: bool, key: &[u8]) -> Result<bool> {
        if self.arena.try_charge(bytes) {
            return Ok(false);
        }
        if safe {
            return Err(Error::OutOfMemory);
        }
        debug!(
            key = %String::from_utf8_lossy(key),
            "overriding non-expired entries due to memory shortage"
        );
        let mut forcible = false;
        for _ in 0..MAX_FORCED_EVICTIONS {
            if !self.reclaim_forced() {
                break;
            }
            forcible = true;
            if self.arena.try_charge(bytes) {
                return Ok(forcible);
            }
        }
        Err(Error::OutOfMemory)
    }

    // -- store ------------------------------------------------------------

    /// Stores `value` under `key`. Returns whether a live entry was
    /// forcibly evicted to satisfy the write.
    pub(crate) fn store(
        &mut self,
        now: u64,
        key: &[u8],
        value: &Value,
        flags: StoreFlags,
        ttl_ms: u64,
        user_flags: u32,
    ) -> Result<bool> {
        let encoded = encode_scalar(value);
        if encoded.is_none() && (flags.add || flags.replace) {
            return Err(Error::invalid_argument("attempt to add or replace nil values"));
        }

        let hash = hash_key(key);
        self.reclaim_lazy(now);
        let found = self.find(now, hash, key);

        if flags.replace {
            // a stale entry counts as absent for replace
            return match (found, encoded) {
                (Found::Live(id), Some((kind, bytes))) => {
                    self.overwrite(now, id, kind, bytes, ttl_ms, user_flags, flags.safe)
                }
                _ => Err(Error::NotFound),
            };
        }

        if flags.add {
            return match (found, encoded) {
                (Found::Live(_), _) => Err(Error::AlreadyExists),
                (Found::Stale(id), Some((kind, bytes))) => {
                    self.overwrite(now, id, kind, bytes, ttl_ms, user_flags, flags.safe)
                }
                (Found::Absent, Some((kind, bytes))) => {
                    self.insert_scalar(now, hash, key, kind, bytes, ttl_ms, user_flags, flags.safe)
                }
                (_, None) => Err(Error::invalid_argument("attempt to add or replace nil values")),
            };
        }

        match (found, encoded) {
            // nil deletes; deleting an absent key succeeds
            (Found::Live(id) | Found::Stale(id), None) => {
                self.destroy(id);
                Ok(false)
            }
            (Found::Absent, None) => Ok(false),
            (Found::Live(id) | Found::Stale(id), Some((kind, bytes))) => {
                self.overwrite(now, id, kind, bytes, ttl_ms, user_flags, flags.safe)
            }
            (Found::Absent, Some((kind, bytes))) => {
                self.insert_scalar(now, hash, key, kind, bytes, ttl_ms, user_flags, flags.safe)
            }
        }
    }

    /// Replaces the value of an existing entry, in place when the byte
    /// length matches and the old payload is scalar.
    #[allow(clippy::too_many_arguments)]
    fn overwrite(
        &mut self,
        now: u64,
        id: SlotId,
        kind: ScalarKind,
        bytes: Box<[u8]>,
        ttl_ms: u64,
        user_flags: u32,
        safe: bool,
    ) -> Result<bool> {
        if let Some(entry) = self.entries.get_mut(id) {
            if let Payload::Scalar {
                kind: old_kind,
                bytes: old_bytes,
            } = &mut entry.payload
            {
                if old_bytes.len() == bytes.len() {
                    debug!("store: found old entry and value size matched, reusing it");
                    *old_kind = kind;
                    old_bytes.copy_from_slice(&bytes);
                    entry.user_flags = user_flags;
                    entry.expires_at_ms = deadline(now, ttl_ms);
                    return Ok(false);
                }
            }
        }
        debug!("store: found old entry but value size not matched, removing it first");
        let (hash, key) = match self.entries.get(id) {
            Some(entry) => (entry.key_hash, entry.key.to_vec()),
            None => return Err(Error::corrupt("entry vanished during overwrite")),
        };
        self.destroy(id);
        self.insert_scalar(now, hash, &key, kind, bytes, ttl_ms, user_flags, safe)
    }

    /// Allocates and indexes a fresh scalar entry at the recency head.
    #[allow(clippy::too_many_arguments)]
    fn insert_scalar(
        &mut self,
        now: u64,
        hash: u32,
        key: &[u8],
        kind: ScalarKind,
        bytes: Box<[u8]>,
        ttl_ms: u64,
        user_flags: u32,
        safe: bool,
    ) -> Result<bool> {
        let forcible = self.reserve(Entry::scalar_charge(key.len(), bytes.len()), safe, key)?;
        let mut entry =
            Entry::new_scalar(hash, key.to_vec().into_boxed_slice(), kind, bytes, user_flags);
        entry.expires_at_ms = deadline(now, ttl_ms);
        let id = self.entries.insert(entry);
        self.index.insert(&mut self.entries, id);
        self.lru.push_front(&mut self.entries, id);
        Ok(forcible)
    }

    // -- fetch ------------------------------------------------------------

    /// Reads the value under `key`. Absent (or stale without `allow_stale`)
    /// yields `Ok(None)`. Returns `(value, user_flags, is_stale)`.
    pub(crate) fn fetch(
        &mut self,
        now: u64,
        key: &[u8],
        allow_stale: bool,
    ) -> Result<Option<(Value, u32, bool)>> {
        let hash = hash_key(key);
        // a stale read must not delete unrelated stale entries either
        if !allow_stale {
            self.reclaim_lazy(now);
        }
        let (id, stale) = match self.find(now, hash, key) {
            Found::Absent => return Ok(None),
            Found::Stale(_) if !allow_stale => return Ok(None),
            Found::Stale(id) => (id, true),
            Found::Live(id) => (id, false),
        };
        let Some(entry) = self.entries.get(id) else {
            return Ok(None);
        };
        match &entry.payload {
            Payload::List { .. } => Err(Error::TypeMismatch),
            Payload::Scalar { kind, bytes } => {
                let value = decode_scalar(*kind, bytes).inspect_err(|_| {
                    error!(
                        key = %String::from_utf8_lossy(key),
                        "bad scalar value size found for key"
                    );
                })?;
                Ok(Some((value, entry.user_flags, stale)))
            }
        }
    }

    // -- incr -------------------------------------------------------------

    /// Adds `delta` to the number stored under `key`. Returns the new value
    /// and the forcible-eviction flag.
    pub(crate) fn incr(
        &mut self,
        now: u64,
        key: &[u8],
        delta: f64,
        init: Option<f64>,
        ttl: TtlPolicy,
    ) -> Result<(f64, bool)> {
        let hash = hash_key(key);
        self.reclaim_lazy(now);

        let found = self.find(now, hash, key);

        if let Found::Live(id) = found {
            let Some(entry) = self.entries.get_mut(id) else {
                return Err(Error::NotFound);
            };
            let Payload::Scalar {
                kind: ScalarKind::Number,
                bytes,
            } = &mut entry.payload
            else {
                return Err(Error::TypeMismatch);
            };
            if bytes.len() != 8 {
                return Err(Error::TypeMismatch);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            let num = f64::from_le_bytes(raw) + delta;
            bytes.copy_from_slice(&num.to_le_bytes());
            match ttl {
                TtlPolicy::Set(ms) => entry.expires_at_ms = deadline(now, ms),
                TtlPolicy::Clear => entry.expires_at_ms = 0,
                TtlPolicy::Preserve => {}
            }
            return Ok((num, false));
        }

        // absent or stale
        let Some(init) = init else {
            return Err(Error::NotFound);
        };
        let num = init + delta;
        let ttl_ms = match ttl {
            TtlPolicy::Set(ms) => ms,
            TtlPolicy::Clear | TtlPolicy::Preserve => 0,
        };

        if let Found::Stale(id) = found {
            let reusable = match self.entries.get(id) {
                Some(entry) => match &entry.payload {
                    Payload::Scalar { bytes, .. } => bytes.len() == 8,
                    Payload::List { .. } => false,
                },
                None => false,
            };
            if reusable {
                debug!("incr: found old entry and value size matched, reusing it");
                if let Some(entry) = self.entries.get_mut(id) {
                    if let Payload::Scalar { kind, bytes } = &mut entry.payload {
                        *kind = ScalarKind::Number;
                        bytes.copy_from_slice(&num.to_le_bytes());
                    }
                    entry.user_flags = 0;
                    entry.expires_at_ms = deadline(now, ttl_ms);
                }
                return Ok((num, false));
            }
            debug!("incr: found old entry but value size not matched, removing it first");
            self.destroy(id);
        }

        let forcible = self.insert_scalar(
            now,
            hash,
            key,
            ScalarKind::Number,
            Box::new(num.to_le_bytes()),
            ttl_ms,
            0,
            false,
        )?;
        Ok((num, forcible))
    }

    // -- bulk -------------------------------------------------------------

    /// Collects non-stale keys walking the recency list tail→head. Both
    /// passes run under the caller's single lock hold, so they observe the
    /// same snapshot. `limit == 0` means unbounded.
    pub(crate) fn keys(&self, now: u64, limit: usize) -> Vec<Vec<u8>> {
        let mut total = 0usize;
        let mut cur = self.lru.tail();
        while let Some(id) = cur {
            if self.entries.get(id).is_some_and(|e| !e.is_stale(now)) {
                total += 1;
                if limit != 0 && total == limit {
                    break;
                }
            }
            cur = LinkedList::prev_of(&self.entries, id);
        }

        let mut out = Vec::with_capacity(total);
        let mut cur = self.lru.tail();
        while let Some(id) = cur {
            if out.len() == total {
                break;
            }
            if let Some(entry) = self.entries.get(id) {
                if !entry.is_stale(now) {
                    out.push(entry.key.to_vec());
                }
            }
            cur = LinkedList::prev_of(&self.entries, id);
        }
        out
    }

    /// Marks every entry expired, then force-reclaims until empty.
    pub(crate) fn flush_all(&mut self) {
        let mut cur = self.lru.head();
        while let Some(id) = cur {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.expires_at_ms = 1;
            }
            cur = LinkedList::next_of(&self.entries, id);
        }
        while self.reclaim_forced() {}
    }

    /// Deletes stale entries in one tail→head pass, bounded by `limit`
    /// (0 = unbounded). Returns the number freed.
    pub(crate) fn flush_expired(&mut self, now: u64, limit: usize) -> usize {
        let mut freed = 0usize;
        let mut cur = self.lru.tail();
        while let Some(id) = cur {
            let prev = LinkedList::prev_of(&self.entries, id);
            if self.entries.get(id).is_some_and(|e| e.is_stale(now)) {
                self.destroy(id);
                freed += 1;
                if limit != 0 && freed == limit {
                    break;
                }
            }
            cur = prev;
        }
        freed
    }

    // -- ttl --------------------------------------------------------------

    pub(crate) fn ttl(&self, now: u64, key: &[u8]) -> TtlStatus {
        let hash = hash_key(key);
        match self.peek(hash, key).and_then(|id| self.entries.get(id)) {
            None => TtlStatus::Missing,
            Some(entry) if entry.expires_at_ms == 0 => TtlStatus::NoExpiry,
            Some(entry) if entry.expires_at_ms <= now => TtlStatus::Missing,
            Some(entry) => TtlStatus::Remaining(entry.expires_at_ms - now),
        }
    }

    /// Resets the deadline of an existing entry; `ttl_ms == 0` clears it.
    pub(crate) fn set_ttl(&mut self, now: u64, key: &[u8], ttl_ms: u64) -> Result<()> {
        let hash = hash_key(key);
        let Some(id) = self.peek(hash, key) else {
            return Err(Error::NotFound);
        };
        if let Some(entry) = self.entries.get_mut(id) {
            entry.expires_at_ms = deadline(now, ttl_ms);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn debug_validate_invariants(&self) {
        self.lru
            .debug_validate_invariants(&self.entries, self.entries.len());
        self.index.debug_validate_invariants(&self.entries);
        assert_eq!(self.index.len(), self.entries.len());

        let mut charged = 0usize;
        let mut cur = self.lru.head();
        while let Some(id) = cur {
            let entry = self.entries.get(id).expect("entry missing");
            charged += entry.charged_size();
            if let Payload::List { elems, len } = &entry.payload {
                let mut n = 0u32;
                let mut e = elems.head();
                while let Some(elem_id) = e {
                    let elem = self.elems.get(elem_id).expect("element missing");
                    charged += elem.charged_size();
                    n += 1;
                    e = LinkedList::next_of(&self.elems, elem_id);
                }
                assert_eq!(n, *len, "list length out of sync");
            }
            cur = LinkedList::next_of(&self.entries, id);
        }
        assert_eq!(charged, self.arena.stats().used, "byte budget out of sync");
    }
}

/// Absolute deadline for a relative TTL; 0 means no expiry.
fn deadline(now: u64, ttl_ms: u64) -> u64 {
    if ttl_ms > 0 {
        now + ttl_ms
    } else {
        0
    }
}
