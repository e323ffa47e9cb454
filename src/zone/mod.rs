//! One named cache zone: a mutex-serialized engine instance.
//!
//! ## Concurrency model
//!
//! A zone is a passive, lock-protected structure. Every public operation
//! acquires the zone mutex on entry, runs to completion (including any
//! copy-out of value bytes), and releases it on every exit path via guard
//! drop. There is no per-key locking; operations on one zone observe a
//! total order equal to lock-acquisition order. Distinct zones never share
//! a lock.
//!
//! ## Operation surface
//!
//! | Operation                     | Recency   | Notes                             |
//! |-------------------------------|-----------|-----------------------------------|
//! | `store` / `set` / `add` / ... | refreshes | upsert/add/replace, safe variants |
//! | `delete`                      | -         | nil store; absent key is fine     |
//! | `fetch` / `fetch_stale`       | refreshes | absent yields `None`, not an error|
//! | `incr`                        | refreshes | optional init + TTL policy        |
//! | `push` / `pop` / `llen`       | refreshes | double-ended list operations      |
//! | `ttl` / `set_ttl`             | peeks     | never perturbs eviction order     |
//! | `keys`                        | -         | snapshot under one lock hold      |
//! | `flush_all` / `flush_expired` | -         | bulk expiry                       |

mod core;
mod list;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::arena::ArenaStats;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::value::{ListEnd, ListValue, StoreFlags, TtlPolicy, Value};

use self::core::ZoneCore;

/// Smallest accepted zone capacity in bytes.
pub const MIN_ZONE_BYTES: usize = 8192;

/// Longest accepted key in bytes.
pub const MAX_KEY_BYTES: usize = 65535;

/// Options for [`Zone::store`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub flags: StoreFlags,
    /// Relative TTL in milliseconds; 0 means no expiry.
    pub ttl_ms: u64,
    /// Opaque word stored with the entry and returned by fetches.
    pub user_flags: u32,
}

/// Outcome of a successful store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stored {
    /// A live (non-stale) entry was evicted to make room for this write.
    pub forcible: bool,
}

/// Outcome of a successful increment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Incremented {
    pub value: f64,
    /// A live entry was evicted to make room for the fresh insert.
    pub forcible: bool,
}

/// A fetched value with its stored metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub value: Value,
    pub user_flags: u32,
    /// Only ever `true` for [`Zone::fetch_stale`] hits past their deadline.
    pub is_stale: bool,
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// Milliseconds until the deadline passes.
    Remaining(u64),
    /// The entry exists and never expires.
    NoExpiry,
    /// No such key, or its deadline has already passed.
    Missing,
}

/// A named, independently sized cache instance.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct Zone {
    name: String,
    capacity: usize,
    clock: Arc<dyn Clock>,
    core: Mutex<ZoneCore>,
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.capacity == other.capacity
    }
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Zone {
    /// Creates a zone backed by the system clock.
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        Self::with_clock(name, capacity, Arc::new(SystemClock))
    }

    /// Creates a zone with an injected clock (deterministic expiry tests).
    pub fn with_clock(
        name: impl Into<String>,
        capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_argument("empty zone name"));
        }
        if capacity < MIN_ZONE_BYTES {
            return Err(Error::invalid_argument("zone capacity below minimum"));
        }
        Ok(Self {
            name,
            capacity,
            clock,
            core: Mutex::new(ZoneCore::new(capacity)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently unused in the zone's budget.
    pub fn free_bytes(&self) -> usize {
        self.core.lock().free_bytes()
    }

    /// Number of entries currently indexed, stale ones included.
    pub fn len(&self) -> usize {
        self.core.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arena usage counters; the alloc/free counts expose whether an
    /// overwrite happened in place.
    pub fn stats(&self) -> ArenaStats {
        self.core.lock().stats()
    }

    // -- stores -----------------------------------------------------------

    /// Stores `value` under `key` honoring [`StoreOptions`]. A nil value
    /// deletes the key (absent keys included) unless add/replace is set.
    pub fn store(&self, key: &[u8], value: &Value, options: StoreOptions) -> Result<Stored> {
        check_key(key)?;
        let now = self.clock.now_ms();
        let forcible = self.core.lock().store(
            now,
            key,
            value,
            options.flags,
            options.ttl_ms,
            options.user_flags,
        )?;
        Ok(Stored { forcible })
    }

    /// Unconditional upsert.
    pub fn set(&self, key: &[u8], value: &Value) -> Result<Stored> {
        self.store(key, value, StoreOptions::default())
    }

    /// Upsert that fails with [`Error::OutOfMemory`] rather than evicting
    /// live entries.
    pub fn safe_set(&self, key: &[u8], value: &Value) -> Result<Stored> {
        self.store(key, value, flag_options(StoreFlags { safe: true, ..Default::default() }))
    }

    /// Store that fails with [`Error::AlreadyExists`] when the key is live.
    pub fn add(&self, key: &[u8], value: &Value) -> Result<Stored> {
        self.store(key, value, flag_options(StoreFlags { add: true, ..Default::default() }))
    }

    /// [`Zone::add`] without forced eviction.
    pub fn safe_add(&self, key: &[u8], value: &Value) -> Result<Stored> {
        self.store(
            key,
            value,
            flag_options(StoreFlags { add: true, safe: true, ..Default::default() }),
        )
    }

    /// Store that fails with [`Error::NotFound`] unless the key is live.
    pub fn replace(&self, key: &[u8], value: &Value) -> Result<Stored> {
        self.store(key, value, flag_options(StoreFlags { replace: true, ..Default::default() }))
    }

    /// Removes `key`; succeeds even when absent.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.store(key, &Value::Nil, StoreOptions::default())
            .map(|_| ())
    }

    // -- reads ------------------------------------------------------------

    /// Reads the value under `key`. Absent and expired keys yield
    /// `Ok(None)`.
    pub fn fetch(&self, key: &[u8]) -> Result<Option<Fetched>> {
        self.fetch_impl(key, false)
    }

    /// Reads the value under `key`, returning expired-but-unreclaimed
    /// values with `is_stale` set. Skips the lazy expiry sweep so the read
    /// has no side effect on other stale entries.
    pub fn fetch_stale(&self, key: &[u8]) -> Result<Option<Fetched>> {
        self.fetch_impl(key, true)
    }

    fn fetch_impl(&self, key: &[u8], allow_stale: bool) -> Result<Option<Fetched>> {
        check_key(key)?;
        let now = self.clock.now_ms();
        let fetched = self.core.lock().fetch(now, key, allow_stale)?;
        Ok(fetched.map(|(value, user_flags, is_stale)| Fetched {
            value,
            user_flags,
            is_stale,
        }))
    }

    // -- numeric ----------------------------------------------------------

    /// Adds `delta` to the number under `key`. With `init`, an absent or
    /// stale key behaves as if it held `init`; without, it is
    /// [`Error::NotFound`]. `ttl` selects what happens to the deadline.
    pub fn incr(
        &self,
        key: &[u8],
        delta: f64,
        init: Option<f64>,
        ttl: TtlPolicy,
    ) -> Result<Incremented> {
        check_key(key)?;
        let now = self.clock.now_ms();
        let (value, forcible) = self.core.lock().incr(now, key, delta, init, ttl)?;
        Ok(Incremented { value, forcible })
    }

    // -- lists ------------------------------------------------------------

    /// Appends a value at the chosen end of the list under `key`; returns
    /// the new element count.
    pub fn push(&self, key: &[u8], end: ListEnd, value: &ListValue) -> Result<u32> {
        check_key(key)?;
        let now = self.clock.now_ms();
        self.core.lock().push(now, key, end, value)
    }

    /// Removes and returns the element at the chosen end; `Ok(None)` for
    /// absent, stale, or (impossible on live lists) empty keys.
    pub fn pop(&self, key: &[u8], end: ListEnd) -> Result<Option<ListValue>> {
        check_key(key)?;
        let now = self.clock.now_ms();
        self.core.lock().pop(now, key, end)
    }

    /// Element count of the list under `key`; 0 when absent or stale.
    pub fn llen(&self, key: &[u8]) -> Result<u32> {
        check_key(key)?;
        let now = self.clock.now_ms();
        self.core.lock().llen(now, key)
    }

    // -- expiry -----------------------------------------------------------

    /// Remaining lifetime of `key`, without refreshing its recency.
    pub fn ttl(&self, key: &[u8]) -> Result<TtlStatus> {
        check_key(key)?;
        let now = self.clock.now_ms();
        Ok(self.core.lock().ttl(now, key))
    }

    /// Resets the deadline of `key` (`ttl_ms == 0` clears it), without
    /// refreshing its recency. [`Error::NotFound`] when absent.
    pub fn set_ttl(&self, key: &[u8], ttl_ms: u64) -> Result<()> {
        check_key(key)?;
        let now = self.clock.now_ms();
        self.core.lock().set_ttl(now, key, ttl_ms)
    }

    // -- bulk -------------------------------------------------------------

    /// Keys of all non-stale entries, least recently used first. `limit ==
    /// 0` means unbounded. Runs under one lock hold, so the result is a
    /// consistent snapshot; other zone traffic blocks for its duration.
    pub fn keys(&self, limit: usize) -> Vec<Vec<u8>> {
        let now = self.clock.now_ms();
        self.core.lock().keys(now, limit)
    }

    /// Expires and removes every entry.
    pub fn flush_all(&self) {
        self.core.lock().flush_all();
    }

    /// Removes up to `limit` stale entries (0 = unbounded); returns how
    /// many were freed.
    pub fn flush_expired(&self, limit: usize) -> usize {
        let now = self.clock.now_ms();
        self.core.lock().flush_expired(now, limit)
    }
}

fn flag_options(flags: StoreFlags) -> StoreOptions {
    StoreOptions {
        flags,
        ..Default::default()
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("empty key"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(Error::invalid_argument("key too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_validates_arguments() {
        assert!(Zone::new("cache", MIN_ZONE_BYTES).is_ok());
        assert!(matches!(
            Zone::new("", MIN_ZONE_BYTES),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Zone::new("cache", MIN_ZONE_BYTES - 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn keys_are_validated() {
        let zone = Zone::new("cache", MIN_ZONE_BYTES).unwrap();
        assert!(matches!(
            zone.set(b"", &Value::Bool(true)),
            Err(Error::InvalidArgument(_))
        ));
        let long = vec![b'k'; MAX_KEY_BYTES + 1];
        assert!(matches!(
            zone.fetch(&long),
            Err(Error::InvalidArgument(_))
        ));
        let exact = vec![b'k'; MAX_KEY_BYTES];
        assert!(zone.ttl(&exact).is_ok());
    }

    #[test]
    fn accessors_report_configuration() {
        let zone = Zone::new("cache", 2 * MIN_ZONE_BYTES).unwrap();
        assert_eq!(zone.name(), "cache");
        assert_eq!(zone.capacity(), 2 * MIN_ZONE_BYTES);
        assert_eq!(zone.free_bytes(), 2 * MIN_ZONE_BYTES);
        assert!(zone.is_empty());

        zone.set(b"k", &Value::Bool(true)).unwrap();
        assert_eq!(zone.len(), 1);
        assert!(zone.free_bytes() < 2 * MIN_ZONE_BYTES);
    }

    #[test]
    fn delete_is_idempotent() {
        let zone = Zone::new("cache", MIN_ZONE_BYTES).unwrap();
        zone.set(b"k", &Value::from("v")).unwrap();
        zone.delete(b"k").unwrap();
        zone.delete(b"k").unwrap();
        assert_eq!(zone.fetch(b"k").unwrap(), None);
    }
}
