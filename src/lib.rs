//! zonekit: named in-process cache zones with LRU eviction, per-key TTLs,
//! and double-ended list values.
//!
//! See `DESIGN.md` for internal architecture and invariants.

pub mod arena;
pub mod clock;
pub mod ds;
pub mod error;
pub mod registry;
pub mod value;
pub mod zone;

mod entry;

pub mod prelude;

pub use error::{Error, Result};
pub use registry::ZoneRegistry;
pub use value::{ListEnd, ListValue, StoreFlags, TtlPolicy, Value, ValueType};
pub use zone::{Fetched, Incremented, StoreOptions, Stored, TtlStatus, Zone};
