//! Convenience re-exports for typical zone usage.
//!
//! ```
//! use zonekit::prelude::*;
//!
//! let registry = ZoneRegistry::new();
//! let zone = registry.create("sessions", 64 * 1024).unwrap();
//! zone.set(b"user:1", &Value::from("alice")).unwrap();
//! assert!(zone.fetch(b"user:1").unwrap().is_some());
//! ```

pub use crate::arena::ArenaStats;
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::error::{Error, Result};
pub use crate::registry::ZoneRegistry;
pub use crate::value::{ListEnd, ListValue, StoreFlags, TtlPolicy, Value, ValueType};
pub use crate::zone::{
    Fetched, Incremented, StoreOptions, Stored, TtlStatus, Zone, MAX_KEY_BYTES, MIN_ZONE_BYTES,
};
