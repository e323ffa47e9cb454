//! Named-zone registry: create, look up, and enumerate zones.
//!
//! A host process typically creates all of its zones at startup from
//! configuration, then hands workers a shared registry to resolve zones
//! by name. Zones are fully independent; the registry lock only guards
//! the name table, never a zone's data.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::zone::Zone;

/// Shared table of named [`Zone`]s.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: RwLock<FxHashMap<String, Arc<Zone>>>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a zone. Fails with [`Error::InvalidArgument`]
    /// for an empty name or a capacity below [`crate::zone::MIN_ZONE_BYTES`],
    /// and with [`Error::AlreadyExists`] for a duplicate name.
    pub fn create(&self, name: &str, capacity: usize) -> Result<Arc<Zone>> {
        let zone = Arc::new(Zone::new(name, capacity)?);
        self.register(zone)
    }

    /// [`ZoneRegistry::create`] with an injected clock.
    pub fn create_with_clock(
        &self,
        name: &str,
        capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Zone>> {
        let zone = Arc::new(Zone::with_clock(name, capacity, clock)?);
        self.register(zone)
    }

    fn register(&self, zone: Arc<Zone>) -> Result<Arc<Zone>> {
        let mut zones = self.zones.write();
        if zones.contains_key(zone.name()) {
            return Err(Error::AlreadyExists);
        }
        zones.insert(zone.name().to_string(), Arc::clone(&zone));
        Ok(zone)
    }

    /// Resolves a zone by name.
    pub fn find(&self, name: &str) -> Result<Arc<Zone>> {
        self.zones.read().get(name).cloned().ok_or(Error::NotFound)
    }

    /// Names of all registered zones, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.zones.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::zone::MIN_ZONE_BYTES;

    #[test]
    fn create_find_list() {
        let registry = ZoneRegistry::new();
        registry.create("sessions", MIN_ZONE_BYTES).unwrap();
        registry.create("counters", MIN_ZONE_BYTES).unwrap();

        let zone = registry.find("sessions").unwrap();
        assert_eq!(zone.name(), "sessions");
        assert_eq!(registry.find("missing"), Err(Error::NotFound));
        assert_eq!(registry.names(), vec!["counters", "sessions"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = ZoneRegistry::new();
        registry.create("cache", MIN_ZONE_BYTES).unwrap();
        assert_eq!(
            registry.create("cache", MIN_ZONE_BYTES).err(),
            Some(Error::AlreadyExists)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_zones_are_not_registered() {
        let registry = ZoneRegistry::new();
        assert!(registry.create("", MIN_ZONE_BYTES).is_err());
        assert!(registry.create("tiny", 16).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn zones_are_independent() {
        let registry = ZoneRegistry::new();
        let a = registry.create("a", MIN_ZONE_BYTES).unwrap();
        let b = registry.create("b", MIN_ZONE_BYTES).unwrap();
        a.set(b"k", &Value::from("in a")).unwrap();
        assert_eq!(b.fetch(b"k").unwrap(), None);
        assert!(a.fetch(b"k").unwrap().is_some());
    }
}
