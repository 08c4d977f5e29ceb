//! Driver Registry
//!
//! Maps driver names to factories that open a [`KeyValueStore`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{KvError, Result};
use super::KeyValueStore;

/// A named factory for store handles
///
/// `location` is driver specific: a directory, a URI, or ignored.
pub trait Driver: Send + Sync {
    fn open(&self, location: &str) -> Result<Box<dyn KeyValueStore>>;
}

/// Thread-safe registry of storage drivers
///
/// Populated once during startup, read afterwards. Lookups take the read
/// lock, so concurrent readers never block each other.
#[derive(Default)]
pub struct Registry {
    drivers: RwLock<BTreeMap<String, Arc<dyn Driver>>>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in driver with default settings
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        super::register_builtin(&registry, Default::default());
        registry
    }

    /// Register `driver` under `name`
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered. Two drivers claiming one
    /// name is a build misconfiguration, not a runtime condition.
    pub fn register(&self, name: &str, driver: impl Driver + 'static) {
        let mut drivers = self.drivers.write();
        if drivers.contains_key(name) {
            panic!("duplicate registration of kv driver '{}'", name);
        }
        drivers.insert(name.to_string(), Arc::new(driver));
        tracing::debug!("Registered kv driver '{}'", name);
    }

    /// Names of the registered drivers, sorted
    pub fn drivers(&self) -> Vec<String> {
        self.drivers.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.read().contains_key(name)
    }

    /// Open a store through the named driver
    ///
    /// The driver's own result, error included, is returned unchanged.
    pub fn open(&self, driver_name: &str, location: &str) -> Result<Box<dyn KeyValueStore>> {
        // Don't hold the lock while the driver does I/O
        let driver = self
            .drivers
            .read()
            .get(driver_name)
            .cloned()
            .ok_or_else(|| KvError::UnknownDriver(driver_name.to_string()))?;

        driver.open(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvdb::MemoryDriver;

    #[test]
    fn test_drivers_are_sorted() {
        let registry = Registry::new();
        registry.register("zeta", MemoryDriver);
        registry.register("alpha", MemoryDriver);
        registry.register("mid", MemoryDriver);

        assert_eq!(registry.drivers(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    #[should_panic(expected = "duplicate registration of kv driver 'memory'")]
    fn test_duplicate_registration_panics() {
        let registry = Registry::new();
        registry.register("memory", MemoryDriver);
        registry.register("memory", MemoryDriver);
    }

    #[test]
    fn test_unknown_driver() {
        let registry = Registry::new();
        let err = registry.open("badgerdb", "/tmp/nowhere").err().unwrap();
        assert!(matches!(err, KvError::UnknownDriver(ref name) if name == "badgerdb"));
    }
}
