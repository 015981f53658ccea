//! Driver registry: dispatches a ConnInfo envelope to a concrete driver.

use std::collections::HashMap;
use std::sync::Arc;

use postern_types::ConnInfo;

use crate::{Driver, DriverError, DummyDriver, IpmiDriver, MockDriver, Obm};

/// Aggregates drivers by type tag. The registry is itself a [`Driver`]: it
/// expects its info to be the `{"type": ..., "info": ...}` envelope and
/// shells out to the registered driver for `type`, handing it the raw
/// `info` payload.
pub struct Registry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// The standard registry: `ipmi`, `mock`, and `dummy`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("ipmi", Arc::new(IpmiDriver));
        registry.register("mock", Arc::new(MockDriver));
        registry.register("dummy", Arc::new(DummyDriver));
        registry
    }

    /// Register `driver` under `type_tag`, replacing any previous entry.
    pub fn register(&mut self, type_tag: &str, driver: Arc<dyn Driver>) {
        self.drivers.insert(type_tag.to_owned(), driver);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for Registry {
    fn get_obm(&self, info: &[u8]) -> Result<Arc<dyn Obm>, DriverError> {
        let envelope = ConnInfo::from_slice(info)?;
        let driver = self
            .drivers
            .get(&envelope.driver_type)
            .ok_or_else(|| DriverError::UnknownType(envelope.driver_type.clone()))?;
        driver.get_obm(envelope.info_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatches_to_registered_driver() {
        let registry = Registry::standard();
        let obm = registry.get_obm(br#"{"type": "mock", "info": {"addr": "a1"}}"#);
        assert!(obm.is_ok());
    }

    #[test]
    fn test_unknown_type() {
        let registry = Registry::standard();
        assert!(matches!(
            registry.get_obm(br#"{"type": "nope", "info": {}}"#),
            Err(DriverError::UnknownType(t)) if t == "nope"
        ));
    }

    #[test]
    fn test_malformed_envelope() {
        let registry = Registry::standard();
        assert!(matches!(
            registry.get_obm(b"not json"),
            Err(DriverError::MalformedInfo(_))
        ));
    }

    #[test]
    fn test_malformed_driver_payload() {
        let registry = Registry::standard();
        // Envelope parses, but the mock driver wants an object with addr.
        assert!(matches!(
            registry.get_obm(br#"{"type": "mock", "info": 42}"#),
            Err(DriverError::MalformedInfo(_))
        ));
    }
}
