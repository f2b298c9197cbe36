//! Latest decoded readings per device.

use log::warn;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// One device's readings: reading name to value.
pub type Readings = Map<String, Value>;

/// Concurrent readings cache.
///
/// A single mutex guards the whole map; `merge` and `snapshot` each hold it
/// for the full operation, so a snapshot never sees a half-merged device.
#[derive(Debug, Default)]
pub struct ReadingsStore {
    inner: Mutex<BTreeMap<String, Readings>>,
}

impl ReadingsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Readings>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Readings mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Merge `readings` into the entry for `name`, overwriting existing keys.
    pub fn merge(&self, name: &str, readings: Readings) {
        let mut map = self.lock();
        match map.get_mut(name) {
            Some(existing) => existing.extend(readings),
            None => {
                map.insert(name.to_string(), readings);
            }
        }
    }

    /// Copy of every device's readings.
    pub fn snapshot(&self) -> BTreeMap<String, Readings> {
        self.lock().clone()
    }

    /// Copy of one device's readings.
    pub fn get(&self, name: &str) -> Option<Readings> {
        self.lock().get(name).cloned()
    }

    /// Number of devices with readings.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
