//! The abstract `Registry` the core consumes (§1) to publish and discover
//! role endpoints: `put(key, value)` / `watch(prefix)`. The discovery/KV
//! store itself is out of scope; this module ships one in-memory
//! implementation and one file-backed implementation for single-host runs.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("registry io error: {0}")]
    Io(#[from] io::Error),
    #[error("registry entry is not valid utf-8/json: {0}")]
    Malformed(String),
}

/// A flat key/value endpoint directory.
///
/// `watch` is a point-in-time snapshot rather than a subscription: nothing in
/// this specification requires push notification, and every caller (the
/// scheduler's membership table, a sender locating a builder) already polls
/// at its own cadence.
pub trait Registry {
    fn put(&self, key: &str, value: &str) -> Result<(), RegistryError>;

    fn get(&self, key: &str) -> Result<Option<String>, RegistryError>;

    fn watch(&self, prefix: &str) -> Result<Vec<(String, String)>, RegistryError>;

    fn remove(&self, key: &str) -> Result<(), RegistryError>;
}

#[derive(Default)]
pub struct InMemoryRegistry {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for InMemoryRegistry {
    fn put(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn watch(&self, prefix: &str) -> Result<Vec<(String, String)>, RegistryError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn remove(&self, key: &str) -> Result<(), RegistryError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// A `BTreeMap<String, String>` serialized as a single JSON file, guarded by
/// a process-local mutex. Good enough for a single-host multi-process run;
/// concurrent writers on different hosts would need a real KV store, which
/// is out of scope here.
pub struct FileRegistry {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        if !path.exists() {
            fs::write(&path, "{}")?;
        }
        Ok(Self {
            path,
            guard: Mutex::new(()),
        })
    }

    fn load(&self) -> Result<BTreeMap<String, String>, RegistryError> {
        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| RegistryError::Malformed(e.to_string()))
    }

    fn store(&self, map: &BTreeMap<String, String>) -> Result<(), RegistryError> {
        let raw = serde_json::to_string_pretty(map).map_err(|e| RegistryError::Malformed(e.to_string()))?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl Registry for FileRegistry {
    fn put(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        let _lock = self.guard.lock().unwrap();
        let mut map = self.load()?;
        map.insert(key.to_string(), value.to_string());
        self.store(&map)
    }

    fn get(&self, key: &str) -> Result<Option<String>, RegistryError> {
        let _lock = self.guard.lock().unwrap();
        Ok(self.load()?.get(key).cloned())
    }

    fn watch(&self, prefix: &str) -> Result<Vec<(String, String)>, RegistryError> {
        let _lock = self.guard.lock().unwrap();
        Ok(self
            .load()?
            .into_iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect())
    }

    fn remove(&self, key: &str) -> Result<(), RegistryError> {
        let _lock = self.guard.lock().unwrap();
        let mut map = self.load()?;
        map.remove(key);
        self.store(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_watch_filters_by_prefix() {
        let reg = InMemoryRegistry::new();
        reg.put("builder/a", "10.0.0.1:9000").unwrap();
        reg.put("builder/b", "10.0.0.2:9000").unwrap();
        reg.put("sender/a", "10.0.0.3:9000").unwrap();
        let builders = reg.watch("builder/").unwrap();
        assert_eq!(builders.len(), 2);
    }

    #[test]
    fn file_registry_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let reg = FileRegistry::open(&path).unwrap();
        reg.put("scheduler", "10.0.0.9:8080").unwrap();
        drop(reg);

        let reopened = FileRegistry::open(&path).unwrap();
        assert_eq!(
            reopened.get("scheduler").unwrap(),
            Some("10.0.0.9:8080".to_string())
        );
    }

    #[test]
    fn remove_drops_the_entry() {
        let reg = InMemoryRegistry::new();
        reg.put("k", "v").unwrap();
        reg.remove("k").unwrap();
        assert_eq!(reg.get("k").unwrap(), None);
    }
}
