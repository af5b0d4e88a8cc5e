//! Builder membership (§4.6): a single mutex-protected registry, short and
//! non-blocking operations only (§5).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct BuilderInfo {
    pub builder_id: String,
    pub endpoint: String,
    pub capacity: u32,
    pub free_buffers: u32,
    pub last_update: Instant,
}

/// The builder fleet, keyed by `builderId`.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: Mutex<HashMap<String, BuilderInfo>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `TfBuilderConnectionRequest` (§4.6): idempotent, `lastUpdateTs = now`.
    pub fn connect(&self, builder_id: &str, endpoint: &str, capacity: u32) {
        let mut builders = self.builders.lock().unwrap();
        builders.insert(
            builder_id.to_string(),
            BuilderInfo {
                builder_id: builder_id.to_string(),
                endpoint: endpoint.to_string(),
                capacity,
                free_buffers: capacity,
                last_update: Instant::now(),
            },
        );
    }

    pub fn disconnect(&self, builder_id: &str) {
        self.builders.lock().unwrap().remove(builder_id);
    }

    /// `TfBuilderUpdate` heartbeat: refreshes `lastUpdateTs`/`freeBuffers`.
    pub fn update(&self, builder_id: &str, free_buffers: u32) -> bool {
        let mut builders = self.builders.lock().unwrap();
        match builders.get_mut(builder_id) {
            Some(info) => {
                info.free_buffers = free_buffers;
                info.last_update = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Selects the builder for a newly-READY TFID (§4.6 step 1): among
    /// builders whose heartbeat is within `timeout` and `free_buffers > 0`,
    /// the one with the largest `free_buffers`, ties broken by lowest
    /// `builder_id` in lexicographic order for a deterministic outcome.
    pub fn select(&self, timeout: Duration) -> Option<String> {
        let builders = self.builders.lock().unwrap();
        let now = Instant::now();
        builders
            .values()
            .filter(|b| now.saturating_duration_since(b.last_update) <= timeout && b.free_buffers > 0)
            .max_by(|a, b| {
                a.free_buffers
                    .cmp(&b.free_buffers)
                    .then_with(|| b.builder_id.cmp(&a.builder_id))
            })
            .map(|b| b.builder_id.clone())
    }

    /// Decrements `free_buffers` at assignment-emission time (§9 Open
    /// Questions — resolved optimistically, see the crate's DESIGN ledger).
    pub fn decrement_free_buffers(&self, builder_id: &str) {
        if let Some(info) = self.builders.lock().unwrap().get_mut(builder_id) {
            info.free_buffers = info.free_buffers.saturating_sub(1);
        }
    }

    /// Restores a builder's `free_buffers` after a `SendFailed` report.
    pub fn restore_free_buffer(&self, builder_id: &str) {
        if let Some(info) = self.builders.lock().unwrap().get_mut(builder_id) {
            info.free_buffers = info.free_buffers.saturating_add(1).min(info.capacity);
        }
    }

    pub fn endpoint_of(&self, builder_id: &str) -> Option<String> {
        self.builders.lock().unwrap().get(builder_id).map(|b| b.endpoint.clone())
    }

    /// Removes and returns every builder whose heartbeat is older than
    /// `timeout` (§4.6 Builder timeout).
    pub fn evict_stale(&self, timeout: Duration) -> Vec<String> {
        let mut builders = self.builders.lock().unwrap();
        let now = Instant::now();
        let stale: Vec<String> = builders
            .values()
            .filter(|b| now.saturating_duration_since(b.last_update) > timeout)
            .map(|b| b.builder_id.clone())
            .collect();
        for id in &stale {
            builders.remove(id);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.builders.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_largest_free_buffers_with_lexicographic_tiebreak() {
        let reg = BuilderRegistry::new();
        reg.connect("b-2", "10.0.0.2:9000", 1);
        reg.connect("b-1", "10.0.0.1:9000", 1);
        assert_eq!(reg.select(Duration::from_secs(5)), Some("b-1".to_string()));
    }

    #[test]
    fn excludes_builders_with_no_free_buffers() {
        let reg = BuilderRegistry::new();
        reg.connect("b-1", "10.0.0.1:9000", 1);
        reg.decrement_free_buffers("b-1");
        assert_eq!(reg.select(Duration::from_secs(5)), None);
    }

    #[test]
    fn evict_stale_removes_only_expired_builders() {
        let reg = BuilderRegistry::new();
        reg.connect("b-1", "10.0.0.1:9000", 4);
        std::thread::sleep(Duration::from_millis(20));
        let evicted = reg.evict_stale(Duration::from_millis(5));
        assert_eq!(evicted, vec!["b-1".to_string()]);
        assert!(reg.is_empty());
    }
}
