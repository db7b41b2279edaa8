use parking_lot::RwLock;
use saai_core::Worker;
use std::sync::Arc;

/// Registered workers in registration (startup) order.
///
/// Written only during startup; readers clone the `Arc` out of a short read
/// lock and never hold it across an await.
#[derive(Default)]
pub struct WorkerRegistry {
    entries: RwLock<Vec<(String, Arc<dyn Worker>)>>,
}

impl WorkerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a worker. Names are unique by configuration validation.
    pub fn insert(&self, name: &str, worker: Arc<dyn Worker>) {
        self.entries.write().push((name.to_string(), worker));
    }

    /// Look up a worker by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.entries
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, w)| Arc::clone(w))
    }

    /// Worker names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Cloned handles in registration order.
    pub fn entries(&self) -> Vec<(String, Arc<dyn Worker>)> {
        self.entries.read().clone()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
