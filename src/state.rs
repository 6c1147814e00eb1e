//! Process-wide shared state bag.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// A shared, typed key-value bag, visible from every dispatch via
/// `Request::state` / `Application::state`.
///
/// Individual operations are atomic; nothing more is. There is no
/// cross-key coordination and no read-modify-write protection across
/// calls — two dispatches racing `get` + `insert` on the same key will
/// interleave. That coordination, if needed, is the caller's to build.
#[derive(Clone, Default)]
pub struct State {
    entries: Arc<RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under `key`, replacing any previous value.
    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.entries.write().insert(key.into(), Arc::new(value));
    }

    /// Fetches the value under `key`, if present and of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let entries = self.entries.read();
        entries.get(key).cloned()?.downcast::<T>().ok()
    }

    /// Removes `key`. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}
