//! Publication of a shared cache.
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;

use crate::json_ext::Object;
use crate::json_ext::Value;

/// A cache shared between threads.
///
/// Readers take a snapshot of the current cache and work against it for as long as they
/// want. Writers are serialized: each one computes the next cache from the latest snapshot,
/// off to the side, then publishes it with a pointer swap.
pub struct CacheStore {
    current: RwLock<Arc<Value>>,
    writer: Mutex<()>,
}

impl CacheStore {
    pub fn new(cache: Value) -> Self {
        CacheStore {
            current: RwLock::new(Arc::new(cache)),
            writer: Mutex::new(()),
        }
    }

    /// The current cache.
    pub fn snapshot(&self) -> Arc<Value> {
        self.current.read().clone()
    }

    /// Replaces the cache with the output of `update`, applied to the latest cache.
    ///
    /// The cache is left as it was when `update` fails.
    pub fn update<E>(
        &self,
        update: impl FnOnce(&Value) -> Result<Value, E>,
    ) -> Result<Arc<Value>, E> {
        let _writer = self.writer.lock();
        let previous = self.snapshot();
        let next = Arc::new(update(&previous)?);
        *self.current.write() = next.clone();
        Ok(next)
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        CacheStore::new(Value::Object(Object::new()))
    }
}
