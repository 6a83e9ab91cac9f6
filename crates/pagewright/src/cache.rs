//! Concurrent caches owned by a [`TemplateContext`](crate::TemplateContext).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TemplateResult;

type Entry = Arc<dyn Any + Send + Sync>;

/// A cache keyed by `(type, text)`.
///
/// Each entry is stored once per Rust type, so unrelated features can key by
/// the same expression text without colliding. Entries live as long as the
/// cache; there is no eviction.
///
/// ```rust
/// use pagewright::cache::TypedCache;
///
/// let cache = TypedCache::new();
/// let len = cache.get_or_try_insert_with("hello", || Ok("hello".len())).unwrap();
/// assert_eq!(*len, 5);
/// assert!(cache.get::<String>("hello").is_none());
/// ```
#[derive(Default)]
pub struct TypedCache {
    entries: RwLock<HashMap<(TypeId, String), Entry>>,
}

impl TypedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entry = self
            .entries
            .read()
            .get(&(TypeId::of::<T>(), key.to_string()))
            .cloned()?;
        entry.downcast::<T>().ok()
    }

    /// Stores `value`, keeping an existing entry if another caller won the
    /// race. Returns the entry that ended up in the cache.
    pub fn insert<T: Any + Send + Sync>(&self, key: &str, value: T) -> Arc<T> {
        let entry = self
            .entries
            .write()
            .entry((TypeId::of::<T>(), key.to_string()))
            .or_insert_with(|| Arc::new(value) as Entry)
            .clone();
        match entry.downcast::<T>() {
            Ok(value) => value,
            Err(_) => unreachable!("entries are keyed by their own TypeId"),
        }
    }

    /// Returns the cached entry or builds, stores and returns a new one.
    ///
    /// `build` runs outside the lock, so two callers may both build; only one
    /// result is kept.
    pub fn get_or_try_insert_with<T, F>(&self, key: &str, build: F) -> TemplateResult<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> TemplateResult<T>,
    {
        if let Some(hit) = self.get::<T>(key) {
            return Ok(hit);
        }
        tracing::trace!(key, type_name = std::any::type_name::<T>(), "cache miss");
        Ok(self.insert(key, build()?))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for TypedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCache").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builds_once() {
        let cache = TypedCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = cache
                .get_or_try_insert_with("k", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .unwrap();
            assert_eq!(v.len(), 3);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_key_different_types() {
        let cache = TypedCache::new();
        cache.insert("k", 1u32);
        cache.insert("k", "text".to_string());
        assert_eq!(*cache.get::<u32>("k").unwrap(), 1);
        assert_eq!(cache.get::<String>("k").unwrap().as_str(), "text");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let cache = TypedCache::new();
        let err = cache.get_or_try_insert_with::<u8, _>("k", || {
            Err(crate::TemplateError::invalid_argument("nope"))
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_first_insert_wins() {
        let cache = TypedCache::new();
        cache.insert("k", 1i32);
        assert_eq!(*cache.insert("k", 2i32), 1);
    }
}
