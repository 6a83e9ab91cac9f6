//! Type-keyed dependency container.
//!
//! A [`Container`] holds shared services (database handles, clients,
//! settings objects) that filters resolve by type at render time. Entries
//! are stored as `Arc<T>`, so a resolved service can be kept beyond the
//! lookup without holding any lock.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{TemplateError, TemplateResult};

#[derive(Default)]
pub struct Container {
    services: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any previous one of the same type.
    pub fn register<T: Any + Send + Sync>(&self, service: T) {
        self.register_arc(Arc::new(service));
    }

    pub fn register_arc<T: Any + Send + Sync>(&self, service: Arc<T>) {
        self.services.write().insert(TypeId::of::<T>(), service);
    }

    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let service = self.services.read().get(&TypeId::of::<T>()).cloned()?;
        service.downcast::<T>().ok()
    }

    /// Like [`resolve`](Self::resolve), failing when the type is not registered.
    pub fn resolve_required<T: Any + Send + Sync>(&self) -> TemplateResult<Arc<T>> {
        self.resolve::<T>().ok_or_else(|| {
            TemplateError::invalid_argument(format!(
                "service not registered: {}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.services.read().contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct SiteName(&'static str);

    #[test]
    fn test_register_and_resolve() {
        let container = Container::new();
        assert!(container.resolve::<SiteName>().is_none());
        container.register(SiteName("docs"));
        assert_eq!(container.resolve::<SiteName>().unwrap().0, "docs");
        assert!(container.contains::<SiteName>());
    }

    #[test]
    fn test_register_replaces() {
        let container = Container::new();
        container.register(1u32);
        container.register(2u32);
        assert_eq!(*container.resolve::<u32>().unwrap(), 2);
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_resolve_required_names_the_type() {
        let err = Container::new().resolve_required::<SiteName>().unwrap_err();
        assert!(err.to_string().contains("SiteName"));
    }
}
