//! Service registry (C1): a name → instance table with introspection by
//! declared interface capabilities.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::RegistrationError;

struct ServiceEntry {
    instance: Arc<dyn Any + Send + Sync>,
    capabilities: HashSet<String>,
    order: usize,
}

/// Write-once-per-name service table. Many-reader/serialized-writer;
/// sealed after the Start barrier (§4.1).
#[derive(Default)]
pub struct ServiceRegistry {
    entries: RwLock<HashMap<String, ServiceEntry>>,
    sealed: AtomicBool,
    next_order: std::sync::atomic::AtomicUsize,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named service instance with its declared capability set.
    pub fn register(
        &self,
        name: impl Into<String>,
        instance: Arc<dyn Any + Send + Sync>,
        capabilities: impl IntoIterator<Item = String>,
    ) -> Result<(), RegistrationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        if self.sealed.load(Ordering::Acquire) {
            return Err(RegistrationError::Sealed);
        }

        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(RegistrationError::AlreadyExists(name));
        }
        let order = self.next_order.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            name,
            ServiceEntry {
                instance,
                capabilities: capabilities.into_iter().collect(),
                order,
            },
        );
        Ok(())
    }

    /// Look up a service by name and downcast it to `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, RegistrationError> {
        let entries = self.entries.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| RegistrationError::NotFound(name.to_string()))?;
        entry
            .instance
            .clone()
            .downcast::<T>()
            .map_err(|_| RegistrationError::TypeMismatch {
                name: name.to_string(),
            })
    }

    /// Every service whose declared capability set is a superset of
    /// `required`, in registration order.
    pub fn get_by_capability(&self, required: &HashSet<String>) -> Vec<(String, Arc<dyn Any + Send + Sync>)> {
        let entries = self.entries.read();
        let mut matches: Vec<(usize, String, Arc<dyn Any + Send + Sync>)> = entries
            .iter()
            .filter(|(_, entry)| required.is_subset(&entry.capabilities))
            .map(|(name, entry)| (entry.order, name.clone(), entry.instance.clone()))
            .collect();
        matches.sort_by_key(|(order, ..)| *order);
        matches.into_iter().map(|(_, name, inst)| (name, inst)).collect()
    }

    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read();
        let mut names: Vec<(usize, String)> = entries
            .iter()
            .map(|(name, entry)| (entry.order, name.clone()))
            .collect();
        names.sort_by_key(|(order, _)| *order);
        names.into_iter().map(|(_, name)| name).collect()
    }

    /// Seal the registry; subsequent writes return `Sealed`. Called by the
    /// lifecycle coordinator once the Start barrier is crossed.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_get_round_trips() {
        let registry = ServiceRegistry::new();
        registry
            .register("router", Arc::new(42i32), ["router".to_string()])
            .unwrap();

        let got = registry.get::<i32>("router").unwrap();
        assert_eq!(*got, 42);
    }

    #[test]
    fn duplicate_name_is_error() {
        let registry = ServiceRegistry::new();
        registry.register("a", Arc::new(1i32), []).unwrap();
        let err = registry.register("a", Arc::new(2i32), []).unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyExists(_)));
    }

    #[test]
    fn empty_name_is_rejected() {
        let registry = ServiceRegistry::new();
        let err = registry.register("", Arc::new(1i32), []).unwrap_err();
        assert!(matches!(err, RegistrationError::EmptyName));
    }

    #[test]
    fn type_mismatch_on_wrong_downcast() {
        let registry = ServiceRegistry::new();
        registry.register("a", Arc::new(1i32), []).unwrap();
        let err = registry.get::<String>("a").unwrap_err();
        assert!(matches!(err, RegistrationError::TypeMismatch { .. }));
    }

    #[test]
    fn capability_lookup_returns_superset_matches_in_registration_order() {
        let registry = ServiceRegistry::new();
        registry
            .register("a", Arc::new(1i32), ["http".to_string()])
            .unwrap();
        registry
            .register("b", Arc::new(2i32), ["http".to_string(), "metrics".to_string()])
            .unwrap();
        registry.register("c", Arc::new(3i32), ["metrics".to_string()]).unwrap();

        let required: HashSet<String> = ["http".to_string()].into_iter().collect();
        let matches = registry.get_by_capability(&required);
        let names: Vec<_> = matches.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn sealed_registry_rejects_writes() {
        let registry = ServiceRegistry::new();
        registry.seal();
        let err = registry.register("a", Arc::new(1i32), []).unwrap_err();
        assert!(matches!(err, RegistrationError::Sealed));
    }
}
