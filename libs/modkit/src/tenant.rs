//! Tenant service (C4): a tenant-ID → (section → config-provider) store
//! that notifies tenant-aware modules of tenant lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::ConfigProvider;
use crate::error::TenantError;

/// A non-empty opaque tenant identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self, TenantError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TenantError::EmptyId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback surface for tenant-aware modules (§6.1's `TenantAware`
/// capability). Implemented as a trait here (rather than a raw closure
/// pair) so modules can hold state across calls.
pub trait TenantAware: Send + Sync {
    fn on_tenant_registered(&self, id: &TenantId);
    fn on_tenant_removed(&self, id: &TenantId);
}

struct TenantRecord {
    sections: HashMap<String, Arc<dyn ConfigProvider>>,
}

/// Tenant-ID → per-section config providers, plus the set of tenant-aware
/// modules to notify on tenant lifecycle events.
#[derive(Default)]
pub struct TenantService {
    tenants: RwLock<HashMap<TenantId, TenantRecord>>,
    aware_modules: RwLock<Vec<Arc<dyn TenantAware>>>,
}

impl TenantService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant with its per-section config. Every already
    /// registered tenant-aware module receives exactly one
    /// `on_tenant_registered` callback, fired after the write lock is
    /// released to avoid callback→lock deadlocks (§5).
    pub fn register_tenant(
        &self,
        id: TenantId,
        sections: HashMap<String, Arc<dyn ConfigProvider>>,
    ) -> Result<(), TenantError> {
        {
            let mut tenants = self.tenants.write();
            if tenants.contains_key(&id) {
                return Err(TenantError::AlreadyExists(id.to_string()));
            }
            tenants.insert(id.clone(), TenantRecord { sections });
        }

        let modules = self.aware_modules.read().clone();
        for module in modules {
            module.on_tenant_registered(&id);
        }
        Ok(())
    }

    pub fn remove_tenant(&self, id: &TenantId) -> Result<(), TenantError> {
        {
            let mut tenants = self.tenants.write();
            if tenants.remove(id).is_none() {
                return Err(TenantError::NotFound(id.to_string()));
            }
        }

        let modules = self.aware_modules.read().clone();
        for module in modules {
            module.on_tenant_removed(id);
        }
        Ok(())
    }

    pub fn get_tenant_config(
        &self,
        id: &TenantId,
        section: &str,
    ) -> Result<Arc<dyn ConfigProvider>, TenantError> {
        let tenants = self.tenants.read();
        let record = tenants
            .get(id)
            .ok_or_else(|| TenantError::NotFound(id.to_string()))?;
        record
            .sections
            .get(section)
            .cloned()
            .ok_or_else(|| TenantError::NotFound(format!("{id}/{section}")))
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        let mut ids: Vec<_> = self.tenants.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Register a tenant-aware module. It receives one
    /// `on_tenant_registered` callback per already-known tenant, in
    /// tenant-registration order, ensuring late joiners see every tenant
    /// exactly once regardless of registration order (§4.4's late-join
    /// symmetry).
    pub fn register_tenant_aware_module(&self, module: Arc<dyn TenantAware>) {
        let known = self.tenants();
        self.aware_modules.write().push(module.clone());
        for id in known {
            module.on_tenant_registered(&id);
        }
    }
}
