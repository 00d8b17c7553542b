//! Module registry (C6): a name → module table plus declared dependencies,
//! provided/required services, and capability flags.

use std::sync::Arc;

use crate::contract::{
    Configurable, ConstructorInjected, EmitterModule, Module, ObserverModule, ProvidedService,
    RequiredService, ServicesAware, Startable, Stoppable,
};
use crate::error::DependencyError;
use crate::tenant::TenantAware;

/// One registered module and the capabilities it opted into. Branching on
/// which optional field is `Some` replaces runtime type probing (§9).
pub struct ModuleEntry {
    pub name: String,
    pub explicit_deps: Vec<String>,
    pub core: Option<Arc<dyn Module>>,
    pub constructor: Option<Arc<dyn ConstructorInjected>>,
    pub configurable: Option<Arc<dyn Configurable>>,
    pub startable: Option<Arc<dyn Startable>>,
    pub stoppable: Option<Arc<dyn Stoppable>>,
    pub services_aware: Option<Arc<dyn ServicesAware>>,
    pub observer: Option<Arc<dyn ObserverModule>>,
    pub emitter: Option<Arc<dyn EmitterModule>>,
    pub tenant_aware: Option<Arc<dyn TenantAware>>,
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("name", &self.name)
            .field("explicit_deps", &self.explicit_deps)
            .field("configurable", &self.configurable.is_some())
            .field("startable", &self.startable.is_some())
            .field("stoppable", &self.stoppable.is_some())
            .field("services_aware", &self.services_aware.is_some())
            .field("observer", &self.observer.is_some())
            .field("emitter", &self.emitter.is_some())
            .field("tenant_aware", &self.tenant_aware.is_some())
            .field("constructor_injected", &self.constructor.is_some())
            .finish()
    }
}

impl ModuleEntry {
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps = self.explicit_deps.clone();
        if let Some(sa) = &self.services_aware {
            deps.extend(sa.dependencies());
        }
        deps
    }

    pub fn provides_services(&self) -> Vec<ProvidedService> {
        self.services_aware
            .as_ref()
            .map(|sa| sa.provides_services())
            .unwrap_or_default()
    }

    pub fn requires_services(&self) -> Vec<RequiredService> {
        self.services_aware
            .as_ref()
            .map(|sa| sa.requires_services())
            .unwrap_or_default()
    }
}

/// Builder used to declare a module before the application resolves and
/// initializes it. Construct with [`ModuleRegistration::new`] (a ready
/// instance) or [`ModuleRegistration::with_constructor`] (deferred,
/// constructor-injected).
pub struct ModuleRegistration {
    entry: ModuleEntry,
}

impl ModuleRegistration {
    pub fn new(name: impl Into<String>, core: Arc<dyn Module>) -> Self {
        Self {
            entry: ModuleEntry {
                name: name.into(),
                explicit_deps: Vec::new(),
                core: Some(core),
                constructor: None,
                configurable: None,
                startable: None,
                stoppable: None,
                services_aware: None,
                observer: None,
                emitter: None,
                tenant_aware: None,
            },
        }
    }

    /// Register a module whose instance is materialized by the resolver
    /// after dependencies are prepared, rather than up front.
    pub fn with_constructor(name: impl Into<String>, constructor: Arc<dyn ConstructorInjected>) -> Self {
        Self {
            entry: ModuleEntry {
                name: name.into(),
                explicit_deps: Vec::new(),
                core: None,
                constructor: Some(constructor),
                configurable: None,
                startable: None,
                stoppable: None,
                services_aware: None,
                observer: None,
                emitter: None,
                tenant_aware: None,
            },
        }
    }

    pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.entry.explicit_deps = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn configurable(mut self, c: Arc<dyn Configurable>) -> Self {
        self.entry.configurable = Some(c);
        self
    }

    pub fn startable(mut self, s: Arc<dyn Startable>) -> Self {
        self.entry.startable = Some(s);
        self
    }

    pub fn stoppable(mut self, s: Arc<dyn Stoppable>) -> Self {
        self.entry.stoppable = Some(s);
        self
    }

    pub fn services_aware(mut self, s: Arc<dyn ServicesAware>) -> Self {
        self.entry.services_aware = Some(s);
        self
    }

    pub fn observer(mut self, o: Arc<dyn ObserverModule>) -> Self {
        self.entry.observer = Some(o);
        self
    }

    pub fn emitter(mut self, e: Arc<dyn EmitterModule>) -> Self {
        self.entry.emitter = Some(e);
        self
    }

    pub fn tenant_aware(mut self, t: Arc<dyn TenantAware>) -> Self {
        self.entry.tenant_aware = Some(t);
        self
    }
}

/// The pre-resolution table of registered modules (C6). Resolution into a
/// topological order is the job of [`crate::resolver::DependencyResolver`]
/// (C7); this type only owns registration and uniqueness.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: Vec<ModuleEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: ModuleRegistration) -> Result<(), DependencyError> {
        let name = registration.entry.name.clone();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(DependencyError::DuplicateModule(name));
        }
        self.entries.push(registration.entry);
        Ok(())
    }

    pub fn entries(&self) -> &[ModuleEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ModuleEntry> {
        self.entries
    }

    pub fn entries_mut(&mut self) -> &mut Vec<ModuleEntry> {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
