//! Module contracts (§6.1): the mandatory `Module` trait plus one
//! opt-in trait per capability. A `ModuleEntry` (see [`crate::module`])
//! holds each optional trait behind `Option<Arc<dyn Trait>>`, so the
//! resolver and lifecycle coordinator branch on which fields are `Some`
//! rather than on runtime type probing (§9).

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::events::Subject;
use crate::service::ServiceRegistry;
use crate::tenant::TenantAware;

/// Context handed to a module's `init`: everything the kernel resolved on
/// its behalf plus the facilities it may call into during Init.
///
/// Cheap to clone: both fields are `Arc`s, which is what lets the lifecycle
/// coordinator hand an owned copy to each observer bridge it wires up.
#[derive(Clone)]
pub struct ModuleCtx {
    pub(crate) services: Arc<ServiceRegistry>,
    pub(crate) subject: Arc<Subject>,
}

impl ModuleCtx {
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }
}

/// Mandatory module interface (§6.1).
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique, stable identity across the process.
    fn name(&self) -> &str;

    /// Called once, in dependency-resolved order, during `Init`.
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Configurable: runs `register_config` before Init, after feeders run.
pub trait Configurable: Send + Sync {
    fn register_config(&self, config: &crate::config::ConfigRegistry) -> anyhow::Result<()>;
}

/// Startable: runs in topological order on `Application::start`.
#[async_trait]
pub trait Startable: Send + Sync {
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Stoppable: runs in reverse topological order on `Application::stop`.
#[async_trait]
pub trait Stoppable: Send + Sync {
    async fn stop(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// One entry in a module's declared provided-services list (§3).
pub struct ProvidedService {
    pub name: String,
    pub capabilities: Vec<String>,
}

/// One entry in a module's declared required-services list (§3).
pub struct RequiredService {
    pub name: String,
    pub capabilities: Vec<String>,
    pub optional: bool,
}

/// ServicesAware: declares explicit module dependencies plus the services
/// a module provides/requires, the raw material the resolver (C7) turns
/// into a DAG.
pub trait ServicesAware: Send + Sync {
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }
    fn provides_services(&self) -> Vec<ProvidedService> {
        Vec::new()
    }
    fn requires_services(&self) -> Vec<RequiredService> {
        Vec::new()
    }
}

/// Observer: receives events dispatched through C5.
#[async_trait]
pub trait ObserverModule: Send + Sync {
    fn observer_id(&self) -> String;

    /// Optional filter: if present, only events whose type is in the set
    /// are delivered to this module (§3's observer event-type filter).
    fn event_filter(&self) -> Option<HashSet<String>> {
        None
    }

    async fn on_event(&self, ctx: &ModuleCtx, event: &crate::events::Event) -> anyhow::Result<()>;
}

/// Emitter: declares the finite set of event types it may emit and wires
/// itself into the subject during Init.
pub trait EmitterModule: Send + Sync {
    fn registered_event_types(&self) -> Vec<String>;
    fn register_observers(&self, subject: &Subject) -> anyhow::Result<()> {
        let _ = subject;
        Ok(())
    }
}

/// Re-exported so downstream modules implement tenant-awareness against
/// the same trait the tenant service dispatches through.
pub use TenantAware as TenantAwareModule;

/// ConstructorInjected: the resolver, having prepared dependencies, calls
/// this factory to materialize the module record (§9's neutral form of
/// reflection-based DI).
pub trait ConstructorInjected: Send + Sync {
    fn construct(&self, services: &ServiceRegistry) -> anyhow::Result<Arc<dyn Module>>;
}
