//! Application facade (C9): the single entry point a host embeds to wire
//! up every other component and drive it through its lifecycle.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigProvider, ConfigRegistry, NullConfigProvider};
use crate::error::{KernelError, LifecycleError};
use crate::feeder::{ConfigFeeder, FeederPipeline};
use crate::lifecycle::{LifecycleCoordinator, Phase};
use crate::logger::{Logger, TracingLogger};
use crate::module::{ModuleEntry, ModuleRegistration, ModuleRegistry};
use crate::service::ServiceRegistry;
use crate::tenant::TenantService;
use crate::events::Subject;

/// The modular application kernel. One instance owns one set of modules,
/// services, config sections and feeders, and one lifecycle; nothing here
/// is process-global (§9's isolation law holds at the `Application`
/// boundary).
pub struct Application {
    logger: Arc<dyn Logger>,
    services: Arc<ServiceRegistry>,
    config: Arc<ConfigRegistry>,
    feeders: Mutex<FeederPipeline>,
    tenants: Arc<TenantService>,
    subject: Arc<Subject>,
    modules: Mutex<ModuleRegistry>,
    resolved: Mutex<Option<Vec<ModuleEntry>>>,
    coordinator: LifecycleCoordinator,
    cancel: CancellationToken,
}

impl Application {
    /// Build an application with the default `tracing`-backed logger and
    /// observer delivery budget, holding `root_config` as C2's root
    /// provider (spec §4.7: `NewApplication(rootConfig, logger)`).
    pub fn new(root_config: Arc<dyn ConfigProvider>) -> Self {
        Self::with_logger(root_config, Arc::new(TracingLogger::new()))
    }

    /// Build an application with no root config provider of its own; every
    /// section is then self-contained. Convenience for hosts and tests
    /// that don't exercise root-level config.
    pub fn new_without_root_config() -> Self {
        Self::new(Arc::new(NullConfigProvider))
    }

    pub fn with_logger(root_config: Arc<dyn ConfigProvider>, logger: Arc<dyn Logger>) -> Self {
        Self {
            logger,
            services: Arc::new(ServiceRegistry::new()),
            config: Arc::new(ConfigRegistry::with_root(root_config)),
            feeders: Mutex::new(FeederPipeline::new()),
            tenants: Arc::new(TenantService::new()),
            subject: Arc::new(Subject::new()),
            modules: Mutex::new(ModuleRegistry::new()),
            resolved: Mutex::new(None),
            coordinator: LifecycleCoordinator::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build an application whose observer subject enforces a non-default
    /// per-observer delivery budget (§5).
    pub fn new_observable(
        root_config: Arc<dyn ConfigProvider>,
        logger: Arc<dyn Logger>,
        observer_delivery_budget: Duration,
    ) -> Self {
        let mut app = Self::with_logger(root_config, logger);
        app.subject = Arc::new(Subject::new().with_delivery_budget(observer_delivery_budget));
        app
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.logger.clone()
    }

    /// The root config provider the application was constructed with.
    pub fn root_config(&self) -> Option<Arc<dyn ConfigProvider>> {
        self.config.root()
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn tenants(&self) -> &TenantService {
        &self.tenants
    }

    pub fn phase(&self) -> Phase {
        self.coordinator.phase()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn require_registration_open(&self) -> Result<(), KernelError> {
        if self.coordinator.phase() != Phase::Registered {
            return Err(KernelError::Lifecycle(LifecycleError::WrongPhase {
                phase: "registered",
            }));
        }
        Ok(())
    }

    /// Register a module (C6). Must happen before [`Application::init`].
    pub fn register_module(&self, registration: ModuleRegistration) -> Result<(), KernelError> {
        self.require_registration_open()?;
        self.modules.lock().register(registration)?;
        Ok(())
    }

    /// Register a service directly, bypassing module wiring. Used mainly
    /// by the host to seed framework-level services (a clock, an HTTP
    /// client) before any module runs.
    pub fn register_service(
        &self,
        name: impl Into<String>,
        instance: Arc<dyn Any + Send + Sync>,
        capabilities: impl IntoIterator<Item = String>,
    ) -> Result<(), KernelError> {
        self.services
            .register(name, instance, capabilities)
            .map_err(KernelError::from)
    }

    pub fn get_service<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, KernelError> {
        self.services.get::<T>(name).map_err(KernelError::from)
    }

    /// Register a config section (C2). Must happen before Configure runs.
    pub fn register_config_section(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn ConfigProvider>,
    ) -> Result<(), KernelError> {
        self.require_registration_open()?;
        self.config.register_section(name, provider).map_err(KernelError::from)
    }

    pub fn get_config_section(&self, name: &str) -> Result<Arc<dyn ConfigProvider>, KernelError> {
        self.config.get_section(name).map_err(KernelError::from)
    }

    /// Replace the feeder pipeline wholesale. Must happen before
    /// [`Application::init`]; the pipeline seals itself once Configure runs.
    pub fn set_config_feeders(&self, feeders: Vec<Arc<dyn ConfigFeeder>>) -> Result<(), KernelError> {
        self.require_registration_open()?;
        self.feeders.lock().set_feeders(feeders).map_err(KernelError::from)
    }

    pub fn push_config_feeder(&self, feeder: Arc<dyn ConfigFeeder>) -> Result<(), KernelError> {
        self.require_registration_open()?;
        self.feeders.lock().push(feeder).map_err(KernelError::from)
    }

    /// Resolve dependencies, run Configure, then Init. Seals the service
    /// registry's capacity for fresh registrations isn't enforced here;
    /// sealing happens at Start (§4.1) so Init-time modules can still
    /// register services discovered during their own `init`.
    pub async fn init(&self) -> Result<(), KernelError> {
        self.require_registration_open()?;

        let taken = std::mem::take(&mut *self.modules.lock());
        let entries = taken.into_entries();
        let order = crate::resolver::DependencyResolver::resolve(&entries)?;

        let mut slots: Vec<Option<ModuleEntry>> = entries.into_iter().map(Some).collect();
        let mut ordered: Vec<ModuleEntry> = order
            .iter()
            .map(|&i| slots[i].take().expect("resolver returned each index at most once"))
            .collect();

        self.coordinator
            .run_configure(&ordered, &self.config, &mut self.feeders.lock())?;

        self.coordinator
            .run_init(
                &mut ordered,
                &self.services,
                &self.subject,
                &self.tenants,
                self.cancel.clone(),
            )
            .await?;

        *self.resolved.lock() = Some(ordered);
        Ok(())
    }

    /// Run every `Startable` in resolved order, then seal the service
    /// registry (§4.1): no module may register a new service once Start
    /// begins.
    pub async fn start(&self) -> Result<(), KernelError> {
        // Taken out of the mutex (rather than held across the await below)
        // since parking_lot guards aren't meant to cross await points.
        let entries = self.resolved.lock().take().ok_or(KernelError::Lifecycle(
            LifecycleError::WrongPhase { phase: "registered" },
        ))?;

        let result = self.coordinator.run_start(&entries, &self.subject, self.cancel.clone()).await;
        *self.resolved.lock() = Some(entries);
        result?;

        self.services.seal();
        Ok(())
    }

    /// Run every `Stoppable` in reverse resolved order. All modules are
    /// given a chance to stop even if an earlier one fails or exceeds its
    /// deadline; if any failed, the first failure is returned as the
    /// error and every failure is logged. Idempotent (§8): once the
    /// lifecycle has already reached `Stopping`/`Stopped`, a further call
    /// is a no-op returning `Ok(())`.
    pub async fn stop(&self) -> Result<(), KernelError> {
        let entries = self.resolved.lock().take().ok_or(KernelError::Lifecycle(
            LifecycleError::WrongPhase { phase: "started" },
        ))?;

        self.cancel.cancel();
        let result = self.coordinator.run_stop(&entries, &self.subject, self.cancel.clone()).await;
        *self.resolved.lock() = Some(entries);

        match result {
            Ok(()) => Ok(()),
            Err(failures) => {
                for failure in &failures {
                    self.logger.error(&failure.to_string(), &[]);
                }
                Err(KernelError::Lifecycle(
                    failures.into_iter().next().expect("non-empty failure list"),
                ))
            }
        }
    }

    /// Init, then Start, then block until the cancellation token fires
    /// (typically from a host signal handler), then Stop.
    pub async fn run(&self) -> Result<(), KernelError> {
        self.init().await?;
        self.start().await?;
        self.cancel.cancelled().await;
        self.stop().await
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new_without_root_config()
    }
}
