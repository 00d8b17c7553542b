//! Lifecycle coordinator (C8): drives registered modules through
//! Configure → Init → Start → Stop in resolver-ordered (or reverse)
//! passes, one phase method per transition, mirroring the phase-by-phase
//! runtime this kernel's host is modeled on.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigRegistry;
use crate::contract::ModuleCtx;
use crate::error::LifecycleError;
use crate::events::{Event, Observer, Subject};
use crate::feeder::FeederPipeline;
use crate::module::ModuleEntry;
use crate::service::ServiceRegistry;
use crate::tenant::TenantService;

/// Default per-module shutdown budget (§5, §4.6: "30 s for Stop").
pub const DEFAULT_STOP_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Registered,
    Configured,
    Initialized,
    Started,
    Stopping,
    Stopped,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Registered => "registered",
            Phase::Configured => "configured",
            Phase::Initialized => "initialized",
            Phase::Started => "started",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
        }
    }
}

/// Bridges the module-facing `ObserverModule` capability (which receives a
/// `ModuleCtx`) onto the plain `Observer` the subject dispatches through.
struct ObserverBridge {
    ctx: ModuleCtx,
    module: Arc<dyn crate::contract::ObserverModule>,
}

#[async_trait::async_trait]
impl Observer for ObserverBridge {
    fn observer_id(&self) -> String {
        self.module.observer_id()
    }

    fn event_filter(&self) -> Option<std::collections::HashSet<String>> {
        self.module.event_filter()
    }

    async fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        self.module.on_event(&self.ctx, event).await
    }
}

/// Drives the Registered→Configured→Initialized→Started→Stopping→Stopped
/// state machine (§4.6) for one [`crate::app::Application`].
pub struct LifecycleCoordinator {
    phase: RwLock<Phase>,
    stop_deadline: Duration,
}

impl Default for LifecycleCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleCoordinator {
    pub fn new() -> Self {
        Self {
            phase: RwLock::new(Phase::Registered),
            stop_deadline: DEFAULT_STOP_DEADLINE,
        }
    }

    pub fn with_stop_deadline(mut self, deadline: Duration) -> Self {
        self.stop_deadline = deadline;
        self
    }

    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    fn require_phase(&self, expected: Phase) -> Result<(), LifecycleError> {
        let current = *self.phase.read();
        if current != expected {
            return Err(LifecycleError::WrongPhase { phase: current.as_str() });
        }
        Ok(())
    }

    /// Configure phase: `register_config` for every `Configurable` module,
    /// then run the feeder pipeline, then validate every section. Sections
    /// are registered before feeders run so a feeder can target any of
    /// them regardless of module registration order.
    pub fn run_configure(
        &self,
        entries: &[ModuleEntry],
        config: &ConfigRegistry,
        feeders: &mut FeederPipeline,
    ) -> Result<(), LifecycleError> {
        self.require_phase(Phase::Registered)?;

        for entry in entries {
            if let Some(configurable) = &entry.configurable {
                configurable
                    .register_config(config)
                    .map_err(|source| LifecycleError::Configure {
                        module: entry.name.clone(),
                        source,
                    })?;
            }
        }

        feeders.run(config).map_err(|err| LifecycleError::Configure {
            module: "<feeder-pipeline>".to_string(),
            source: anyhow::anyhow!(err),
        })?;

        config.validate_all().map_err(|err| LifecycleError::Configure {
            module: "<config-validation>".to_string(),
            source: anyhow::anyhow!(err),
        })?;

        config.seal();
        *self.phase.write() = Phase::Configured;
        Ok(())
    }

    /// Init phase: in resolved order, materialize constructor-injected
    /// modules, call `Module::init`, wire observers/emitters into the
    /// subject, and register tenant-aware modules — each exactly once, in
    /// the same order modules were initialized. A failing module's Init
    /// aborts forward motion and reverse-stops every module already
    /// initialized in this pass (§4.6, §7); teardown failures are chained
    /// onto the original error's source rather than dropped.
    pub async fn run_init(
        &self,
        entries: &mut [ModuleEntry],
        services: &Arc<ServiceRegistry>,
        subject: &Arc<Subject>,
        tenants: &TenantService,
        cancel: CancellationToken,
    ) -> Result<(), LifecycleError> {
        self.require_phase(Phase::Configured)?;

        let ctx = ModuleCtx {
            services: services.clone(),
            subject: subject.clone(),
        };

        let mut initialized: Vec<usize> = Vec::new();

        for idx in 0..entries.len() {
            let init_result = Self::init_one(&mut entries[idx], &ctx, services, subject, tenants).await;
            if let Err(err) = init_result {
                *self.phase.write() = Phase::Stopping;
                let source = Self::chain_teardown(
                    err,
                    Self::rollback(entries, initialized.iter().rev().copied(), subject, cancel, self.stop_deadline).await,
                );
                *self.phase.write() = Phase::Stopped;
                return Err(source);
            }
            initialized.push(idx);
        }

        *self.phase.write() = Phase::Initialized;
        Ok(())
    }

    async fn init_one(
        entry: &mut ModuleEntry,
        ctx: &ModuleCtx,
        services: &Arc<ServiceRegistry>,
        subject: &Arc<Subject>,
        tenants: &TenantService,
    ) -> Result<(), LifecycleError> {
        if entry.core.is_none() {
            if let Some(constructor) = &entry.constructor {
                let built = constructor
                    .construct(services)
                    .map_err(|source| LifecycleError::Init {
                        module: entry.name.clone(),
                        source,
                    })?;
                entry.core = Some(built);
            }
        }

        if let Some(core) = entry.core.clone() {
            core.init(ctx).await.map_err(|source| LifecycleError::Init {
                module: entry.name.clone(),
                source,
            })?;
        }

        if let Some(emitter) = &entry.emitter {
            subject.declare_event_types(entry.name.clone(), emitter.registered_event_types());
            emitter
                .register_observers(subject)
                .map_err(|source| LifecycleError::Init {
                    module: entry.name.clone(),
                    source,
                })?;
        }

        if let Some(observer) = &entry.observer {
            subject.register_observer(Arc::new(ObserverBridge {
                ctx: ctx.clone(),
                module: observer.clone(),
            }));
        }

        if let Some(tenant_aware) = &entry.tenant_aware {
            tenants.register_tenant_aware_module(tenant_aware.clone());
        }

        subject
            .notify(Event::builder("kernel.lifecycle", "com.kernel.module.initialized").data(
                serde_json::json!({ "module": entry.name }),
            ))
            .await;
        Ok(())
    }

    /// Start phase: `Startable::start` in resolved order. A failing module's
    /// Start aborts forward motion and reverse-stops every module already
    /// started in this pass (§4.6, §7).
    pub async fn run_start(
        &self,
        entries: &[ModuleEntry],
        subject: &Subject,
        cancel: CancellationToken,
    ) -> Result<(), LifecycleError> {
        self.require_phase(Phase::Initialized)?;

        let mut started: Vec<usize> = Vec::new();

        for (idx, entry) in entries.iter().enumerate() {
            if let Some(startable) = &entry.startable {
                if let Err(source) = startable.start(cancel.clone()).await {
                    let err = LifecycleError::Start {
                        module: entry.name.clone(),
                        source,
                    };
                    *self.phase.write() = Phase::Stopping;
                    let source = Self::chain_teardown(
                        err,
                        Self::rollback(entries, started.iter().rev().copied(), subject, cancel, self.stop_deadline).await,
                    );
                    *self.phase.write() = Phase::Stopped;
                    return Err(source);
                }
            }
            subject
                .notify(Event::builder("kernel.lifecycle", "com.kernel.module.started").data(
                    serde_json::json!({ "module": entry.name }),
                ))
                .await;
            started.push(idx);
        }

        *self.phase.write() = Phase::Started;
        Ok(())
    }

    /// Reverse-stop the modules at `indices` (already in the order they
    /// should be torn down), returning every failure encountered. Used by
    /// both `run_init`/`run_start` rollback and directly by `run_stop`.
    async fn rollback(
        entries: &[ModuleEntry],
        indices: impl Iterator<Item = usize>,
        subject: &Subject,
        cancel: CancellationToken,
        deadline: Duration,
    ) -> Vec<LifecycleError> {
        let mut failures = Vec::new();
        for idx in indices {
            let entry = &entries[idx];
            if let Some(stoppable) = &entry.stoppable {
                match tokio::time::timeout(deadline, stoppable.stop(cancel.clone())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(source)) => failures.push(LifecycleError::Stop {
                        module: entry.name.clone(),
                        source,
                    }),
                    Err(_) => failures.push(LifecycleError::StopDeadlineExceeded {
                        module: entry.name.clone(),
                    }),
                }
            }
            subject
                .notify(Event::builder("kernel.lifecycle", "com.kernel.module.stopped").data(
                    serde_json::json!({ "module": entry.name }),
                ))
                .await;
        }
        failures
    }

    /// Chain teardown failures onto the original error's `anyhow::Error`
    /// source as additional context (§7: "return the original error with
    /// the teardown errors chained"), rather than silently dropping them.
    fn chain_teardown(original: LifecycleError, teardown: Vec<LifecycleError>) -> LifecycleError {
        if teardown.is_empty() {
            return original;
        }
        let teardown_summary = teardown
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        match original {
            LifecycleError::Init { module, source } => LifecycleError::Init {
                module,
                source: source.context(format!(
                    "reverse teardown of already-initialized modules also failed: {teardown_summary}"
                )),
            },
            LifecycleError::Start { module, source } => LifecycleError::Start {
                module,
                source: source.context(format!(
                    "reverse teardown of already-started modules also failed: {teardown_summary}"
                )),
            },
            other => other,
        }
    }

    /// Stop phase: `Stoppable::stop` in reverse resolved order, each
    /// bounded by the shutdown deadline. Every module is given a chance to
    /// stop regardless of whether an earlier one failed or timed out
    /// (§9's Open Question: shutdown failures are recorded per-module but
    /// never skip a sibling's Stop); all failures are returned together so
    /// the caller sees every module that failed to shut down cleanly.
    ///
    /// Idempotent (§8): once the phase has already reached `Stopping` or
    /// `Stopped`, a further call is a no-op that returns `Ok(())` rather
    /// than re-running teardown or rejecting with `WrongPhase`.
    pub async fn run_stop(
        &self,
        entries: &[ModuleEntry],
        subject: &Subject,
        cancel: CancellationToken,
    ) -> Result<(), Vec<LifecycleError>> {
        {
            let current = *self.phase.read();
            if current == Phase::Stopping || current == Phase::Stopped {
                return Ok(());
            }
            if current != Phase::Started && current != Phase::Initialized {
                return Err(vec![LifecycleError::WrongPhase { phase: current.as_str() }]);
            }
        }
        *self.phase.write() = Phase::Stopping;

        let failures = Self::rollback(entries, (0..entries.len()).rev(), subject, cancel, self.stop_deadline).await;

        *self.phase.write() = Phase::Stopped;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}
