//! End-to-end scenarios driven entirely through `Application`'s public API:
//! dependency-ordered init/start/stop, cycle rejection, tenant late-join,
//! observer fault isolation, and the declared-events audit.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use modkit::{
    Application, DependencyError, EmitterModule, Event, KernelError, Module, ModuleCtx,
    ModuleRegistration, ObserverModule, ProvidedService, RequiredService, ServicesAware, Subject,
    TenantAwareModule, TenantId,
};

fn new_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

struct Provider {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Module for Provider {
    fn name(&self) -> &str {
        self.name
    }
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        self.log.lock().push(format!("init:{}", self.name));
        ctx.services()
            .register("database", Arc::new(42i32), ["database".to_string()])?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ServicesAware for Provider {
    fn provides_services(&self) -> Vec<ProvidedService> {
        vec![ProvidedService {
            name: "database".to_string(),
            capabilities: vec!["database".to_string()],
        }]
    }
}

struct Consumer {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Module for Consumer {
    fn name(&self) -> &str {
        self.name
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        self.log.lock().push(format!("init:{}", self.name));
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ServicesAware for Consumer {
    fn requires_services(&self) -> Vec<RequiredService> {
        vec![RequiredService {
            name: "database".to_string(),
            capabilities: vec!["database".to_string()],
            optional: false,
        }]
    }
}

#[tokio::test]
async fn provider_initializes_before_its_consumer() {
    let log = new_log();

    let app = Application::new_without_root_config();
    app.register_module(
        ModuleRegistration::new(
            "consumer",
            Arc::new(Consumer {
                name: "consumer",
                log: log.clone(),
            }),
        )
        .services_aware(Arc::new(Consumer {
            name: "consumer",
            log: log.clone(),
        })),
    )
    .unwrap();
    app.register_module(
        ModuleRegistration::new(
            "provider",
            Arc::new(Provider {
                name: "provider",
                log: log.clone(),
            }),
        )
        .services_aware(Arc::new(Provider {
            name: "provider",
            log: log.clone(),
        })),
    )
    .unwrap();

    app.init().await.unwrap();

    assert_eq!(log.lock().clone(), vec!["init:provider".to_string(), "init:consumer".to_string()]);
}

#[tokio::test]
async fn missing_required_service_fails_init() {
    let log = new_log();

    let app = Application::new_without_root_config();
    app.register_module(
        ModuleRegistration::new(
            "consumer",
            Arc::new(Consumer {
                name: "consumer",
                log: log.clone(),
            }),
        )
        .services_aware(Arc::new(Consumer {
            name: "consumer",
            log: log.clone(),
        })),
    )
    .unwrap();

    let err = app.init().await.unwrap_err();
    match err {
        KernelError::Dependency(DependencyError::MissingDependency { .. }) => {}
        other => panic!("expected MissingDependency, got {other:?}"),
    }
}

struct CycleModule {
    name: &'static str,
}

#[async_trait]
impl Module for CycleModule {
    fn name(&self) -> &str {
        self.name
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test]
async fn cyclic_explicit_dependency_is_rejected() {
    let app = Application::new_without_root_config();
    app.register_module(
        ModuleRegistration::new("a", Arc::new(CycleModule { name: "a" })).depends_on(["b"]),
    )
    .unwrap();
    app.register_module(
        ModuleRegistration::new("b", Arc::new(CycleModule { name: "b" })).depends_on(["a"]),
    )
    .unwrap();

    let err = app.init().await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Dependency(DependencyError::CyclicDependency { .. })
    ));
}

struct StopRecorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Module for StopRecorder {
    fn name(&self) -> &str {
        self.name
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl modkit::Stoppable for StopRecorder {
    async fn stop(&self, _cancel: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        self.log.lock().push(format!("stop:{}", self.name));
        Ok(())
    }
}

#[tokio::test]
async fn stop_runs_in_reverse_resolved_order() {
    let log = new_log();

    let app = Application::new_without_root_config();
    let a = Arc::new(StopRecorder { name: "a", log: log.clone() });
    let b = Arc::new(StopRecorder { name: "b", log: log.clone() });
    app.register_module(
        ModuleRegistration::new("a", a.clone()).stoppable(a.clone()),
    )
    .unwrap();
    app.register_module(
        ModuleRegistration::new("b", b.clone()).depends_on(["a"]).stoppable(b.clone()),
    )
    .unwrap();

    app.init().await.unwrap();
    app.start().await.unwrap();
    app.stop().await.unwrap();

    assert_eq!(log.lock().clone(), vec!["stop:b".to_string(), "stop:a".to_string()]);
}

struct FailingInit {
    name: &'static str,
}

#[async_trait]
impl Module for FailingInit {
    fn name(&self) -> &str {
        self.name
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test]
async fn a_failing_init_reverse_stops_modules_already_initialized() {
    let log = new_log();

    let app = Application::new_without_root_config();
    let a = Arc::new(StopRecorder { name: "a", log: log.clone() });
    app.register_module(ModuleRegistration::new("a", a.clone()).stoppable(a))
        .unwrap();
    app.register_module(
        ModuleRegistration::new("broken", Arc::new(FailingInit { name: "broken" }))
            .depends_on(["a"]),
    )
    .unwrap();

    let err = app.init().await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Lifecycle(modkit::LifecycleError::Init { .. })
    ));
    assert_eq!(log.lock().clone(), vec!["stop:a".to_string()]);
}

struct TenantWatcher {
    events: Arc<Mutex<Vec<String>>>,
}

impl TenantAwareModule for TenantWatcher {
    fn on_tenant_registered(&self, id: &TenantId) {
        self.events.lock().push(format!("registered:{id}"));
    }
    fn on_tenant_removed(&self, id: &TenantId) {
        self.events.lock().push(format!("removed:{id}"));
    }
}

struct TenantModule {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Module for TenantModule {
    fn name(&self) -> &str {
        "tenant-module"
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test]
async fn tenant_registered_before_module_still_delivers_late_join_callback() {
    let events = Arc::new(Mutex::new(Vec::new()));

    let app = Application::new_without_root_config();
    app.tenants()
        .register_tenant(TenantId::new("acme").unwrap(), Default::default())
        .unwrap();

    let watcher = Arc::new(TenantWatcher { events: events.clone() });
    app.register_module(
        ModuleRegistration::new("tenant-module", Arc::new(TenantModule { events: events.clone() }))
            .tenant_aware(watcher),
    )
    .unwrap();

    app.init().await.unwrap();

    assert_eq!(events.lock().clone(), vec!["registered:acme".to_string()]);
}

struct FaultyObserverModule;

#[async_trait]
impl Module for FaultyObserverModule {
    fn name(&self) -> &str {
        "faulty-observer"
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl ObserverModule for FaultyObserverModule {
    fn observer_id(&self) -> String {
        "faulty-observer".to_string()
    }
    async fn on_event(&self, _ctx: &ModuleCtx, _event: &Event) -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }
}

struct GoodObserverModule {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl Module for GoodObserverModule {
    fn name(&self) -> &str {
        "good-observer"
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl ObserverModule for GoodObserverModule {
    fn observer_id(&self) -> String {
        "good-observer".to_string()
    }
    fn event_filter(&self) -> Option<std::collections::HashSet<String>> {
        Some(["com.kernel.test.pinged".to_string()].into_iter().collect())
    }
    async fn on_event(&self, _ctx: &ModuleCtx, _event: &Event) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct EmitterOnly;

#[async_trait]
impl Module for EmitterOnly {
    fn name(&self) -> &str {
        "emitter"
    }
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        ctx.subject()
            .notify(Event::builder("emitter", "com.kernel.test.pinged"))
            .await;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl EmitterModule for EmitterOnly {
    fn registered_event_types(&self) -> Vec<String> {
        vec!["com.kernel.test.pinged".to_string()]
    }
}

#[tokio::test]
async fn a_faulty_observer_does_not_block_delivery_to_a_healthy_one() {
    let count = Arc::new(AtomicUsize::new(0));

    let app = Application::new_without_root_config();
    app.register_module(
        ModuleRegistration::new("faulty-observer", Arc::new(FaultyObserverModule))
            .observer(Arc::new(FaultyObserverModule)),
    )
    .unwrap();
    app.register_module(
        ModuleRegistration::new(
            "good-observer",
            Arc::new(GoodObserverModule { count: count.clone() }),
        )
        .observer(Arc::new(GoodObserverModule { count: count.clone() })),
    )
    .unwrap();
    app.register_module(
        ModuleRegistration::new("emitter", Arc::new(EmitterOnly)).emitter(Arc::new(EmitterOnly)),
    )
    .unwrap();

    app.init().await.unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn declared_event_type_that_is_never_emitted_shows_up_in_the_audit() {
    let subject = Subject::new();
    subject.declare_event_types("ghost-emitter", ["com.kernel.test.never".to_string()]);

    let observed: Vec<Event> = Vec::new();
    let unexercised = subject.audit(&observed);

    assert!(unexercised
        .get("ghost-emitter")
        .unwrap()
        .contains("com.kernel.test.never"));
}
