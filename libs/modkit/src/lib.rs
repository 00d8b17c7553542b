//! A modular application runtime: a host embeds [`Application`], registers
//! modules, services, config sections and feeders against it, then drives
//! it through Init → Start → Stop (or calls [`Application::run`] to do all
//! three plus waiting on a shutdown signal).
//!
//! ## Module example
//!
//! ```rust,ignore
//! use std::any::Any;
//! use std::sync::Arc;
//! use modkit::{Application, Module, ModuleCtx, ModuleRegistration};
//!
//! struct Greeter;
//!
//! #[modkit::async_trait]
//! impl Module for Greeter {
//!     fn name(&self) -> &str { "greeter" }
//!     async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
//!         ctx.services().register("greeter.hello", Arc::new("hello".to_string()), [])?;
//!         Ok(())
//!     }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let app = Application::new(std::sync::Arc::new(modkit::NullConfigProvider));
//! app.register_module(ModuleRegistration::new("greeter", Arc::new(Greeter)))?;
//! app.init().await?;
//! app.start().await?;
//! app.stop().await?;
//! # Ok(())
//! # }
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

pub mod app;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod feeder;
pub mod lifecycle;
pub mod logger;
pub mod module;
pub mod resolver;
pub mod service;
pub mod tenant;

pub use app::Application;
pub use config::{ConfigProvider, ConfigRegistry, NullConfigProvider};
pub use contract::{
    Configurable, ConstructorInjected, EmitterModule, Module, ModuleCtx, ObserverModule,
    ProvidedService, RequiredService, ServicesAware, Startable, Stoppable, TenantAwareModule,
};
pub use error::{ConfigError, DependencyError, KernelError, LifecycleError, RegistrationError, TenantError};
pub use events::{Event, EventBuilder, Observer, Subject};
pub use feeder::{ConfigFeeder, FeederPipeline, MapFeeder};
pub use lifecycle::{LifecycleCoordinator, Phase};
pub use logger::{Logger, TracingLogger};
pub use module::{ModuleEntry, ModuleRegistration, ModuleRegistry};
pub use resolver::DependencyResolver;
pub use service::ServiceRegistry;
pub use tenant::{TenantAware, TenantId, TenantService};
