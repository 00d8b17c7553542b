//! Typed error taxonomy for the kernel.
//!
//! One enum per error family (registration, config, dependency, lifecycle,
//! tenant), aggregated into [`KernelError`] for the facade's public
//! surface. Every phase-specific variant carries the module/section name
//! and, where the cause came from module code, the original `anyhow::Error`
//! as `#[source]` so callers can chain through to the real cause.

use thiserror::Error;

/// Errors raised by the service registry (C1).
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("service '{0}' is already registered")]
    AlreadyExists(String),
    #[error("service '{0}' not found")]
    NotFound(String),
    #[error("service '{name}' does not have the expected type")]
    TypeMismatch { name: String },
    #[error("service name must not be empty")]
    EmptyName,
    #[error("registry is sealed; no further writes are accepted")]
    Sealed,
}

/// Errors raised while populating or validating config sections (C2, C3).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config section '{0}' not found")]
    SectionNotFound(String),
    #[error("config section '{0}' is already registered")]
    SectionAlreadyExists(String),
    #[error("feeder failed to populate section '{section}'")]
    FeederFailed {
        section: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("config section '{section}' invalid: field '{field}': {reason}")]
    Invalid {
        section: String,
        field: String,
        reason: String,
    },
    #[error("feeder list cannot be mutated after Init has started")]
    FeedersSealed,
}

/// Errors raised by the dependency resolver (C7).
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("module '{consumer}' requires service '{service}' but no module provides it")]
    MissingDependency { consumer: String, service: String },
    #[error("service '{service}' is provided by more than one module: '{first}' and '{second}'")]
    AmbiguousProvider {
        service: String,
        first: String,
        second: String,
    },
    #[error("module '{module}' declares a dependency on unknown module '{depends_on}'")]
    UnknownDependency { module: String, depends_on: String },
    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },
    #[error("module '{0}' is already registered")]
    DuplicateModule(String),
}

/// Errors raised while driving modules through Init/Start/Stop (C8).
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("configuration failed for module '{module}'")]
    Configure {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("initialization failed for module '{module}'")]
    Init {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("start failed for module '{module}'")]
    Start {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("stop failed for module '{module}'")]
    Stop {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("stop of module '{module}' exceeded its shutdown deadline")]
    StopDeadlineExceeded { module: String },
    #[error("operation is not valid in the current lifecycle phase ({phase})")]
    WrongPhase { phase: &'static str },
}

/// Errors raised by the tenant service (C4).
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("tenant '{0}' not found")]
    NotFound(String),
    #[error("tenant '{0}' is already registered")]
    AlreadyExists(String),
    #[error("tenant id must not be empty")]
    EmptyId,
}

/// Top-level error returned by the [`crate::app::Application`] facade.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Tenant(#[from] TenantError),
}
