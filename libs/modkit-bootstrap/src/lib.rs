//! Host-side bootstrap helpers that sit in front of [`modkit::Application`]:
//! layered config loading, logging initialization, and graceful-shutdown
//! signal handling. None of this is part of the kernel itself — a host
//! could build its own — but it's the version every host here should share.

pub mod config;
pub mod config_provider;
pub mod logging;
pub mod paths;
pub mod signals;

pub use config::{AppConfig, CliArgs, LoggingConfig, Section};
pub use config_provider::{AppConfigFeeder, AppConfigProvider};
pub use logging::init_logging_unified;
pub use signals::{cancel_on_shutdown_signal, wait_for_shutdown};
