//! Bridges a loaded [`crate::config::AppConfig`] into modkit's config
//! feeder pipeline (C3): each key of `AppConfig::modules` becomes the JSON
//! fed into the identically-named config section a module registered.

use std::sync::Arc;

use modkit::{ConfigError, ConfigFeeder, ConfigRegistry};

use crate::config::AppConfig;

/// Read-only access to the host config outside the feeder pipeline, e.g. to
/// hand `server`/`logging` to bootstrap code that runs before any
/// `modkit::Application` exists.
pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn from_arc(config: Arc<AppConfig>) -> Self {
        Self(config)
    }

    pub fn inner(&self) -> &AppConfig {
        &self.0
    }

    pub fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.modules.get(module_name)
    }
}

/// A [`ConfigFeeder`] that feeds every section in `AppConfig::modules` into
/// an application's [`ConfigRegistry`] in one pass.
pub struct AppConfigFeeder {
    identity: String,
    config: Arc<AppConfig>,
}

impl AppConfigFeeder {
    pub fn new(identity: impl Into<String>, config: Arc<AppConfig>) -> Self {
        Self {
            identity: identity.into(),
            config,
        }
    }
}

impl ConfigFeeder for AppConfigFeeder {
    fn source_identity(&self) -> String {
        self.identity.clone()
    }

    fn feed(&self, registry: &ConfigRegistry) -> Result<(), ConfigError> {
        for (section, value) in &self.config.modules {
            match registry.get_section(section) {
                Ok(provider) => provider.merge_json(value.clone())?,
                Err(_) => {
                    tracing::warn!(
                        feeder = %self.identity,
                        section = %section,
                        "module config section was never registered; ignoring"
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modkit::ConfigProvider as _;
    use parking_lot::Mutex;
    use std::any::Any;

    struct TestSection(Mutex<serde_json::Value>);

    impl modkit::ConfigProvider for TestSection {
        fn as_json(&self) -> serde_json::Value {
            self.0.lock().clone()
        }

        fn merge_json(&self, value: serde_json::Value) -> Result<(), ConfigError> {
            *self.0.lock() = value;
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn feeds_registered_section_from_modules_bag() {
        let mut app_config = AppConfig::default();
        app_config
            .modules
            .insert("greeter".to_string(), serde_json::json!({"greeting": "hi"}));

        let registry = ConfigRegistry::new();
        let section = Arc::new(TestSection(Mutex::new(serde_json::json!({}))));
        registry.register_section("greeter", section.clone()).unwrap();

        let feeder = AppConfigFeeder::new("app-config", Arc::new(app_config));
        feeder.feed(&registry).unwrap();

        assert_eq!(section.as_json(), serde_json::json!({"greeting": "hi"}));
    }

    #[test]
    fn ignores_sections_the_application_never_registered() {
        let mut app_config = AppConfig::default();
        app_config
            .modules
            .insert("ghost".to_string(), serde_json::json!({"x": 1}));

        let registry = ConfigRegistry::new();
        let feeder = AppConfigFeeder::new("app-config", Arc::new(app_config));
        assert!(feeder.feed(&registry).is_ok());
    }
}
