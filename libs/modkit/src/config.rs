//! Config registry (C2): a section-name → config-provider table.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ConfigError;

/// Any object exposing a pointer to the underlying config struct (§6.5).
///
/// Modules register a concrete type implementing this trait; the feeder
/// pipeline mutates it in place, then `validate` is called once before the
/// owning module's `Init`.
pub trait ConfigProvider: Send + Sync + Any {
    /// The JSON representation of the current config value, used by
    /// feeders that work generically (env/file) without knowing the
    /// concrete struct type.
    fn as_json(&self) -> serde_json::Value;

    /// Merge a JSON value into the underlying struct. Unknown fields are
    /// ignored with a warning rather than failing (§8 boundary behavior).
    fn merge_json(&self, value: serde_json::Value) -> Result<(), ConfigError>;

    /// Validate the section after the feeder pipeline has run. Default:
    /// always valid.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// A root config provider holding no data. Used by hosts that don't need
/// a root-level config object (every section is self-contained) and by
/// tests that don't exercise config at all.
#[derive(Default)]
pub struct NullConfigProvider;

impl ConfigProvider for NullConfigProvider {
    fn as_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn merge_json(&self, _value: serde_json::Value) -> Result<(), ConfigError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Section-name → provider table (C2), plus the root config provider the
/// host hands in at construction (spec §2: "holds the root config
/// provider").
#[derive(Default)]
pub struct ConfigRegistry {
    root: RwLock<Option<Arc<dyn ConfigProvider>>>,
    sections: RwLock<HashMap<String, Arc<dyn ConfigProvider>>>,
    sealed: std::sync::atomic::AtomicBool,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry already holding the host's root config provider.
    pub fn with_root(root: Arc<dyn ConfigProvider>) -> Self {
        Self {
            root: RwLock::new(Some(root)),
            ..Self::default()
        }
    }

    /// The root config provider the host constructed the application with,
    /// if any.
    pub fn root(&self) -> Option<Arc<dyn ConfigProvider>> {
        self.root.read().clone()
    }

    pub fn register_section(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn ConfigProvider>,
    ) -> Result<(), ConfigError> {
        if self.sealed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(ConfigError::FeedersSealed);
        }
        let name = name.into();
        let mut sections = self.sections.write();
        if sections.contains_key(&name) {
            return Err(ConfigError::SectionAlreadyExists(name));
        }
        sections.insert(name, provider);
        Ok(())
    }

    pub fn get_section(&self, name: &str) -> Result<Arc<dyn ConfigProvider>, ConfigError> {
        self.sections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::SectionNotFound(name.to_string()))
    }

    pub fn section_names(&self) -> Vec<String> {
        self.sections.read().keys().cloned().collect()
    }

    pub fn seal(&self) {
        self.sealed.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Validate every registered section, returning the first failure.
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        for (name, provider) in self.sections.read().iter() {
            provider.validate().map_err(|err| match err {
                ConfigError::Invalid { field, reason, .. } => ConfigError::Invalid {
                    section: name.clone(),
                    field,
                    reason,
                },
                other => other,
            })?;
        }
        Ok(())
    }

    pub(crate) fn sections_snapshot(&self) -> Vec<(String, Arc<dyn ConfigProvider>)> {
        self.sections
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct TestSection(Mutex<serde_json::Value>);

    impl ConfigProvider for TestSection {
        fn as_json(&self) -> serde_json::Value {
            self.0.lock().clone()
        }

        fn merge_json(&self, value: serde_json::Value) -> Result<(), ConfigError> {
            let mut guard = self.0.lock();
            if let (Some(existing), Some(incoming)) = (guard.as_object_mut(), value.as_object()) {
                for (k, v) in incoming {
                    existing.insert(k.clone(), v.clone());
                }
            }
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn register_and_get_round_trips() {
        let registry = ConfigRegistry::new();
        let section = Arc::new(TestSection(Mutex::new(serde_json::json!({"a": 1}))));
        registry.register_section("s1", section.clone()).unwrap();

        let got = registry.get_section("s1").unwrap();
        assert_eq!(got.as_json(), serde_json::json!({"a": 1}));
    }

    #[test]
    fn duplicate_section_is_error() {
        let registry = ConfigRegistry::new();
        let section = Arc::new(TestSection(Mutex::new(serde_json::json!({}))));
        registry.register_section("s1", section.clone()).unwrap();
        let err = registry.register_section("s1", section).unwrap_err();
        assert!(matches!(err, ConfigError::SectionAlreadyExists(_)));
    }

    #[test]
    fn missing_section_is_not_found() {
        let registry = ConfigRegistry::new();
        let err = registry.get_section("nope").unwrap_err();
        assert!(matches!(err, ConfigError::SectionNotFound(_)));
    }
}
