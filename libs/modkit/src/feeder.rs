//! Config feeder pipeline (C3): an ordered chain of sources that populate
//! registered config sections before Init.
//!
//! Feeder state is per-[`crate::app::Application`], never process-global
//! (§4.2, §9's isolation law) — two applications in the same process with
//! disjoint feeder lists must produce disjoint configuration outcomes.

use std::sync::Arc;

use crate::config::ConfigRegistry;
use crate::error::ConfigError;

/// A single entry in the ordered feeder chain.
///
/// Feeders run in registration order; for a given field, the
/// last-writing feeder wins. Defaults declared on the config struct
/// itself are the implicit zeroth feeder and are applied before any
/// `ConfigFeeder` runs (each `ConfigProvider` starts from its own
/// `Default`-derived value).
pub trait ConfigFeeder: Send + Sync {
    /// Identity of the underlying source (file path, env prefix, literal
    /// map, ...), used only for diagnostics.
    fn source_identity(&self) -> String;

    /// Feed this source's values into every section currently registered
    /// in `registry`, mutating each provider in place.
    fn feed(&self, registry: &ConfigRegistry) -> Result<(), ConfigError>;
}

/// A feeder that applies a literal map of `section -> JSON value`. Useful
/// directly, and as the building block the env/file feeders in
/// `modkit-bootstrap` are implemented on top of.
pub struct MapFeeder {
    identity: String,
    values: std::collections::HashMap<String, serde_json::Value>,
}

impl MapFeeder {
    pub fn new(identity: impl Into<String>, values: std::collections::HashMap<String, serde_json::Value>) -> Self {
        Self {
            identity: identity.into(),
            values,
        }
    }
}

impl ConfigFeeder for MapFeeder {
    fn source_identity(&self) -> String {
        self.identity.clone()
    }

    fn feed(&self, registry: &ConfigRegistry) -> Result<(), ConfigError> {
        for (section, value) in &self.values {
            match registry.get_section(section) {
                Ok(provider) => provider.merge_json(value.clone())?,
                Err(_) => {
                    tracing::warn!(
                        feeder = %self.identity,
                        section = %section,
                        "feeder targets a section the application never registered; ignoring"
                    );
                }
            }
        }
        Ok(())
    }
}

/// The ordered chain of feeders for one application. Must not be mutated
/// after Init starts (§3's feeder invariant).
#[derive(Default)]
pub struct FeederPipeline {
    feeders: Vec<Arc<dyn ConfigFeeder>>,
    sealed: bool,
}

impl FeederPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feeders(&mut self, feeders: Vec<Arc<dyn ConfigFeeder>>) -> Result<(), ConfigError> {
        if self.sealed {
            return Err(ConfigError::FeedersSealed);
        }
        self.feeders = feeders;
        Ok(())
    }

    pub fn push(&mut self, feeder: Arc<dyn ConfigFeeder>) -> Result<(), ConfigError> {
        if self.sealed {
            return Err(ConfigError::FeedersSealed);
        }
        self.feeders.push(feeder);
        Ok(())
    }

    /// Run every feeder in order against `registry`, then seal the
    /// pipeline so no further mutation is possible for the lifetime of
    /// the application.
    pub fn run(&mut self, registry: &ConfigRegistry) -> Result<(), ConfigError> {
        for feeder in &self.feeders {
            feeder.feed(registry).map_err(|err| match err {
                ConfigError::Invalid { .. } => err,
                other => ConfigError::FeederFailed {
                    section: feeder.source_identity(),
                    source: anyhow::anyhow!(other),
                },
            })?;
        }
        self.sealed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProvider;
    use parking_lot::Mutex;
    use std::any::Any;

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

    fn map(pairs: &[(&str, serde_json::Value)]) -> std::collections::HashMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn later_feeder_overrides_earlier_for_same_field() {
        let registry = ConfigRegistry::new();
        let section = Arc::new(TestSection(Mutex::new(serde_json::json!({"backend": "default"}))));
        registry.register_section("s1", section.clone()).unwrap();

        let mut pipeline = FeederPipeline::new();
        pipeline
            .push(Arc::new(MapFeeder::new(
                "file",
                map(&[("s1", serde_json::json!({"backend": "file-value"}))]),
            )))
            .unwrap();
        pipeline
            .push(Arc::new(MapFeeder::new(
                "env",
                map(&[("s1", serde_json::json!({"backend": "env-value"}))]),
            )))
            .unwrap();

        pipeline.run(&registry).unwrap();
        assert_eq!(section.as_json(), serde_json::json!({"backend": "env-value"}));
    }

    #[test]
    fn feeder_targeting_unknown_section_is_ignored_not_fatal() {
        let registry = ConfigRegistry::new();
        let mut pipeline = FeederPipeline::new();
        pipeline
            .push(Arc::new(MapFeeder::new(
                "env",
                map(&[("ghost", serde_json::json!({"x": 1}))]),
            )))
            .unwrap();

        assert!(pipeline.run(&registry).is_ok());
    }

    #[test]
    fn pipeline_rejects_mutation_after_run() {
        let registry = ConfigRegistry::new();
        let mut pipeline = FeederPipeline::new();
        pipeline.run(&registry).unwrap();

        let err = pipeline
            .push(Arc::new(MapFeeder::new("late", map(&[]))))
            .unwrap_err();
        assert!(matches!(err, ConfigError::FeedersSealed));
    }

    #[test]
    fn two_pipelines_are_isolated() {
        let registry_a = ConfigRegistry::new();
        let section_a = Arc::new(TestSection(Mutex::new(serde_json::json!({"v": 0}))));
        registry_a.register_section("s", section_a.clone()).unwrap();

        let registry_b = ConfigRegistry::new();
        let section_b = Arc::new(TestSection(Mutex::new(serde_json::json!({"v": 0}))));
        registry_b.register_section("s", section_b.clone()).unwrap();

        let mut pipeline_a = FeederPipeline::new();
        pipeline_a
            .push(Arc::new(MapFeeder::new("a", map(&[("s", serde_json::json!({"v": 1}))]))))
            .unwrap();
        pipeline_a.run(&registry_a).unwrap();

        assert_eq!(section_a.as_json(), serde_json::json!({"v": 1}));
        assert_eq!(section_b.as_json(), serde_json::json!({"v": 0}));
    }
}
