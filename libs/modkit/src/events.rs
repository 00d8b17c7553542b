//! Observer subject (C5): an in-process CloudEvents-shaped pub/sub used for
//! lifecycle notifications and module-to-module event fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

/// Default per-observer delivery budget (§5).
pub const DEFAULT_DELIVERY_BUDGET: Duration = Duration::from_secs(5);

/// A CloudEvents-shaped event envelope (§3, §6.2).
///
/// `id`/`time` are stamped by the [`Subject`] at emit time, never by the
/// emitter or the observer, so two observers can't disagree about when an
/// event happened.
#[derive(Debug, Clone)]
pub struct Event {
    id: Uuid,
    source: String,
    ty: String,
    time: DateTime<Utc>,
    data: Value,
}

impl Event {
    /// Start building an event of the given reverse-DNS `type`, e.g.
    /// `com.kernel.module.registered`.
    pub fn builder(source: impl Into<String>, ty: impl Into<String>) -> EventBuilder {
        EventBuilder {
            source: source.into(),
            ty: ty.into(),
            data: Value::Null,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ty(&self) -> &str {
        &self.ty
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Deserialize the structured payload into `T`.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }

    pub fn data(&self) -> &Value {
        &self.data
    }
}

pub struct EventBuilder {
    source: String,
    ty: String,
    data: Value,
}

impl EventBuilder {
    pub fn data(mut self, data: impl serde::Serialize) -> Self {
        self.data = serde_json::to_value(data).unwrap_or(Value::Null);
        self
    }

    /// Finalize the event, stamping `id` and `time` now. Only [`Subject`]
    /// calls this internally from `notify`/`emit`; events are never built
    /// fully-formed by an emitter, matching the self-describing-events
    /// invariant of §3.
    fn finish(self) -> Event {
        Event {
            id: Uuid::new_v4(),
            source: self.source,
            ty: self.ty,
            time: Utc::now(),
            data: self.data,
        }
    }
}

/// A subscriber registered with the [`Subject`].
#[async_trait]
pub trait Observer: Send + Sync {
    /// Unique id among observers. Re-registering with an existing id
    /// replaces the prior registration atomically.
    fn observer_id(&self) -> String;

    /// Optional filter: if present, only events whose type is in the set
    /// are delivered to this observer.
    fn event_filter(&self) -> Option<HashSet<String>> {
        None
    }

    async fn on_event(&self, event: &Event) -> anyhow::Result<()>;
}

struct ObserverEntry {
    observer: Arc<dyn Observer>,
}

/// In-process pub/sub of [`Event`]s. Maintains the observer set and
/// dispatches events, tolerating slow or failing observers (§4.3).
pub struct Subject {
    observers: RwLock<Vec<ObserverEntry>>,
    declared: RwLock<HashMap<String, HashSet<String>>>,
    delivery_budget: Duration,
}

impl Default for Subject {
    fn default() -> Self {
        Self::new()
    }
}

impl Subject {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            declared: RwLock::new(HashMap::new()),
            delivery_budget: DEFAULT_DELIVERY_BUDGET,
        }
    }

    pub fn with_delivery_budget(mut self, budget: Duration) -> Self {
        self.delivery_budget = budget;
        self
    }

    /// Register (or replace) an observer.
    pub fn register_observer(&self, observer: Arc<dyn Observer>) {
        let id = observer.observer_id();
        let mut observers = self.observers.write();
        if let Some(existing) = observers.iter_mut().find(|e| e.observer.observer_id() == id) {
            existing.observer = observer;
        } else {
            observers.push(ObserverEntry { observer });
        }
    }

    /// Unregister an observer by id. Returns `true` if one was removed.
    pub fn unregister_observer(&self, id: &str) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|e| e.observer.observer_id() != id);
        observers.len() != before
    }

    /// Declare the set of event types a module may emit (§4.3).
    pub fn declare_event_types(&self, module: impl Into<String>, types: impl IntoIterator<Item = String>) {
        self.declared
            .write()
            .entry(module.into())
            .or_default()
            .extend(types);
    }

    pub fn registered_event_types(&self, module: &str) -> HashSet<String> {
        self.declared
            .read()
            .get(module)
            .cloned()
            .unwrap_or_default()
    }

    /// Build and dispatch an event. Stamps `id`/`time` here, then fans out
    /// to a snapshot of the current observer set sequentially, so an
    /// observer unregistering itself mid-callback can't race the dispatch
    /// loop (§5). Errors and timeouts are logged and skipped; they never
    /// propagate to the emitter.
    pub async fn notify(&self, event: EventBuilder) -> Event {
        let event = event.finish();
        let snapshot: Vec<Arc<dyn Observer>> = {
            let observers = self.observers.read();
            observers.iter().map(|e| e.observer.clone()).collect()
        };

        for observer in snapshot {
            if let Some(filter) = observer.event_filter() {
                if !filter.contains(event.ty()) {
                    continue;
                }
            }
            let id = observer.observer_id();
            match tokio::time::timeout(self.delivery_budget, observer.on_event(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(observer = %id, error = %err, event = event.ty(), "observer returned an error");
                }
                Err(_) => {
                    tracing::warn!(observer = %id, event = event.ty(), "observer delivery exceeded its budget");
                }
            }
        }

        event
    }

    /// Given an observed event stream, return the declared-but-never-
    /// emitted type set per module — the basis of the declared-events
    /// audit (§4.3, §8 scenario 6).
    pub fn audit(&self, observed: &[Event]) -> HashMap<String, HashSet<String>> {
        let mut emitted: HashMap<&str, HashSet<&str>> = HashMap::new();
        for event in observed {
            emitted.entry(event.source()).or_default().insert(event.ty());
        }

        let mut unexercised = HashMap::new();
        for (module, declared_types) in self.declared.read().iter() {
            let emitted_types = emitted.get(module.as_str());
            let missing: HashSet<String> = declared_types
                .iter()
                .filter(|t| !emitted_types.is_some_and(|e| e.contains(t.as_str())))
                .cloned()
                .collect();
            if !missing.is_empty() {
                unexercised.insert(module.clone(), missing);
            }
        }
        unexercised
    }
}
