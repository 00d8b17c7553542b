//! Dependency resolver (C7): builds a DAG from declared service
//! requires/provides plus explicit module dependencies and topologically
//! orders it.
//!
//! The cycle-detection and topological-sort algorithms below are the
//! arena+index form called for in §9: a flat `Vec` of nodes keyed by
//! module name, edges as `(usize, usize)` pairs, cycle detection as an
//! iterative-DFS-shaped colouring walk, and a stable Kahn's-algorithm pass
//! that always prefers the lowest original index among ready nodes so
//! identical inputs produce identical orders (§8's determinism law).

use std::collections::{HashMap, VecDeque};

use crate::error::DependencyError;
use crate::module::ModuleEntry;

/// Resolve `entries` into a topological order, returning the indices of
/// `entries` in the order modules should be initialized.
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn resolve(entries: &[ModuleEntry]) -> Result<Vec<usize>, DependencyError> {
        let index_of: HashMap<&str, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.as_str(), i))
            .collect();

        // 1) provided-service -> provider-module map.
        let mut providers: HashMap<String, usize> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            for provided in entry.provides_services() {
                if let Some(&existing) = providers.get(&provided.name) {
                    if existing != i {
                        return Err(DependencyError::AmbiguousProvider {
                            service: provided.name,
                            first: entries[existing].name.clone(),
                            second: entry.name.clone(),
                        });
                    }
                }
                providers.insert(provided.name, i);
            }
        }

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];

        // 2) required-service edges: provider -> consumer.
        for (consumer_idx, entry) in entries.iter().enumerate() {
            for required in entry.requires_services() {
                match providers.get(&required.name) {
                    Some(&provider_idx) => {
                        if provider_idx != consumer_idx {
                            adjacency[provider_idx].push(consumer_idx);
                        }
                        // A module requiring a service it itself provides
                        // is a self-loop, collapsed rather than an error.
                    }
                    None if required.optional => {}
                    None => {
                        return Err(DependencyError::MissingDependency {
                            consumer: entry.name.clone(),
                            service: required.name,
                        });
                    }
                }
            }
        }

        // 3) explicit module -> module edges.
        for (consumer_idx, entry) in entries.iter().enumerate() {
            for dep_name in entry.dependencies() {
                let provider_idx = *index_of.get(dep_name.as_str()).ok_or_else(|| {
                    DependencyError::UnknownDependency {
                        module: entry.name.clone(),
                        depends_on: dep_name.clone(),
                    }
                })?;
                if provider_idx != consumer_idx {
                    adjacency[provider_idx].push(consumer_idx);
                }
            }
        }

        // 4) cycle detection.
        if let Some(cycle) = detect_cycle(entries, &adjacency) {
            return Err(DependencyError::CyclicDependency { path: cycle });
        }

        // 5) stable topological sort (Kahn's algorithm, lowest-index-first).
        Ok(stable_topo_sort(entries.len(), &adjacency))
    }
}

fn detect_cycle(entries: &[ModuleEntry], adjacency: &[Vec<usize>]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors = vec![Color::White; entries.len()];
    let mut path = Vec::new();

    fn dfs(
        node: usize,
        entries: &[ModuleEntry],
        adjacency: &[Vec<usize>],
        colors: &mut [Color],
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        colors[node] = Color::Gray;
        path.push(node);

        for &next in &adjacency[node] {
            match colors[next] {
                Color::Gray => {
                    let start = path.iter().position(|&n| n == next)?;
                    let mut cycle: Vec<String> = path[start..].iter().map(|&i| entries[i].name.clone()).collect();
                    cycle.push(entries[next].name.clone());
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = dfs(next, entries, adjacency, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors[node] = Color::Black;
        None
    }

    for i in 0..entries.len() {
        if colors[i] == Color::White {
            if let Some(cycle) = dfs(i, entries, adjacency, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
    }

    None
}

fn stable_topo_sort(node_count: usize, adjacency: &[Vec<usize>]) -> Vec<usize> {
    let mut indegree = vec![0usize; node_count];
    for targets in adjacency {
        for &target in targets {
            indegree[target] += 1;
        }
    }

    // VecDeque pushed in ascending index order and popped from the front
    // keeps the result deterministic: among all currently-ready nodes the
    // one with the lowest original registration index always goes first.
    let mut ready: VecDeque<usize> = (0..node_count).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);

    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &next in &adjacency[node] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                let pos = ready.partition_point(|&n| n < next);
                ready.insert(pos, next);
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Module, ProvidedService, RequiredService, ServicesAware};
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::Arc;

    struct DummyModule(&'static str);

    #[async_trait]
    impl Module for DummyModule {
        fn name(&self) -> &str {
            self.0
        }
        async fn init(&self, _ctx: &crate::contract::ModuleCtx) -> anyhow::Result<()> {
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Provides(&'static str);
    impl ServicesAware for Provides {
        fn provides_services(&self) -> Vec<ProvidedService> {
            vec![ProvidedService {
                name: self.0.to_string(),
                capabilities: vec![],
            }]
        }
    }

    struct Requires(&'static str, bool);
    impl ServicesAware for Requires {
        fn requires_services(&self) -> Vec<RequiredService> {
            vec![RequiredService {
                name: self.0.to_string(),
                capabilities: vec![],
                optional: self.1,
            }]
        }
    }

    fn entry(name: &'static str, sa: Option<Arc<dyn ServicesAware>>, deps: Vec<&'static str>) -> ModuleEntry {
        ModuleEntry {
            name: name.to_string(),
            explicit_deps: deps.into_iter().map(String::from).collect(),
            core: Some(Arc::new(DummyModule(name))),
            constructor: None,
            configurable: None,
            startable: None,
            stoppable: None,
            services_aware: sa,
            observer: None,
            emitter: None,
            tenant_aware: None,
        }
    }

    #[test]
    fn linear_two_module_init_order() {
        let entries = vec![
            entry("b", Some(Arc::new(Requires("router", false))), vec![]),
            entry("a", Some(Arc::new(Provides("router"))), vec![]),
        ];
        let order = DependencyResolver::resolve(&entries).unwrap();
        let names: Vec<_> = order.iter().map(|&i| entries[i].name.clone()).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_required_service_is_fatal() {
        let entries = vec![entry("b", Some(Arc::new(Requires("router", false))), vec![])];
        let err = DependencyResolver::resolve(&entries).unwrap_err();
        assert!(matches!(err, DependencyError::MissingDependency { .. }));
    }

    #[test]
    fn missing_optional_dependency_is_not_fatal() {
        let entries = vec![entry("b", Some(Arc::new(Requires("router", true))), vec![])];
        assert!(DependencyResolver::resolve(&entries).is_ok());
    }

    #[test]
    fn cyclic_dependency_reports_full_path() {
        let entries = vec![
            entry("a", None, vec!["b"]),
            entry("b", None, vec!["a"]),
        ];
        let err = DependencyResolver::resolve(&entries).unwrap_err();
        match err {
            DependencyError::CyclicDependency { path } => {
                assert!(path.contains(&"a".to_string()));
                assert!(path.contains(&"b".to_string()));
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn self_requiring_own_service_is_collapsed_not_an_error() {
        struct Both;
        impl ServicesAware for Both {
            fn provides_services(&self) -> Vec<ProvidedService> {
                vec![ProvidedService {
                    name: "x".into(),
                    capabilities: vec![],
                }]
            }
            fn requires_services(&self) -> Vec<RequiredService> {
                vec![RequiredService {
                    name: "x".into(),
                    capabilities: vec![],
                    optional: false,
                }]
            }
        }
        let entries = vec![entry("a", Some(Arc::new(Both)), vec![])];
        assert!(DependencyResolver::resolve(&entries).is_ok());
    }

    #[test]
    fn ambiguous_provider_is_fatal() {
        let entries = vec![
            entry("a", Some(Arc::new(Provides("x"))), vec![]),
            entry("b", Some(Arc::new(Provides("x"))), vec![]),
        ];
        let err = DependencyResolver::resolve(&entries).unwrap_err();
        assert!(matches!(err, DependencyError::AmbiguousProvider { .. }));
    }

    #[test]
    fn deterministic_across_runs() {
        let entries = vec![
            entry("c", None, vec!["a", "b"]),
            entry("b", None, vec!["a"]),
            entry("a", None, vec![]),
        ];
        let order1 = DependencyResolver::resolve(&entries).unwrap();
        let order2 = DependencyResolver::resolve(&entries).unwrap();
        assert_eq!(order1, order2);
    }

    #[test]
    fn empty_module_set_resolves_to_empty_order() {
        let entries: Vec<ModuleEntry> = Vec::new();
        assert_eq!(DependencyResolver::resolve(&entries).unwrap(), Vec::<usize>::new());
    }
}
