//! Utility functions for the container

/// Dependency resolution utilities
pub mod dependency {
    use std::collections::{HashMap, HashSet};
    use std::thread::{self, ThreadId};

    use parking_lot::Mutex;

    use crate::error::ContainerError;

    /// Tracks tokens currently being constructed to detect circular dependencies.
    ///
    /// Resolution is synchronous, so the in-progress chain of one resolution is
    /// exactly the stack kept for the calling thread. Independent resolutions on
    /// other threads never see each other's entries.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        stacks: Mutex<HashMap<ThreadId, Vec<(String, String)>>>,
    }

    impl CreationTracker {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks `key` as being created on the current thread.
        ///
        /// The returned guard pops the entry when dropped.
        ///
        /// # Errors
        ///
        /// Returns `CircularDependency` with the chain from the first occurrence of
        /// `key` back to itself if it is already being created on this thread.
        pub fn enter(&self, key: &str, display: &str) -> Result<CreationGuard<'_>, ContainerError> {
            let thread = thread::current().id();
            let mut stacks = self.stacks.lock();
            let stack = stacks.entry(thread).or_default();

            if let Some(start) = stack.iter().position(|(k, _)| k == key) {
                let mut chain: Vec<String> =
                    stack[start..].iter().map(|(_, d)| d.clone()).collect();
                chain.push(display.to_string());
                tracing::debug!("Circular dependency detected: {}", chain.join(" -> "));
                return Err(ContainerError::CircularDependency { chain });
            }

            stack.push((key.to_string(), display.to_string()));
            Ok(CreationGuard {
                tracker: self,
                thread,
                key: key.to_string(),
            })
        }

        /// Checks if a key is currently being created on this thread.
        pub fn is_creating(&self, key: &str) -> bool {
            self.stacks
                .lock()
                .get(&thread::current().id())
                .map(|stack| stack.iter().any(|(k, _)| k == key))
                .unwrap_or(false)
        }

        /// Gets a snapshot of the chain being created on this thread.
        ///
        /// This is useful for debugging and error messages.
        pub fn current_chain(&self) -> Vec<String> {
            self.stacks
                .lock()
                .get(&thread::current().id())
                .map(|stack| stack.iter().map(|(_, d)| d.clone()).collect())
                .unwrap_or_default()
        }

        fn exit(&self, thread: ThreadId, key: &str) {
            let mut stacks = self.stacks.lock();
            if let Some(stack) = stacks.get_mut(&thread) {
                if let Some(pos) = stack.iter().rposition(|(k, _)| k == key) {
                    stack.remove(pos);
                }
                if stack.is_empty() {
                    stacks.remove(&thread);
                }
            }
        }
    }

    /// RAII guard returned by [`CreationTracker::enter`]
    #[derive(Debug)]
    pub struct CreationGuard<'a> {
        tracker: &'a CreationTracker,
        thread: ThreadId,
        key: String,
    }

    impl Drop for CreationGuard<'_> {
        fn drop(&mut self) {
            self.tracker.exit(self.thread, &self.key);
        }
    }

    /// Problem found while checking the declared dependency graph
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DependencyValidationError {
        /// Edges that lead back to where they started, first node repeated at the end
        CircularDependency { cycle: Vec<String> },
        /// `dependent` declares a dependency nobody provides
        MissingDependency { dependent: String, missing: String },
    }

    impl std::fmt::Display for DependencyValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::CircularDependency { cycle } => {
                    write!(f, "Circular dependency detected: {}", cycle.join(" -> "))
                }
                Self::MissingDependency { dependent, missing } => {
                    write!(f, "'{}' depends on '{}' which is not registered", dependent, missing)
                }
            }
        }
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Open,
        Done,
    }

    /// Checks `dependencies` (node -> nodes it needs) for unknown nodes first, then cycles.
    ///
    /// Nodes are walked in sorted order so the reported problem is stable between runs.
    pub fn validate_dependency_graph(
        dependencies: &HashMap<String, Vec<String>>,
    ) -> Result<(), DependencyValidationError> {
        let mut nodes: Vec<&str> = dependencies.keys().map(String::as_str).collect();
        nodes.sort_unstable();

        let missing = nodes.iter().find_map(|node| {
            dependencies[*node]
                .iter()
                .find(|dep| !dependencies.contains_key(*dep))
                .map(|dep| (node.to_string(), dep.clone()))
        });
        if let Some((dependent, missing)) = missing {
            return Err(DependencyValidationError::MissingDependency { dependent, missing });
        }

        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(nodes.len());
        let mut path: Vec<&str> = Vec::new();
        for node in nodes {
            if let Some(cycle) = walk(node, dependencies, &mut marks, &mut path) {
                return Err(DependencyValidationError::CircularDependency { cycle });
            }
        }
        Ok(())
    }

    fn walk<'g>(
        node: &'g str,
        graph: &'g HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'g str, Mark>,
        path: &mut Vec<&'g str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Open) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(node, Mark::Open);
        path.push(node);
        for dep in graph.get(node).into_iter().flatten() {
            if let Some(cycle) = walk(dep, graph, marks, path) {
                return Some(cycle);
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        None
    }
}

#[cfg(test)]
mod tests {
    mod dependency_tests {
        use super::super::dependency::*;
        use crate::error::ContainerError;
        use std::collections::HashMap;
        use std::sync::Arc;

        #[test]
        fn test_creation_tracker() {
            let tracker = CreationTracker::new();
            assert!(!tracker.is_creating("class:Room"));

            {
                let _room = tracker.enter("class:Room", "Room").unwrap();
                assert!(tracker.is_creating("class:Room"));

                let _door = tracker.enter("class:Door", "Door").unwrap();
                assert_eq!(tracker.current_chain(), vec!["Room", "Door"]);

                match tracker.enter("class:Room", "Room") {
                    Err(ContainerError::CircularDependency { chain }) => {
                        assert_eq!(chain, vec!["Room", "Door", "Room"]);
                    }
                    other => panic!("expected a cycle, got {:?}", other),
                }
            }

            assert!(!tracker.is_creating("class:Room"));
            assert!(tracker.current_chain().is_empty());
        }

        #[test]
        fn test_tracker_is_per_thread() {
            let tracker = Arc::new(CreationTracker::new());
            let _guard = tracker.enter("shared", "Shared").unwrap();

            let other = Arc::clone(&tracker);
            let handle = std::thread::spawn(move || other.enter("shared", "Shared").is_ok());
            assert!(handle.join().unwrap());
            assert!(tracker.is_creating("shared"));
        }

        fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
            edges
                .iter()
                .map(|(node, deps)| {
                    (node.to_string(), deps.iter().map(|d| d.to_string()).collect())
                })
                .collect()
        }

        #[test]
        fn test_graph_reports_unregistered_dependency() {
            let deps = graph(&[("Room", &["Door"]), ("Lamp", &[])]);
            assert_eq!(
                validate_dependency_graph(&deps),
                Err(DependencyValidationError::MissingDependency {
                    dependent: "Room".to_string(),
                    missing: "Door".to_string(),
                })
            );
        }

        #[test]
        fn test_graph_reports_cycle_from_first_sorted_node() {
            let deps = graph(&[("Hall", &["Room"]), ("Room", &["Door"]), ("Door", &["Hall"])]);
            assert_eq!(
                validate_dependency_graph(&deps),
                Err(DependencyValidationError::CircularDependency {
                    cycle: vec!["Door".into(), "Hall".into(), "Room".into(), "Door".into()],
                })
            );

            let looped = graph(&[("Mirror", &["Mirror"])]);
            let err = validate_dependency_graph(&looped).unwrap_err();
            assert_eq!(err.to_string(), "Circular dependency detected: Mirror -> Mirror");
        }

        #[test]
        fn test_graph_accepts_shared_dependencies() {
            let deps = graph(&[
                ("Config", &[]),
                ("Store", &["Config"]),
                ("Service", &["Store", "Config"]),
            ]);
            assert!(validate_dependency_graph(&deps).is_ok());
        }
    }
}
