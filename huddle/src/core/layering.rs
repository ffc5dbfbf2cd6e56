//! Dependency layering for the planned task graph.
//!
//! Layer 0 holds tasks with no dependencies; every other task sits one layer
//! above its deepest dependency. Tasks in the same layer never depend on each
//! other, so a layer is the unit of parallelizable work.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::types::Task;

/// Failure computing layers for a task graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayeringError {
    #[error("task '{task}' depends on '{dependency}', which does not exist")]
    MissingDependency { task: String, dependency: String },
    #[error("dependency cycle involving tasks: {}", involved.join(", "))]
    Cycle { involved: Vec<String> },
}

/// Compute the execution layer of every task.
///
/// `layer(t) = 0` when `t` has no dependencies, otherwise
/// `1 + max(layer(d))` over its dependencies. Fails fast on a dependency
/// reference that names no task, and reports a cycle when no remaining task
/// becomes ready.
pub fn assign_layers(tasks: &[Task]) -> Result<BTreeMap<String, u32>, LayeringError> {
    for task in tasks {
        for dep in &task.depends_on {
            if !tasks.iter().any(|t| &t.id == dep) {
                return Err(LayeringError::MissingDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut layers: BTreeMap<String, u32> = BTreeMap::new();
    let mut remaining: Vec<&Task> = tasks.iter().collect();

    while !remaining.is_empty() {
        let mut progressed = false;
        remaining.retain(|task| {
            let ready = task.depends_on.iter().all(|dep| layers.contains_key(dep));
            if !ready {
                return true;
            }
            let layer = task
                .depends_on
                .iter()
                .map(|dep| layers[dep] + 1)
                .max()
                .unwrap_or(0);
            layers.insert(task.id.clone(), layer);
            progressed = true;
            false
        });

        if !progressed {
            let mut involved: Vec<String> =
                remaining.iter().map(|task| task.id.clone()).collect();
            involved.sort();
            return Err(LayeringError::Cycle { involved });
        }
    }

    Ok(layers)
}

/// Highest layer present, if any task exists.
pub fn max_layer(layers: &BTreeMap<String, u32>) -> Option<u32> {
    layers.values().copied().max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task;

    #[test]
    fn independent_tasks_share_layer_zero() {
        let tasks = vec![task("a", &[]), task("b", &[]), task("c", &[])];
        let layers = assign_layers(&tasks).expect("layers");
        assert!(layers.values().all(|&layer| layer == 0));
    }

    #[test]
    fn layer_is_one_above_deepest_dependency() {
        // d depends on both a chain of depth 2 and a root: it must land on
        // the maximum incoming layer + 1, not the first discovered.
        let tasks = vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("d", &["a", "c"]),
        ];
        let layers = assign_layers(&tasks).expect("layers");
        assert_eq!(layers["a"], 0);
        assert_eq!(layers["b"], 1);
        assert_eq!(layers["c"], 2);
        assert_eq!(layers["d"], 3);
    }

    #[test]
    fn layer_zero_iff_no_dependencies() {
        let tasks = vec![task("a", &[]), task("b", &["a"])];
        let layers = assign_layers(&tasks).expect("layers");
        for t in &tasks {
            assert_eq!(t.depends_on.is_empty(), layers[&t.id] == 0);
        }
    }

    #[test]
    fn missing_dependency_is_named() {
        let tasks = vec![task("a", &["ghost"])];
        let err = assign_layers(&tasks).expect_err("should fail");
        assert_eq!(
            err,
            LayeringError::MissingDependency {
                task: "a".to_string(),
                dependency: "ghost".to_string(),
            }
        );
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn self_dependency_reports_cycle() {
        let tasks = vec![task("a", &["a"])];
        let err = assign_layers(&tasks).expect_err("should fail");
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn mutual_dependency_names_all_involved() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"]), task("c", &[])];
        let err = assign_layers(&tasks).expect_err("should fail");
        assert_eq!(
            err,
            LayeringError::Cycle {
                involved: vec!["a".to_string(), "b".to_string()],
            }
        );
    }
}
