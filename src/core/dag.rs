//! Dependency graph validation.
//!
//! The graph mirrors the dependency sets of registered tasks. It is used to
//! reject registrations that would close a cycle (a cyclic run would block
//! forever on completion signals) and, in strict mode, to reject references
//! to tasks that were never registered.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use super::types::TaskId;

/// Errors that can occur when validating task dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    /// A cycle was detected in the graph.
    #[error("cycle detected involving task: {0}")]
    CycleDetected(TaskId),

    /// A dependency references a task that doesn't exist.
    #[error("unknown dependency: task '{from}' depends on non-existent task '{to}'")]
    UnknownDependency { from: TaskId, to: TaskId },

    /// Attempted to add a duplicate task.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),
}

/// Directed graph of task dependencies, in registration order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Task IDs in the order they were added.
    order: Vec<TaskId>,

    /// Edges: task_id -> list of tasks it depends on.
    dependencies: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.dependencies.contains_key(id)
    }

    /// Add a task and its dependencies.
    ///
    /// Dependencies may reference tasks that are added later. If the new
    /// edges close a cycle among known tasks, the task is not added.
    pub fn add_task(&mut self, id: TaskId, depends_on: &[TaskId]) -> Result<(), DagError> {
        if self.contains(&id) {
            return Err(DagError::DuplicateTask(id));
        }

        self.order.push(id.clone());
        self.dependencies.insert(id.clone(), depends_on.to_vec());

        if let Err(err) = self.topological_sort() {
            self.order.pop();
            self.dependencies.remove(&id);
            return Err(err);
        }

        Ok(())
    }

    /// Get the dependencies of a task.
    pub fn get_dependencies(&self, id: &TaskId) -> Option<&[TaskId]> {
        self.dependencies.get(id).map(|v| v.as_slice())
    }

    /// Get tasks that depend on the given task (downstream tasks).
    pub fn get_downstream(&self, id: &TaskId) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|task_id| {
                self.dependencies
                    .get(*task_id)
                    .is_some_and(|deps| deps.contains(id))
            })
            .cloned()
            .collect()
    }

    /// All `(from, to)` pairs where `to` was never added.
    pub fn unknown_dependencies(&self) -> Vec<(TaskId, TaskId)> {
        let mut unknown = Vec::new();
        for from in &self.order {
            for to in &self.dependencies[from] {
                if !self.contains(to) {
                    unknown.push((from.clone(), to.clone()));
                }
            }
        }
        unknown
    }

    /// Fail on the first dependency that references an unknown task.
    pub fn validate_references(&self) -> Result<(), DagError> {
        match self.unknown_dependencies().into_iter().next() {
            Some((from, to)) => Err(DagError::UnknownDependency { from, to }),
            None => Ok(()),
        }
    }

    /// Return tasks in a dependency-respecting order.
    ///
    /// Unknown dependencies are ignored. Ties are broken by registration
    /// order. Returns an error if a cycle exists.
    pub fn topological_sort(&self) -> Result<Vec<TaskId>, DagError> {
        // Kahn's algorithm
        let mut in_degree: HashMap<&TaskId, usize> = HashMap::new();
        let mut reverse_deps: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();

        for id in &self.order {
            let known = self.dependencies[id]
                .iter()
                .filter(|dep| self.contains(dep))
                .collect::<Vec<_>>();
            in_degree.insert(id, known.len());
            for dep in known {
                reverse_deps.entry(dep).or_default().push(id);
            }
        }

        // Start with nodes that have no dependencies
        let mut queue: VecDeque<&TaskId> = self
            .order
            .iter()
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut result = Vec::with_capacity(self.order.len());

        while let Some(id) = queue.pop_front() {
            result.push(id.clone());

            // Reduce in-degree for all downstream tasks
            if let Some(downstream) = reverse_deps.get(id) {
                for next in downstream {
                    if let Some(degree) = in_degree.get_mut(next) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*next);
                        }
                    }
                }
            }
        }

        // If we didn't visit all nodes, there's a cycle
        if result.len() != self.order.len() {
            let cycle_node = self
                .order
                .iter()
                .rev()
                .find(|id| in_degree[id] > 0)
                .cloned()
                .unwrap_or_else(|| self.order[0].clone());
            return Err(DagError::CycleDetected(cycle_node));
        }

        Ok(result)
    }

    /// Get all task IDs in registration order.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.order
    }
}
