//! Dependency graph over workflow steps: topological ordering and
//! antichain-level grouping for parallel dispatch.
//!
//! Kahn's algorithm drives both: a full topological sort for a flat
//! execution order, and a level-by-level variant that peels one antichain
//! (steps with no unresolved dependency) at a time, the unit the engine
//! schedules concurrently.

use std::collections::{HashMap, VecDeque};

use warden_types::{Request, Step, Violation, ViolationKind};

/// Steps and their dependency edges, keyed by step id.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    nodes: HashMap<String, Step>,
    order: Vec<String>,
}

impl DependencyGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `step`, recording its declared dependencies as incoming edges.
    pub fn add_step(&mut self, step: Step) {
        self.order.push(step.id.clone());
        self.nodes.insert(step.id.clone(), step);
    }

    /// Number of steps in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn in_degrees(&self) -> HashMap<String, usize> {
        let mut degrees: HashMap<String, usize> =
            self.nodes.keys().map(|id| (id.clone(), 0)).collect();
        for step in self.nodes.values() {
            for dep in &step.depends_on {
                if let Some(d) = degrees.get_mut(&step.id) {
                    if self.nodes.contains_key(dep) {
                        *d += 1;
                    }
                }
            }
        }
        degrees
    }

    /// Flat execution order respecting every dependency edge.
    ///
    /// # Errors
    ///
    /// Returns a [`ViolationKind::Cycle`] violation if the graph contains a
    /// cycle, or references a dependency id that was never added.
    pub fn topological_order(&self) -> Result<Vec<Step>, Violation> {
        Ok(self
            .antichain_levels()?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Group steps into antichains: level 0 has no dependencies, level N's
    /// steps depend only on steps in levels `< N`. Steps within one level
    /// carry no edges between them and may run concurrently.
    ///
    /// # Errors
    ///
    /// Returns a [`ViolationKind::Cycle`] violation if a cycle prevents
    /// every step from being scheduled.
    pub fn antichain_levels(&self) -> Result<Vec<Vec<Step>>, Violation> {
        for step in self.nodes.values() {
            for dep in &step.depends_on {
                if !self.nodes.contains_key(dep) {
                    return Err(Violation::new(
                        ViolationKind::Cycle,
                        format!("step '{}' depends on unknown step '{dep}'", step.id),
                    ));
                }
            }
        }

        let mut in_degree = self.in_degrees();
        let mut levels: Vec<Vec<Step>> = Vec::new();
        let mut ready: VecDeque<String> = self
            .order
            .iter()
            .filter(|id| in_degree.get(*id).copied() == Some(0))
            .cloned()
            .collect();
        let mut scheduled = 0usize;

        while !ready.is_empty() {
            let mut level = Vec::new();
            let this_level: Vec<String> = ready.drain(..).collect();
            for id in &this_level {
                level.push(self.nodes[id].clone());
                scheduled += 1;
            }

            for step in &self.nodes.values().collect::<Vec<_>>() {
                if this_level.contains(&step.id) {
                    continue;
                }
                if step.depends_on.iter().any(|d| this_level.contains(d)) {
                    let degree = in_degree.get_mut(&step.id).expect("tracked node");
                    let removable = step.depends_on.iter().filter(|d| this_level.contains(*d)).count();
                    *degree = degree.saturating_sub(removable);
                    if *degree == 0 {
                        ready.push_back(step.id.clone());
                    }
                }
            }

            levels.push(level);
        }

        if scheduled != self.nodes.len() {
            return Err(Violation::new(
                ViolationKind::Cycle,
                "dependency cycle detected in workflow",
            ));
        }

        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(
            id,
            Request::Python {
                code: "pass".into(),
                globals: std::collections::HashMap::new(),
                locals: std::collections::HashMap::new(),
            },
        )
        .depends_on(deps.iter().copied())
    }

    #[test]
    fn linear_chain_orders_correctly() {
        let mut g = DependencyGraph::new();
        g.add_step(step("a", &[]));
        g.add_step(step("b", &["a"]));
        g.add_step(step("c", &["b"]));

        let order = g.topological_order().unwrap();
        let ids: Vec<_> = order.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn independent_steps_share_a_level() {
        let mut g = DependencyGraph::new();
        g.add_step(step("a", &[]));
        g.add_step(step("b", &[]));
        g.add_step(step("c", &["a", "b"]));

        let levels = g.antichain_levels().unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].len(), 2);
        assert_eq!(levels[1].len(), 1);
        assert_eq!(levels[1][0].id, "c");
    }

    #[test]
    fn cycle_is_detected() {
        let mut g = DependencyGraph::new();
        g.add_step(step("a", &["b"]));
        g.add_step(step("b", &["a"]));

        let err = g.topological_order().unwrap_err();
        assert_eq!(err.kind, ViolationKind::Cycle);
    }

    #[test]
    fn unknown_dependency_is_a_cycle_violation() {
        let mut g = DependencyGraph::new();
        g.add_step(step("a", &["ghost"]));

        let err = g.topological_order().unwrap_err();
        assert_eq!(err.kind, ViolationKind::Cycle);
    }
}
