//! Step dependency graph built on `petgraph`.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::definition::PlannedStep;
use crate::error::PlanError;

/// Directed graph of step dependencies; an edge `a -> b` means `b` waits
/// for `a`. Node weights are step indices.
#[derive(Debug)]
pub struct PlanGraph {
    graph: DiGraph<usize, ()>,
}

impl PlanGraph {
    /// Build the graph from steps whose indices are `0..steps.len()`.
    ///
    /// Dependencies on unknown indices are rejected; a step depending on
    /// itself is a cycle.
    pub fn from_steps(steps: &[PlannedStep]) -> Result<Self, PlanError> {
        let mut graph = DiGraph::with_capacity(steps.len(), steps.len());
        for step in steps {
            graph.add_node(step.index);
        }
        for step in steps {
            for &dependency in &step.depends_on {
                if dependency >= steps.len() {
                    return Err(PlanError::UnknownDependency {
                        step: step.key.clone(),
                        dependency: dependency.to_string(),
                    });
                }
                if dependency == step.index {
                    return Err(PlanError::CyclicPlan);
                }
                graph.add_edge(NodeIndex::new(dependency), NodeIndex::new(step.index), ());
            }
        }
        Ok(Self { graph })
    }

    /// Order steps that share a target lock by declaration: each such step
    /// also waits for every earlier one on the same lock.
    ///
    /// A template whose dependencies run against that order then shows up
    /// as a cycle instead of two steps waiting on each other forever.
    #[must_use]
    pub fn with_lock_order(mut self, steps: &[PlannedStep]) -> Self {
        for (position, later) in steps.iter().enumerate() {
            let Some(lock) = &later.lock else {
                continue;
            };
            for earlier in steps[..position].iter().filter(|s| s.lock.as_ref() == Some(lock)) {
                self.graph.update_edge(
                    NodeIndex::new(earlier.index),
                    NodeIndex::new(later.index),
                    (),
                );
            }
        }
        self
    }

    /// Returns `true` if the graph contains at least one cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Group steps into levels using Kahn's algorithm.
    ///
    /// Every step's dependencies sit in earlier levels; within a level steps
    /// are sorted by index, so the result is deterministic.
    pub fn levels(&self) -> Result<Vec<Vec<usize>>, PlanError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            let current: Vec<NodeIndex> = remaining
                .iter()
                .filter(|idx| in_degree[idx.index()] == 0)
                .copied()
                .collect();
            if current.is_empty() {
                return Err(PlanError::CyclicPlan);
            }
            for &idx in &current {
                for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                    in_degree[next.index()] -= 1;
                }
            }
            remaining.retain(|idx| !current.contains(idx));

            let mut level: Vec<usize> = current.into_iter().map(|idx| self.graph[idx]).collect();
            level.sort_unstable();
            levels.push(level);
        }
        Ok(levels)
    }

    /// A deterministic topological order of step indices.
    pub fn topological_order(&self) -> Result<Vec<usize>, PlanError> {
        Ok(self.levels()?.into_iter().flatten().collect())
    }

    /// The order compensation walks: dependents before their dependencies.
    pub fn reverse_topological_order(&self) -> Result<Vec<usize>, PlanError> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    /// Steps `index` waits for.
    #[must_use]
    pub fn predecessors(&self, index: usize) -> Vec<usize> {
        self.neighbors(index, Direction::Incoming)
    }

    /// Steps waiting for `index`.
    #[must_use]
    pub fn successors(&self, index: usize) -> Vec<usize> {
        self.neighbors(index, Direction::Outgoing)
    }

    fn neighbors(&self, index: usize, direction: Direction) -> Vec<usize> {
        if index >= self.graph.node_count() {
            return Vec::new();
        }
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(index), direction)
            .map(|idx| self.graph[idx])
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Steps with no dependencies.
    #[must_use]
    pub fn entry_steps(&self) -> Vec<usize> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx])
            .collect()
    }

    /// Number of steps.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
