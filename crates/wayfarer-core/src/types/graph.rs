//! Task graph definition and structural validation.
//!
//! A `TaskGraph` is the opaque plan handed over by an external planner. The
//! engine validates only structural invariants here: ids resolve, edges
//! point at real nodes, and the dependency relation is acyclic.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::step::{Step, StepId};

/// Structural graph defects. All of these are fatal to the whole task and
/// surface before any node executes.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph has no nodes")]
    EmptyGraph,

    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("step '{0}' depends on undefined step '{1}'")]
    MissingDependency(String, String),

    #[error("edge references undefined step '{0}'")]
    UnknownEdgeEndpoint(String),

    #[error("dependency cycle involving step: {0}")]
    CycleDetected(String),
}

/// Explicit dependency edge: `to` waits for `from`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: StepId,
    pub to: StepId,
}

impl GraphEdge {
    pub fn new(from: impl Into<StepId>, to: impl Into<StepId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Directed acyclic graph of steps.
///
/// Dependencies may be declared either inline on each step or as explicit
/// edges; [`TaskGraph::resolved_dependencies`] folds both into one relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    pub nodes: Vec<Step>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl TaskGraph {
    pub fn new(nodes: Vec<Step>, edges: Vec<GraphEdge>) -> Self {
        Self { nodes, edges }
    }

    /// Build a graph from steps that carry their dependencies inline.
    pub fn from_nodes(nodes: Vec<Step>) -> Self {
        Self {
            nodes,
            edges: Vec::new(),
        }
    }

    /// Look up a step by id.
    pub fn get_step(&self, id: &StepId) -> Option<&Step> {
        self.nodes.iter().find(|step| &step.id == id)
    }

    /// Merge inline dependencies and explicit edges into one map of
    /// step id -> deduplicated dependency list.
    pub fn resolved_dependencies(&self) -> HashMap<StepId, Vec<StepId>> {
        let mut deps: HashMap<StepId, Vec<StepId>> = self
            .nodes
            .iter()
            .map(|step| (step.id.clone(), step.dependencies.clone()))
            .collect();

        for edge in &self.edges {
            if let Some(list) = deps.get_mut(&edge.to) {
                if !list.contains(&edge.from) {
                    list.push(edge.from.clone());
                }
            }
        }

        deps
    }

    /// Validate structural invariants. Must pass before any scheduling.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyGraph);
        }

        let mut seen = HashSet::new();
        for step in &self.nodes {
            if !seen.insert(&step.id) {
                return Err(GraphError::DuplicateStepId(step.id.to_string()));
            }
        }

        let ids: HashSet<&StepId> = self.nodes.iter().map(|step| &step.id).collect();
        for step in &self.nodes {
            for dep in &step.dependencies {
                if !ids.contains(dep) {
                    return Err(GraphError::MissingDependency(
                        step.id.to_string(),
                        dep.to_string(),
                    ));
                }
            }
        }
        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !ids.contains(endpoint) {
                    return Err(GraphError::UnknownEdgeEndpoint(endpoint.to_string()));
                }
            }
        }

        self.detect_cycles()
    }

    /// DFS cycle detection over the resolved dependency relation.
    fn detect_cycles(&self) -> Result<(), GraphError> {
        let deps = self.resolved_dependencies();

        // Adjacency: dependency -> dependents.
        let mut adj: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
        for (id, dep_list) in &deps {
            adj.entry(id).or_default();
            for dep in dep_list {
                adj.entry(dep).or_default().push(id);
            }
        }

        fn dfs<'a>(
            node: &'a StepId,
            adj: &HashMap<&'a StepId, Vec<&'a StepId>>,
            visited: &mut HashSet<&'a StepId>,
            on_path: &mut HashSet<&'a StepId>,
        ) -> Option<&'a StepId> {
            visited.insert(node);
            on_path.insert(node);

            if let Some(neighbors) = adj.get(node) {
                for &next in neighbors {
                    if !visited.contains(next) {
                        if let Some(found) = dfs(next, adj, visited, on_path) {
                            return Some(found);
                        }
                    } else if on_path.contains(next) {
                        return Some(next);
                    }
                }
            }

            on_path.remove(node);
            None
        }

        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        for step in &self.nodes {
            if !visited.contains(&step.id) {
                if let Some(found) = dfs(&step.id, &adj, &mut visited, &mut on_path) {
                    return Err(GraphError::CycleDetected(found.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Group steps into execution levels, breadth-first by dependency
    /// satisfaction: level 0 has no dependencies, level k depends only on
    /// earlier levels. A round that makes no progress while nodes remain
    /// means the graph is cyclic.
    pub fn levels(&self) -> Result<Vec<Vec<StepId>>, GraphError> {
        let deps = self.resolved_dependencies();
        let mut assigned: HashSet<StepId> = HashSet::new();
        let mut levels: Vec<Vec<StepId>> = Vec::new();

        while assigned.len() < self.nodes.len() {
            let mut level: Vec<StepId> = Vec::new();
            for step in &self.nodes {
                if assigned.contains(&step.id) {
                    continue;
                }
                let ready = deps
                    .get(&step.id)
                    .map(|list| list.iter().all(|dep| assigned.contains(dep)))
                    .unwrap_or(true);
                if ready {
                    level.push(step.id.clone());
                }
            }

            if level.is_empty() {
                let stuck = self
                    .nodes
                    .iter()
                    .find(|step| !assigned.contains(&step.id))
                    .map(|step| step.id.to_string())
                    .unwrap_or_default();
                return Err(GraphError::CycleDetected(stuck));
            }

            for id in &level {
                assigned.insert(id.clone());
            }
            levels.push(level);
        }

        Ok(levels)
    }
}
