//! Target graph construction
//!
//! Dependency edges between targets are inferred from artifact paths: if
//! a target lists another target's output artifact among its
//! `internal_static_library_paths` or `library_import_paths`, the
//! producer must be built first. Entries that match no internal artifact
//! are external libraries and create no edge.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::resolve::ResolvedTarget;
use crate::{Error, Result};

/// Directed acyclic dependency graph over resolved targets
///
/// Edges point dependency -> dependent; the topological order therefore
/// lists dependencies before the targets that consume them.
#[derive(Debug)]
pub struct TargetGraph {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
    topo_order: Vec<String>,
}

impl TargetGraph {
    /// Build the graph from resolved targets (in declaration order)
    pub fn build(targets: &[ResolvedTarget]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();

        // Node insertion order tracks declaration order; Kahn's queue
        // below relies on it for deterministic tie-breaking.
        for target in targets {
            let idx = graph.add_node(target.name.clone());
            indices.insert(target.name.clone(), idx);
        }

        let artifact_owners: HashMap<String, &str> = targets
            .iter()
            .map(|t| (t.artifact_path().to_string(), t.name.as_str()))
            .collect();

        for target in targets {
            let dependent_idx = indices[&target.name];
            let referenced = target
                .internal_static_library_paths
                .iter()
                .chain(target.library_import_paths.iter());

            for path in referenced {
                match artifact_owners.get(path.as_str()) {
                    Some(owner) if *owner == target.name => {
                        return Err(Error::cyclic_dependency(vec![target.name.clone()]));
                    }
                    Some(owner) => {
                        let dependency_idx = indices[*owner];
                        // Dependency must be built before the dependent
                        if !graph.contains_edge(dependency_idx, dependent_idx) {
                            graph.add_edge(dependency_idx, dependent_idx, ());
                        }
                    }
                    None => {
                        tracing::debug!(
                            target_name = %target.name,
                            path = %path,
                            "No internal target produces this path; treating as external library"
                        );
                    }
                }
            }
        }

        let topo_order = kahn_order(&graph, targets)?;

        Ok(Self {
            graph,
            indices,
            topo_order,
        })
    }

    /// Targets in build order (dependencies first)
    pub fn topo_order(&self) -> &[String] {
        &self.topo_order
    }

    /// Direct dependencies of a target
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Direct dependents of a target
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, dir: Direction) -> Vec<String> {
        let Some(&idx) = self.indices.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].clone())
            .collect();
        names.sort();
        names
    }

    /// Restrict the build order to the requested targets plus their
    /// transitive dependencies, preserving the overall topological order.
    ///
    /// An empty request selects every target.
    pub fn restrict_to(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Ok(self.topo_order.clone());
        }

        let mut selected: HashSet<String> = HashSet::new();
        let mut pending: VecDeque<String> = VecDeque::new();

        for name in requested {
            if !self.indices.contains_key(name) {
                return Err(Error::UnknownTargetReference { name: name.clone() });
            }
            pending.push_back(name.clone());
        }

        while let Some(name) = pending.pop_front() {
            if selected.insert(name.clone()) {
                for dep in self.dependencies_of(&name) {
                    pending.push_back(dep);
                }
            }
        }

        Ok(self
            .topo_order
            .iter()
            .filter(|name| selected.contains(*name))
            .cloned()
            .collect())
    }
}

/// Kahn's algorithm with the ready queue seeded and drained in
/// declaration order, so independent targets always schedule
/// deterministically. Falls back to cycle extraction when nodes remain.
fn kahn_order(graph: &DiGraph<String, ()>, targets: &[ResolvedTarget]) -> Result<Vec<String>> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
        .collect();

    let mut queue: VecDeque<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx] == 0)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(idx) = queue.pop_front() {
        order.push(graph[idx].clone());
        // Collect first so unlock order follows declaration order too
        let mut unlocked: Vec<NodeIndex> = Vec::new();
        for next in graph.neighbors_directed(idx, Direction::Outgoing) {
            let degree = in_degree.get_mut(&next).unwrap();
            *degree -= 1;
            if *degree == 0 {
                unlocked.push(next);
            }
        }
        unlocked.sort();
        queue.extend(unlocked);
    }

    if order.len() < graph.node_count() {
        let done: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        let cycle = find_cycle(graph, &done, targets);
        return Err(Error::cyclic_dependency(cycle));
    }

    Ok(order)
}

/// Depth-first tri-color search over the residue of Kahn's algorithm,
/// returning the members of one cycle in edge order.
fn find_cycle(
    graph: &DiGraph<String, ()>,
    done: &HashSet<&str>,
    targets: &[ResolvedTarget],
) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors: HashMap<NodeIndex, Color> = graph
        .node_indices()
        .map(|idx| (idx, Color::White))
        .collect();
    let mut stack: Vec<NodeIndex> = Vec::new();

    fn visit(
        graph: &DiGraph<String, ()>,
        idx: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(idx, Color::Gray);
        stack.push(idx);

        for next in graph.neighbors_directed(idx, Direction::Outgoing) {
            match colors[&next] {
                Color::Gray => {
                    let start = stack.iter().position(|&n| n == next).unwrap();
                    return Some(stack[start..].to_vec());
                }
                Color::White => {
                    if let Some(cycle) = visit(graph, next, colors, stack) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        stack.pop();
        colors.insert(idx, Color::Black);
        None
    }

    // Start from undrained nodes, in declaration order
    for target in targets {
        if done.contains(target.name.as_str()) {
            continue;
        }
        let idx = graph
            .node_indices()
            .find(|&i| graph[i] == target.name)
            .expect("target present in graph");
        if colors[&idx] == Color::White {
            if let Some(cycle) = visit(graph, idx, &mut colors, &mut stack) {
                return cycle.into_iter().map(|i| graph[i].clone()).collect();
            }
        }
    }

    Vec::new()
}
