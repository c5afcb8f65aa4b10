//! Dependency graph over one tag's tasks and subtasks.
//!
//! Design:
//! - Nodes: every task (`EntityId::Task`) and subtask (`EntityId::Subtask`) in the tag
//! - Forward edges: entity -> entities it depends on (must complete first)
//! - Reverse edges: entity -> entities that depend on it
//! - Invariant: edges and reverse_edges must be kept in sync

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::{EntityId, TagPartition};

/// Dependency graph for one tag.
///
/// Edges may point at entities that do not exist (dangling references are
/// tolerated in the document); `exists` only reports real nodes.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashSet<EntityId>,

    /// Forward edges: entity -> entities it depends on
    edges: HashMap<EntityId, HashSet<EntityId>>,

    /// Reverse edges: entity -> entities waiting for it
    reverse_edges: HashMap<EntityId, HashSet<EntityId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a tag, resolving each dependency list in its
    /// owner's context.
    pub fn from_partition(partition: &TagPartition) -> Self {
        let mut graph = Self::new();
        for task in &partition.tasks {
            let task_node = EntityId::Task(task.id);
            graph.add_node(task_node);
            for dep in task.resolved_dependencies() {
                graph.add_dependency(task_node, dep.entity(None));
            }
            for subtask in &task.subtasks {
                let node = EntityId::Subtask {
                    parent: task.id,
                    subtask: subtask.id,
                };
                graph.add_node(node);
                for dep in subtask.resolved_dependencies(task) {
                    graph.add_dependency(node, dep.entity(Some(task.id)));
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, node: EntityId) {
        self.nodes.insert(node);
    }

    /// Add a dependency: `node` depends on `depends_on`.
    pub fn add_dependency(&mut self, node: EntityId, depends_on: EntityId) {
        self.edges.entry(node).or_default().insert(depends_on);
        self.reverse_edges
            .entry(depends_on)
            .or_default()
            .insert(node);
    }

    /// Remove a dependency, keeping both edge maps in sync.
    pub fn remove_dependency(&mut self, node: EntityId, depends_on: EntityId) {
        if let Entry::Occupied(mut e) = self.edges.entry(node) {
            e.get_mut().remove(&depends_on);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
        if let Entry::Occupied(mut e) = self.reverse_edges.entry(depends_on) {
            e.get_mut().remove(&node);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
    }

    pub fn exists(&self, node: EntityId) -> bool {
        self.nodes.contains(&node)
    }

    /// Direct dependencies, sorted.
    pub fn dependencies_of(&self, node: EntityId) -> Vec<EntityId> {
        let mut deps: Vec<EntityId> = self
            .edges
            .get(&node)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default();
        deps.sort();
        deps
    }

    /// Entities that directly depend on `node`, sorted.
    pub fn dependents_of(&self, node: EntityId) -> Vec<EntityId> {
        let mut waiting: Vec<EntityId> = self
            .reverse_edges
            .get(&node)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default();
        waiting.sort();
        waiting
    }

    /// Everything reachable from `start` by following dependency edges,
    /// excluding `start` itself.
    pub fn reachable_from(&self, start: EntityId) -> Vec<EntityId> {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut out = Vec::new();
        while let Some(node) = queue.pop_front() {
            for dep in self.dependencies_of(node) {
                if seen.insert(dep) {
                    out.push(dep);
                    queue.push_back(dep);
                }
            }
        }
        out
    }

    pub fn has_cycle(&self) -> bool {
        self.detect_cycle().is_some()
    }

    /// Return the first cycle found as a path `a -> b -> ... -> a`, or `None`
    /// for a DAG.
    ///
    /// Three-colour DFS: a gray node reached again closes a cycle; black nodes
    /// are fully explored and skipped, so diamonds are not false positives.
    pub fn detect_cycle(&self) -> Option<Vec<EntityId>> {
        let mut starts: Vec<EntityId> = self.edges.keys().copied().collect();
        starts.sort();

        let mut colors: HashMap<EntityId, Color> = HashMap::new();
        let mut path: Vec<EntityId> = Vec::new();
        for start in starts {
            if colors.get(&start).copied().unwrap_or(Color::White) == Color::White
                && let Some(cycle) = self.dfs_cycle(start, &mut colors, &mut path)
            {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: EntityId,
        colors: &mut HashMap<EntityId, Color>,
        path: &mut Vec<EntityId>,
    ) -> Option<Vec<EntityId>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for dep in self.dependencies_of(node) {
            match colors.get(&dep).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    let from = path.iter().position(|n| *n == dep).unwrap_or(0);
                    let mut cycle = path[from..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = self.dfs_cycle(dep, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        colors.insert(node, Color::Black);
        path.pop();
        None
    }
}
