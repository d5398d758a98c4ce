//! Generator dependency resolution.
//!
//! Builds one dependency graph spanning all hosts (dependencies may cross
//! host boundaries) over the secrets that still need generating, and produces
//! a generation order via depth-first topological sort. A cycle is a hard
//! failure naming its participants; it is never silently broken by picking an
//! arbitrary order.

use std::collections::BTreeMap;

use crate::core::manifest::{Manifest, NodeId};
use crate::error::{Error, Result};

/// Secrets that participate in generation: a generator is set and the source
/// ciphertext does not exist yet. Secrets whose ciphertext already exists are
/// already-resolved leaves, available to satisfy dependents, generator or
/// not.
pub fn pending(manifest: &Manifest) -> Vec<NodeId> {
    manifest
        .all_secrets()
        .filter(|(_, decl)| {
            decl.generator.is_some()
                && decl
                    .source
                    .as_ref()
                    .is_some_and(|source| !source.exists())
        })
        .map(|(id, _)| id)
        .collect()
}

/// Directed dependency graph over pending secrets.
///
/// An edge `A -> B` means A must be generated before B; the graph stores the
/// reverse adjacency (each node's dependencies) since that is what the DFS
/// walks.
pub struct DependencyGraph {
    deps: BTreeMap<NodeId, Vec<NodeId>>,
}

impl DependencyGraph {
    /// Build the graph induced by the pending secrets of a manifest.
    ///
    /// Dependencies that are not themselves pending are dropped: their
    /// ciphertext exists, so they impose no ordering.
    pub fn build(manifest: &Manifest, pending: &[NodeId]) -> Self {
        let mut deps: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();

        for id in pending {
            let mut node_deps = Vec::new();
            if let Some(decl) = manifest.secret(id) {
                if let Some(generator) = decl
                    .generator
                    .as_ref()
                    .and_then(|name| manifest.generators.get(name))
                {
                    for reference in &generator.dependencies {
                        if let Some(target) = NodeId::parse(reference) {
                            if pending.contains(&target) {
                                node_deps.push(target);
                            }
                        }
                    }
                }
            }
            deps.insert(id.clone(), node_deps);
        }

        Self { deps }
    }

    /// Topological order: every dependency precedes its dependent.
    ///
    /// Three-color depth-first search; a back edge to an in-progress node is
    /// a cycle and fails with [`Error::CyclicDependency`] naming the
    /// participating secrets.
    pub fn resolve(&self) -> Result<Vec<NodeId>> {
        let mut color: BTreeMap<&NodeId, Color> = BTreeMap::new();
        let mut order = Vec::with_capacity(self.deps.len());
        let mut path = Vec::new();

        for node in self.deps.keys() {
            if color.get(node).copied().unwrap_or(Color::White) == Color::White {
                self.visit(node, &mut color, &mut path, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a NodeId,
        color: &mut BTreeMap<&'a NodeId, Color>,
        path: &mut Vec<&'a NodeId>,
        order: &mut Vec<NodeId>,
    ) -> Result<()> {
        color.insert(node, Color::InProgress);
        path.push(node);

        if let Some(deps) = self.deps.get(node) {
            for dep in deps {
                match color.get(dep).copied().unwrap_or(Color::White) {
                    Color::White => self.visit(dep, color, path, order)?,
                    Color::InProgress => {
                        // Back edge: the cycle is the path suffix starting at
                        // the node we just came back to.
                        let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(dep.to_string());
                        return Err(Error::CyclicDependency(cycle));
                    }
                    Color::Done => {}
                }
            }
        }

        path.pop();
        color.insert(node, Color::Done);
        order.push(node.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    InProgress,
    Done,
}
