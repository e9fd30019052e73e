//! Dependency graph over a manifest's sub-specs.
//!
//! The graph is a derived, in-memory view: it is rebuilt from the manifest at
//! the start of every scheduling cycle and never persisted on its own.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use thiserror::Error;

use crate::manifest::{Manifest, SubSpecStatus};
use crate::paths::sanitize_name;

/// Errors raised while building or scheduling over the dependency graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An entry has no usable identifier, or identifiers collide.
    #[error("Malformed manifest: {reason}")]
    MalformedManifest { reason: String },

    /// A dependency names a sub-spec that is not in the manifest.
    #[error("Sub-spec '{node}' depends on unknown sub-spec '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    /// Nothing is eligible because pending sub-specs depend on each other.
    #[error(
        "No eligible sub-specs and none in progress. Dependency cycle detected among: {}",
        .nodes.join(", ")
    )]
    DependencyCycle { nodes: Vec<String> },

    /// Nothing is eligible because pending sub-specs wait on failed ones.
    #[error(
        "No eligible sub-specs and none in progress. {} sub-spec(s) can never run: {}",
        .blocked.len(),
        describe_blocked(.blocked)
    )]
    Stuck { blocked: Vec<BlockedNode> },
}

/// A pending sub-spec together with the dependencies holding it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedNode {
    pub name: String,
    pub waiting_on: Vec<(String, SubSpecStatus)>,
}

impl fmt::Display for BlockedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let waits: Vec<String> = self
            .waiting_on
            .iter()
            .map(|(dep, status)| format!("{} is {}", dep, status))
            .collect();
        write!(f, "{} (waiting on {})", self.name, waits.join(", "))
    }
}

fn describe_blocked(blocked: &[BlockedNode]) -> String {
    blocked
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One sub-spec with its resolved dependencies and current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubSpecNode {
    pub name: String,
    pub deps: Vec<String>,
    pub status: SubSpecStatus,
}

/// Sub-specs keyed by name, iterated in manifest order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    nodes: HashMap<String, SubSpecNode>,
}

impl DependencyGraph {
    /// Build the graph from a manifest.
    ///
    /// Fails when an entry has no name, when two entries share a name (or
    /// names that normalize to the same container name), or when a
    /// dependency refers to a sub-spec that does not exist.
    pub fn build(manifest: &Manifest) -> Result<Self, GraphError> {
        let mut graph = DependencyGraph::default();
        // Container names are derived from the sanitized sub-spec name.
        let mut unit_names: HashMap<String, String> = HashMap::new();

        for (index, entry) in manifest.entries().iter().enumerate() {
            let name = entry
                .resolved_name()
                .ok_or_else(|| GraphError::MalformedManifest {
                    reason: format!("sub-spec entry #{} has no name or id", index + 1),
                })?
                .to_string();

            if graph.nodes.contains_key(&name) {
                return Err(GraphError::MalformedManifest {
                    reason: format!("duplicate sub-spec name '{}'", name),
                });
            }
            if let Some(other) = unit_names.insert(sanitize_name(&name), name.clone()) {
                return Err(GraphError::MalformedManifest {
                    reason: format!(
                        "sub-specs '{}' and '{}' map to the same container name '{}'",
                        other,
                        name,
                        sanitize_name(&name)
                    ),
                });
            }

            let node = SubSpecNode {
                name: name.clone(),
                deps: entry
                    .declared_dependencies()
                    .iter()
                    .map(|d| d.trim().to_string())
                    .collect(),
                status: entry.resolved_status(),
            };
            graph.order.push(name.clone());
            graph.nodes.insert(name, node);
        }

        for node in graph.nodes() {
            if let Some(missing) = node.deps.iter().find(|d| !graph.nodes.contains_key(*d)) {
                return Err(GraphError::UnknownDependency {
                    node: node.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in manifest order.
    pub fn nodes(&self) -> impl Iterator<Item = &SubSpecNode> {
        self.order.iter().filter_map(|name| self.nodes.get(name))
    }

    pub fn get(&self, name: &str) -> Option<&SubSpecNode> {
        self.nodes.get(name)
    }

    pub fn status(&self, name: &str) -> Option<SubSpecStatus> {
        self.nodes.get(name).map(|n| n.status)
    }

    /// Set a node's status. Returns false if the node does not exist.
    pub fn set_status(&mut self, name: &str, status: SubSpecStatus) -> bool {
        match self.nodes.get_mut(name) {
            Some(node) => {
                node.status = status;
                true
            }
            None => false,
        }
    }

    /// `(name, status)` pairs in manifest order, for writing back to the manifest.
    pub fn statuses(&self) -> impl Iterator<Item = (&str, SubSpecStatus)> {
        self.nodes().map(|n| (n.name.as_str(), n.status))
    }

    pub fn count(&self, status: SubSpecStatus) -> usize {
        self.nodes().filter(|n| n.status == status).count()
    }

    /// Whether every node is complete.
    pub fn is_complete(&self) -> bool {
        self.nodes().all(|n| n.status == SubSpecStatus::Complete)
    }

    /// Names of nodes that can run now, in manifest order.
    ///
    /// A node is eligible when it is pending and every dependency is complete.
    pub fn eligible(&self) -> Vec<String> {
        self.nodes()
            .filter(|node| node.status == SubSpecStatus::Pending)
            .filter(|node| {
                node.deps
                    .iter()
                    .all(|dep| self.status(dep) == Some(SubSpecStatus::Complete))
            })
            .map(|node| node.name.clone())
            .collect()
    }

    /// Reset `in_progress` nodes to `pending`, returning their names.
    ///
    /// Execution units are not persisted, so at the start of a run nothing
    /// can actually be in flight.
    pub fn reset_in_progress(&mut self) -> Vec<String> {
        let stale: Vec<String> = self
            .nodes()
            .filter(|n| n.status == SubSpecStatus::InProgress)
            .map(|n| n.name.clone())
            .collect();
        for name in &stale {
            self.set_status(name, SubSpecStatus::Pending);
        }
        stale
    }

    /// Pending nodes with at least one dependency that is not complete.
    pub fn blocked(&self) -> Vec<BlockedNode> {
        self.nodes()
            .filter(|node| node.status == SubSpecStatus::Pending)
            .filter_map(|node| {
                let waiting_on: Vec<(String, SubSpecStatus)> = node
                    .deps
                    .iter()
                    .filter_map(|dep| {
                        let status = self.status(dep)?;
                        (status != SubSpecStatus::Complete).then(|| (dep.clone(), status))
                    })
                    .collect();
                (!waiting_on.is_empty()).then(|| BlockedNode {
                    name: node.name.clone(),
                    waiting_on,
                })
            })
            .collect()
    }

    /// Dependency cycles among nodes that are not yet complete.
    ///
    /// Each cycle lists its members in manifest order; cycles are ordered by
    /// their first member.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut graph = DiGraph::<&str, ()>::new();
        let mut index = HashMap::new();
        for node in self.nodes().filter(|n| n.status != SubSpecStatus::Complete) {
            index.insert(node.name.as_str(), graph.add_node(node.name.as_str()));
        }
        for node in self.nodes() {
            let Some(&to) = index.get(node.name.as_str()) else {
                continue;
            };
            for dep in &node.deps {
                if let Some(&from) = index.get(dep.as_str()) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut names: Vec<&str> = scc.iter().map(|i| graph[*i]).collect();
                names.sort_by_key(|name| position.get(name).copied().unwrap_or(usize::MAX));
                names.into_iter().map(str::to_string).collect()
            })
            .collect();
        cycles.sort_by_key(|cycle| {
            cycle
                .first()
                .and_then(|name| position.get(name.as_str()).copied())
                .unwrap_or(usize::MAX)
        });
        cycles
    }

    /// Explain why no node is eligible while pending nodes remain.
    pub fn diagnose_stall(&self) -> GraphError {
        match self.find_cycles().into_iter().next() {
            Some(nodes) => GraphError::DependencyCycle { nodes },
            None => GraphError::Stuck {
                blocked: self.blocked(),
            },
        }
    }
}
