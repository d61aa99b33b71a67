//! Graph comparison: node provenance over the two runs.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::types::{Graph, GraphEdge};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeProvenance {
    /// Present in both runs.
    Kept,
    /// Only in the newer run.
    Added,
    /// Only in the older run.
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedNode {
    pub id: String,
    pub label: String,
    pub provenance: NodeProvenance,
}

/// Node union of both runs with the newer run's edges.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MergedGraph {
    pub nodes: Vec<MergedNode>,
    pub edges: Vec<GraphEdge>,
}

impl MergedGraph {
    pub fn count(&self, provenance: NodeProvenance) -> usize {
        self.nodes.iter().filter(|n| n.provenance == provenance).count()
    }
}

/// Merge two graphs. Newer-run nodes come first (kept or added), then
/// older-run nodes absent from the newer run (removed). A node id appears at
/// most once. Edges are not diffed.
pub fn merge_graphs(old: &Graph, new: &Graph) -> MergedGraph {
    let old_ids: BTreeSet<&str> = old.nodes.iter().map(|n| n.id.as_str()).collect();
    let new_ids: BTreeSet<&str> = new.nodes.iter().map(|n| n.id.as_str()).collect();

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut nodes = Vec::with_capacity(new.nodes.len() + old.nodes.len());

    for node in &new.nodes {
        if !seen.insert(node.id.as_str()) {
            continue;
        }
        let provenance = if old_ids.contains(node.id.as_str()) {
            NodeProvenance::Kept
        } else {
            NodeProvenance::Added
        };
        nodes.push(MergedNode {
            id: node.id.clone(),
            label: node.label.clone(),
            provenance,
        });
    }
    for node in &old.nodes {
        if new_ids.contains(node.id.as_str()) || !seen.insert(node.id.as_str()) {
            continue;
        }
        nodes.push(MergedNode {
            id: node.id.clone(),
            label: node.label.clone(),
            provenance: NodeProvenance::Removed,
        });
    }

    MergedGraph {
        nodes,
        edges: new.edges.clone(),
    }
}
