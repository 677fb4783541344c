//! Structural validation: milestones, node-type legality, reachability.

use std::collections::{BTreeMap, BTreeSet};

use crate::artifact::{Artifact, ArtifactSummary};
use crate::catalog::NodeCatalog;
use crate::milestones::{MilestoneProperty, MilestoneTable};

pub const DEFAULT_START_NODE: &str = "Start";

/// Outcome of validating one artifact against one target version.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralReport {
    pub version: u32,
    pub summary: ArtifactSummary,
    /// First applicable milestone that does not hold.
    pub missing_milestone: Option<MilestoneProperty>,
    /// Node type tags absent from the catalog.
    pub invalid_types: Vec<String>,
    /// Declared nodes not reachable from the start node.
    pub unreachable: Vec<String>,
}

impl StructuralReport {
    pub fn milestones_ok(&self) -> bool {
        self.missing_milestone.is_none()
    }

    pub fn nodes_ok(&self) -> bool {
        self.invalid_types.is_empty()
    }

    pub fn connected(&self) -> bool {
        self.unreachable.is_empty()
    }

    pub fn is_ok(&self) -> bool {
        self.milestones_ok() && self.nodes_ok() && self.connected()
    }

    /// Human-readable list of failures; empty when the report is clean.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Some(milestone) = self.missing_milestone {
            problems.push(format!("Missing milestone: {}", milestone));
        }
        if !self.invalid_types.is_empty() {
            problems.push(format!("Invalid node types: {}", self.invalid_types.join(", ")));
        }
        if !self.unreachable.is_empty() {
            problems.push(format!("Unreachable nodes: {}", self.unreachable.join(", ")));
        }
        problems
    }
}

/// Validator configured with an explicit catalog and milestone table.
#[derive(Debug, Clone)]
pub struct StructuralValidator {
    catalog: NodeCatalog,
    milestones: MilestoneTable,
    start_node: String,
}

impl StructuralValidator {
    pub fn new(catalog: NodeCatalog, milestones: MilestoneTable) -> Self {
        Self {
            catalog,
            milestones,
            start_node: DEFAULT_START_NODE.to_string(),
        }
    }

    pub fn with_start_node(mut self, start: impl Into<String>) -> Self {
        self.start_node = start.into();
        self
    }

    pub fn catalog(&self) -> &NodeCatalog {
        &self.catalog
    }

    pub fn milestones(&self) -> &MilestoneTable {
        &self.milestones
    }

    pub fn validate(&self, artifact: &Artifact, version: u32) -> StructuralReport {
        let summary = artifact.summary();
        StructuralReport {
            version,
            missing_milestone: self.milestones.first_unmet(version, &summary),
            invalid_types: self.catalog.unknown_types(artifact),
            unreachable: unreachable_nodes(artifact, &self.start_node),
            summary,
        }
    }
}

/// Depth-first traversal of the connection map from `start`; returns the
/// declared node names never visited, sorted. A missing start node leaves
/// every node unreachable.
pub fn unreachable_nodes(artifact: &Artifact, start: &str) -> Vec<String> {
    let declared = artifact.node_names();
    let mut visited: BTreeSet<&str> = BTreeSet::new();

    if declared.contains(start) {
        let graph: BTreeMap<&str, &Vec<String>> = artifact
            .connections
            .iter()
            .map(|(src, targets)| (src.as_str(), targets))
            .collect();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            if let Some(targets) = graph.get(node) {
                stack.extend(targets.iter().rev().map(String::as_str));
            }
        }
    }

    declared
        .difference(&visited)
        .map(|name| name.to_string())
        .collect()
}
