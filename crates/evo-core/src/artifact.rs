//! Workflow artifact: a named graph of typed nodes and directed connections.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::hashing::to_canonical_json;

/// A named, typed unit of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Fields we do not interpret (position, credentials, ids).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            parameters: Map::new(),
            extra: Map::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// Type tag without any namespace prefix
    /// (`n8n-nodes-base.httpRequest` -> `httpRequest`).
    pub fn base_type(&self) -> &str {
        base_type(&self.kind)
    }
}

pub(crate) fn base_type(tag: &str) -> &str {
    tag.rsplit_once('.').map(|(_, t)| t).unwrap_or(tag)
}

/// The graph under evolution.
///
/// Connections map a source node name to the ordered names of its
/// destinations. Both the flat form (`{"A": ["B"]}`) and the nested
/// n8n form (`{"A": {"main": [[{"node": "B"}]]}}`) are accepted on
/// input; the flat form is always written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(deserialize_with = "deserialize_connections")]
    pub connections: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Artifact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            connections: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn connect(mut self, from: &str, to: &str) -> Self {
        self.connections
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
        self
    }

    /// Parse an artifact from JSON text. Missing `nodes` or `connections`
    /// keys are malformed.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text).map_err(CoreError::MalformedArtifact)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Compact JSON with sorted keys; stable across runs.
    pub fn canonical_json(&self) -> String {
        to_canonical_json(&self.to_value())
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.to_value()).unwrap_or_default()
    }

    /// Top-level keys of the serialized form.
    pub fn top_level_keys(&self) -> BTreeSet<String> {
        match self.to_value() {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => BTreeSet::new(),
        }
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_names(&self) -> BTreeSet<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary::of(self)
    }
}

/// Read-only projection of an artifact used by milestones, scoring and
/// prompt feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub total: usize,
    pub types: BTreeSet<String>,
    pub has_branching: bool,
    pub has_error: bool,
    pub external_apis: usize,
    pub include_oauth2: bool,
}

impl ArtifactSummary {
    pub fn of(artifact: &Artifact) -> Self {
        let nodes = &artifact.nodes;
        Self {
            total: nodes.len(),
            types: nodes.iter().map(|n| n.kind.clone()).collect(),
            has_branching: nodes
                .iter()
                .any(|n| matches!(n.base_type(), "if" | "switch")),
            has_error: nodes
                .iter()
                .any(|n| n.name.to_lowercase().contains("error")),
            external_apis: nodes
                .iter()
                .filter(|n| n.kind.to_lowercase().contains("http"))
                .count(),
            include_oauth2: nodes.iter().any(uses_oauth2),
        }
    }

    /// Number of distinct base types.
    pub fn distinct_base_types(&self) -> usize {
        self.types
            .iter()
            .map(|t| base_type(t))
            .collect::<BTreeSet<_>>()
            .len()
    }
}

fn uses_oauth2(node: &Node) -> bool {
    if node.base_type().to_lowercase().starts_with("oauth2") {
        return true;
    }
    node.parameters
        .get("authentication")
        .and_then(Value::as_str)
        .map(|auth| auth.to_lowercase().contains("oauth2"))
        .unwrap_or(false)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Targets {
    Names(Vec<String>),
    Outputs(BTreeMap<String, Vec<Vec<Link>>>),
}

#[derive(Deserialize)]
struct Link {
    node: String,
}

fn deserialize_connections<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Targets> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(source, targets)| {
            let names = match targets {
                Targets::Names(names) => names,
                Targets::Outputs(outputs) => outputs
                    .into_values()
                    .flatten()
                    .flatten()
                    .map(|link| link.node)
                    .collect(),
            };
            (source, names)
        })
        .collect())
}
