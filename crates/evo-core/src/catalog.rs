//! Node-type catalog: the set of legal type tags for one run.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::artifact::{base_type, Artifact};
use crate::error::CoreError;

/// Built-in catalog used when no schema document is available.
pub const DEFAULT_NODE_TYPES: &[&str] = &[
    "start",
    "webhook",
    "httpRequest",
    "set",
    "if",
    "switch",
    "merge",
    "supabase",
    "function",
    "functionItem",
    "wait",
    "delay",
    "emailSend",
    "smtp",
    "googleSheets",
    "zoho",
    "stripe",
    "slack",
    "splitInBatches",
];

#[derive(Deserialize)]
struct SchemaDocument {
    #[serde(default, rename = "validNodes")]
    valid_nodes: Vec<String>,
}

/// Immutable set of legal node types. Tags are stored and compared by
/// base name, so namespaced tags match their short form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCatalog {
    types: BTreeSet<String>,
}

impl NodeCatalog {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            types: types
                .into_iter()
                .map(|t| base_type(t.as_ref()).to_string())
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(DEFAULT_NODE_TYPES)
    }

    /// Parse a schema document of the form `{"validNodes": [...]}`.
    pub fn from_schema_str(path: &Path, text: &str) -> Result<Self, CoreError> {
        let doc: SchemaDocument = serde_json::from_str(text).map_err(|source| CoreError::Schema {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(doc.valid_nodes))
    }

    /// Load from a schema file, or fall back to the built-in set when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::builtin());
        }
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_schema_str(path, &text)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.types.contains(base_type(tag))
    }

    /// Type tags of `artifact` not present in the catalog, in node order.
    pub fn unknown_types(&self, artifact: &Artifact) -> Vec<String> {
        artifact
            .nodes
            .iter()
            .filter(|n| !self.contains(&n.kind))
            .map(|n| n.kind.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for NodeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
