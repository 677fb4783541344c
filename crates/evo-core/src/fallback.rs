//! Deterministic minimal artifact returned when generation is exhausted.

use serde_json::json;

use crate::artifact::{Artifact, Node};

pub const FALLBACK_NAME: &str = "Fallback Workflow";

/// Fixed chain: start -> trigger -> external call -> status set -> persistence.
pub fn fallback_artifact() -> Artifact {
    Artifact::new(FALLBACK_NAME)
        .with_node(Node::new("Start", "start"))
        .with_node(
            Node::new("Webhook", "webhook")
                .with_parameter("httpMethod", json!("POST"))
                .with_parameter("path", json!("fallback")),
        )
        .with_node(Node::new("HTTP Request", "httpRequest").with_parameter("method", json!("GET")))
        .with_node(Node::new("Set Status", "set").with_parameter("status", json!("received")))
        .with_node(Node::new("Supabase", "supabase").with_parameter("operation", json!("insert")))
        .connect("Start", "Webhook")
        .connect("Webhook", "HTTP Request")
        .connect("HTTP Request", "Set Status")
        .connect("Set Status", "Supabase")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_chain_order() {
        let artifact = fallback_artifact();
        let types: Vec<_> = artifact.nodes.iter().map(|n| n.kind.as_str()).collect();
        assert_eq!(types, ["start", "webhook", "httpRequest", "set", "supabase"]);
        assert_eq!(artifact.connections["Start"], ["Webhook"]);
        assert_eq!(artifact.connections["Set Status"], ["Supabase"]);
        assert_eq!(artifact.connections.len(), 4);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        assert_eq!(fallback_artifact().canonical_json(), fallback_artifact().canonical_json());
    }
}
