//! Pluggable domain rules. Each rule returns its violations; an empty list
//! means the artifact passes.

use std::collections::BTreeSet;

use crate::artifact::Artifact;

pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, artifact: &Artifact) -> Vec<String>;
}

/// Require a minimum number of distinct node base types.
pub struct MinDistinctTypes(pub usize);

impl Rule for MinDistinctTypes {
    fn name(&self) -> &'static str {
        "min_distinct_types"
    }

    fn check(&self, artifact: &Artifact) -> Vec<String> {
        let distinct = artifact.summary().distinct_base_types();
        if distinct < self.0 {
            vec![format!(
                "only {} distinct node types (need at least {})",
                distinct, self.0
            )]
        } else {
            Vec::new()
        }
    }
}

pub struct UniqueNodeNames;

impl Rule for UniqueNodeNames {
    fn name(&self) -> &'static str {
        "unique_node_names"
    }

    fn check(&self, artifact: &Artifact) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut reported = BTreeSet::new();
        artifact
            .nodes
            .iter()
            .filter(|n| !seen.insert(n.name.as_str()) && reported.insert(n.name.as_str()))
            .map(|n| format!("duplicate node name '{}'", n.name))
            .collect()
    }
}

/// Connections may only reference declared nodes.
pub struct KnownConnectionTargets;

impl Rule for KnownConnectionTargets {
    fn name(&self) -> &'static str {
        "known_connection_targets"
    }

    fn check(&self, artifact: &Artifact) -> Vec<String> {
        let declared = artifact.node_names();
        let mut violations = Vec::new();
        for (source, targets) in &artifact.connections {
            if !declared.contains(source.as_str()) {
                violations.push(format!("connection from undeclared node '{}'", source));
            }
            for target in targets {
                if !declared.contains(target.as_str()) {
                    violations.push(format!("connection '{}' -> undeclared node '{}'", source, target));
                }
            }
        }
        violations
    }
}

/// Node types that must appear at least once (matched on base type).
pub struct RequiredTypes(pub Vec<String>);

impl Rule for RequiredTypes {
    fn name(&self) -> &'static str {
        "required_types"
    }

    fn check(&self, artifact: &Artifact) -> Vec<String> {
        self.0
            .iter()
            .filter(|required| !artifact.nodes.iter().any(|n| n.base_type() == required.as_str()))
            .map(|required| format!("missing required node type '{}'", required))
            .collect()
    }
}

/// Ordered collection of rules applied together.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Distinct-type floor, unique names, known targets, plus any
    /// required types.
    pub fn standard(min_distinct_types: usize, required_types: Vec<String>) -> Self {
        let set = Self::new()
            .with(MinDistinctTypes(min_distinct_types))
            .with(UniqueNodeNames)
            .with(KnownConnectionTargets);
        if required_types.is_empty() {
            set
        } else {
            set.with(RequiredTypes(required_types))
        }
    }

    /// All violations, each prefixed with the rule name.
    pub fn enforce(&self, artifact: &Artifact) -> Vec<String> {
        self.rules
            .iter()
            .flat_map(|rule| {
                rule.check(artifact)
                    .into_iter()
                    .map(move |v| format!("{}: {}", rule.name(), v))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Node;
    use crate::fallback::fallback_artifact;

    #[test]
    fn test_standard_rules_pass_fallback() {
        let rules = RuleSet::standard(3, vec!["webhook".into()]);
        assert!(rules.enforce(&fallback_artifact()).is_empty());
        assert_eq!(rules.len(), 4);
    }

    #[test]
    fn test_min_distinct_types() {
        let artifact = Artifact::new("t")
            .with_node(Node::new("A", "set"))
            .with_node(Node::new("B", "n8n-nodes-base.set"));
        let violations = RuleSet::new().with(MinDistinctTypes(2)).enforce(&artifact);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].starts_with("min_distinct_types:"));
    }

    #[test]
    fn test_duplicate_names_reported_once() {
        let artifact = Artifact::new("t")
            .with_node(Node::new("A", "set"))
            .with_node(Node::new("A", "if"))
            .with_node(Node::new("A", "wait"));
        assert_eq!(UniqueNodeNames.check(&artifact).len(), 1);
    }

    #[test]
    fn test_unknown_connection_targets() {
        let artifact = Artifact::new("t")
            .with_node(Node::new("A", "set"))
            .connect("A", "Ghost")
            .connect("Phantom", "A");
        assert_eq!(KnownConnectionTargets.check(&artifact).len(), 2);
    }

    #[test]
    fn test_required_types() {
        let artifact = Artifact::new("t").with_node(Node::new("A", "set"));
        let violations = RequiredTypes(vec!["set".into(), "webhook".into()]).check(&artifact);
        assert_eq!(violations, vec!["missing required node type 'webhook'".to_string()]);
    }
}
