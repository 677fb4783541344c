//! Evolution gate: has the candidate moved on from its predecessor, and
//! does it keep the schema and rules? Failures get one repair round-trip.

use evo_core::evolution::artifact_similarity;
use evo_core::{Artifact, CoreError, NodeCatalog, RuleSet, SchemaDiff};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::llm::{extract_json_block, LlmError, LlmStrategy, DEFAULT_TEMPERATURE};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateReport {
    /// Similarity to the previous artifact; `None` without one.
    pub similarity: Option<f64>,
    pub evolved: bool,
    pub diff: SchemaDiff,
    pub violations: Vec<String>,
}

impl GateReport {
    pub fn passes(&self) -> bool {
        self.evolved && self.diff.is_clean() && self.violations.is_empty()
    }

    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.evolved {
            problems.push(format!(
                "Not evolved: similarity {:.3} to the previous version",
                self.similarity.unwrap_or(1.0)
            ));
        }
        if !self.diff.missing_keys.is_empty() {
            problems.push(format!("Missing keys: {}", self.diff.missing_keys.join(", ")));
        }
        if !self.diff.invalid_nodes.is_empty() {
            problems.push(format!("Invalid nodes: {}", self.diff.invalid_nodes.join(", ")));
        }
        problems.extend(self.violations.iter().cloned());
        problems
    }
}

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("repair request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("repair reply is not a workflow: {0}")]
    Malformed(#[from] CoreError),

    #[error("repair left {} problem(s): {}", .0.len(), .0.join("; "))]
    Unresolved(Vec<String>),
}

pub struct EvolutionGate<'a> {
    catalog: &'a NodeCatalog,
    rules: &'a RuleSet,
    threshold: f64,
    llm: &'a dyn LlmStrategy,
}

impl<'a> EvolutionGate<'a> {
    pub fn new(catalog: &'a NodeCatalog, rules: &'a RuleSet, threshold: f64, llm: &'a dyn LlmStrategy) -> Self {
        Self {
            catalog,
            rules,
            threshold,
            llm,
        }
    }

    /// Similarity, schema diff and rule checks.
    pub fn inspect(&self, previous: Option<&Artifact>, candidate: &Artifact) -> GateReport {
        let similarity = previous.map(|prev| artifact_similarity(prev, candidate));
        GateReport {
            similarity,
            evolved: similarity.map_or(true, |s| s < self.threshold),
            diff: SchemaDiff::between(previous, candidate, self.catalog),
            violations: self.rules.enforce(candidate),
        }
    }

    /// Ask the generation service to fix `candidate`, then re-run the
    /// schema diff and rules on the reply. Similarity is not re-checked.
    pub fn repair(
        &self,
        previous: Option<&Artifact>,
        candidate: &Artifact,
        problems: &[String],
    ) -> Result<Artifact, RepairError> {
        let mut prompt = format!(
            "Repair this n8n workflow JSON to match schema:\n{}",
            candidate.to_pretty_json()
        );
        if !problems.is_empty() {
            prompt.push_str("\n\nProblems to fix:\n");
            for problem in problems {
                prompt.push_str(&format!("- {}\n", problem));
            }
        }

        let reply = self.llm.complete(&prompt, DEFAULT_TEMPERATURE)?;
        let repaired = Artifact::from_json(&extract_json_block(&reply))?;

        let diff = SchemaDiff::between(previous, &repaired, self.catalog);
        let violations = self.rules.enforce(&repaired);
        if diff.is_clean() && violations.is_empty() {
            debug!(nodes = repaired.nodes.len(), "repair cleared checks");
            return Ok(repaired);
        }

        let report = GateReport {
            similarity: None,
            evolved: true,
            diff,
            violations,
        };
        Err(RepairError::Unresolved(report.problems()))
    }
}
