//! Documentation files packed alongside each accepted workflow.

use evo_core::{Artifact, SchemaDiff};
use evo_store::archive::{
    AUTO_EVAL_FILE, DEPLOYMENT_FILE, FEEDBACK_FILE, LOGIC_MAP_FILE, NODE_SUGGESTIONS_FILE, NODE_SUMMARY_FILE,
    README_FILE, SCORE_FILE, SELF_PROMPT_FILE, VALIDATION_FILE, WORKFLOW_FILE,
};
use evo_store::PackArchive;
use serde_json::json;
use tracing::warn;

use super::llm::{LlmStrategy, DEFAULT_TEMPERATURE};
use super::prompt::CRITIQUE_KEY;

/// Written in place of a document whose generation failed. Cleanup looks
/// for it to find broken archives.
pub const ERROR_MARKER: &str = "generation error";

/// Everything the archive describes.
pub struct DocsInput<'a> {
    pub version: u32,
    pub artifact: &'a Artifact,
    pub score: u32,
    pub prompt: &'a str,
    /// Critique of the previous version, as fed into this one.
    pub previous_critique: &'a str,
    pub diff: &'a SchemaDiff,
    pub violations: &'a [String],
}

pub struct Docs {
    pub archive: PackArchive,
    /// Critique of this version, to hand to the next.
    pub critique: String,
}

pub struct DocsBuilder<'a> {
    llm: &'a dyn LlmStrategy,
}

impl<'a> DocsBuilder<'a> {
    pub fn new(llm: &'a dyn LlmStrategy) -> Self {
        Self { llm }
    }

    fn write(&self, prompt: &str) -> String {
        match self.llm.complete(prompt, DEFAULT_TEMPERATURE) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "document generation failed");
                format!("{}: {}", ERROR_MARKER, e)
            }
        }
    }

    pub fn build(&self, input: &DocsInput<'_>) -> Docs {
        let version = input.version;
        let workflow = input.artifact.to_pretty_json();
        let critique = self.write(&format!("Critique this JSON:\n{}", input.artifact.canonical_json()));

        let validation = format!(
            "## Critique\n\n{}\n\n---\n\n## Schema Diff Report\n\n{}\n\n---\n\n## Rule Violations\n\n{}",
            critique,
            serde_json::to_string_pretty(input.diff).unwrap_or_default(),
            serde_json::to_string_pretty(input.violations).unwrap_or_default(),
        );
        let feedback = json!({ CRITIQUE_KEY: input.previous_critique });
        let summary = input.artifact.summary();

        let mut archive = PackArchive::new();
        archive.insert(WORKFLOW_FILE, workflow);
        archive.insert(SCORE_FILE, format!("{}/100", input.score));
        archive.insert(README_FILE, self.write(&format!("Describe V{} enterprise workflow.", version)));
        archive.insert(LOGIC_MAP_FILE, self.write("Logic map for scalable enterprise automation."));
        archive.insert(DEPLOYMENT_FILE, self.write("How to deploy on Render + Supabase."));
        archive.insert(NODE_SUGGESTIONS_FILE, self.write("3 nodes to add next."));
        archive.insert(VALIDATION_FILE, validation);
        archive.insert(FEEDBACK_FILE, serde_json::to_string_pretty(&feedback).unwrap_or_default());
        archive.insert(SELF_PROMPT_FILE, input.prompt);
        archive.insert(NODE_SUMMARY_FILE, serde_json::to_string_pretty(&summary).unwrap_or_default());
        if version > 1 {
            archive.insert(
                AUTO_EVAL_FILE,
                self.write(&format!(
                    "Compare V{} and V{} for logic and quality.",
                    version - 1,
                    version
                )),
            );
        }

        Docs { archive, critique }
    }
}

/// Whether a document carries the failure marker.
pub fn has_error_marker(text: &str) -> bool {
    text.contains(ERROR_MARKER)
}
