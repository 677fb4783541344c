//! Prompt shaping and the small state files that feed it: prompt
//! history, the critique handed to the next version, and prompt logs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use evo_core::{Artifact, MilestoneTable, NodeCatalog, RuleSet, SchemaDiff};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const CRITIQUE_KEY: &str = "V_prev_critique";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read a JSON state file; missing or blank files give the default.
fn load_state<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StateError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&text).map_err(|source| StateError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn save_state<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let io = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    let text = serde_json::to_string_pretty(value).map_err(|source| StateError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(io)
}

/// Sampling temperature for a version: conservative early, bolder later.
pub fn temperature_for(version: u32) -> f64 {
    match version {
        0..=2 => 0.4,
        3..=5 => 0.65,
        _ => 0.85,
    }
}

/// What the previous version left behind, used to steer the next prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub score: u32,
    pub violations: Vec<String>,
    pub diff_summary: SchemaDiff,
    pub milestone_hits: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub critique: String,
}

impl FeedbackSummary {
    pub fn from_previous(
        previous: Option<&Artifact>,
        score: Option<u32>,
        critique: &str,
        catalog: &NodeCatalog,
        rules: &RuleSet,
        milestones: &MilestoneTable,
    ) -> Self {
        let Some(previous) = previous else {
            return Self {
                critique: critique.to_string(),
                ..Self::default()
            };
        };
        Self {
            score: score.unwrap_or(0),
            violations: rules.enforce(previous),
            diff_summary: SchemaDiff::between(Some(previous), previous, catalog),
            milestone_hits: milestones.hits(&previous.summary()),
            critique: critique.to_string(),
        }
    }
}

/// Guidance lines derived from the previous version's feedback.
pub fn curriculum(version: u32, feedback: &FeedbackSummary) -> String {
    if version <= 1 {
        return "Start with a minimal but complete trigger-to-persistence flow.".to_string();
    }

    let mut lines = vec![format!(
        "The previous version scored {}/100; this one must score at least as high.",
        feedback.score
    )];
    if !feedback.violations.is_empty() {
        lines.push(format!("Fix these rule violations: {}.", feedback.violations.join("; ")));
    }
    if !feedback.diff_summary.invalid_nodes.is_empty() {
        lines.push(format!(
            "Replace unsupported node types: {}.",
            feedback.diff_summary.invalid_nodes.join(", ")
        ));
    }
    let unmet: Vec<&str> = feedback
        .milestone_hits
        .iter()
        .filter(|(_, hit)| !**hit)
        .map(|(key, _)| key.as_str())
        .collect();
    if !unmet.is_empty() {
        lines.push(format!("Work toward the milestones not yet met: {}.", unmet.join(", ")));
    }
    if !feedback.critique.trim().is_empty() {
        lines.push(format!("Address this critique of the previous version:\n{}", feedback.critique.trim()));
    }
    lines.join("\n")
}

/// Build the generation prompt for `version` and its temperature.
pub fn shape_prompt(
    version: u32,
    milestones: &MilestoneTable,
    previous_prompt: &str,
    feedback: &FeedbackSummary,
) -> (String, f64) {
    let milestone = milestones
        .at(version)
        .map(|m| m.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    let mut prompt = format!(
        "You are generating V{version} of an enterprise-grade n8n workflow.\n\n\
         Rules:\n\
         - Only return clean, executable JSON\n\
         - Use only node types from the schema\n\
         - Include real APIs (Stripe, Google Sheets, Supabase, Zoho, etc.)\n\
         - No placeholder nodes, mock data, or dummy names\n\
         - Improve on the last version's weaknesses\n\
         - Must include nodes: webhook, httpRequest, set, and a status logic branch\n\n\
         Milestones: {milestone}\n\
         {guidance}\n",
        guidance = curriculum(version, feedback),
    );
    if !previous_prompt.trim().is_empty() {
        prompt.push_str(&format!("\nPrevious brief, for reference:\n{}\n", previous_prompt.trim()));
    }
    prompt.push_str("Add branching, error handling, and scalable logic. Maintain upward evolution.\n");

    (prompt, temperature_for(version))
}

/// `prompt_history.json`: the prompt used for each accepted version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptHistory {
    prompts: BTreeMap<String, String>,
}

impl PromptHistory {
    pub fn load(path: &Path) -> Result<Self, StateError> {
        load_state(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        save_state(path, self)
    }

    pub fn get(&self, version: u32) -> Option<&str> {
        self.prompts.get(&format!("V{}", version)).map(String::as_str)
    }

    pub fn record(&mut self, version: u32, prompt: &str) {
        self.prompts.insert(format!("V{}", version), prompt.to_string());
    }
}

/// `feedback.json`: the critique of the latest version, read by the next.
pub struct FeedbackFile {
    path: PathBuf,
}

impl FeedbackFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn critique(&self) -> Result<String, StateError> {
        let map: BTreeMap<String, String> = load_state(&self.path)?;
        Ok(map.get(CRITIQUE_KEY).cloned().unwrap_or_default())
    }

    pub fn store_critique(&self, critique: &str) -> Result<(), StateError> {
        let mut map: BTreeMap<String, String> = load_state(&self.path)?;
        map.insert(CRITIQUE_KEY.to_string(), critique.to_string());
        save_state(&self.path, &map)
    }
}

/// Writes each prompt to `<dir>/V<version>_<role>.txt`, overwriting.
pub struct PromptLog {
    dir: PathBuf,
}

impl PromptLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, version: u32, role: &str) -> PathBuf {
        self.dir.join(format!("V{}_{}.txt", version, role))
    }

    /// Failures are logged, never raised.
    pub fn record(&self, version: u32, role: &str, prompt: &str) {
        let path = self.path_for(version, role);
        let result = std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, prompt));
        match result {
            Ok(()) => debug!(path = %path.display(), "logged {} prompt", role),
            Err(e) => warn!(path = %path.display(), error = %e, "could not log prompt"),
        }
    }
}
