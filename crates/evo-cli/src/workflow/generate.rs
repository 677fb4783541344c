//! Generation loop.
//!
//! Each attempt walks a fixed gate order:
//!
//! ```text
//! REQUEST -> STRUCTURAL_CHECK -> [REPAIR] -> RUNTIME_SANITY -> SCORE
//!         -> REGRESSION -> [VOTE] -> accepted into the pool
//! ```
//!
//! Any gate can discard the attempt. After the attempt budget the best
//! pooled candidate wins. An empty pool escalates once to a strengthened
//! stage (stricter prompt, hotter temperature); if that pool is empty too
//! the deterministic fallback artifact is returned, so a run always ends
//! with an artifact.

use evo_core::evolution::DEFAULT_SIMILARITY_THRESHOLD;
use evo_core::validate::DEFAULT_START_NODE;
use evo_core::{fallback_artifact, Artifact, RuleSet, StructuralValidator};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::gate::{EvolutionGate, RepairError};
use super::llm::{extract_json_block, LlmError, LlmStrategy};
use super::prompt::PromptLog;
use super::scorer::{Scorer, NEUTRAL_SCORE};
use super::strategies::RetrySettings;
use super::vote::{Judge, DEFAULT_VOTE_SAMPLES};

pub const STRICT_SUFFIX: &str =
    "Enforce schema diff & rule checks strictly. Every milestone up to this version must hold.";

/// `[generation]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Attempts per stage.
    pub attempts: usize,
    /// Temperature added in the strengthened stage.
    pub strict_temperature_step: f64,
    pub similarity_threshold: f64,
    pub vote_samples: usize,
    pub neutral_score: u32,
    /// Lowercase substrings the serialized candidate must contain.
    pub required_markers: Vec<String>,
    pub start_node: String,
    pub retry: RetrySettings,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            strict_temperature_step: 0.1,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            vote_samples: DEFAULT_VOTE_SAMPLES,
            neutral_score: NEUTRAL_SCORE,
            required_markers: vec!["webhook".into(), "status".into(), "http".into()],
            start_node: DEFAULT_START_NODE.to_string(),
            retry: RetrySettings::default(),
        }
    }
}

/// The accepted predecessor of the version being generated.
#[derive(Debug, Clone)]
pub struct Previous {
    pub artifact: Artifact,
    /// Recorded score, if known. Candidates scoring lower are discarded.
    pub score: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub version: u32,
    pub prompt: String,
    pub temperature: f64,
    pub previous: Option<Previous>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Primary,
    Strengthened,
}

impl Stage {
    fn role(&self) -> &'static str {
        match self {
            Self::Primary => "generate",
            Self::Strengthened => "strengthened",
        }
    }
}

/// Why an attempt left the pipeline.
#[derive(Debug, Error)]
pub enum Discard {
    #[error("request failed: {0}")]
    Request(#[from] LlmError),

    #[error("reply is not a workflow: {0}")]
    Malformed(String),

    #[error("structural check failed and {0}")]
    Unrepaired(#[from] RepairError),

    #[error("missing runtime markers: {}", .0.join(", "))]
    Sanity(Vec<String>),

    #[error("score {score} below previous {previous}")]
    Regression { score: u32, previous: u32 },

    #[error("acceptance vote rejected the change")]
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub artifact: Artifact,
    pub score: u32,
    pub repaired: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted { candidate: Candidate, stage: Stage },
    Fallback { artifact: Artifact },
}

impl Outcome {
    pub fn artifact(&self) -> &Artifact {
        match self {
            Self::Accepted { candidate, .. } => &candidate.artifact,
            Self::Fallback { artifact } => artifact,
        }
    }

    pub fn into_artifact(self) -> Artifact {
        match self {
            Self::Accepted { candidate, .. } => candidate.artifact,
            Self::Fallback { artifact } => artifact,
        }
    }

    /// Score of the winner; the fallback is not scored here.
    pub fn score(&self) -> Option<u32> {
        match self {
            Self::Accepted { candidate, .. } => Some(candidate.score),
            Self::Fallback { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Highest-scoring candidate; ties go to the earliest.
pub fn select_winner(pool: Vec<Candidate>) -> Option<Candidate> {
    pool.into_iter().fold(None, |best, candidate| match best {
        Some(b) if b.score >= candidate.score => Some(b),
        _ => Some(candidate),
    })
}

pub struct GenerationLoop<'a> {
    llm: &'a dyn LlmStrategy,
    validator: &'a StructuralValidator,
    gate: EvolutionGate<'a>,
    scorer: Scorer<'a>,
    judge: &'a dyn Judge,
    settings: &'a GenerationSettings,
    prompt_log: Option<&'a PromptLog>,
}

impl<'a> GenerationLoop<'a> {
    pub fn new(
        llm: &'a dyn LlmStrategy,
        validator: &'a StructuralValidator,
        rules: &'a RuleSet,
        judge: &'a dyn Judge,
        settings: &'a GenerationSettings,
    ) -> Self {
        Self {
            llm,
            validator,
            gate: EvolutionGate::new(validator.catalog(), rules, settings.similarity_threshold, llm),
            scorer: Scorer::new(llm).with_neutral(settings.neutral_score),
            judge,
            settings,
            prompt_log: None,
        }
    }

    pub fn with_prompt_log(mut self, log: &'a PromptLog) -> Self {
        self.prompt_log = Some(log);
        self
    }

    pub fn run(&self, request: &GenerationRequest) -> Outcome {
        for stage in [Stage::Primary, Stage::Strengthened] {
            let (prompt, temperature) = self.stage_prompt(request, stage);
            if let Some(log) = self.prompt_log {
                log.record(request.version, stage.role(), &prompt);
            }

            let pool = self.fill_pool(request, &prompt, temperature);
            if let Some(candidate) = select_winner(pool) {
                info!(
                    version = request.version,
                    score = candidate.score,
                    repaired = candidate.repaired,
                    stage = ?stage,
                    "candidate accepted"
                );
                return Outcome::Accepted { candidate, stage };
            }
            warn!(version = request.version, stage = ?stage, "no candidate survived");
        }

        warn!(version = request.version, "generation exhausted, using fallback workflow");
        Outcome::Fallback {
            artifact: fallback_artifact(),
        }
    }

    fn stage_prompt(&self, request: &GenerationRequest, stage: Stage) -> (String, f64) {
        match stage {
            Stage::Primary => (request.prompt.clone(), request.temperature),
            Stage::Strengthened => (
                format!("{}\n\n{}", request.prompt, STRICT_SUFFIX),
                (request.temperature + self.settings.strict_temperature_step).min(1.0),
            ),
        }
    }

    fn fill_pool(&self, request: &GenerationRequest, prompt: &str, temperature: f64) -> Vec<Candidate> {
        let mut pool = Vec::new();
        for attempt in 1..=self.settings.attempts {
            match self.attempt(request, prompt, temperature) {
                Ok(candidate) => {
                    debug!(attempt, score = candidate.score, "candidate pooled");
                    pool.push(candidate);
                }
                Err(reason @ (Discard::Regression { .. } | Discard::Rejected)) => {
                    debug!(attempt, %reason, "attempt pruned");
                }
                Err(reason) => {
                    info!(attempt, %reason, "attempt discarded");
                }
            }
        }
        pool
    }

    /// One pass through every gate.
    pub fn attempt(&self, request: &GenerationRequest, prompt: &str, temperature: f64) -> Result<Candidate, Discard> {
        let version = request.version;
        let previous = request.previous.as_ref();
        let previous_artifact = previous.map(|p| &p.artifact);

        // REQUEST
        let reply = self.llm.complete(
            &format!("Return only valid JSON for n8n workflow V{}:\n{}", version, prompt),
            temperature,
        )?;
        let json = extract_json_block(&reply);
        if json.is_empty() {
            return Err(Discard::Malformed("no JSON object in reply".into()));
        }
        let mut artifact = Artifact::from_json(&json).map_err(|e| Discard::Malformed(e.to_string()))?;

        // STRUCTURAL_CHECK, then at most one REPAIR
        let report = self.validator.validate(&artifact, version);
        let gate = self.gate.inspect(previous_artifact, &artifact);
        let mut repaired = false;
        if !report.is_ok() || !gate.passes() {
            let mut problems = report.problems();
            problems.extend(gate.problems());
            debug!(?problems, "structural check failed, repairing");
            if let Some(log) = self.prompt_log {
                log.record(version, "repair", &problems.join("\n"));
            }
            artifact = self.gate.repair(previous_artifact, &artifact, &problems)?;
            repaired = true;

            let report = self.validator.validate(&artifact, version);
            if !report.is_ok() {
                return Err(Discard::Unrepaired(RepairError::Unresolved(report.problems())));
            }
        }

        // RUNTIME_SANITY
        let text = artifact.canonical_json().to_lowercase();
        let missing: Vec<String> = self
            .settings
            .required_markers
            .iter()
            .filter(|marker| !text.contains(&marker.to_lowercase()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Discard::Sanity(missing));
        }

        // SCORE
        let score = self.scorer.score(&artifact);

        // REGRESSION
        if let Some(previous_score) = previous.and_then(|p| p.score) {
            if score < previous_score {
                return Err(Discard::Regression {
                    score,
                    previous: previous_score,
                });
            }
        }

        // VOTE
        if let Some(prev) = previous_artifact.filter(|_| version > 1) {
            if !self.judge.judge(prev, &artifact) {
                return Err(Discard::Rejected);
            }
        }

        Ok(Candidate {
            artifact,
            score,
            repaired,
        })
    }
}
