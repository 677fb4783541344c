//! Artifact scoring: deterministic heuristic blended with an LLM rating.

use std::sync::OnceLock;

use evo_core::heuristic::MAX_SCORE;
use evo_core::{blend, heuristic_score, Artifact};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::llm::{LlmStrategy, DEFAULT_TEMPERATURE};

/// Rating used when the reply has no usable number or the call fails.
pub const NEUTRAL_SCORE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub heuristic: u32,
    pub qualitative: u32,
    pub total: u32,
}

pub struct Scorer<'a> {
    llm: &'a dyn LlmStrategy,
    neutral: u32,
}

impl<'a> Scorer<'a> {
    pub fn new(llm: &'a dyn LlmStrategy) -> Self {
        Self {
            llm,
            neutral: NEUTRAL_SCORE,
        }
    }

    pub fn with_neutral(mut self, neutral: u32) -> Self {
        self.neutral = neutral.min(MAX_SCORE);
        self
    }

    pub fn score(&self, artifact: &Artifact) -> u32 {
        self.breakdown(artifact).total
    }

    pub fn breakdown(&self, artifact: &Artifact) -> ScoreBreakdown {
        let heuristic = heuristic_score(&artifact.summary());
        let qualitative = self.rate(artifact);
        let total = blend(heuristic, qualitative);
        debug!(heuristic, qualitative, total, "scored artifact");
        ScoreBreakdown {
            heuristic,
            qualitative,
            total,
        }
    }

    fn rate(&self, artifact: &Artifact) -> u32 {
        let prompt = format!(
            "Rate this n8n workflow from 0 to 100 for reliability, coverage and maintainability. \
             Reply with the number first.\n{}",
            artifact.to_pretty_json()
        );
        match self.llm.complete(&prompt, DEFAULT_TEMPERATURE) {
            Ok(reply) => parse_rating(&reply).unwrap_or(self.neutral),
            Err(e) => {
                warn!(error = %e, "rating failed, using neutral score");
                self.neutral
            }
        }
    }
}

fn integer_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

/// First integer token in the reply that lies in `0..=100`.
pub fn parse_rating(reply: &str) -> Option<u32> {
    integer_token()
        .find_iter(reply)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .find(|n| *n <= MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::llm::{LlmError, NoLlm};
    use evo_core::{fallback_artifact, Node};

    struct Fixed(&'static str);

    impl LlmStrategy for Fixed {
        fn complete(&self, _prompt: &str, _temperature: f64) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating("82"), Some(82));
        assert_eq!(parse_rating("Score: 250 points, I'd say 73/100"), Some(73));
        assert_eq!(parse_rating("no idea"), None);
        assert_eq!(parse_rating("0"), Some(0));
    }

    #[test]
    fn test_blend_with_rating() {
        let llm = Fixed("I'd give it 90.");
        let scorer = Scorer::new(&llm);
        let breakdown = scorer.breakdown(&fallback_artifact());
        // five nodes, a single http node, no branching or error path
        assert_eq!(breakdown.heuristic, 25);
        assert_eq!(breakdown.qualitative, 90);
        assert_eq!(breakdown.total, 57);
    }

    #[test]
    fn test_failed_call_uses_neutral() {
        let scorer = Scorer::new(&NoLlm);
        let breakdown = scorer.breakdown(&fallback_artifact());
        assert_eq!(breakdown.qualitative, NEUTRAL_SCORE);
        assert_eq!(breakdown.total, (25 + NEUTRAL_SCORE) / 2);
    }

    #[test]
    fn test_score_stays_bounded() {
        let mut big = Artifact::new("big");
        for i in 0..40 {
            big = big.with_node(Node::new(format!("Error http {}", i), "httpRequest"));
        }
        big = big.with_node(Node::new("Branch", "if"));
        let llm = Fixed("100");
        let breakdown = Scorer::new(&llm).breakdown(&big);
        assert_eq!(breakdown.heuristic, 100);
        assert!(breakdown.total <= 100);
    }
}
