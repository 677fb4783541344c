//! Acceptance vote on a candidate against its predecessor.

use evo_core::Artifact;
use tracing::debug;

use super::llm::{LlmStrategy, DEFAULT_TEMPERATURE};

pub const DEFAULT_VOTE_SAMPLES: usize = 3;

/// Decides whether `new` improves on `old`.
pub trait Judge {
    fn judge(&self, old: &Artifact, new: &Artifact) -> bool;
}

/// Asks the generation service the same question several times and
/// accepts on a strict majority of "yes". A failed sample counts as "no".
pub struct LlmVoter<'a> {
    llm: &'a dyn LlmStrategy,
    samples: usize,
}

impl<'a> LlmVoter<'a> {
    pub fn new(llm: &'a dyn LlmStrategy) -> Self {
        Self {
            llm,
            samples: DEFAULT_VOTE_SAMPLES,
        }
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples.max(1);
        self
    }
}

impl Judge for LlmVoter<'_> {
    fn judge(&self, old: &Artifact, new: &Artifact) -> bool {
        let prompt = format!(
            "Old workflow:\n{}\n\nNew workflow:\n{}\n\nWas this change an improvement? Answer yes or no.",
            old.to_pretty_json(),
            new.to_pretty_json()
        );
        let yes = (0..self.samples)
            .filter(|_| match self.llm.complete(&prompt, DEFAULT_TEMPERATURE) {
                Ok(reply) => is_yes(&reply),
                Err(e) => {
                    debug!(error = %e, "vote sample failed");
                    false
                }
            })
            .count();
        debug!(yes, samples = self.samples, "acceptance vote");
        yes * 2 > self.samples
    }
}

pub fn is_yes(reply: &str) -> bool {
    reply.trim().to_lowercase().starts_with("yes")
}
