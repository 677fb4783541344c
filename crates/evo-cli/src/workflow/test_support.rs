//! Deterministic generation-service stand-in shared by workflow and
//! command tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::llm::{LlmError, LlmStrategy};

/// Routes each prompt by its opening words to a queue of canned replies.
/// An exhausted queue fails the call, except for documentation prompts,
/// which always get a short note unless critiques are set to fail.
#[derive(Default)]
pub(crate) struct ScriptedLlm {
    generations: Mutex<VecDeque<String>>,
    ratings: Mutex<VecDeque<String>>,
    repairs: Mutex<VecDeque<String>>,
    votes: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    critique_fails: bool,
}

impl ScriptedLlm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn generate(self, reply: impl Into<String>) -> Self {
        self.generations.lock().unwrap().push_back(reply.into());
        self
    }

    pub(crate) fn rate(self, reply: impl Into<String>) -> Self {
        self.ratings.lock().unwrap().push_back(reply.into());
        self
    }

    pub(crate) fn repair(self, reply: impl Into<String>) -> Self {
        self.repairs.lock().unwrap().push_back(reply.into());
        self
    }

    pub(crate) fn vote(self, reply: impl Into<String>) -> Self {
        self.votes.lock().unwrap().push_back(reply.into());
        self
    }

    pub(crate) fn failing_critiques(mut self) -> Self {
        self.critique_fails = true;
        self
    }

    /// Every prompt received so far, in order.
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn prompts_starting_with(&self, prefix: &str) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.starts_with(prefix))
            .collect()
    }
}

impl LlmStrategy for ScriptedLlm {
    fn complete(&self, prompt: &str, _temperature: f64) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let queue = if prompt.starts_with("Return only valid JSON") {
            &self.generations
        } else if prompt.starts_with("Rate this") {
            &self.ratings
        } else if prompt.starts_with("Repair this") {
            &self.repairs
        } else if prompt.starts_with("Old workflow") {
            &self.votes
        } else if self.critique_fails && prompt.starts_with("Critique this") {
            return Err(LlmError::EmptyReply);
        } else {
            return Ok("Generated notes.".to_string());
        };
        queue.lock().unwrap().pop_front().ok_or(LlmError::EmptyReply)
    }
}
