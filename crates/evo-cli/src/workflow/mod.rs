//! Generation pipeline: the LLM-facing half of the engine.
//!
//! The deterministic checks live in `evo-core`; this module wires them to
//! the generation service (candidates, ratings, repairs, votes, docs).

pub mod docs;
pub mod gate;
pub mod generate;
pub mod llm;
pub mod prompt;
pub mod scorer;
pub mod strategies;
pub mod vote;

#[cfg(test)]
pub(crate) mod test_support;

pub use generate::{GenerationLoop, GenerationRequest, GenerationSettings, Previous};
pub use llm::{build_llm_strategy, LlmStrategy, RetryingLlm};
pub use scorer::Scorer;
pub use vote::LlmVoter;
