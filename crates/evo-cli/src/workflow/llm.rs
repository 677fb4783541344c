//! Generation service: LLM strategies, the retrying wrapper, and JSON
//! extraction from free-text replies.
//!
//! Real providers are only compiled with the "llm" feature.
//! Supported providers: anthropic, openai, google.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

#[cfg(feature = "llm")]
use rig::{
    client::{CompletionClient, ProviderClient},
    completion::Prompt,
    providers,
};

use super::strategies::RetryStrategy;

/// Sampling temperature for critiques, ratings, votes and repairs.
pub const DEFAULT_TEMPERATURE: f64 = 0.6;

pub const DEFAULT_SYSTEM_PROMPT: &str = "Act as a workflow architect.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM not configured")]
    NotConfigured,

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("missing {var} environment variable for {provider} provider")]
    MissingKey { provider: String, var: &'static str },

    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("empty reply")]
    EmptyReply,

    #[error("failed to create runtime: {0}")]
    Runtime(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<LlmError>,
    },
}

/// Text-completion capability.
pub trait LlmStrategy: Send + Sync {
    /// Generate a completion from a prompt.
    fn complete(&self, prompt: &str, temperature: f64) -> Result<String, LlmError>;

    /// Generate with an explicit system prompt.
    fn complete_with_system(
        &self,
        _system: &str,
        prompt: &str,
        temperature: f64,
    ) -> Result<String, LlmError> {
        self.complete(prompt, temperature)
    }
}

/// No LLM - every call fails, so generation ends in the fallback artifact.
pub struct NoLlm;

impl LlmStrategy for NoLlm {
    fn complete(&self, _prompt: &str, _temperature: f64) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured)
    }
}

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
    Google,
}

impl Provider {
    /// Parse provider from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "gpt" => Some(Self::OpenAI),
            "google" | "gemini" => Some(Self::Google),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::Google => "google",
        }
    }

    /// Get default model for this provider.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAI => "gpt-4o",
            Self::Google => "gemini-2.0-flash",
        }
    }

    /// Get environment variable name for API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Google => "GEMINI_API_KEY",
        }
    }
}

#[cfg(feature = "llm")]
pub struct RigLlm {
    provider: Provider,
    model: String,
    system_prompt: String,
    runtime: tokio::runtime::Runtime,
}

#[cfg(feature = "llm")]
impl RigLlm {
    pub fn new(provider_str: &str, model: Option<&str>, system_prompt: &str) -> Result<Self, LlmError> {
        let provider = Provider::from_str(provider_str)
            .ok_or_else(|| LlmError::UnsupportedProvider(provider_str.to_string()))?;

        // Check for API key
        if std::env::var(provider.env_var()).is_err() {
            return Err(LlmError::MissingKey {
                provider: provider_str.to_string(),
                var: provider.env_var(),
            });
        }

        let model = model
            .map(|m| m.to_string())
            .unwrap_or_else(|| provider.default_model().to_string());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| LlmError::Runtime(e.to_string()))?;

        Ok(Self {
            provider,
            model,
            system_prompt: system_prompt.to_string(),
            runtime,
        })
    }

    async fn complete_async(&self, system: &str, prompt: &str, temperature: f64) -> Result<String, LlmError> {
        let failed = |e: rig::completion::PromptError| LlmError::Request {
            provider: self.provider.name().to_string(),
            message: e.to_string(),
        };
        match self.provider {
            Provider::Anthropic => {
                let client = providers::anthropic::Client::from_env();
                let agent = client
                    .agent(&self.model)
                    .preamble(system)
                    .temperature(temperature)
                    .build();
                agent.prompt(prompt).await.map_err(failed)
            }
            Provider::OpenAI => {
                let client = providers::openai::Client::from_env();
                let agent = client
                    .agent(&self.model)
                    .preamble(system)
                    .temperature(temperature)
                    .build();
                agent.prompt(prompt).await.map_err(failed)
            }
            Provider::Google => {
                let client = providers::gemini::Client::from_env();
                let agent = client
                    .agent(&self.model)
                    .preamble(system)
                    .temperature(temperature)
                    .build();
                agent.prompt(prompt).await.map_err(failed)
            }
        }
    }
}

#[cfg(feature = "llm")]
impl LlmStrategy for RigLlm {
    fn complete(&self, prompt: &str, temperature: f64) -> Result<String, LlmError> {
        self.runtime
            .block_on(self.complete_async(&self.system_prompt, prompt, temperature))
    }

    fn complete_with_system(&self, system: &str, prompt: &str, temperature: f64) -> Result<String, LlmError> {
        self.runtime
            .block_on(self.complete_async(system, prompt, temperature))
    }
}

/// Wraps a strategy so empty replies and errors are retried with the
/// given policy. After the last try the call fails with
/// [`LlmError::Exhausted`].
pub struct RetryingLlm {
    inner: Box<dyn LlmStrategy>,
    retry: Box<dyn RetryStrategy>,
}

impl RetryingLlm {
    pub fn new(inner: Box<dyn LlmStrategy>, retry: Box<dyn RetryStrategy>) -> Self {
        Self { inner, retry }
    }

    fn with_retries<F>(&self, call: F) -> Result<String, LlmError>
    where
        F: Fn() -> Result<String, LlmError>,
    {
        let mut failures = 0;
        loop {
            let error = match call() {
                Ok(reply) if !reply.trim().is_empty() => return Ok(reply.trim().to_string()),
                Ok(_) => LlmError::EmptyReply,
                Err(e) => e,
            };
            failures += 1;
            match self.retry.next_delay(failures) {
                Some(delay) => {
                    warn!(attempt = failures, error = %error, "LLM call failed, retrying");
                    std::thread::sleep(delay);
                }
                None => {
                    return Err(LlmError::Exhausted {
                        attempts: failures,
                        last: Box::new(error),
                    })
                }
            }
        }
    }
}

impl LlmStrategy for RetryingLlm {
    fn complete(&self, prompt: &str, temperature: f64) -> Result<String, LlmError> {
        self.with_retries(|| self.inner.complete(prompt, temperature))
    }

    fn complete_with_system(&self, system: &str, prompt: &str, temperature: f64) -> Result<String, LlmError> {
        self.with_retries(|| self.inner.complete_with_system(system, prompt, temperature))
    }
}

/// Build an LLM strategy for a provider. Without the "llm" feature, or
/// when the provider cannot be initialized, this is [`NoLlm`].
pub fn build_llm_strategy(
    _provider: Option<&str>,
    _model: Option<&str>,
    _system_prompt: &str,
) -> Box<dyn LlmStrategy> {
    #[cfg(feature = "llm")]
    {
        if let Some(provider) = _provider {
            match RigLlm::new(provider, _model, _system_prompt) {
                Ok(llm) => return Box::new(llm),
                Err(e) => {
                    warn!("Failed to initialize LLM: {}", e);
                }
            }
        }
    }

    Box::new(NoLlm)
}

fn fenced_json() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("valid regex"))
}

/// Pull the JSON object out of a free-text reply: a fenced `json` block if
/// present, else the text between the first `{` and the last `}`. Returns
/// an empty string when neither is found.
pub fn extract_json_block(text: &str) -> String {
    if let Some(caps) = fenced_json().captures(text) {
        return caps[1].trim().to_string();
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => text[start..=end].trim().to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::workflow::strategies::{FixedRetry, NoRetry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replies with the queued answers in order, then repeats the last one.
    pub(crate) struct Sequence {
        replies: Vec<Result<String, ()>>,
        calls: Arc<AtomicUsize>,
    }

    impl Sequence {
        pub(crate) fn new(replies: Vec<Result<&str, ()>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let seq = Self {
                replies: replies.into_iter().map(|r| r.map(str::to_string)).collect(),
                calls: Arc::clone(&calls),
            };
            (seq, calls)
        }
    }

    impl LlmStrategy for Sequence {
        fn complete(&self, _prompt: &str, _temperature: f64) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = &self.replies[n.min(self.replies.len() - 1)];
            reply.clone().map_err(|_| LlmError::Request {
                provider: "test".into(),
                message: "boom".into(),
            })
        }
    }

    #[test]
    fn test_no_llm() {
        assert!(NoLlm.complete("test", 0.5).is_err());
    }

    #[test]
    fn test_build_llm_strategy_without_provider() {
        let strategy = build_llm_strategy(None, None, DEFAULT_SYSTEM_PROMPT);
        assert!(strategy.complete("test", 0.5).is_err());
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(Provider::from_str("anthropic"), Some(Provider::Anthropic));
        assert_eq!(Provider::from_str("claude"), Some(Provider::Anthropic));
        assert_eq!(Provider::from_str("OpenAI"), Some(Provider::OpenAI));
        assert_eq!(Provider::from_str("gemini"), Some(Provider::Google));
        assert_eq!(Provider::from_str("unknown"), None);
        assert_eq!(Provider::OpenAI.env_var(), "OPENAI_API_KEY");
    }

    #[test]
    fn test_retry_recovers_from_empty_reply() {
        let (seq, calls) = Sequence::new(vec![Ok("   "), Err(()), Ok("done")]);
        let llm = RetryingLlm::new(Box::new(seq), Box::new(FixedRetry::new(3, 0.0)));
        assert_eq!(llm.complete("p", 0.6).unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_gives_up() {
        let (seq, calls) = Sequence::new(vec![Ok("")]);
        let llm = RetryingLlm::new(Box::new(seq), Box::new(FixedRetry::new(3, 0.0)));
        match llm.complete("p", 0.6) {
            Err(LlmError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, LlmError::EmptyReply));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_no_retry_single_call() {
        let (seq, calls) = Sequence::new(vec![Err(())]);
        let llm = RetryingLlm::new(Box::new(seq), Box::new(NoRetry));
        assert!(llm.complete("p", 0.6).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_extract_fenced_block() {
        let reply = "Here you go:\n```json\n{\"nodes\": []}\n```\nEnjoy {not this}";
        assert_eq!(extract_json_block(reply), "{\"nodes\": []}");
    }

    #[test]
    fn test_extract_braces() {
        assert_eq!(extract_json_block("sure! {\"a\": {\"b\": 1}} thanks"), "{\"a\": {\"b\": 1}}");
        assert_eq!(extract_json_block("no json here"), "");
        assert_eq!(extract_json_block("} backwards {"), "");
    }
}
