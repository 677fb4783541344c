//! `evo run`: generate, package, publish and record the next version.

use std::path::PathBuf;

use chrono::Utc;
use evo_core::hashing::sha256_hex;
use evo_core::{Artifact, CoreError, Ledger, SchemaDiff};
use evo_store::archive::WORKFLOW_FILE;
use evo_store::{archive_name, stored_versions, ObjectStore, PackArchive, StoreError, UploadOutcome, ZIP_CONTENT_TYPE};
use serde::Serialize;
use tracing::{info, warn};

use super::{open_store, report_error, CommandError};
use crate::config::{env_lookup, Settings};
use crate::workflow::docs::{has_error_marker, DocsBuilder, DocsInput};
use crate::workflow::prompt::{shape_prompt, FeedbackFile, FeedbackSummary, PromptHistory, PromptLog};
use crate::workflow::strategies::build_retry_strategy;
use crate::workflow::{
    build_llm_strategy, GenerationLoop, GenerationRequest, LlmStrategy, LlmVoter, Previous, RetryingLlm, Scorer,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub version: u32,
    pub output_path: PathBuf,
    pub score: u32,
    pub fallback: bool,
    pub hash: String,
}

/// Next version: one past the highest of the store listing and the ledger.
pub fn next_version(stored: &[u32], ledger: &Ledger) -> Result<u32, CoreError> {
    let listed = stored.iter().copied().max().unwrap_or(0);
    let latest = listed.max(ledger.latest_version().unwrap_or(0));
    latest.checked_add(1).ok_or(CoreError::VersionOverflow(latest))
}

/// Previous workflow from its local pack folder, else from the stored
/// archive. `None` when neither exists.
pub fn load_previous(
    settings: &Settings,
    store: &dyn ObjectStore,
    version: u32,
) -> Result<Option<Artifact>, CommandError> {
    let local = settings.pack_folder(version).join(WORKFLOW_FILE);
    if local.is_file() {
        let text = std::fs::read_to_string(&local).map_err(|e| CoreError::Io {
            path: local.clone(),
            source: e,
        })?;
        return Ok(Some(Artifact::from_json(&text)?));
    }

    let name = archive_name(version, &settings.paths.pack_suffix);
    let bytes = match store.download(&settings.storage.staging_bucket, &name) {
        Ok(bytes) => bytes,
        Err(StoreError::NotFound { .. }) => {
            warn!(version, "previous version not found locally or in storage");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let archive = PackArchive::from_zip_bytes(&bytes)?;
    match archive.get_str(WORKFLOW_FILE) {
        Some(text) => Ok(Some(Artifact::from_json(text)?)),
        None => {
            warn!(archive = %name, "archive has no workflow file");
            Ok(None)
        }
    }
}

/// One full run. Nothing is written until a winner (or the fallback)
/// has been chosen.
pub fn run_version(
    settings: &Settings,
    llm: &dyn LlmStrategy,
    store: &dyn ObjectStore,
    version_override: Option<u32>,
) -> Result<RunResult, CommandError> {
    let staging = settings.storage.staging_bucket.as_str();
    let ledger_path = settings.ledger_path();
    let mut ledger = Ledger::load(&ledger_path)?;
    let version = match version_override {
        Some(v) => v,
        None => next_version(&stored_versions(&store.list(staging)?), &ledger)?,
    };
    info!(version, store = store.name(), "starting run");

    let validator = settings.validator()?;
    let rules = settings.rule_set();
    let scorer = Scorer::new(llm).with_neutral(settings.generation.neutral_score);

    let history_path = settings.prompt_history_path();
    let mut history = PromptHistory::load(&history_path)?;
    let feedback_file = FeedbackFile::new(settings.feedback_path());
    let previous_critique = feedback_file.critique()?;

    let previous = match version {
        0 | 1 => None,
        v => load_previous(settings, store, v - 1)?.map(|artifact| {
            let score = ledger
                .get(v - 1)
                .map(|e| e.score)
                .unwrap_or_else(|| scorer.score(&artifact));
            Previous {
                artifact,
                score: Some(score),
            }
        }),
    };

    let feedback = FeedbackSummary::from_previous(
        previous.as_ref().map(|p| &p.artifact),
        previous.as_ref().and_then(|p| p.score),
        &previous_critique,
        validator.catalog(),
        &rules,
        validator.milestones(),
    );
    let previous_prompt = history.get(version.saturating_sub(1)).unwrap_or_default().to_string();
    let (prompt, temperature) = shape_prompt(version, validator.milestones(), &previous_prompt, &feedback);

    let voter = LlmVoter::new(llm).with_samples(settings.generation.vote_samples);
    let prompt_log = PromptLog::new(settings.prompt_log_dir());
    let generation = GenerationLoop::new(llm, &validator, &rules, &voter, &settings.generation)
        .with_prompt_log(&prompt_log);
    let request = GenerationRequest {
        version,
        prompt: prompt.clone(),
        temperature,
        previous: previous.clone(),
    };
    let outcome = generation.run(&request);
    let fallback = outcome.is_fallback();
    let score = match outcome.score() {
        Some(score) => score,
        None => scorer.score(outcome.artifact()),
    };
    let artifact = outcome.into_artifact();

    let previous_artifact = previous.as_ref().map(|p| &p.artifact);
    let diff = SchemaDiff::between(previous_artifact, &artifact, validator.catalog());
    let violations = rules.enforce(&artifact);
    let docs = DocsBuilder::new(llm).build(&DocsInput {
        version,
        artifact: &artifact,
        score,
        prompt: &prompt,
        previous_critique: &previous_critique,
        diff: &diff,
        violations: &violations,
    });

    let zip_path = docs.archive.write_pack(&settings.pack_folder(version))?;
    let bytes = std::fs::read(&zip_path).map_err(|e| CoreError::Io {
        path: zip_path.clone(),
        source: e,
    })?;
    let hash = sha256_hex(&bytes);

    let name = archive_name(version, &settings.paths.pack_suffix);
    let mut buckets = vec![staging];
    if settings.storage.prod_bucket != settings.storage.staging_bucket {
        buckets.push(settings.storage.prod_bucket.as_str());
    }
    for bucket in buckets {
        match store.upload(bucket, &name, &bytes, ZIP_CONTENT_TYPE)? {
            UploadOutcome::Uploaded => info!(bucket, archive = %name, "uploaded"),
            UploadOutcome::Skipped => warn!(bucket, archive = %name, "archive already stored, skipped"),
        }
    }

    history.record(version, &prompt);
    history.save(&history_path)?;
    if has_error_marker(&docs.critique) {
        warn!(version, "critique failed, clearing stored critique");
        feedback_file.store_critique("")?;
    } else {
        feedback_file.store_critique(&docs.critique)?;
    }
    ledger.append(version, score, hash.clone(), Utc::now());
    ledger.save(&ledger_path)?;
    info!(version, score, fallback, "run complete");

    Ok(RunResult {
        version,
        output_path: zip_path,
        score,
        fallback,
        hash,
    })
}

pub fn cmd_run(settings: &Settings, version: Option<u32>, json: bool) -> i32 {
    let store = match open_store(settings, env_lookup) {
        Ok(store) => store,
        Err(e) => return report_error(&e.into(), json),
    };
    let provider = settings.llm.enabled().then_some(settings.llm.provider.as_str());
    let llm = RetryingLlm::new(
        build_llm_strategy(provider, settings.llm.model.as_deref(), &settings.llm.system_prompt),
        build_retry_strategy(&settings.generation.retry),
    );

    match run_version(settings, &llm, store.as_ref(), version) {
        Ok(result) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "done",
                        "output_path": result.output_path,
                        "version": result.version,
                        "score": result.score,
                        "fallback": result.fallback,
                    })
                );
            } else {
                let note = if result.fallback { " (fallback workflow)" } else { "" };
                println!(
                    "V{} complete with score {}/100{}: {}",
                    result.version,
                    result.score,
                    note,
                    result.output_path.display()
                );
            }
            0
        }
        Err(e) => report_error(&e, json),
    }
}
