//! CLI command implementations.

pub mod cleanup;
pub mod ledger_cmd;
pub mod run_cmd;
pub mod validate_cmd;
pub mod versions;

use evo_core::CoreError;
use evo_store::{LocalStore, ObjectStore, StoreError, SupabaseStore};
use thiserror::Error;

use crate::config::{ConfigError, Settings, SUPABASE_SERVICE_KEY, SUPABASE_URL};
use crate::workflow::prompt::StateError;

/// Failures while running a command against configured services.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl CommandError {
    /// Configuration problems exit with 2, everything else with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Print an error the way every command does and return its exit code.
pub fn report_error(err: &CommandError, json: bool) -> i32 {
    if json {
        println!("{}", serde_json::json!({ "error": err.to_string() }));
    } else {
        eprintln!("Error: {}", err);
    }
    err.exit_code()
}

/// Build the configured storage backend.
pub fn open_store(
    settings: &Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn ObjectStore>, ConfigError> {
    match settings.storage.backend.as_str() {
        "supabase" => {
            let missing: Vec<String> = [SUPABASE_URL, SUPABASE_SERVICE_KEY]
                .into_iter()
                .filter(|name| lookup(name).is_none())
                .map(str::to_string)
                .collect();
            match (lookup(SUPABASE_URL), lookup(SUPABASE_SERVICE_KEY)) {
                (Some(url), Some(key)) => Ok(Box::new(SupabaseStore::new(&url, &key))),
                _ => Err(ConfigError::MissingEnv(missing)),
            }
        }
        "local" => Ok(Box::new(LocalStore::new(settings.local_store_root()))),
        other => Err(ConfigError::UnknownBackend(other.to_string())),
    }
}

/// Settings rooted in a scratch directory with the local backend and no model.
#[cfg(test)]
pub(crate) fn offline_settings(root: &std::path::Path) -> Settings {
    let mut settings = Settings::default();
    settings.paths.work_dir = root.to_path_buf();
    settings.storage.backend = "local".into();
    settings.storage.local_root = root.join("storage");
    settings.llm.provider = "none".into();
    settings
}
