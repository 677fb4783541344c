//! Settings: TOML file for tunables, environment for secrets and switches.
//!
//! Lookup order for the file: `--config <path>`, then `./evo.toml`, then
//! `<config_dir>/evo/config.toml`; built-in defaults when none exists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use evo_core::{CoreError, MilestoneProperty, MilestoneTable, NodeCatalog, RuleSet, StructuralValidator};
use evo_store::pack_name;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::llm::{Provider, DEFAULT_SYSTEM_PROMPT};
use crate::workflow::GenerationSettings;

pub const LOCAL_CONFIG: &str = "evo.toml";
pub const DEPLOYMENT_FLAG: &str = "DEPLOYMENT_ACTIVE";
pub const SUPABASE_URL: &str = "SUPABASE_URL";
pub const SUPABASE_SERVICE_KEY: &str = "SUPABASE_SERVICE_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error("invalid milestone version '{0}'")]
    MilestoneVersion(String),

    #[error("unknown storage backend '{}' (expected one of: {})", .0, evo_store::backends::available().join(", "))]
    UnknownBackend(String),

    #[error("unsupported LLM provider '{0}'")]
    UnknownProvider(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// anthropic, openai, google, or "none" to run without a model.
    pub provider: String,
    pub model: Option<String>,
    pub system_prompt: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl LlmSettings {
    pub fn enabled(&self) -> bool {
        !self.provider.eq_ignore_ascii_case("none")
    }

    pub fn provider(&self) -> Result<Option<Provider>, ConfigError> {
        if !self.enabled() {
            return Ok(None);
        }
        Provider::from_str(&self.provider)
            .map(Some)
            .ok_or_else(|| ConfigError::UnknownProvider(self.provider.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: String,
    pub staging_bucket: String,
    pub prod_bucket: String,
    /// Root directory for the local backend, relative to the work dir.
    pub local_root: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: "supabase".to_string(),
            staging_bucket: "workflowpacks".to_string(),
            prod_bucket: "workflowpacks".to_string(),
            local_root: PathBuf::from("storage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub work_dir: PathBuf,
    pub packs_dir: PathBuf,
    pub ledger: PathBuf,
    pub prompt_history: PathBuf,
    pub schema: PathBuf,
    pub pack_suffix: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            packs_dir: PathBuf::from("workflow_core/packs"),
            ledger: PathBuf::from("versions.json"),
            prompt_history: PathBuf::from("prompt_history.json"),
            schema: PathBuf::from("n8n_schema.json"),
            pack_suffix: "n8n_Ultimate_Pack".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub min_distinct_types: usize,
    pub required_types: Vec<String>,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            min_distinct_types: 3,
            required_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub generation: GenerationSettings,
    pub llm: LlmSettings,
    pub storage: StorageSettings,
    pub paths: PathSettings,
    /// Version threshold -> milestone property key.
    pub milestones: BTreeMap<String, String>,
    pub rules: RuleSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            generation: GenerationSettings::default(),
            llm: LlmSettings::default(),
            storage: StorageSettings::default(),
            paths: PathSettings::default(),
            milestones: MilestoneTable::default()
                .iter()
                .map(|(v, p)| (v.to_string(), p.key().to_string()))
                .collect(),
            rules: RuleSettings::default(),
        }
    }
}

impl Settings {
    /// Load from an explicit path, or the first config file found.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_paths().into_iter().find(|p| p.is_file()),
        };
        match candidate {
            Some(p) => {
                let text = std::fs::read_to_string(&p).map_err(|source| ConfigError::Read {
                    path: p.clone(),
                    source,
                })?;
                Self::from_toml(&p, &text)
            }
            None => Ok(Self::default()),
        }
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("evo").join("config.toml"));
        }
        paths
    }

    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Bucket overrides from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bucket) = lookup("STAGING_BUCKET").filter(|b| !b.is_empty()) {
            self.storage.staging_bucket = bucket;
        }
        if let Some(bucket) = lookup("PROD_BUCKET").filter(|b| !b.is_empty()) {
            self.storage.prod_bucket = bucket;
        }
    }

    /// Environment variables the configured backends need.
    pub fn required_env(&self) -> Result<Vec<&'static str>, ConfigError> {
        let mut required = Vec::new();
        match self.storage.backend.as_str() {
            "supabase" => required.extend([SUPABASE_URL, SUPABASE_SERVICE_KEY]),
            "local" => {}
            other => return Err(ConfigError::UnknownBackend(other.to_string())),
        }
        if let Some(provider) = self.llm.provider()? {
            required.push(provider.env_var());
        }
        Ok(required)
    }

    /// Fails with every missing name at once.
    pub fn check_env(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let missing: Vec<String> = self
            .required_env()?
            .into_iter()
            .filter(|name| lookup(name).map_or(true, |v| v.trim().is_empty()))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingEnv(missing))
        }
    }

    pub fn milestone_table(&self) -> Result<MilestoneTable, ConfigError> {
        let mut table = BTreeMap::new();
        for (version, key) in &self.milestones {
            let threshold: u32 = version
                .trim()
                .parse()
                .map_err(|_| ConfigError::MilestoneVersion(version.clone()))?;
            table.insert(threshold, key.parse::<MilestoneProperty>()?);
        }
        Ok(MilestoneTable::new(table))
    }

    /// Catalog from the schema document, or the built-in set.
    pub fn catalog(&self) -> Result<NodeCatalog, ConfigError> {
        Ok(NodeCatalog::load(&self.schema_path())?)
    }

    pub fn validator(&self) -> Result<StructuralValidator, ConfigError> {
        Ok(StructuralValidator::new(self.catalog()?, self.milestone_table()?)
            .with_start_node(self.generation.start_node.clone()))
    }

    pub fn rule_set(&self) -> RuleSet {
        RuleSet::standard(self.rules.min_distinct_types, self.rules.required_types.clone())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.work_dir.join(path)
        }
    }

    pub fn packs_dir(&self) -> PathBuf {
        self.resolve(&self.paths.packs_dir)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.paths.ledger)
    }

    pub fn prompt_history_path(&self) -> PathBuf {
        self.resolve(&self.paths.prompt_history)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.resolve(&self.paths.schema)
    }

    pub fn feedback_path(&self) -> PathBuf {
        self.packs_dir().join("feedback.json")
    }

    pub fn prompt_log_dir(&self) -> PathBuf {
        self.resolve(Path::new("prompt_logs"))
    }

    pub fn local_store_root(&self) -> PathBuf {
        self.resolve(&self.storage.local_root)
    }

    /// Local folder of a version's pack; its zip sits next to it.
    pub fn pack_folder(&self, version: u32) -> PathBuf {
        self.packs_dir().join(pack_name(version, &self.paths.pack_suffix))
    }
}

/// `DEPLOYMENT_ACTIVE` must be "true" (any case) for runs to do anything.
pub fn deployment_active(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup(DEPLOYMENT_FLAG)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Process environment lookup.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.generation.attempts, 5);
        assert_eq!(settings.generation.retry.max_attempts, 3);
        assert_eq!(settings.storage.staging_bucket, "workflowpacks");
        assert_eq!(settings.milestone_table().unwrap(), MilestoneTable::default());
        assert_eq!(settings.rule_set().len(), 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            [generation]
            attempts = 2

            [generation.retry]
            strategy = "exponential"

            [llm]
            provider = "anthropic"

            [storage]
            backend = "local"

            [paths]
            work_dir = "/srv/evo"

            [milestones]
            2 = "has_branching"
        "#;
        let settings = Settings::from_toml(Path::new("evo.toml"), text).unwrap();
        assert_eq!(settings.generation.attempts, 2);
        assert_eq!(settings.generation.similarity_threshold, 0.95);
        assert_eq!(settings.generation.retry.strategy, "exponential");
        assert_eq!(settings.generation.retry.max_attempts, 3);
        assert_eq!(settings.ledger_path(), PathBuf::from("/srv/evo/versions.json"));
        assert_eq!(
            settings.pack_folder(7),
            PathBuf::from("/srv/evo/workflow_core/packs/V7_n8n_Ultimate_Pack")
        );
        let table = settings.milestone_table().unwrap();
        assert_eq!(table.at(2), Some(MilestoneProperty::HasBranching));
        assert_eq!(table.at(3), None);
        assert_eq!(settings.required_env().unwrap(), vec!["ANTHROPIC_API_KEY"]);
    }

    #[test]
    fn test_bad_milestone() {
        let mut settings = Settings::default();
        settings.milestones.insert("x".into(), "has_error".into());
        assert!(matches!(settings.milestone_table(), Err(ConfigError::MilestoneVersion(_))));

        let mut settings = Settings::default();
        settings.milestones.insert("9".into(), "teleport".into());
        assert!(matches!(
            settings.milestone_table(),
            Err(ConfigError::Core(CoreError::UnknownMilestone(_)))
        ));
    }

    #[test]
    fn test_missing_env_lists_every_name() {
        let settings = Settings::default();
        let err = settings.check_env(lookup(&[("SUPABASE_URL", "https://x")])).unwrap_err();
        match err {
            ConfigError::MissingEnv(names) => {
                assert_eq!(names, vec!["SUPABASE_SERVICE_KEY", "OPENAI_API_KEY"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(settings
            .check_env(lookup(&[
                ("SUPABASE_URL", "https://x"),
                ("SUPABASE_SERVICE_KEY", "k"),
                ("OPENAI_API_KEY", "sk"),
            ]))
            .is_ok());
    }

    #[test]
    fn test_offline_settings_need_nothing() {
        let mut settings = Settings::default();
        settings.storage.backend = "local".into();
        settings.llm.provider = "none".into();
        assert!(settings.required_env().unwrap().is_empty());

        settings.storage.backend = "s3".into();
        let err = settings.required_env().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackend(_)));
        assert_eq!(err.to_string(), "unknown storage backend 's3' (expected one of: supabase, local)");
    }

    #[test]
    fn test_bucket_overrides() {
        let mut settings = Settings::default();
        settings.apply_env(lookup(&[("STAGING_BUCKET", "staging"), ("PROD_BUCKET", "")]));
        assert_eq!(settings.storage.staging_bucket, "staging");
        assert_eq!(settings.storage.prod_bucket, "workflowpacks");
    }

    #[test]
    fn test_deployment_flag() {
        assert!(deployment_active(lookup(&[("DEPLOYMENT_ACTIVE", "TRUE")])));
        assert!(!deployment_active(lookup(&[("DEPLOYMENT_ACTIVE", "false")])));
        assert!(!deployment_active(lookup(&[])));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(Settings::load(Some(&path)), Err(ConfigError::Read { .. })));
    }
}
