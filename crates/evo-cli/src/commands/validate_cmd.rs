//! `evo validate <file>`: offline structural check of a workflow file.

use std::path::Path;

use evo_core::{Artifact, CoreError, StructuralReport};
use serde::Serialize;

use super::{report_error, CommandError};
use crate::config::Settings;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub version: u32,
    pub ok: bool,
    pub problems: Vec<String>,
    pub violations: Vec<String>,
    #[serde(skip)]
    pub report: StructuralReport,
}

pub fn validate_file(settings: &Settings, path: &Path, version: u32) -> Result<ValidationResult, CommandError> {
    let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let artifact = Artifact::from_json(&text)?;
    let report = settings.validator()?.validate(&artifact, version);
    let violations = settings.rule_set().enforce(&artifact);
    Ok(ValidationResult {
        version,
        ok: report.is_ok() && violations.is_empty(),
        problems: report.problems(),
        violations,
        report,
    })
}

pub fn cmd_validate(settings: &Settings, path: &Path, version: u32, json: bool) -> i32 {
    let result = match validate_file(settings, path, version) {
        Ok(result) => result,
        Err(e) => return report_error(&e, json),
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "version": result.version,
                "ok": result.ok,
                "summary": result.report.summary,
                "problems": result.problems,
                "violations": result.violations,
            })
        );
    } else {
        let summary = &result.report.summary;
        println!(
            "{}: {} nodes, {} distinct types, branching={}, error handling={}, external APIs={}, oauth2={}",
            path.display(),
            summary.total,
            summary.distinct_base_types(),
            summary.has_branching,
            summary.has_error,
            summary.external_apis,
            summary.include_oauth2
        );
        if result.ok {
            println!("Valid for V{}", result.version);
        } else {
            for problem in result.problems.iter().chain(&result.violations) {
                println!("  - {}", problem);
            }
        }
    }

    if result.ok {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::offline_settings;
    use evo_core::{fallback_artifact, MilestoneProperty, Node};

    #[test]
    fn test_validate_fallback_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = offline_settings(dir.path());
        let path = dir.path().join("workflow.json");
        std::fs::write(&path, fallback_artifact().to_pretty_json()).unwrap();

        assert!(validate_file(&settings, &path, 2).unwrap().ok);
        let later = validate_file(&settings, &path, 3).unwrap();
        assert!(!later.ok);
        assert_eq!(later.report.missing_milestone, Some(MilestoneProperty::HasBranching));
    }

    #[test]
    fn test_validate_reports_rules_and_reachability() {
        let dir = tempfile::tempdir().unwrap();
        let settings = offline_settings(dir.path());
        let path = dir.path().join("workflow.json");
        let artifact = fallback_artifact()
            .with_node(Node::new("Island", "wait"))
            .connect("Supabase", "Nowhere");
        std::fs::write(&path, artifact.to_pretty_json()).unwrap();

        let result = validate_file(&settings, &path, 1).unwrap();
        assert!(!result.ok);
        assert_eq!(result.report.unreachable, vec!["Island".to_string()]);
        assert!(result.violations.iter().any(|v| v.contains("Nowhere")));
    }

    #[test]
    fn test_validate_schema_catalog_used() {
        let dir = tempfile::tempdir().unwrap();
        let settings = offline_settings(dir.path());
        std::fs::write(settings.schema_path(), r#"{"validNodes": ["start", "webhook"]}"#).unwrap();
        let path = dir.path().join("workflow.json");
        std::fs::write(&path, fallback_artifact().to_pretty_json()).unwrap();

        let result = validate_file(&settings, &path, 1).unwrap();
        assert_eq!(result.report.invalid_types.len(), 3);
    }
}
