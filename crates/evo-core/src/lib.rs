//! Deterministic core of the workflow evolution pipeline.
//!
//! Holds the artifact graph model and everything that can be decided
//! without talking to an external service:
//! - structural validation (milestones, node types, reachability)
//! - evolution checks (similarity, schema diff) and pluggable rules
//! - the heuristic half of the score
//! - the version ledger

pub mod artifact;
pub mod catalog;
mod error;
pub mod evolution;
pub mod fallback;
pub mod hashing;
pub mod heuristic;
pub mod ledger;
pub mod milestones;
pub mod rules;
pub mod validate;

pub use artifact::{Artifact, ArtifactSummary, Node};
pub use catalog::NodeCatalog;
pub use error::CoreError;
pub use evolution::{similarity_ratio, SchemaDiff};
pub use fallback::fallback_artifact;
pub use heuristic::{blend, heuristic_score};
pub use ledger::{Ledger, LedgerEntry};
pub use milestones::{MilestoneProperty, MilestoneTable};
pub use rules::{Rule, RuleSet};
pub use validate::{StructuralReport, StructuralValidator};
