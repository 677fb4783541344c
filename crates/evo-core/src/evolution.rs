//! Evolution checks between a previous artifact and a candidate.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::catalog::NodeCatalog;

/// Similarity at or above which a candidate has not evolved.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.95;

/// Normalized edit-distance similarity in [0, 1]:
/// `1 - levenshtein(a, b) / max(len(a), len(b))`, over characters.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Similarity of the canonical serializations of two artifacts.
pub fn artifact_similarity(previous: &Artifact, candidate: &Artifact) -> f64 {
    similarity_ratio(&previous.canonical_json(), &candidate.canonical_json())
}

/// Whether `candidate` moved far enough away from `previous`.
pub fn has_evolved(previous: &Artifact, candidate: &Artifact, threshold: f64) -> bool {
    artifact_similarity(previous, candidate) < threshold
}

/// Schema regressions of a candidate relative to its predecessor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiff {
    /// Top-level keys of the previous artifact missing from the candidate.
    pub missing_keys: Vec<String>,
    /// Candidate node types absent from the catalog.
    pub invalid_nodes: Vec<String>,
}

impl SchemaDiff {
    pub fn between(previous: Option<&Artifact>, candidate: &Artifact, catalog: &NodeCatalog) -> Self {
        let missing_keys = match previous {
            Some(prev) => {
                let present = candidate.top_level_keys();
                prev.top_level_keys()
                    .into_iter()
                    .filter(|k| !present.contains(k))
                    .collect()
            }
            None => Vec::new(),
        };
        Self {
            missing_keys,
            invalid_nodes: catalog.unknown_types(candidate),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.missing_keys.is_empty() && self.invalid_nodes.is_empty()
    }
}
