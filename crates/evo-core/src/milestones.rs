//! Version-gated structural requirements.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactSummary;
use crate::error::CoreError;

/// Summary property a milestone requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneProperty {
    /// At least one external-API node.
    ExternalApis,
    HasBranching,
    HasError,
    IncludeOauth2,
}

impl MilestoneProperty {
    pub const ALL: [MilestoneProperty; 4] = [
        Self::ExternalApis,
        Self::HasBranching,
        Self::HasError,
        Self::IncludeOauth2,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::ExternalApis => "external_apis",
            Self::HasBranching => "has_branching",
            Self::HasError => "has_error",
            Self::IncludeOauth2 => "include_oauth2",
        }
    }

    /// Count properties need at least one; flags need to be true.
    pub fn is_met(&self, summary: &ArtifactSummary) -> bool {
        match self {
            Self::ExternalApis => summary.external_apis >= 1,
            Self::HasBranching => summary.has_branching,
            Self::HasError => summary.has_error,
            Self::IncludeOauth2 => summary.include_oauth2,
        }
    }
}

impl fmt::Display for MilestoneProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MilestoneProperty {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.key() == s)
            .ok_or_else(|| CoreError::UnknownMilestone(s.to_string()))
    }
}

/// Ordered mapping from version threshold to required property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneTable {
    milestones: BTreeMap<u32, MilestoneProperty>,
}

impl MilestoneTable {
    pub fn new(milestones: BTreeMap<u32, MilestoneProperty>) -> Self {
        Self { milestones }
    }

    /// Milestone introduced exactly at `version`, if any.
    pub fn at(&self, version: u32) -> Option<MilestoneProperty> {
        self.milestones.get(&version).copied()
    }

    /// Milestones whose threshold is at or below `version`, in threshold order.
    pub fn applicable(&self, version: u32) -> impl Iterator<Item = (u32, MilestoneProperty)> + '_ {
        self.milestones.range(..=version).map(|(v, p)| (*v, *p))
    }

    /// First applicable milestone the summary does not satisfy.
    pub fn first_unmet(&self, version: u32, summary: &ArtifactSummary) -> Option<MilestoneProperty> {
        self.applicable(version)
            .map(|(_, p)| p)
            .find(|p| !p.is_met(summary))
    }

    /// Whether each milestone property (at any threshold) holds.
    pub fn hits(&self, summary: &ArtifactSummary) -> BTreeMap<String, bool> {
        self.milestones
            .values()
            .map(|p| (p.key().to_string(), p.is_met(summary)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, MilestoneProperty)> + '_ {
        self.milestones.iter().map(|(v, p)| (*v, *p))
    }
}

impl Default for MilestoneTable {
    fn default() -> Self {
        Self::new(BTreeMap::from([
            (2, MilestoneProperty::ExternalApis),
            (3, MilestoneProperty::HasBranching),
            (4, MilestoneProperty::HasError),
            (5, MilestoneProperty::IncludeOauth2),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, Node};

    fn summary_of(nodes: &[(&str, &str)]) -> ArtifactSummary {
        let artifact = nodes
            .iter()
            .fold(Artifact::new("t"), |a, (name, kind)| a.with_node(Node::new(*name, *kind)));
        artifact.summary()
    }

    #[test]
    fn test_version_one_has_no_requirements() {
        let table = MilestoneTable::default();
        assert_eq!(table.first_unmet(1, &summary_of(&[("Start", "start")])), None);
    }

    fn satisfying(property: MilestoneProperty) -> (&'static str, &'static str) {
        match property {
            MilestoneProperty::ExternalApis => ("Call", "httpRequest"),
            MilestoneProperty::HasBranching => ("Route", "if"),
            MilestoneProperty::HasError => ("Error Handler", "set"),
            MilestoneProperty::IncludeOauth2 => ("Auth", "oauth2Api"),
        }
    }

    #[test]
    fn test_lacking_property_fails_from_threshold_on() {
        let table = MilestoneTable::default();
        for (threshold, missing) in table.iter() {
            let nodes: Vec<_> = MilestoneProperty::ALL
                .into_iter()
                .filter(|p| *p != missing)
                .map(satisfying)
                .collect();
            let summary = summary_of(&nodes);
            for version in threshold..threshold + 5 {
                assert_eq!(table.first_unmet(version, &summary), Some(missing));
            }
            assert_eq!(table.first_unmet(threshold - 1, &summary), None);
        }
    }

    #[test]
    fn test_reports_first_failing_key() {
        let table = MilestoneTable::default();
        let has_api = summary_of(&[("Call", "httpRequest")]);
        assert_eq!(table.first_unmet(2, &has_api), None);
        assert_eq!(table.first_unmet(3, &has_api), Some(MilestoneProperty::HasBranching));
        assert_eq!(table.first_unmet(9, &has_api), Some(MilestoneProperty::HasBranching));
    }

    #[test]
    fn test_parse_property() {
        assert_eq!("has_error".parse::<MilestoneProperty>().unwrap(), MilestoneProperty::HasError);
        assert!("flying".parse::<MilestoneProperty>().is_err());
    }

    #[test]
    fn test_at_and_hits() {
        let table = MilestoneTable::default();
        assert_eq!(table.at(3), Some(MilestoneProperty::HasBranching));
        assert_eq!(table.at(7), None);
        let hits = table.hits(&summary_of(&[("Call", "httpRequest")]));
        assert_eq!(hits["external_apis"], true);
        assert_eq!(hits["has_error"], false);
    }
}
