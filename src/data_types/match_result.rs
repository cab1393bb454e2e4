
use serde::Serialize;

use crate::data_types::sequins::{MutationKind, Stratum};

/// Positional rule used to pair an observed record with a catalog region
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, strum_macros::Display, strum_macros::EnumString)]
#[strum(ascii_case_insensitive)]
pub enum MatchRule {
    /// Same start and end
    Exact,
    /// The region fully contains the query
    Contains,
    /// At least one shared base
    Overlap
}

/// Outcome of matching one observed record against the catalog
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MatchResult {
    /// No catalog region was found by position
    Unmatched {
        /// Mutation kind implied by the record alleles, if any
        kind: Option<MutationKind>,
        /// The merged reference region the record falls in, if any; informational only
        attributed_region: Option<String>
    },
    /// A catalog region was found by position
    Matched {
        sequin_id: String,
        /// Rule that produced the match
        rule: MatchRule,
        by_position: bool,
        by_reference: bool,
        by_alternate: bool,
        /// Strata of the matched entry, always contains `Stratum::Overall`
        strata: Vec<Stratum>,
        /// Mutation kind implied by the record alleles, if any
        kind: Option<MutationKind>
    }
}

impl MatchResult {
    /// True when position, reference allele and alternate allele all agree
    pub fn is_true_positive(&self) -> bool {
        matches!(self, MatchResult::Matched { by_position: true, by_reference: true, by_alternate: true, .. })
    }

    /// The matched identifier, whether or not the alleles agree
    pub fn sequin_id(&self) -> Option<&str> {
        match self {
            MatchResult::Matched { sequin_id, .. } => Some(sequin_id),
            MatchResult::Unmatched { .. } => None
        }
    }

    /// The intrinsic mutation kind of the record
    pub fn kind(&self) -> Option<MutationKind> {
        match self {
            MatchResult::Matched { kind, .. } |
            MatchResult::Unmatched { kind, .. } => *kind
        }
    }

    /// Identifier used to label a record in reports: the match, else the attribution
    pub fn label(&self) -> Option<&str> {
        match self {
            MatchResult::Matched { sequin_id, .. } => Some(sequin_id),
            MatchResult::Unmatched { attributed_region, .. } => attributed_region.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_positive() {
        let matched = MatchResult::Matched {
            sequin_id: "S1".to_string(),
            rule: MatchRule::Exact,
            by_position: true, by_reference: true, by_alternate: true,
            strata: vec![Stratum::Overall],
            kind: Some(MutationKind::Snp)
        };
        assert!(matched.is_true_positive());
        assert_eq!(matched.sequin_id(), Some("S1"));

        let wrong_alt = MatchResult::Matched {
            sequin_id: "S1".to_string(),
            rule: MatchRule::Exact,
            by_position: true, by_reference: true, by_alternate: false,
            strata: vec![Stratum::Overall],
            kind: Some(MutationKind::Snp)
        };
        assert!(!wrong_alt.is_true_positive());
        assert_eq!(wrong_alt.sequin_id(), Some("S1"));

        let unmatched = MatchResult::Unmatched { kind: None, attributed_region: Some("R1".to_string()) };
        assert!(!unmatched.is_true_positive());
        assert_eq!(unmatched.sequin_id(), None);
        assert_eq!(unmatched.label(), Some("R1"));
    }
}
