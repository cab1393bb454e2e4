
/*!
Pairs one observed record with at most one catalog entry.
Exact placement is always tried first, then the configured fallback rule.
*/

use derive_builder::Builder;
use log::trace;

use crate::data_types::match_result::{MatchResult, MatchRule};
use crate::data_types::records::ObservedRecord;
use crate::reference_catalog::ReferenceCatalog;

/// Controls how records are paired with the catalog
#[derive(Builder, Clone, Copy, Debug)]
#[builder(default)]
pub struct MatcherConfig {
    /// Rule tried after Exact fails; `None` for variant calls, Contains or Overlap for alignments and contigs
    fallback_rule: Option<MatchRule>,
    /// If true, unmatched records are labelled with the merged reference region they fall in
    attribute_unmatched: bool
}

impl Default for MatcherConfig {
    fn default() -> Self {
        // reasonable defaults for unit tests, main.rs sets these from user input
        Self {
            fallback_rule: None,
            attribute_unmatched: true
        }
    }
}

impl MatcherConfig {
    // getters
    pub fn fallback_rule(&self) -> Option<MatchRule> {
        self.fallback_rule
    }

    pub fn attribute_unmatched(&self) -> bool {
        self.attribute_unmatched
    }
}

/// Stateless matcher over a borrowed catalog
#[derive(Clone, Copy, Debug)]
pub struct Matcher<'a> {
    catalog: &'a ReferenceCatalog,
    config: MatcherConfig
}

impl<'a> Matcher<'a> {
    /// Constructor
    pub fn new(catalog: &'a ReferenceCatalog, config: MatcherConfig) -> Self {
        Self {
            catalog, config
        }
    }

    /// Matches a single record.
    /// A record with alleles only counts as a true match if both alleles agree exactly (case-sensitive).
    /// Records without alleles are compared on position alone.
    /// # Arguments
    /// * `record` - any observed record
    pub fn match_record<R: ObservedRecord + ?Sized>(&self, record: &R) -> MatchResult {
        let kind = record.intrinsic_kind();
        let Some(locus) = record.locus() else {
            return MatchResult::Unmatched { kind, attributed_region: None };
        };
        let chrom = record.chrom();

        let found = self.catalog.find_by_locus(chrom, &locus, MatchRule::Exact)
            .map(|e| (e, MatchRule::Exact))
            .or_else(|| {
                let rule = self.config.fallback_rule?;
                self.catalog.find_by_locus(chrom, &locus, rule).map(|e| (e, rule))
            });

        match found {
            Some((entry, rule)) => {
                let (by_reference, by_alternate) = match (record.alleles(), entry.variant()) {
                    (Some((r, a)), Some(variant)) => (r == variant.ref_allele(), a == variant.alt_allele()),
                    // we cannot confirm alleles against an entry that has none
                    (Some(_), None) => (false, false),
                    (None, _) => (true, true)
                };
                trace!("{chrom}:{locus} matched {} by {rule} (ref={by_reference}, alt={by_alternate})", entry.id());
                MatchResult::Matched {
                    sequin_id: entry.id().to_string(),
                    rule,
                    by_position: true,
                    by_reference,
                    by_alternate,
                    strata: entry.strata(),
                    kind
                }
            },
            None => {
                let attributed_region = if self.config.attribute_unmatched {
                    self.catalog.attribute(chrom, &locus).map(|s| s.to_string())
                } else {
                    None
                };
                MatchResult::Unmatched { kind, attributed_region }
            }
        }
    }

    pub fn catalog(&self) -> &'a ReferenceCatalog {
        self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::locus::Locus;
    use crate::data_types::records::{AlignmentRecord, ContigRecord, VariantRecord};
    use crate::data_types::sequins::{ContextClass, Genotype, MutationKind, Stratum, VariantDescriptor};
    use crate::reference_catalog::CatalogBuilder;

    fn variant_catalog() -> ReferenceCatalog {
        let mut builder = CatalogBuilder::new();
        builder.add_mixture("S1", None, 10.0, "A").unwrap();
        builder.add_annotation("S1", "chrQ", 1001, 1001,
            Some(VariantDescriptor::new("A".to_string(), "G".to_string(), Genotype::Heterozygous, ContextClass::Common)), None
        ).unwrap();
        builder.finalize().unwrap()
    }

    fn region_catalog() -> ReferenceCatalog {
        let mut builder = CatalogBuilder::new();
        builder.add_mixture("G1", Some(1000), 4.0, "A").unwrap();
        builder.add_mixture("G2", Some(1000), 8.0, "A").unwrap();
        builder.add_annotation("G1", "chrIS", 1, 1000, None, None).unwrap();
        builder.add_annotation("G2", "chrIS", 2001, 3000, None, None).unwrap();
        builder.finalize().unwrap()
    }

    fn call(pos: u64, r: &str, a: &str) -> VariantRecord {
        VariantRecord::new("chrQ".to_string(), pos, r.to_string(), a.to_string()).unwrap()
    }

    #[test]
    fn test_exact_variant_match() {
        let catalog = variant_catalog();
        let matcher = Matcher::new(&catalog, MatcherConfig::default());
        let result = matcher.match_record(&call(1001, "A", "G"));
        assert!(result.is_true_positive());
        match result {
            MatchResult::Matched { sequin_id, strata, rule, .. } => {
                assert_eq!(sequin_id, "S1");
                assert_eq!(rule, MatchRule::Exact);
                assert!(strata.contains(&Stratum::Overall));
                assert!(strata.contains(&Stratum::Mutation(MutationKind::Snp)));
            },
            MatchResult::Unmatched { .. } => panic!("expected a match")
        }
    }

    #[test]
    fn test_allele_strictness() {
        let catalog = variant_catalog();
        let matcher = Matcher::new(&catalog, MatcherConfig::default());

        // position only
        let wrong_alt = matcher.match_record(&call(1001, "A", "T"));
        assert!(!wrong_alt.is_true_positive());
        assert_eq!(wrong_alt.sequin_id(), Some("S1"));

        // case matters
        let lower = matcher.match_record(&call(1001, "A", "g"));
        assert!(!lower.is_true_positive());

        // different position, no fallback for variants, but attributed to the region
        let elsewhere = matcher.match_record(&call(1002, "C", "CT"));
        assert_eq!(elsewhere, MatchResult::Unmatched { kind: Some(MutationKind::Insertion), attributed_region: None });
        let inside = matcher.match_record(&VariantRecord::new("chrQ".to_string(), 1000, "TA".to_string(), "T".to_string()).unwrap());
        assert_eq!(inside, MatchResult::Unmatched { kind: Some(MutationKind::Deletion), attributed_region: Some("S1".to_string()) });
    }

    #[test]
    fn test_fallback_rules() {
        let catalog = region_catalog();
        let read = AlignmentRecord::mapped(Some("r1".to_string()), "chrIS".to_string(), Locus::new(100, 250).unwrap());
        let straddle = AlignmentRecord::mapped(Some("r2".to_string()), "chrIS".to_string(), Locus::new(950, 1100).unwrap());

        // no fallback, only exact spans match
        let exact_only = Matcher::new(&catalog, MatcherConfig::default());
        assert_eq!(exact_only.match_record(&read).sequin_id(), None);

        let contains = Matcher::new(&catalog, MatcherConfigBuilder::default().fallback_rule(Some(MatchRule::Contains)).build().unwrap());
        let result = contains.match_record(&read);
        assert!(result.is_true_positive());
        assert_eq!(result.sequin_id(), Some("G1"));
        assert_eq!(contains.match_record(&straddle).sequin_id(), None);

        let overlap = Matcher::new(&catalog, MatcherConfigBuilder::default().fallback_rule(Some(MatchRule::Overlap)).build().unwrap());
        assert_eq!(overlap.match_record(&straddle).sequin_id(), Some("G1"));

        // unmapped never matches
        assert_eq!(overlap.match_record(&AlignmentRecord::unmapped(None)), MatchResult::Unmatched { kind: None, attributed_region: None });

        // contigs go through the same path
        let contig = ContigRecord::new("contig_1".to_string(), "chrIS".to_string(), Locus::new(2001, 3000).unwrap(), 12.0);
        match overlap.match_record(&contig) {
            MatchResult::Matched { sequin_id, rule, .. } => {
                assert_eq!(sequin_id, "G2");
                assert_eq!(rule, MatchRule::Exact);
            },
            MatchResult::Unmatched { .. } => panic!("expected a match")
        }
    }

    #[test]
    fn test_attribution_disabled() {
        let catalog = variant_catalog();
        let config = MatcherConfigBuilder::default().attribute_unmatched(false).build().unwrap();
        let matcher = Matcher::new(&catalog, config);
        let inside = matcher.match_record(&VariantRecord::new("chrQ".to_string(), 1000, "TA".to_string(), "T".to_string()).unwrap());
        assert_eq!(inside, MatchResult::Unmatched { kind: Some(MutationKind::Deletion), attributed_region: None });
    }
}
