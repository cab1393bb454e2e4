
/*!
Stratified confusion and regression accounting.
Counters are pre-seeded from the catalog so strata with nothing observed still report, and false negatives are only
derived at finalization.
*/

use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::data_types::confusion::ConfusionCounter;
use crate::data_types::match_result::MatchResult;
use crate::data_types::records::MalformedRecord;
use crate::data_types::regression::{DetectionLimit, LinearModel, RegressionPointSet};
use crate::data_types::sequins::Stratum;
use crate::reference_catalog::ReferenceCatalog;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AccountingError {
    #[error("stratum {stratum} has {tp} true positives but only {reference_total} reference entries")]
    ExcessTruePositives { stratum: String, tp: u64, reference_total: u64 }
}

/// How repeated observations of the same entry combine in the regression set
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ObservationMode {
    /// The latest observation replaces earlier ones, e.g. allele frequency of a call
    Latest,
    /// Observations add up, e.g. read counts
    Sum
}

/// What happened to a single recorded match
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum RecordOutcome {
    /// First supporting record for an entry
    TruePositive,
    /// Supports an entry that was already detected; counted in the histogram only
    Duplicate,
    /// Does not support any entry
    FalsePositive
}

/// Final numbers for one stratum
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StratumReport {
    pub stratum: Stratum,
    pub confusion: ConfusionCounter,
    pub model: LinearModel
}

/// Final numbers for one catalog entry
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SequinReport {
    pub sequin_id: String,
    /// Expected value in the selected mixture
    pub expected: Option<f64>,
    /// Observed value, if the entry was detected
    pub observed: Option<f64>,
    /// Number of supporting records
    pub count: u64,
    pub detected: bool
}

/// Everything an analysis reports once the stream is done
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AccountingSummary {
    /// Mixture the expected values come from
    pub mixture: String,
    /// Per-stratum results, in stratum order
    pub strata: Vec<StratumReport>,
    /// Per-entry results, in identifier order
    pub sequins: Vec<SequinReport>,
    /// Lowest expected value still observed, from the overall points
    pub detection_limit: Option<DetectionLimit>
}

impl AccountingSummary {
    /// Lookup for a single stratum
    pub fn stratum(&self, stratum: &Stratum) -> Option<&StratumReport> {
        self.strata.iter().find(|s| s.stratum == *stratum)
    }

    /// The overall stratum, always present
    pub fn overall(&self) -> Option<&StratumReport> {
        self.stratum(&Stratum::Overall)
    }
}

/// Streaming accumulator over match results
#[derive(Clone, Debug)]
pub struct Accumulator<'a> {
    catalog: &'a ReferenceCatalog,
    /// Mixture label the expected values come from
    mixture: String,
    mode: ObservationMode,
    counters: BTreeMap<Stratum, ConfusionCounter>,
    regressions: BTreeMap<Stratum, RegressionPointSet>,
    /// Supporting record count per entry, zero-initialized from the catalog
    histogram: BTreeMap<String, u64>,
    /// Entries that already produced a TP
    detected: BTreeSet<String>
}

impl<'a> Accumulator<'a> {
    /// Constructor, seeding every requested stratum (plus overall) with its reference total
    /// # Arguments
    /// * `catalog` - the finalized catalog
    /// * `mixture` - the mixture label used for expected values
    /// * `strata` - strata that must be reported even if nothing lands in them
    /// * `mode` - how repeated observations combine
    pub fn new(catalog: &'a ReferenceCatalog, mixture: &str, strata: &[Stratum], mode: ObservationMode) -> Self {
        let mut accumulator = Self {
            catalog,
            mixture: mixture.to_string(),
            mode,
            counters: Default::default(),
            regressions: Default::default(),
            histogram: catalog.histogram(),
            detected: Default::default()
        };
        accumulator.seed(&Stratum::Overall);
        for stratum in strata.iter() {
            accumulator.seed(stratum);
        }
        accumulator
    }

    /// Makes sure a stratum exists, with its reference total from the catalog
    fn seed(&mut self, stratum: &Stratum) -> &mut ConfusionCounter {
        let catalog = self.catalog;
        self.counters.entry(*stratum)
            .or_insert_with(|| ConfusionCounter::with_reference_total(catalog.count_stratum(stratum)))
    }

    /// Records one match.
    /// # Arguments
    /// * `result` - the match for one record
    /// * `observed` - the value this record observed for its entry, e.g. allele frequency or abundance
    /// # Errors
    /// * if the match names an identifier the catalog does not contain; nothing is counted
    pub fn record(&mut self, result: &MatchResult, observed: f64) -> Result<RecordOutcome, MalformedRecord> {
        match result {
            MatchResult::Matched { sequin_id, strata, .. } if result.is_true_positive() => {
                let Some(count) = self.histogram.get_mut(sequin_id) else {
                    return Err(MalformedRecord::new(sequin_id.as_str(), "matched an identifier that is not in the catalog"));
                };
                *count += 1;
                let first_detection = self.detected.insert(sequin_id.clone());
                if first_detection {
                    for stratum in strata.iter() {
                        self.seed(stratum).tp += 1;
                    }
                }

                match self.catalog.get(sequin_id).and_then(|e| e.concentration(&self.mixture)) {
                    Some(expected) => {
                        for stratum in strata.iter() {
                            let points = self.regressions.entry(*stratum).or_default();
                            match self.mode {
                                ObservationMode::Latest => points.add(sequin_id, expected, observed),
                                ObservationMode::Sum => points.accumulate(sequin_id, expected, observed)
                            }
                        }
                    },
                    None => debug!("No expected value for {sequin_id} in mixture {}", self.mixture)
                };

                if first_detection {
                    Ok(RecordOutcome::TruePositive)
                } else {
                    Ok(RecordOutcome::Duplicate)
                }
            },
            _ => {
                self.seed(&Stratum::Overall).fp += 1;
                if let Some(kind) = result.kind() {
                    self.seed(&Stratum::Mutation(kind)).fp += 1;
                }
                Ok(RecordOutcome::FalsePositive)
            }
        }
    }

    /// Current counter for a stratum, before false negatives are derived
    pub fn counter(&self, stratum: &Stratum) -> Option<&ConfusionCounter> {
        self.counters.get(stratum)
    }

    pub fn histogram(&self) -> &BTreeMap<String, u64> {
        &self.histogram
    }

    /// Derives false negatives and fits the per-stratum models.
    /// # Errors
    /// * if any stratum has more true positives than reference entries
    pub fn finalize(self) -> Result<AccountingSummary, AccountingError> {
        let mut strata = Vec::with_capacity(self.counters.len());
        for (stratum, counter) in self.counters.iter() {
            if counter.tp > counter.reference_total {
                return Err(AccountingError::ExcessTruePositives {
                    stratum: stratum.to_string(),
                    tp: counter.tp,
                    reference_total: counter.reference_total
                });
            }
            let mut confusion = *counter;
            confusion.fn_ = counter.reference_total - counter.tp;

            let model = match self.regressions.get(stratum) {
                Some(points) => points.fit(),
                None => LinearModel::default()
            };
            if !model.is_defined() && model.n > 0 {
                warn!("Regression for stratum {stratum} is undefined with {} usable points", model.n);
            }
            strata.push(StratumReport {
                stratum: *stratum,
                confusion,
                model
            });
        }

        let overall_points = self.regressions.get(&Stratum::Overall);
        let detection_limit = overall_points.and_then(|p| p.detection_limit());
        let sequins = self.histogram.iter()
            .map(|(id, &count)| {
                let observed = overall_points
                    .and_then(|p| p.points().get(id))
                    .map(|(_, y)| *y);
                SequinReport {
                    sequin_id: id.clone(),
                    expected: self.catalog.get(id).and_then(|e| e.concentration(&self.mixture)),
                    observed,
                    count,
                    detected: self.detected.contains(id)
                }
            })
            .collect();

        Ok(AccountingSummary {
            mixture: self.mixture,
            strata,
            sequins,
            detection_limit
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use crate::data_types::records::VariantRecord;
    use crate::data_types::sequins::{ContextClass, Genotype, MutationKind, VariantDescriptor};
    use crate::matcher::{Matcher, MatcherConfig};
    use crate::reference_catalog::CatalogBuilder;

    fn catalog() -> ReferenceCatalog {
        let mut builder = CatalogBuilder::new();
        let sequins = [
            ("S1", 1001, "A", "G", 0.5, Genotype::Heterozygous, ContextClass::Common),
            ("S2", 2001, "C", "CTT", 0.25, Genotype::Somatic, ContextClass::LowGc),
            ("S3", 3001, "G", "T", 0.125, Genotype::Somatic, ContextClass::Common),
            ("S4", 4001, "TA", "T", 1.0, Genotype::Homozygous, ContextClass::Common)
        ];
        for (id, pos, r, a, af, gt, ctx) in sequins {
            builder.add_mixture(id, None, af, "A").unwrap();
            builder.add_annotation(id, "chrQ", pos, pos + r.len() as u64 - 1,
                Some(VariantDescriptor::new(r.to_string(), a.to_string(), gt, ctx)), None
            ).unwrap();
        }
        builder.finalize().unwrap()
    }

    fn call(pos: u64, r: &str, a: &str, depth_ref: u64, depth_alt: u64) -> VariantRecord {
        VariantRecord::new("chrQ".to_string(), pos, r.to_string(), a.to_string()).unwrap()
            .with_depths(Some(depth_ref), Some(depth_alt))
    }

    #[test]
    fn test_variant_accounting() {
        let catalog = catalog();
        let matcher = Matcher::new(&catalog, MatcherConfig::default());
        let mut accumulator = Accumulator::new(&catalog, "A", &Stratum::variant_strata(), ObservationMode::Latest);

        let calls = [
            call(1001, "A", "G", 50, 50),
            call(1001, "A", "G", 40, 60), // duplicate
            call(2001, "C", "CTT", 30, 10),
            call(3001, "G", "C", 10, 10), // wrong allele
            call(5001, "A", "T", 10, 10), // nowhere
            call(4001, "TA", "T", 0, 20)
        ];
        let outcomes: Vec<RecordOutcome> = calls.iter()
            .map(|c| {
                let result = matcher.match_record(c);
                accumulator.record(&result, c.allele_frequency().unwrap()).unwrap()
            })
            .collect();
        assert_eq!(outcomes, vec![
            RecordOutcome::TruePositive, RecordOutcome::Duplicate, RecordOutcome::TruePositive,
            RecordOutcome::FalsePositive, RecordOutcome::FalsePositive, RecordOutcome::TruePositive
        ]);
        assert_eq!(accumulator.histogram()["S1"], 2);
        assert_eq!(accumulator.histogram()["S3"], 0);

        let summary = accumulator.finalize().unwrap();
        let overall = summary.overall().unwrap();
        assert_eq!(overall.confusion, ConfusionCounter::new(3, 2, 1, 4));

        // reference total always equals TP + FN after finalization
        for report in summary.strata.iter() {
            assert_eq!(report.confusion.reference_total, report.confusion.tp + report.confusion.fn_);
        }

        let snp = summary.stratum(&Stratum::Mutation(MutationKind::Snp)).unwrap();
        assert_eq!(snp.confusion, ConfusionCounter::new(1, 2, 1, 2));
        let ins = summary.stratum(&Stratum::Mutation(MutationKind::Insertion)).unwrap();
        assert_eq!(ins.confusion, ConfusionCounter::new(1, 0, 0, 1));

        // empty strata are still reported
        let empty = summary.stratum(&Stratum::Context(ContextClass::LongHomopolymer)).unwrap();
        assert_eq!(empty.confusion, ConfusionCounter::default());
        assert!(!empty.model.is_defined());

        // S1 took the latest observation
        let s1 = summary.sequins.iter().find(|s| s.sequin_id == "S1").unwrap();
        assert_approx_eq!(s1.observed.unwrap(), 0.6);
        assert_eq!(s1.count, 2);
        let s3 = summary.sequins.iter().find(|s| s.sequin_id == "S3").unwrap();
        assert!(!s3.detected);
        assert_eq!(s3.observed, None);
        assert_approx_eq!(s3.expected.unwrap(), 0.125);

        // overall regression over S1, S2, S4: log2 x = -1, -2, 0
        let model = &overall.model;
        assert_eq!(model.n, 3);
        assert!(model.is_defined());
        assert_eq!(summary.detection_limit.as_ref().unwrap().sequin_id, "S2");
    }

    #[test]
    fn test_sum_mode() {
        let catalog = catalog();
        let mut accumulator = Accumulator::new(&catalog, "A", &[], ObservationMode::Sum);
        let result = MatchResult::Matched {
            sequin_id: "S1".to_string(),
            rule: crate::data_types::match_result::MatchRule::Contains,
            by_position: true, by_reference: true, by_alternate: true,
            strata: vec![Stratum::Overall],
            kind: None
        };
        for _ in 0..5 {
            accumulator.record(&result, 1.0).unwrap();
        }
        assert_eq!(accumulator.counter(&Stratum::Overall).unwrap().tp, 1);
        let summary = accumulator.finalize().unwrap();
        let s1 = summary.sequins.iter().find(|s| s.sequin_id == "S1").unwrap();
        assert_approx_eq!(s1.observed.unwrap(), 5.0);
        assert_eq!(s1.count, 5);
        assert_eq!(summary.overall().unwrap().confusion.fn_, 3);
    }

    #[test]
    fn test_unknown_identifier_is_rejected() {
        let catalog = catalog();
        let mut accumulator = Accumulator::new(&catalog, "A", &[], ObservationMode::Latest);
        let result = MatchResult::Matched {
            sequin_id: "X1".to_string(),
            rule: crate::data_types::match_result::MatchRule::Exact,
            by_position: true, by_reference: true, by_alternate: true,
            strata: vec![Stratum::Overall],
            kind: None
        };
        assert!(accumulator.record(&result, 1.0).is_err());
        assert!(!accumulator.histogram().contains_key("X1"));
        assert_eq!(accumulator.counter(&Stratum::Overall).unwrap().tp, 0);

        // the per-sequin output stays limited to the catalog
        let summary = accumulator.finalize().unwrap();
        let ids: Vec<&str> = summary.sequins.iter().map(|s| s.sequin_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2", "S3", "S4"]);
        assert_eq!(summary.overall().unwrap().confusion, ConfusionCounter::new(0, 0, 4, 4));
    }

    #[test]
    fn test_excess_true_positives() {
        let catalog = catalog();
        let mut accumulator = Accumulator::new(&catalog, "A", &[], ObservationMode::Latest);
        // no entry carries this context, so its reference total is 0
        let stratum = Stratum::Context(ContextClass::LongHomopolymer);
        let result = MatchResult::Matched {
            sequin_id: "S1".to_string(),
            rule: crate::data_types::match_result::MatchRule::Exact,
            by_position: true, by_reference: true, by_alternate: true,
            strata: vec![Stratum::Overall, stratum],
            kind: None
        };
        accumulator.record(&result, 1.0).unwrap();
        assert_eq!(accumulator.finalize().unwrap_err(), AccountingError::ExcessTruePositives {
            stratum: stratum.to_string(), tp: 1, reference_total: 0
        });
    }
}
