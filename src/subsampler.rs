
/*!
Coverage-based subsampling of control alignments.
The subsampler moves through three phases, each a distinct type so that no phase can be revisited:
1. `CoverageMeasure` - accumulate depth for control and endogenous regions
2. `CoverageMeasure::compute` - derive one retention probability per control region
3. `SamplingPlan` - decide per alignment, then `finish` into the normalization table

# Example usage
```rust
use sequin_qc::data_types::locus::Locus;
use sequin_qc::data_types::records::AlignmentRecord;
use sequin_qc::interval_engine::IntervalEngine;
use sequin_qc::subsampler::{CoverageMeasure, SubsampleConfig};

let control = IntervalEngine::new([("chrIS".to_string(), "R1".to_string(), Locus::new(1, 100).unwrap())]);
let endogenous = IntervalEngine::new([("chr1".to_string(), "R1".to_string(), Locus::new(1, 100).unwrap())]);
let mut measure = CoverageMeasure::new(control, endogenous).unwrap();
for i in 0..4 {
    let name = Some(format!("c{i}"));
    measure.measure(&AlignmentRecord::mapped(name, "chrIS".to_string(), Locus::new(1, 100).unwrap()));
}
measure.measure(&AlignmentRecord::mapped(None, "chr1".to_string(), Locus::new(1, 100).unwrap()));

let mut plan = measure.compute(&SubsampleConfig::default()).unwrap();
assert_eq!(plan.probability("R1"), Some(0.25));
let keep = plan.should_retain(&AlignmentRecord::unmapped(Some("u1".to_string())));
assert!(keep);
```
*/

use derive_builder::Builder;
use fnv::FnvHasher;
use indexmap::IndexMap;
use indicatif::ParallelProgressIterator;
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::hash::Hasher;

use crate::data_types::match_result::MatchRule;
use crate::data_types::normalization::{CoverageStats, RegionNormalization, SamplingPolicy};
use crate::data_types::records::{AlignmentRecord, ObservedRecord};
use crate::interval_engine::IntervalEngine;
use crate::util::progress_bar::get_progress_style;
use crate::util::stats::{mean, median};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SubsampleError {
    #[error("no control regions were provided")]
    NoControlRegions,
    #[error("fixed proportion must be within [0, 1], got {0}")]
    InvalidProportion(f64),
    #[error("region {region_id} has endogenous coverage ({endogenous}) above control coverage ({control})")]
    EndogenousExceedsControl { region_id: String, endogenous: f64, control: f64 }
}

/// Controls the subsampling
#[derive(Builder, Clone, Copy, Debug)]
#[builder(default)]
pub struct SubsampleConfig {
    /// How the retention probability is derived
    policy: SamplingPolicy,
    /// Seed for the per-alignment draw
    seed: u64,
    /// If true, endogenous coverage above control coverage is an error instead of p = 1
    require_control_excess: bool
}

impl Default for SubsampleConfig {
    fn default() -> Self {
        Self {
            policy: SamplingPolicy::Mean,
            seed: 0,
            require_control_excess: true
        }
    }
}

impl SubsampleConfig {
    // getters
    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn require_control_excess(&self) -> bool {
        self.require_control_excess
    }
}

/// Deterministic uniform draw in [0, 1) for a sampling key (normally the read name).
/// The same key and seed always produce the same value, so mates and re-runs agree.
/// The key is hashed with 64-bit FNV-1a over little-endian seed bytes, which does not depend on the platform.
pub fn sampling_draw(seed: u64, key: &str) -> f64 {
    let mut hasher = FnvHasher::default();
    hasher.write(&seed.to_le_bytes());
    hasher.write(key.as_bytes());
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(hasher.finish());
    rng.gen::<f64>()
}

/// Why a retention probability was pinned to a bound instead of taken from the coverage ratio
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbabilityBound {
    /// Control coverage is zero or unusable, p = 0
    NoControlCoverage,
    /// Endogenous coverage is zero, p = 0
    NoEndogenousCoverage,
    /// Endogenous coverage is above control coverage, p = 1
    EndogenousAboveControl
}

/// Retention probability for a region, with the reason when it sits at a bound.
/// Nothing is logged here; `CoverageMeasure::compute` reports bounds once per region.
/// Returns an error only when endogenous coverage is above control coverage and that is configured as fatal.
/// # Arguments
/// * `region_id` - used for messages
/// * `endogenous` - the coverage we want to reach
/// * `control` - the coverage we have
/// * `config` - policy and strictness
pub fn retention_probability(
    region_id: &str, endogenous: &CoverageStats, control: &CoverageStats, config: &SubsampleConfig
) -> Result<(f64, Option<ProbabilityBound>), SubsampleError> {
    let (numerator, denominator) = match config.policy {
        SamplingPolicy::Fixed(p) => {
            if !(0.0..=1.0).contains(&p) {
                return Err(SubsampleError::InvalidProportion(p));
            }
            return Ok((p, None));
        },
        SamplingPolicy::Mean => (endogenous.mean, control.mean),
        SamplingPolicy::Median => (endogenous.median, control.median),
        SamplingPolicy::ReadCount => (endogenous.reads as f64, control.reads as f64)
    };

    if denominator <= 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return Ok((0.0, Some(ProbabilityBound::NoControlCoverage)));
    }
    if numerator <= 0.0 {
        return Ok((0.0, Some(ProbabilityBound::NoEndogenousCoverage)));
    }
    if numerator > denominator {
        if config.require_control_excess {
            return Err(SubsampleError::EndogenousExceedsControl {
                region_id: region_id.to_string(),
                endogenous: numerator,
                control: denominator
            });
        }
        return Ok((1.0, Some(ProbabilityBound::EndogenousAboveControl)));
    }
    Ok(((numerator / denominator).clamp(0.0, 1.0), None))
}

/// Phase 1: depth accumulation
#[derive(Debug)]
pub struct CoverageMeasure {
    /// Control (spike-in) regions
    control: IntervalEngine,
    /// Endogenous regions, paired with control regions by identifier
    endogenous: IntervalEngine,
    /// Alignments counted in a control region
    control_records: u64,
    /// Alignments counted in an endogenous region
    endogenous_records: u64
}

impl CoverageMeasure {
    /// Constructor
    /// # Errors
    /// * if there are no control regions
    pub fn new(control: IntervalEngine, endogenous: IntervalEngine) -> Result<Self, SubsampleError> {
        if control.is_empty() {
            return Err(SubsampleError::NoControlRegions);
        }
        Ok(Self {
            control, endogenous,
            control_records: 0,
            endogenous_records: 0
        })
    }

    /// Counts an alignment from the control source; returns true if it landed in a region
    pub fn measure_control(&mut self, record: &AlignmentRecord) -> bool {
        let Some(locus) = record.locus() else {
            return false;
        };
        let counted = self.control.depth(record.chrom(), &locus).is_some();
        if counted {
            self.control_records += 1;
        }
        counted
    }

    /// Counts an alignment from the endogenous source; returns true if it landed in a region
    pub fn measure_endogenous(&mut self, record: &AlignmentRecord) -> bool {
        let Some(locus) = record.locus() else {
            return false;
        };
        let counted = self.endogenous.depth(record.chrom(), &locus).is_some();
        if counted {
            self.endogenous_records += 1;
        }
        counted
    }

    /// Counts an alignment from a combined source, control regions first
    pub fn measure(&mut self, record: &AlignmentRecord) -> bool {
        self.measure_control(record) || self.measure_endogenous(record)
    }

    /// Phase 2: derives the retention probability of every control region.
    /// Control regions without an endogenous partner use the pooled endogenous coverage.
    /// # Errors
    /// * if a region violates the configured coverage expectation
    /// * if a fixed proportion is outside [0, 1]
    pub fn compute(self, config: &SubsampleConfig) -> Result<SamplingPlan, SubsampleError> {
        info!("Measured {} control and {} endogenous alignments", self.control_records, self.endogenous_records);

        let endogenous_lookup: FxHashMap<&str, CoverageStats> = self.endogenous.regions()
            .map(|(_, region)| (region.id(), region.stats()))
            .collect();
        let pooled = pooled_stats(&endogenous_lookup.values().copied().collect::<Vec<_>>());

        let control_regions: Vec<_> = self.control.regions().collect();
        let plans: Vec<(String, RegionPlan)> = control_regions.into_par_iter()
            .map(|(_, region)| {
                let control = region.stats();
                let endogenous = match endogenous_lookup.get(region.id()) {
                    Some(stats) => *stats,
                    None => {
                        debug!("Region {} has no endogenous partner, using pooled coverage", region.id());
                        pooled
                    }
                };
                let (probability, bound) = retention_probability(region.id(), &endogenous, &control, config)?;
                match bound {
                    Some(ProbabilityBound::NoControlCoverage) => {
                        warn!("Region {} has no usable control coverage, retention probability set to 0", region.id());
                    },
                    Some(ProbabilityBound::NoEndogenousCoverage) => {
                        warn!("Region {} has no endogenous coverage, retention probability set to 0", region.id());
                    },
                    Some(ProbabilityBound::EndogenousAboveControl) => {
                        warn!("Region {} has endogenous coverage above control coverage, retention probability set to 1", region.id());
                    },
                    None => {}
                }
                Ok((region.id().to_string(), RegionPlan {
                    probability,
                    endogenous,
                    control,
                    reads_before: 0,
                    reads_after: 0
                }))
            })
            .progress_with_style(get_progress_style())
            .collect::<Result<_, SubsampleError>>()?;

        // the same engine now tracks coverage from retained alignments only
        let mut control = self.control;
        control.reset_depth();
        Ok(SamplingPlan {
            control,
            plans: plans.into_iter().collect(),
            seed: config.seed,
            seen: 0,
            retained: 0
        })
    }
}

/// Average of per-region summaries, used for control regions that have no endogenous partner
fn pooled_stats(stats: &[CoverageStats]) -> CoverageStats {
    let means: Vec<f64> = stats.iter().map(|s| s.mean).collect();
    let medians: Vec<f64> = stats.iter().map(|s| s.median).collect();
    let reads: Vec<f64> = stats.iter().map(|s| s.reads as f64).collect();
    let totals: Vec<f64> = stats.iter().map(|s| s.total as f64).collect();
    CoverageStats {
        mean: mean(&means).unwrap_or_default(),
        median: median(&medians).unwrap_or_default(),
        total: mean(&totals).unwrap_or_default().round() as u64,
        reads: mean(&reads).unwrap_or_default().round() as u64
    }
}

/// Per-region sampling state
#[derive(Clone, Debug)]
struct RegionPlan {
    probability: f64,
    endogenous: CoverageStats,
    control: CoverageStats,
    reads_before: u64,
    reads_after: u64
}

/// Phase 3: the streaming retain/drop decision
#[derive(Debug)]
pub struct SamplingPlan {
    /// Control regions, depth counters track retained alignments
    control: IntervalEngine,
    /// Region identifier to plan, in control region order
    plans: IndexMap<String, RegionPlan>,
    seed: u64,
    /// Total alignments offered
    seen: u64,
    /// Total alignments retained
    retained: u64
}

impl SamplingPlan {
    /// Decides whether to keep an alignment.
    /// Unmapped alignments and alignments outside every control region are always kept.
    /// Otherwise the alignment is kept iff the draw for its name is >= 1 - p.
    /// Unnamed alignments draw on their placement instead, so they are not kept or dropped as one block.
    pub fn should_retain(&mut self, record: &AlignmentRecord) -> bool {
        self.seen += 1;
        let keep = self.decide(record);
        if keep {
            self.retained += 1;
        }
        keep
    }

    fn decide(&mut self, record: &AlignmentRecord) -> bool {
        let Some(locus) = record.locus() else {
            return true;
        };
        let Some(region_id) = self.control.find(record.chrom(), &locus, MatchRule::Overlap).map(|r| r.id().to_string()) else {
            return true;
        };
        let Some(plan) = self.plans.get_mut(&region_id) else {
            return true;
        };

        plan.reads_before += 1;
        let draw = match record.name() {
            Some(name) => sampling_draw(self.seed, name),
            None => sampling_draw(self.seed, &format!("{}:{}-{}", record.chrom(), locus.start(), locus.end()))
        };
        let keep = draw >= 1.0 - plan.probability;
        if keep {
            plan.reads_after += 1;
            self.control.depth(record.chrom(), &locus);
        }
        keep
    }

    /// Retention probability for a region
    pub fn probability(&self, region_id: &str) -> Option<f64> {
        self.plans.get(region_id).map(|p| p.probability)
    }

    /// Total alignments offered and retained so far
    pub fn counts(&self) -> (u64, u64) {
        (self.seen, self.retained)
    }

    /// Produces the normalization table
    pub fn finish(self) -> Vec<RegionNormalization> {
        let mut plans = self.plans;
        self.control.regions()
            .filter_map(|(chrom, region)| {
                let plan = plans.swap_remove(region.id())?;
                Some(RegionNormalization {
                    region_id: region.id().to_string(),
                    chrom: chrom.to_string(),
                    locus: *region.locus(),
                    endogenous: plan.endogenous,
                    control: plan.control,
                    probability: plan.probability,
                    reads_before: plan.reads_before,
                    reads_after: plan.reads_after,
                    control_after: region.stats()
                })
            })
            .collect()
    }
}
