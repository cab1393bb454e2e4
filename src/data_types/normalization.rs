
use serde::Serialize;

use crate::data_types::locus::Locus;

/// Depth summary for one region
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CoverageStats {
    /// Mean per-base depth across the region
    pub mean: f64,
    /// Median per-base depth across the region
    pub median: f64,
    /// Sum of per-base depth
    pub total: u64,
    /// Number of alignments attributed to the region
    pub reads: u64
}

/// How a region's retention probability is derived from its two coverage summaries
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum SamplingPolicy {
    /// min(endogenous mean / control mean, 1)
    Mean,
    /// min(endogenous median / control median, 1)
    Median,
    /// The same fixed probability for every region
    Fixed(f64),
    /// min(endogenous reads / control reads, 1)
    ReadCount
}

impl std::fmt::Display for SamplingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingPolicy::Mean => write!(f, "mean"),
            SamplingPolicy::Median => write!(f, "median"),
            SamplingPolicy::Fixed(p) => write!(f, "fixed({p})"),
            SamplingPolicy::ReadCount => write!(f, "reads")
        }
    }
}

/// Final per-region normalization report
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionNormalization {
    /// Identifier of the control region
    pub region_id: String,
    /// Control chromosome
    pub chrom: String,
    /// Control locus
    pub locus: Locus,
    /// Coverage of the matching endogenous region (or the pooled endogenous coverage)
    pub endogenous: CoverageStats,
    /// Control coverage before subsampling
    pub control: CoverageStats,
    /// Retention probability, always within [0, 1]
    pub probability: f64,
    /// Control alignments seen while sampling
    pub reads_before: u64,
    /// Control alignments retained while sampling
    pub reads_after: u64,
    /// Control coverage from retained alignments only
    pub control_after: CoverageStats
}

impl RegionNormalization {
    /// Fraction of sampled control reads that were kept, if any were seen
    pub fn retained_fraction(&self) -> Option<f64> {
        if self.reads_before > 0 {
            Some(self.reads_after as f64 / self.reads_before as f64)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn test_retained_fraction() {
        let mut norm = RegionNormalization {
            region_id: "R1".to_string(),
            chrom: "chrQ".to_string(),
            locus: Locus::new(1, 100).unwrap(),
            endogenous: CoverageStats::default(),
            control: CoverageStats::default(),
            probability: 0.25,
            reads_before: 1000,
            reads_after: 250,
            control_after: CoverageStats::default()
        };
        assert_approx_eq!(norm.retained_fraction().unwrap(), 0.25);
        norm.reads_before = 0;
        norm.reads_after = 0;
        assert_eq!(norm.retained_fraction(), None);
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(SamplingPolicy::Mean.to_string(), "mean");
        assert_eq!(SamplingPolicy::Fixed(0.5).to_string(), "fixed(0.5)");
    }
}
