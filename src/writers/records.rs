
use serde::Serialize;
use std::path::Path;

use crate::accuracy::{AccuracyReport, RegionAccuracy};
use crate::data_types::confusion::ConfusionCounter;
use crate::data_types::normalization::RegionNormalization;
use crate::detect::CallReport;
use crate::writers::summary::delimited_writer;

/// One labelled call per row
#[derive(Serialize)]
struct CallRow<'a> {
    chrom: &'a str,
    position: u64,
    ref_allele: &'a str,
    alt_allele: &'a str,
    /// TP, FP, or duplicate
    outcome: String,
    /// Matched sequin, or the attributed region of a false positive
    label: Option<&'a str>,
    allele_frequency: Option<f64>,
    depth_ref: Option<u64>,
    depth_alt: Option<u64>,
    quality: Option<f64>
}

/// Writes every labelled call, in input order
/// # Arguments
/// * `filename` - the filename for the output (tsv/csv)
/// * `calls` - the labelled calls from a detection run
pub fn write_calls(filename: &Path, calls: &[CallReport]) -> csv::Result<()> {
    let mut csv_writer = delimited_writer(filename)?;
    for call in calls.iter() {
        csv_writer.serialize(CallRow {
            chrom: &call.chrom,
            position: call.position,
            ref_allele: &call.ref_allele,
            alt_allele: &call.alt_allele,
            outcome: format!("{:?}", call.outcome),
            label: call.label.as_deref(),
            allele_frequency: call.allele_frequency,
            depth_ref: call.depth_ref,
            depth_alt: call.depth_alt,
            quality: call.quality
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// One sampling region per row
#[derive(Serialize)]
struct NormalizationRow<'a> {
    region_id: &'a str,
    chrom: &'a str,
    start: u64,
    end: u64,
    endogenous_mean: f64,
    endogenous_median: f64,
    endogenous_reads: u64,
    control_mean: f64,
    control_median: f64,
    control_reads: u64,
    probability: f64,
    reads_before: u64,
    reads_after: u64,
    retained_fraction: Option<f64>,
    control_mean_after: f64,
    control_median_after: f64
}

/// Writes the per-region normalization after sampling
/// # Arguments
/// * `filename` - the filename for the output (tsv/csv)
/// * `regions` - region results from the sampling plan
pub fn write_normalization(filename: &Path, regions: &[RegionNormalization]) -> csv::Result<()> {
    let mut csv_writer = delimited_writer(filename)?;
    for region in regions.iter() {
        csv_writer.serialize(NormalizationRow {
            region_id: &region.region_id,
            chrom: &region.chrom,
            start: region.locus.start(),
            end: region.locus.end(),
            endogenous_mean: region.endogenous.mean,
            endogenous_median: region.endogenous.median,
            endogenous_reads: region.endogenous.reads,
            control_mean: region.control.mean,
            control_median: region.control.median,
            control_reads: region.control.reads,
            probability: region.probability,
            reads_before: region.reads_before,
            reads_after: region.reads_after,
            retained_fraction: region.retained_fraction(),
            control_mean_after: region.control_after.mean,
            control_median_after: region.control_after.median
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// One accuracy level per row
#[derive(Serialize)]
struct AccuracyRow<'a> {
    label: &'a str,
    /// "base" or "region"
    level: &'a str,
    tp: u64,
    fp: u64,
    #[serde(rename = "fn")]
    fn_: u64,
    reference_total: u64,
    sensitivity: Option<f64>,
    precision: Option<f64>,
    f1: Option<f64>
}

impl<'a> AccuracyRow<'a> {
    fn new(label: &'a str, level: &'a str, counter: &ConfusionCounter) -> Self {
        Self {
            label, level,
            tp: counter.tp,
            fp: counter.fp,
            fn_: counter.fn_,
            reference_total: counter.reference_total,
            sensitivity: counter.sensitivity(),
            precision: counter.precision(),
            f1: counter.f1()
        }
    }
}

/// Writes the base and region level accuracy
/// # Arguments
/// * `filename` - the filename for the output (tsv/csv)
/// * `label` - the label for the output rows
/// * `report` - the accuracy results
pub fn write_accuracy(filename: &Path, label: &str, report: &AccuracyReport) -> csv::Result<()> {
    let mut csv_writer = delimited_writer(filename)?;
    csv_writer.serialize(AccuracyRow::new(label, "base", &report.base))?;
    csv_writer.serialize(AccuracyRow::new(label, "region", &report.region))?;
    csv_writer.flush()?;
    Ok(())
}

/// One merged sequin region per row
#[derive(Serialize)]
struct RegionAccuracyRow<'a> {
    region_id: &'a str,
    chrom: &'a str,
    start: u64,
    end: u64,
    covered_bases: u64,
    uncovered_bases: u64,
    sensitivity: Option<f64>,
    reads: u64
}

/// Writes base coverage for every merged sequin region
/// # Arguments
/// * `filename` - the filename for the output (tsv/csv)
/// * `regions` - per-region results from the accuracy run
pub fn write_region_accuracy(filename: &Path, regions: &[RegionAccuracy]) -> csv::Result<()> {
    let mut csv_writer = delimited_writer(filename)?;
    for region in regions.iter() {
        csv_writer.serialize(RegionAccuracyRow {
            region_id: &region.region_id,
            chrom: &region.chrom,
            start: region.locus.start(),
            end: region.locus.end(),
            covered_bases: region.bases.tp,
            uncovered_bases: region.bases.fn_,
            sensitivity: region.bases.sensitivity(),
            reads: region.reads
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::RecordOutcome;
    use crate::data_types::locus::Locus;
    use crate::data_types::normalization::CoverageStats;

    #[test]
    fn test_write_calls() {
        let calls = vec![CallReport {
            chrom: "chrQ".to_string(),
            position: 1001,
            ref_allele: "A".to_string(),
            alt_allele: "G".to_string(),
            label: Some("V1".to_string()),
            outcome: RecordOutcome::TruePositive,
            allele_frequency: Some(0.5),
            depth_ref: Some(10),
            depth_alt: Some(10),
            quality: None
        }];
        let filename = std::env::temp_dir().join("sequin_qc_calls.tsv");
        write_calls(&filename, &calls).unwrap();
        let content = std::fs::read_to_string(&filename).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "chrom\tposition\tref_allele\talt_allele\toutcome\tlabel\tallele_frequency\tdepth_ref\tdepth_alt\tquality");
        assert_eq!(lines[1], "chrQ\t1001\tA\tG\tTruePositive\tV1\t0.5\t10\t10\t");
    }

    #[test]
    fn test_write_normalization() {
        let stats = CoverageStats { mean: 4.0, median: 4.0, total: 400, reads: 4 };
        let regions = vec![RegionNormalization {
            region_id: "R1".to_string(),
            chrom: "chrQ".to_string(),
            locus: Locus::new(1, 100).unwrap(),
            endogenous: stats,
            control: stats,
            probability: 1.0,
            reads_before: 4,
            reads_after: 4,
            control_after: stats
        }];
        let filename = std::env::temp_dir().join("sequin_qc_norm.csv");
        write_normalization(&filename, &regions).unwrap();
        let content = std::fs::read_to_string(&filename).unwrap();
        assert!(content.lines().nth(1).unwrap().starts_with("R1,chrQ,1,100,4.0,4.0,4,"));
    }

    #[test]
    fn test_write_accuracy() {
        let region = RegionAccuracy {
            region_id: "G1".to_string(),
            chrom: "chrIS".to_string(),
            locus: Locus::new(1, 100).unwrap(),
            bases: ConfusionCounter::new(75, 0, 25, 100),
            reads: 2
        };
        let report = AccuracyReport {
            base: ConfusionCounter::new(75, 25, 25, 100),
            region: ConfusionCounter::new(1, 0, 0, 1),
            regions: vec![region],
            ..Default::default()
        };

        let summary_fn = std::env::temp_dir().join("sequin_qc_accuracy.tsv");
        write_accuracy(&summary_fn, "run1", &report).unwrap();
        let content = std::fs::read_to_string(&summary_fn).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "label\tlevel\ttp\tfp\tfn\treference_total\tsensitivity\tprecision\tf1");
        assert_eq!(lines[1], "run1\tbase\t75\t25\t25\t100\t0.75\t0.75\t0.75");
        assert!(lines[2].starts_with("run1\tregion\t1\t0\t0\t1\t1.0\t1.0"));

        let regions_fn = std::env::temp_dir().join("sequin_qc_accuracy_regions.tsv");
        write_region_accuracy(&regions_fn, &report.regions).unwrap();
        let content = std::fs::read_to_string(&regions_fn).unwrap();
        assert_eq!(content.lines().nth(1).unwrap(), "G1\tchrIS\t1\t100\t75\t25\t0.75\t2");
    }
}
