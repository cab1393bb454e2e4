
/*!
Variant detection analysis: how many of the catalog variants a caller recovered, and how well the observed allele
frequencies track the expected ones.
*/

use log::{debug, info};
use serde::Serialize;

use crate::accumulator::{AccountingSummary, Accumulator, ObservationMode, RecordOutcome};
use crate::data_types::records::{ObservedRecord, VariantRecord, recover_record};
use crate::data_types::sequins::Stratum;
use crate::matcher::{Matcher, MatcherConfig};
use crate::reference_catalog::ReferenceCatalog;
use crate::util::progress_bar::RecordProgress;

/// One labelled call
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CallReport {
    pub chrom: String,
    pub position: u64,
    pub ref_allele: String,
    pub alt_allele: String,
    /// Matched sequin, or for false positives the reference region the call falls in
    pub label: Option<String>,
    pub outcome: RecordOutcome,
    pub allele_frequency: Option<f64>,
    pub depth_ref: Option<u64>,
    pub depth_alt: Option<u64>,
    pub quality: Option<f64>
}

/// Everything the detection analysis produces
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionReport {
    /// Stratified confusion, regression, and per-sequin results
    pub summary: AccountingSummary,
    /// Every processed call with its label, in input order
    pub calls: Vec<CallReport>,
    /// Calls skipped by the FILTER check
    pub filtered: u64,
    /// Malformed calls skipped with a warning
    pub skipped: u64
}

/// Runs the detection analysis over a stream of calls.
/// # Arguments
/// * `catalog` - the finalized catalog, each entry must carry a variant
/// * `mixture` - mixture label for expected allele frequencies
/// * `records` - the calls, in any order; `MalformedRecord` errors are skipped with a warning
/// * `passed_only` - if true, calls that did not pass FILTER are skipped
/// # Errors
/// * if the record stream itself fails
/// * if the accounting is internally inconsistent
pub fn detect_variants<I>(catalog: &ReferenceCatalog, mixture: &str, records: I, passed_only: bool) -> anyhow::Result<DetectionReport>
where
    I: IntoIterator<Item = anyhow::Result<VariantRecord>>
{
    let matcher = Matcher::new(catalog, MatcherConfig::default());
    let mut accumulator = Accumulator::new(catalog, mixture, &Stratum::variant_strata(), ObservationMode::Latest);
    let mut calls = vec![];
    let mut filtered = 0;
    let mut skipped = 0;
    let mut progress = RecordProgress::new("variant calls");

    for result in records {
        progress.tick();
        let Some(record) = recover_record(result, &mut skipped)? else {
            continue;
        };
        if passed_only && !record.passed() {
            filtered += 1;
            continue;
        }

        let result = matcher.match_record(&record);
        let Some(outcome) = recover_record(accumulator.record(&result, record.observed_abundance()), &mut skipped)? else {
            continue;
        };
        debug!("{}:{} {}>{} => {outcome:?}", record.chrom(), record.position(), record.ref_allele(), record.alt_allele());
        calls.push(CallReport {
            chrom: record.chrom().to_string(),
            position: record.position(),
            ref_allele: record.ref_allele().to_string(),
            alt_allele: record.alt_allele().to_string(),
            label: result.label().map(|s| s.to_string()),
            outcome,
            allele_frequency: record.allele_frequency(),
            depth_ref: record.depth_ref(),
            depth_alt: record.depth_alt(),
            quality: record.quality()
        });
    }
    progress.finish();
    if filtered > 0 {
        info!("Skipped {filtered} calls that did not pass filters");
    }
    if skipped > 0 {
        info!("Skipped {skipped} malformed calls");
    }

    let summary = accumulator.finalize()?;
    if let Some(overall) = summary.overall() {
        let c = &overall.confusion;
        info!("Overall: TP={}, FP={}, FN={}, sensitivity={:?}, precision={:?}", c.tp, c.fp, c.fn_, c.sensitivity(), c.precision());
    }
    Ok(DetectionReport {
        summary,
        calls,
        filtered,
        skipped
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use crate::data_types::confusion::ConfusionCounter;
    use crate::data_types::records::MalformedRecord;
    use crate::data_types::sequins::{ContextClass, Genotype, VariantDescriptor};
    use crate::reference_catalog::CatalogBuilder;

    fn catalog() -> ReferenceCatalog {
        let mut builder = CatalogBuilder::new();
        builder.add_mixture("S1", None, 0.5, "A").unwrap();
        builder.add_mixture("S2", None, 0.1, "A").unwrap();
        builder.add_annotation("S1", "chrQ", 1001, 1001,
            Some(VariantDescriptor::new("A".to_string(), "G".to_string(), Genotype::Heterozygous, ContextClass::Common)), None
        ).unwrap();
        builder.add_annotation("S2", "chrQ", 2001, 2001,
            Some(VariantDescriptor::new("C".to_string(), "T".to_string(), Genotype::Somatic, ContextClass::Cancer)), None
        ).unwrap();
        builder.finalize().unwrap()
    }

    fn call(pos: u64, r: &str, a: &str, passed: bool) -> anyhow::Result<VariantRecord> {
        Ok(VariantRecord::new("chrQ".to_string(), pos, r.to_string(), a.to_string())?
            .with_depths(Some(12), Some(8))
            .with_passed(passed))
    }

    #[test]
    fn test_true_positive_call() {
        let catalog = catalog();
        let report = detect_variants(&catalog, "A", vec![call(1001, "A", "G", true)], false).unwrap();
        let overall = report.summary.overall().unwrap();
        assert_eq!(overall.confusion, ConfusionCounter::new(1, 0, 1, 2));
        assert_eq!(report.calls.len(), 1);
        assert_eq!(report.calls[0].label.as_deref(), Some("S1"));
        assert_eq!(report.calls[0].outcome, RecordOutcome::TruePositive);
        assert_approx_eq!(report.calls[0].allele_frequency.unwrap(), 0.4);
    }

    #[test]
    fn test_allele_mismatch_is_false_positive() {
        let catalog = catalog();
        let report = detect_variants(&catalog, "A", vec![call(1001, "A", "T", true)], false).unwrap();
        let overall = report.summary.overall().unwrap();
        assert_eq!(overall.confusion.tp, 0);
        assert_eq!(overall.confusion.fp, 1);
        assert_eq!(overall.confusion.fn_, 2);
        assert_eq!(report.calls.iter().filter(|c| c.outcome == RecordOutcome::FalsePositive).count(), 1);
    }

    #[test]
    fn test_filtering() {
        let catalog = catalog();
        let records = vec![
            call(1001, "A", "G", false),
            call(2001, "C", "T", true)
        ];
        let report = detect_variants(&catalog, "A", records, true).unwrap();
        assert_eq!(report.filtered, 1);
        assert_eq!(report.calls.len(), 1);
        assert_eq!(report.summary.overall().unwrap().confusion, ConfusionCounter::new(1, 0, 1, 2));

        let detected: Vec<&str> = report.summary.sequins.iter()
            .filter(|s| s.detected)
            .map(|s| s.sequin_id.as_str())
            .collect();
        assert_eq!(detected, vec!["S2"]);
    }

    #[test]
    fn test_malformed_call_is_skipped() {
        let catalog = catalog();
        let records = vec![
            call(1001, "A", "G", true),
            Err(MalformedRecord::new("chrQ:1501", "non-numeric QUAL").into()),
            call(2001, "C", "T", true)
        ];
        let report = detect_variants(&catalog, "A", records, false).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.calls.len(), 2);
        assert_eq!(report.summary.overall().unwrap().confusion, ConfusionCounter::new(2, 0, 0, 2));
    }

    #[test]
    fn test_stream_error_propagates() {
        let catalog = catalog();
        let records = vec![call(1001, "A", "G", true), Err(anyhow::anyhow!("truncated input"))];
        assert!(detect_variants(&catalog, "A", records, false).is_err());
    }
}
