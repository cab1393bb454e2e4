/*!
Alignment accuracy: how well aligned reads reproduce the sequin regions.
Two levels are reported:
* base level - covered sequin bases against aligned bases that fall outside every sequin region
* region level - sequins containing at least one alignment against alignments contained by none
*/

use itertools::Itertools;
use log::info;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::data_types::confusion::ConfusionCounter;
use crate::data_types::locus::Locus;
use crate::data_types::match_result::{MatchResult, MatchRule};
use crate::data_types::records::{ObservedRecord, recover_record};
use crate::matcher::{Matcher, MatcherConfigBuilder};
use crate::reference_catalog::ReferenceCatalog;
use crate::util::progress_bar::RecordProgress;

/// Base-level coverage of one merged sequin region
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionAccuracy {
    /// First sequin in the merged region
    pub region_id: String,
    pub chrom: String,
    pub locus: Locus,
    /// tp = covered bases, fn = uncovered bases; fp is never set per region
    pub bases: ConfusionCounter,
    /// Alignments sharing at least one base with the region
    pub reads: u64
}

/// Everything the accuracy analysis produces
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AccuracyReport {
    /// Base level: tp = covered sequin bases, fp = aligned bases outside sequin regions, fn = uncovered sequin bases
    pub base: ConfusionCounter,
    /// Region level: tp = sequins containing an alignment, fp = alignments no sequin contains
    pub region: ConfusionCounter,
    /// Per merged region, in chromosome then position order
    pub regions: Vec<RegionAccuracy>,
    /// Alignments on chromosomes without sequins
    pub genome: u64,
    /// Alignments without a placement
    pub unmapped: u64,
    /// Malformed records skipped with a warning
    pub skipped: u64
}

/// Number of bases in the union of `loci`
fn union_length(loci: Vec<Locus>) -> u64 {
    loci.into_iter()
        .sorted_by_key(|l| (l.start(), l.end()))
        .coalesce(|a, b| if a.overlaps(&b) { Ok(a.union(&b)) } else { Err((a, b)) })
        .map(|l| l.length())
        .sum()
}

/// Measures base and region level accuracy of placed records against the sequin regions.
/// Only records on sequin chromosomes are scored.
/// # Arguments
/// * `catalog` - the catalog; concentrations are not needed, so an annotation-only catalog works
/// * `records` - alignments; `MalformedRecord` errors are skipped with a warning
/// # Errors
/// * if the record stream itself fails
pub fn measure_accuracy<R, I>(catalog: &ReferenceCatalog, records: I) -> anyhow::Result<AccuracyReport>
where
    R: ObservedRecord,
    I: IntoIterator<Item = anyhow::Result<R>>
{
    let matcher_config = MatcherConfigBuilder::default()
        .fallback_rule(Some(MatchRule::Contains))
        .attribute_unmatched(false)
        .build()?;
    let matcher = Matcher::new(catalog, matcher_config);
    let mut engine = catalog.region_engine();

    let mut report = AccuracyReport::default();
    let mut aligned: FxHashMap<String, Vec<Locus>> = Default::default();
    let mut detected: BTreeSet<String> = Default::default();
    let mut progress = RecordProgress::new("alignments");

    for result in records {
        progress.tick();
        let Some(record) = recover_record(result, &mut report.skipped)? else {
            continue;
        };
        let Some(locus) = record.locus() else {
            report.unmapped += 1;
            continue;
        };
        let chrom = record.chrom();
        if !catalog.has_chrom(chrom) {
            report.genome += 1;
            continue;
        }

        engine.cover(chrom, &locus);
        aligned.entry(chrom.to_string()).or_default().push(locus);
        match matcher.match_record(&record) {
            MatchResult::Matched { sequin_id, .. } => {
                detected.insert(sequin_id);
            },
            MatchResult::Unmatched { .. } => report.region.fp += 1
        };
    }
    progress.finish();

    for (chrom, region) in engine.regions() {
        let length = region.locus().length();
        let covered = region.covered_bases();
        let bases = ConfusionCounter::new(covered, 0, length - covered, length);
        report.base += bases;
        report.regions.push(RegionAccuracy {
            region_id: region.id().to_string(),
            chrom: chrom.to_string(),
            locus: *region.locus(),
            bases,
            reads: region.reads()
        });
    }
    let aligned_bases: u64 = aligned.into_values().map(union_length).sum();
    report.base.fp = aligned_bases.saturating_sub(report.base.tp);

    let sequins = catalog.len() as u64;
    report.region.tp = detected.len() as u64;
    report.region.fn_ = sequins - report.region.tp;
    report.region.reference_total = sequins;

    info!("Base level: TP={}, FP={}, FN={}, sensitivity={:?}, precision={:?}",
        report.base.tp, report.base.fp, report.base.fn_, report.base.sensitivity(), report.base.precision());
    info!("Region level: TP={}, FP={}, FN={}", report.region.tp, report.region.fp, report.region.fn_);
    if report.skipped > 0 {
        info!("Skipped {} malformed records", report.skipped);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use crate::data_types::records::{AlignmentRecord, MalformedRecord};
    use crate::reference_catalog::CatalogBuilder;

    fn catalog() -> ReferenceCatalog {
        let mut builder = CatalogBuilder::new();
        builder.add_annotation("G1", "chrIS", 1, 100, None, None).unwrap();
        builder.add_annotation("G2", "chrIS", 201, 300, None, None).unwrap();
        builder.add_annotation("G3", "chrIS", 401, 500, None, None).unwrap();
        builder.finalize_annotation_only().unwrap()
    }

    fn read(chrom: &str, start: u64, end: u64) -> anyhow::Result<AlignmentRecord> {
        Ok(AlignmentRecord::mapped(None, chrom.to_string(), Locus::new(start, end)?))
    }

    #[test]
    fn test_union_length() {
        assert_eq!(union_length(vec![]), 0);
        let loci = vec![
            Locus::new(50, 60).unwrap(),
            Locus::new(1, 10).unwrap(),
            Locus::new(5, 20).unwrap(),
            Locus::new(21, 30).unwrap()
        ];
        // 1..=20 and 21..=30 touch but do not overlap, 50..=60 is separate
        assert_eq!(union_length(loci), 41);
    }

    #[test]
    fn test_alignment_accuracy() {
        let catalog = catalog();
        let records = vec![
            read("chrIS", 1, 50),
            read("chrIS", 26, 75),
            // runs 10 bases past G2
            read("chrIS", 261, 310),
            // between sequins
            read("chrIS", 351, 370),
            read("chr1", 1, 100),
            Ok(AlignmentRecord::unmapped(None)),
            Err(MalformedRecord::new("read9", "reference sequence index 4 is not in the header").into())
        ];
        let report = measure_accuracy(&catalog, records).unwrap();

        // G1 1..=75 and G2 261..=300 are covered
        assert_eq!(report.base, ConfusionCounter::new(115, 30, 185, 300));
        assert_approx_eq!(report.base.sensitivity().unwrap(), 115.0 / 300.0);
        assert_eq!(report.region, ConfusionCounter::new(1, 2, 2, 3));
        assert_eq!((report.genome, report.unmapped, report.skipped), (1, 1, 1));

        let per_region: Vec<(&str, u64, u64, u64)> = report.regions.iter()
            .map(|r| (r.region_id.as_str(), r.bases.tp, r.bases.fn_, r.reads))
            .collect();
        assert_eq!(per_region, vec![("G1", 75, 25, 2), ("G2", 40, 60, 1), ("G3", 0, 100, 0)]);

        // the base counters add up to the overall reference
        let total: u64 = report.regions.iter().map(|r| r.bases.reference_total).sum();
        assert_eq!(total, report.base.reference_total);
    }

    #[test]
    fn test_stream_error_propagates() {
        let catalog = catalog();
        let records = vec![read("chrIS", 1, 50), Err(anyhow::anyhow!("truncated input"))];
        assert!(measure_accuracy(&catalog, records).is_err());
    }
}
