
/*!
Abundance analysis: observed sequin abundance (alignments or assembled contigs) against expected concentration.
*/

use log::info;
use serde::Serialize;

use crate::accumulator::{AccountingSummary, Accumulator, ObservationMode, RecordOutcome};
use crate::data_types::records::{ObservedRecord, recover_record};
use crate::matcher::{Matcher, MatcherConfig};
use crate::reference_catalog::ReferenceCatalog;
use crate::util::progress_bar::RecordProgress;

/// Where the records of an abundance run went
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AbundanceCounts {
    /// Records matched to a sequin
    pub sequin: u64,
    /// Records on a sequin chromosome that did not match any sequin
    pub sequin_unmatched: u64,
    /// Records placed anywhere else
    pub genome: u64,
    /// Records without a placement
    pub unmapped: u64,
    /// Malformed records skipped with a warning
    pub skipped: u64
}

impl AbundanceCounts {
    /// Fraction of placed records that landed on sequins
    pub fn dilution(&self) -> Option<f64> {
        let placed = self.sequin + self.sequin_unmatched + self.genome;
        if placed > 0 {
            Some((self.sequin + self.sequin_unmatched) as f64 / placed as f64)
        } else {
            None
        }
    }

    /// Records that were accounted, skipped records excluded
    pub fn total(&self) -> u64 {
        self.sequin + self.sequin_unmatched + self.genome + self.unmapped
    }
}

/// Everything the abundance analysis produces
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AbundanceReport {
    pub summary: AccountingSummary,
    pub counts: AbundanceCounts,
    pub dilution: Option<f64>
}

/// Runs the abundance analysis over a stream of placed records.
/// Only records on chromosomes that carry sequins are accounted; everything else is counted as genome.
/// # Arguments
/// * `catalog` - the finalized catalog
/// * `mixture` - mixture label for expected concentrations
/// * `records` - alignments or contigs; `MalformedRecord` errors are skipped with a warning
/// * `matcher_config` - fallback rule for records that are not placed exactly on a sequin
/// # Errors
/// * if the record stream itself fails
/// * if the accounting is internally inconsistent
pub fn measure_abundance<R, I>(
    catalog: &ReferenceCatalog, mixture: &str, records: I, matcher_config: MatcherConfig
) -> anyhow::Result<AbundanceReport>
where
    R: ObservedRecord,
    I: IntoIterator<Item = anyhow::Result<R>>
{
    let matcher = Matcher::new(catalog, matcher_config);
    let mut accumulator = Accumulator::new(catalog, mixture, &[], ObservationMode::Sum);
    let mut counts = AbundanceCounts::default();
    let mut progress = RecordProgress::new("records");

    for result in records {
        progress.tick();
        let Some(record) = recover_record(result, &mut counts.skipped)? else {
            continue;
        };
        if record.locus().is_none() {
            counts.unmapped += 1;
            continue;
        }
        if !catalog.has_chrom(record.chrom()) {
            counts.genome += 1;
            continue;
        }

        let result = matcher.match_record(&record);
        match recover_record(accumulator.record(&result, record.observed_abundance()), &mut counts.skipped)? {
            Some(RecordOutcome::TruePositive | RecordOutcome::Duplicate) => counts.sequin += 1,
            Some(RecordOutcome::FalsePositive) => counts.sequin_unmatched += 1,
            None => {}
        };
    }
    progress.finish();

    let dilution = counts.dilution();
    info!("Records: {} accounted, {} on sequins, {} unmatched on sequin chromosomes, {} genome, {} unmapped",
        counts.total(), counts.sequin, counts.sequin_unmatched, counts.genome, counts.unmapped);
    if counts.skipped > 0 {
        info!("Skipped {} malformed records", counts.skipped);
    }
    let summary = accumulator.finalize()?;
    if let Some(model) = summary.overall().map(|o| &o.model) {
        info!("Abundance regression: n={}, slope={:?}, r2={:?}", model.n, model.slope, model.r2);
    }
    Ok(AbundanceReport {
        summary,
        counts,
        dilution
    })
}
