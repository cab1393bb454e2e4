
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::accumulator::{AccountingSummary, SequinReport, StratumReport};

/// Opens a delimited writer, comma-separated if the file ends with .csv and tab-separated otherwise
/// # Arguments
/// * `filename` - the filename for the output (tsv/csv)
pub fn delimited_writer(filename: &Path) -> csv::Result<csv::Writer<File>> {
    let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
    let delimiter: u8 = if is_csv { b',' } else { b'\t' };
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(filename)
}

/// This is a wrapper for writing out the stratified results of one analysis
pub struct SummaryWriter<'a> {
    /// User provided label to go on each row
    label: String,
    summary: &'a AccountingSummary
}

/// Contains all the data written to each row of the confusion file
#[derive(Serialize)]
struct ConfusionRow {
    /// User provided label
    label: String,
    mixture: String,
    /// Stratum family, e.g. "Mutation"
    category: String,
    /// Stratum value, e.g. "SNP"
    stratum: String,
    /// Catalog entries in this stratum
    reference_total: u64,
    tp: u64,
    fp: u64,
    #[serde(rename = "fn")]
    fn_: u64,
    /// Sensitivity = TP / reference total
    metric_sensitivity: Option<f64>,
    /// Precision = TP / (TP + FP)
    metric_precision: Option<f64>,
    metric_f1: Option<f64>
}

impl ConfusionRow {
    fn new(label: String, mixture: String, report: &StratumReport) -> Self {
        let c = &report.confusion;
        Self {
            label, mixture,
            category: report.stratum.category().to_string(),
            stratum: report.stratum.label(),
            reference_total: c.reference_total,
            tp: c.tp,
            fp: c.fp,
            fn_: c.fn_,
            metric_sensitivity: c.sensitivity(),
            metric_precision: c.precision(),
            metric_f1: c.f1()
        }
    }
}

/// Contains all the data written to each row of the regression file
#[derive(Serialize)]
struct RegressionRow {
    label: String,
    mixture: String,
    category: String,
    stratum: String,
    /// Number of log2 points the fit used
    n: usize,
    intercept: Option<f64>,
    slope: Option<f64>,
    r: Option<f64>,
    r2: Option<f64>,
    adjusted_r2: Option<f64>,
    f_statistic: Option<f64>,
    p_value: Option<f64>,
    ss_model: Option<f64>,
    ss_error: Option<f64>,
    ss_total: Option<f64>,
    df_model: Option<usize>,
    df_error: Option<usize>,
    df_total: Option<usize>
}

impl RegressionRow {
    fn new(label: String, mixture: String, report: &StratumReport) -> Self {
        let m = &report.model;
        Self {
            label, mixture,
            category: report.stratum.category().to_string(),
            stratum: report.stratum.label(),
            n: m.n,
            intercept: m.intercept,
            slope: m.slope,
            r: m.r,
            r2: m.r2,
            adjusted_r2: m.adjusted_r2,
            f_statistic: m.f_statistic,
            p_value: m.p_value,
            ss_model: m.ss_model,
            ss_error: m.ss_error,
            ss_total: m.ss_total,
            df_model: m.df_model,
            df_error: m.df_error,
            df_total: m.df_total
        }
    }
}

/// One row per catalog entry
#[derive(Serialize)]
struct SequinRow {
    label: String,
    sequin_id: String,
    expected: Option<f64>,
    observed: Option<f64>,
    log2_expected: Option<f64>,
    log2_observed: Option<f64>,
    count: u64,
    detected: bool
}

impl SequinRow {
    fn new(label: String, report: &SequinReport) -> Self {
        let log2 = |v: Option<f64>| v.filter(|x| *x > 0.0).map(f64::log2);
        Self {
            label,
            sequin_id: report.sequin_id.clone(),
            expected: report.expected,
            observed: report.observed,
            log2_expected: log2(report.expected),
            log2_observed: log2(report.observed),
            count: report.count,
            detected: report.detected
        }
    }
}

impl<'a> SummaryWriter<'a> {
    /// Creates a new writer over a finished summary
    pub fn new(label: String, summary: &'a AccountingSummary) -> Self {
        Self {
            label, summary
        }
    }

    /// Writes one confusion row per stratum, in stratum order
    /// # Arguments
    /// * `filename` - the filename for the output (tsv/csv)
    pub fn write_confusion(&self, filename: &Path) -> csv::Result<()> {
        let mut csv_writer = delimited_writer(filename)?;
        for report in self.summary.strata.iter() {
            let row = ConfusionRow::new(self.label.clone(), self.summary.mixture.clone(), report);
            csv_writer.serialize(&row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Writes one regression row per stratum; undefined fits are left blank
    /// # Arguments
    /// * `filename` - the filename for the output (tsv/csv)
    pub fn write_regression(&self, filename: &Path) -> csv::Result<()> {
        let mut csv_writer = delimited_writer(filename)?;
        for report in self.summary.strata.iter() {
            let row = RegressionRow::new(self.label.clone(), self.summary.mixture.clone(), report);
            csv_writer.serialize(&row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Writes one row per catalog entry, in identifier order
    /// # Arguments
    /// * `filename` - the filename for the output (tsv/csv)
    pub fn write_sequins(&self, filename: &Path) -> csv::Result<()> {
        let mut csv_writer = delimited_writer(filename)?;
        for report in self.summary.sequins.iter() {
            csv_writer.serialize(SequinRow::new(self.label.clone(), report))?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{Accumulator, ObservationMode};
    use crate::data_types::match_result::MatchResult;
    use crate::data_types::sequins::Stratum;
    use crate::reference_catalog::CatalogBuilder;

    fn summary() -> AccountingSummary {
        let mut builder = CatalogBuilder::new();
        builder.add_mixture("G1", None, 2.0, "A").unwrap();
        builder.add_mixture("G2", None, 8.0, "A").unwrap();
        builder.add_annotation("G1", "chrIS", 1, 100, None, None).unwrap();
        builder.add_annotation("G2", "chrIS", 201, 300, None, None).unwrap();
        let catalog = builder.finalize().unwrap();

        let mut accumulator = Accumulator::new(&catalog, "A", &[], ObservationMode::Sum);
        accumulator.record(&MatchResult::Unmatched { kind: None, attributed_region: None }, 1.0).unwrap();
        accumulator.finalize().unwrap()
    }

    #[test]
    fn test_write_tables() {
        let summary = summary();
        let writer = SummaryWriter::new("run1".to_string(), &summary);
        let out_folder = std::env::temp_dir().join("sequin_qc_summary_writer");
        std::fs::create_dir_all(&out_folder).unwrap();

        let confusion_fn = out_folder.join("confusion.tsv");
        writer.write_confusion(&confusion_fn).unwrap();
        let content = std::fs::read_to_string(&confusion_fn).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("label\tmixture\tcategory\tstratum\treference_total\ttp\tfp\tfn\t"));
        assert!(lines[1].starts_with("run1\tA\tALL\tALL\t2\t0\t1\t2\t"));

        let regression_fn = out_folder.join("regression.csv");
        writer.write_regression(&regression_fn).unwrap();
        let content = std::fs::read_to_string(&regression_fn).unwrap();
        // nothing observed, so the fit is blank
        assert!(content.lines().nth(1).unwrap().starts_with("run1,A,ALL,ALL,0,,"));

        let sequin_fn = out_folder.join("sequins.tsv");
        writer.write_sequins(&sequin_fn).unwrap();
        let content = std::fs::read_to_string(&sequin_fn).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("G2\t8.0\t\t3.0\t\t0\tfalse"));
        assert!(summary.stratum(&Stratum::Overall).is_some());
    }
}
