
/// Contains tracker for TP, FP, FN and derived metrics
pub mod confusion;
/// 1-based closed genomic intervals
pub mod locus;
/// Outcome of matching one observed record
pub mod match_result;
/// Coverage summaries and per-region normalization results
pub mod normalization;
/// Observed records: alignments, variant calls, and contigs
pub mod records;
/// Linear regression over log2 expected and observed values
pub mod regression;
/// Sequin catalog entries and the strata they report under
pub mod sequins;
