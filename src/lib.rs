
/// Abundance analysis over alignments or contigs
pub mod abundance;
/// Base and region level accuracy of alignments
pub mod accuracy;
/// Stratified confusion and regression accounting
pub mod accumulator;
/// Command line interface functionality
pub mod cli;
/// Contains various shared data types
pub mod data_types;
/// Variant detection analysis
pub mod detect;
/// Per-chromosome interval lookups and depth tracking
pub mod interval_engine;
/// Pairs observed records with catalog entries
pub mod matcher;
/// Tooling for parsing input files into meaningful structs / data
pub mod parsing;
/// The validated set of sequins with positional indices
pub mod reference_catalog;
/// Coverage-based subsampling of control alignments
pub mod subsampler;
/// Various utility functions that tend to be very generic
pub mod util;
/// All output writers
pub mod writers;
