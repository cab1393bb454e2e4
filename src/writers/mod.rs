/*!
# Writers module
Contains the logic for writing the output files for the detect, abundance, accuracy, and subsample commands.
*/
/// Writes the retained alignments of a subsampling run
pub mod alignments;
/// Per-record tables: labelled calls, alignment accuracy, and region normalization
pub mod records;
/// Temporary output names that are moved into place once every output succeeded
pub mod staging;
/// Stratified confusion, regression, and per-sequin tables
pub mod summary;
