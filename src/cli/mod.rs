/*!
# CLI module
Command line interface functionality that is specific to sequin-qc.
*/

/// The main CLI module that contains the top-level CLI parser and help text
pub mod core;
/// The abundance CLI subcommand
pub mod abundance;
/// The accuracy CLI subcommand
pub mod accuracy;
/// The detect CLI subcommand
pub mod detect;
/// The subsample CLI subcommand
pub mod subsample;
