
use anyhow::bail;
use clap::{Parser, Subcommand};
use chrono::Datelike;
use lazy_static::lazy_static;
use std::path::Path;

use crate::cli::abundance::AbundanceSettings;
use crate::cli::accuracy::AccuracySettings;
use crate::cli::detect::DetectSettings;
use crate::cli::subsample::SubsampleSettings;

lazy_static! {
    /// Stores the full version string we plan to use, which is generated in build.rs
    /// # Examples
    /// * `0.1.0-6bb9635-dirty` - while on a dirty branch
    /// * `0.1.0-6bb9635` - with a fresh commit
    pub static ref FULL_VERSION: String = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("VERGEN_GIT_DESCRIBE"));

    /// Shared after help string containing the legalese.
    pub static ref AFTER_HELP: String = format!("Copyright (C) 2016-{}     sequin-qc contributors.
This program comes with ABSOLUTELY NO WARRANTY; it is intended for
Research Use Only and not for use in diagnostic procedures.", chrono::Utc::now().year());
}

#[derive(Parser)]
#[clap(author,
    version = &**FULL_VERSION,
    about,
    after_help = &**AFTER_HELP)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

/// sequin-qc, quality control of sequencing runs with spiked-in synthetic sequins.
/// Select a subcommand to see more usage information:
#[derive(Subcommand)]
pub enum Commands {
    /// Measures variant calls against the sequin variant catalog
    Detect(Box<DetectSettings>),
    /// Measures observed sequin abundance from alignments or assembled contigs
    Abundance(Box<AbundanceSettings>),
    /// Measures base and region level accuracy of alignments against the sequin regions
    Accuracy(Box<AccuracySettings>),
    /// Subsamples sequin alignments so control coverage matches the genome
    Subsample(Box<SubsampleSettings>)
}

pub fn get_cli() -> Cli {
    Cli::parse()
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
pub fn check_required_filename(filename: &Path, label: &str) -> anyhow::Result<()> {
    if !filename.exists() {
        bail!("{} does not exist: \"{}\"", label, filename.display());
    }

    // file exists
    Ok(())
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
pub fn check_optional_filename(opt_filename: Option<&Path>, label: &str) -> anyhow::Result<()> {
    if let Some(filename) = opt_filename {
        if !filename.exists() {
            bail!("{} does not exist: \"{}\"", label, filename.display());
        }
    }

    // file either was not specified OR it exists
    Ok(())
}

/// Checks that a mixture label is non-empty and normalizes surrounding whitespace
/// # Arguments
/// * `mixture` - the label provided on the command line
pub fn check_mixture_label(mixture: &str) -> anyhow::Result<String> {
    let trimmed = mixture.trim();
    if trimmed.is_empty() {
        bail!("--mixture must not be empty");
    }
    Ok(trimmed.to_string())
}
