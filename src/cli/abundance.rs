
use anyhow::bail;
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{check_mixture_label, check_optional_filename, check_required_filename, AFTER_HELP, FULL_VERSION};
use crate::data_types::match_result::MatchRule;

/// Positional rule for records that are not placed exactly on a sequin
#[derive(Clone, Copy, Default, Debug, strum_macros::Display, Serialize, clap::ValueEnum)]
pub enum FallbackRule {
    /// Exact placements only
    #[strum(serialize = "none")]
    #[clap(name = "none")]
    Exact,
    /// The sequin must contain the record
    #[default]
    #[strum(serialize = "contains")]
    #[clap(name = "contains")]
    Contains,
    /// Any shared base is enough
    #[strum(serialize = "overlap")]
    #[clap(name = "overlap")]
    Overlap
}

impl FallbackRule {
    /// The rule the matcher tries after an exact match fails, if any
    pub fn match_rule(&self) -> Option<MatchRule> {
        match self {
            FallbackRule::Exact => None,
            FallbackRule::Contains => Some(MatchRule::Contains),
            FallbackRule::Overlap => Some(MatchRule::Overlap)
        }
    }
}

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct AbundanceSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    sequin_qc_version: String,

    /// Sequin annotation (BED)
    #[clap(required = true)]
    #[clap(short = 'a')]
    #[clap(long = "annotation")]
    #[clap(value_name = "BED")]
    #[clap(help_heading = Some("Input/Output"))]
    pub annotation_fn: PathBuf,

    /// Sequin mixture concentrations (CSV)
    #[clap(required = true)]
    #[clap(short = 'm')]
    #[clap(long = "mixture-file")]
    #[clap(value_name = "CSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub mixture_fn: PathBuf,

    /// Aligned reads (BAM)
    #[clap(short = 'i')]
    #[clap(long = "input-bam")]
    #[clap(value_name = "BAM")]
    #[clap(help_heading = Some("Input/Output"))]
    #[clap(conflicts_with = "contigs_fn")]
    pub bam_fn: Option<PathBuf>,

    /// Placed contigs with coverage in the score column (BED)
    #[clap(short = 'c')]
    #[clap(long = "input-contigs")]
    #[clap(value_name = "BED")]
    #[clap(help_heading = Some("Input/Output"))]
    pub contigs_fn: Option<PathBuf>,

    /// Output directory containing the summary tables
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-dir")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_folder: PathBuf,

    /// Optional label for the summary output
    #[clap(long = "label")]
    #[clap(value_name = "LABEL")]
    #[clap(help_heading = Some("Input/Output"))]
    #[clap(default_value = "abundance")]
    pub label: String,

    /// Mixture column holding the expected concentrations
    #[clap(long = "mixture")]
    #[clap(value_name = "MIX")]
    #[clap(help_heading = Some("Abundance parameters"))]
    #[clap(default_value = "A")]
    pub mixture: String,

    /// Rule for records not placed exactly on a sequin
    #[clap(long = "fallback-rule")]
    #[clap(value_name = "RULE")]
    #[clap(help_heading = Some("Abundance parameters"))]
    #[clap(default_value = "contains")]
    pub fallback_rule: FallbackRule,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

pub fn check_abundance_settings(mut settings: AbundanceSettings) -> anyhow::Result<AbundanceSettings> {
    // hard code the version in
    settings.sequin_qc_version = FULL_VERSION.clone();
    info!("sequin-qc version: {:?}", &settings.sequin_qc_version);
    info!("Sub-command: abundance");
    info!("Inputs:");

    // check for all the required input files
    check_required_filename(&settings.annotation_fn, "Annotation BED")?;
    check_required_filename(&settings.mixture_fn, "Mixture CSV")?;
    check_optional_filename(settings.bam_fn.as_deref(), "Input BAM")?;
    check_optional_filename(settings.contigs_fn.as_deref(), "Input contigs")?;
    match (settings.bam_fn.as_deref(), settings.contigs_fn.as_deref()) {
        (Some(bam_fn), None) => info!("\tInput BAM: {bam_fn:?}"),
        (None, Some(contigs_fn)) => info!("\tInput contigs: {contigs_fn:?}"),
        _ => bail!("Exactly one of --input-bam or --input-contigs must be provided")
    };

    // dump stuff to the logger
    info!("\tAnnotation: {:?}", &settings.annotation_fn);
    info!("\tMixture file: {:?}", &settings.mixture_fn);

    // outputs
    info!("Outputs:");
    info!("\tLabel: {:?}", &settings.label);
    info!("\tOutput folder: {:?}", &settings.output_folder);

    info!("Abundance parameters:");
    settings.mixture = check_mixture_label(&settings.mixture)?;
    info!("\tMixture: {}", settings.mixture);
    info!("\tFallback rule: {}", settings.fallback_rule);

    Ok(settings)
}
