use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{check_required_filename, AFTER_HELP, FULL_VERSION};

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct AccuracySettings {
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

    /// Aligned reads (BAM)
    #[clap(required = true)]
    #[clap(short = 'i')]
    #[clap(long = "input-bam")]
    #[clap(value_name = "BAM")]
    #[clap(help_heading = Some("Input/Output"))]
    pub bam_fn: PathBuf,

    /// Output directory containing the accuracy tables
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
    #[clap(default_value = "accuracy")]
    pub label: String,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

pub fn check_accuracy_settings(mut settings: AccuracySettings) -> anyhow::Result<AccuracySettings> {
    // hard code the version in
    settings.sequin_qc_version = FULL_VERSION.clone();
    info!("sequin-qc version: {:?}", &settings.sequin_qc_version);
    info!("Sub-command: accuracy");
    info!("Inputs:");

    // check for all the required input files
    check_required_filename(&settings.annotation_fn, "Annotation BED")?;
    check_required_filename(&settings.bam_fn, "Input BAM")?;

    // dump stuff to the logger
    info!("\tAnnotation: {:?}", &settings.annotation_fn);
    info!("\tInput BAM: {:?}", &settings.bam_fn);

    // outputs
    info!("Outputs:");
    info!("\tLabel: {:?}", &settings.label);
    info!("\tOutput folder: {:?}", &settings.output_folder);

    Ok(settings)
}
