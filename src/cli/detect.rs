
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{check_mixture_label, check_required_filename, AFTER_HELP, FULL_VERSION};
use crate::parsing::noodles_helper::resolve_vcf_sample;

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct DetectSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    sequin_qc_version: String,

    /// Sequin annotation with variant columns (BED)
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

    /// Variant calls to assess (VCF)
    #[clap(required = true)]
    #[clap(short = 'i')]
    #[clap(long = "input-vcf")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub vcf_filename: PathBuf,

    /// The sample name to pull depths from [default: first sample]
    #[clap(long = "vcf-sample")]
    #[clap(value_name = "SAMPLE")]
    #[clap(help_heading = Some("Input/Output"))]
    #[clap(default_value = "", hide_default_value = true)]
    pub vcf_sample: String,

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
    #[clap(default_value = "detect")]
    pub label: String,

    /// Mixture column holding the expected allele frequencies
    #[clap(long = "mixture")]
    #[clap(value_name = "MIX")]
    #[clap(help_heading = Some("Detection parameters"))]
    #[clap(default_value = "A")]
    pub mixture: String,

    /// Only assess calls with FILTER=PASS
    #[clap(long = "passed-only")]
    #[clap(help_heading = Some("Detection parameters"))]
    pub passed_only: bool,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Resolved index of `vcf_sample`
    #[clap(skip)]
    pub vcf_sample_index: usize
}

pub fn check_detect_settings(mut settings: DetectSettings) -> anyhow::Result<DetectSettings> {
    // hard code the version in
    settings.sequin_qc_version = FULL_VERSION.clone();
    info!("sequin-qc version: {:?}", &settings.sequin_qc_version);
    info!("Sub-command: detect");
    info!("Inputs:");

    // check for all the required input files
    check_required_filename(&settings.annotation_fn, "Annotation BED")?;
    check_required_filename(&settings.mixture_fn, "Mixture CSV")?;
    check_required_filename(&settings.vcf_filename, "Input VCF")?;

    // dump stuff to the logger
    info!("\tAnnotation: {:?}", &settings.annotation_fn);
    info!("\tMixture file: {:?}", &settings.mixture_fn);
    info!("\tInput VCF: {:?}", &settings.vcf_filename);
    let (sample_index, sample_name) = resolve_vcf_sample(&settings.vcf_filename, &settings.vcf_sample)?;
    settings.vcf_sample_index = sample_index;
    settings.vcf_sample = sample_name;
    info!("\tVCF sample: {:?}", &settings.vcf_sample);

    // outputs
    info!("Outputs:");
    info!("\tLabel: {:?}", &settings.label);
    info!("\tOutput folder: {:?}", &settings.output_folder);

    info!("Detection parameters:");
    settings.mixture = check_mixture_label(&settings.mixture)?;
    info!("\tMixture: {}", settings.mixture);
    info!("\tPassed only: {}", if settings.passed_only { "ENABLED" } else { "DISABLED" });

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DetectSettings {
        DetectSettings {
            annotation_fn: PathBuf::from("./test_data/annotation.bed"),
            mixture_fn: PathBuf::from("./test_data/mixture.csv"),
            vcf_filename: PathBuf::from("./test_data/calls.vcf"),
            output_folder: PathBuf::from("./detect_out"),
            label: "detect".to_string(),
            mixture: "A".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_detect_settings() {
        let checked = check_detect_settings(settings()).unwrap();
        assert_eq!(checked.vcf_sample, "SAMPLE");
        assert_eq!(checked.vcf_sample_index, 0);
        assert_eq!(checked.sequin_qc_version, *FULL_VERSION);
    }

    #[test]
    fn test_missing_inputs() {
        let mut bad = settings();
        bad.vcf_filename = PathBuf::from("./test_data/missing.vcf");
        assert!(check_detect_settings(bad).is_err());

        let mut bad = settings();
        bad.vcf_sample = "other".to_string();
        assert!(check_detect_settings(bad).is_err());
    }
}
