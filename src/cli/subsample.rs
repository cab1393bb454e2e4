
use anyhow::{bail, ensure};
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{check_required_filename, AFTER_HELP, FULL_VERSION};
use crate::data_types::normalization::SamplingPolicy;

/// How the retention probability of a region is derived
#[derive(Clone, Copy, Default, Debug, strum_macros::Display, Serialize, clap::ValueEnum)]
pub enum SamplingMethod {
    /// Ratio of mean coverage
    #[default]
    #[strum(serialize = "mean")]
    #[clap(name = "mean")]
    Mean,
    /// Ratio of median coverage
    #[strum(serialize = "median")]
    #[clap(name = "median")]
    Median,
    /// Ratio of read counts
    #[strum(serialize = "reads")]
    #[clap(name = "reads")]
    Reads,
    /// A fixed proportion for every region, set with --proportion
    #[strum(serialize = "fixed")]
    #[clap(name = "fixed")]
    Fixed
}

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct SubsampleSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    sequin_qc_version: String,

    /// Aligned reads covering both the genome and the sequin decoy (BAM)
    #[clap(required = true)]
    #[clap(short = 'i')]
    #[clap(long = "input-bam")]
    #[clap(value_name = "BAM")]
    #[clap(help_heading = Some("Input/Output"))]
    pub bam_fn: PathBuf,

    /// Sequin control regions, named to pair with the endogenous regions (BED)
    #[clap(required = true)]
    #[clap(short = 'c')]
    #[clap(long = "control-regions")]
    #[clap(value_name = "BED")]
    #[clap(help_heading = Some("Input/Output"))]
    pub control_fn: PathBuf,

    /// Endogenous regions on the genome (BED)
    #[clap(required = true)]
    #[clap(short = 'e')]
    #[clap(long = "endogenous-regions")]
    #[clap(value_name = "BED")]
    #[clap(help_heading = Some("Input/Output"))]
    pub endogenous_fn: PathBuf,

    /// Output directory containing the subsampled BAM and normalization table
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-dir")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_folder: PathBuf,

    /// Coverage statistic used to derive the retention probability
    #[clap(long = "method")]
    #[clap(value_name = "METHOD")]
    #[clap(help_heading = Some("Sampling parameters"))]
    #[clap(default_value = "mean")]
    pub method: SamplingMethod,

    /// Retention probability for every region with --method fixed
    #[clap(long = "proportion")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Sampling parameters"))]
    pub proportion: Option<f64>,

    /// Seed for the per-read draw
    #[clap(long = "seed")]
    #[clap(value_name = "SEED")]
    #[clap(help_heading = Some("Sampling parameters"))]
    #[clap(default_value = "0")]
    pub seed: u64,

    /// Keeps every read in regions where genome coverage exceeds control coverage, instead of failing
    #[clap(long = "allow-low-control")]
    #[clap(help_heading = Some("Sampling parameters"))]
    pub allow_low_control: bool,

    /// Number of threads to use for the coverage step and BAM compression
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

impl SubsampleSettings {
    /// The sampling policy described by `method` and `proportion`
    pub fn sampling_policy(&self) -> anyhow::Result<SamplingPolicy> {
        let policy = match self.method {
            SamplingMethod::Mean => SamplingPolicy::Mean,
            SamplingMethod::Median => SamplingPolicy::Median,
            SamplingMethod::Reads => SamplingPolicy::ReadCount,
            SamplingMethod::Fixed => match self.proportion {
                Some(p) => SamplingPolicy::Fixed(p),
                None => bail!("--proportion is required with --method fixed")
            }
        };
        Ok(policy)
    }
}

pub fn check_subsample_settings(mut settings: SubsampleSettings) -> anyhow::Result<SubsampleSettings> {
    // hard code the version in
    settings.sequin_qc_version = FULL_VERSION.clone();
    info!("sequin-qc version: {:?}", &settings.sequin_qc_version);
    info!("Sub-command: subsample");
    info!("Inputs:");

    // check for all the required input files
    check_required_filename(&settings.bam_fn, "Input BAM")?;
    check_required_filename(&settings.control_fn, "Control regions")?;
    check_required_filename(&settings.endogenous_fn, "Endogenous regions")?;

    // dump stuff to the logger
    info!("\tInput BAM: {:?}", &settings.bam_fn);
    info!("\tControl regions: {:?}", &settings.control_fn);
    info!("\tEndogenous regions: {:?}", &settings.endogenous_fn);

    // outputs
    info!("Outputs:");
    info!("\tOutput folder: {:?}", &settings.output_folder);

    info!("Sampling parameters:");
    let policy = settings.sampling_policy()?;
    if let SamplingPolicy::Fixed(p) = policy {
        ensure!((0.0..=1.0).contains(&p), "--proportion must be within [0, 1]");
    } else if settings.proportion.is_some() {
        bail!("--proportion is only used with --method fixed");
    }
    info!("\tMethod: {policy}");
    info!("\tSeed: {}", settings.seed);
    info!("\tLow control coverage: {}", if settings.allow_low_control { "ALLOWED" } else { "ERROR" });

    if settings.threads == 0 {
        settings.threads = 1;
    }
    info!("Processing threads: {}", settings.threads);

    Ok(settings)
}
