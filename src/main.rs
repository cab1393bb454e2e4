
use anyhow::Context;
use log::{LevelFilter, error, info, warn};
use std::path::Path;
use std::time::Instant;

use sequin_qc::abundance::{AbundanceReport, measure_abundance};
use sequin_qc::accuracy::measure_accuracy;
use sequin_qc::accumulator::AccountingSummary;
use sequin_qc::cli::abundance::{AbundanceSettings, check_abundance_settings};
use sequin_qc::cli::accuracy::{AccuracySettings, check_accuracy_settings};
use sequin_qc::cli::core::{Commands, get_cli};
use sequin_qc::cli::detect::{DetectSettings, check_detect_settings};
use sequin_qc::cli::subsample::{SubsampleSettings, check_subsample_settings};
use sequin_qc::data_types::records::recover_record;
use sequin_qc::detect::detect_variants;
use sequin_qc::matcher::MatcherConfigBuilder;
use sequin_qc::parsing::annotation::{load_contigs, load_region_engine};
use sequin_qc::parsing::{load_annotation_catalog, load_catalog};
use sequin_qc::parsing::noodles_helper::{AlignmentFile, load_variant_records};
use sequin_qc::reference_catalog::ReferenceCatalog;
use sequin_qc::subsampler::{CoverageMeasure, SubsampleConfigBuilder};
use sequin_qc::util::json_io::save_json;
use sequin_qc::util::progress_bar::RecordProgress;
use sequin_qc::writers::alignments::AlignmentWriter;
use sequin_qc::writers::records::{write_accuracy, write_calls, write_normalization, write_region_accuracy};
use sequin_qc::writers::staging::StagedOutputs;
use sequin_qc::writers::summary::SummaryWriter;

/// Sets up logging at the requested verbosity
fn init_logging(verbosity: u8) {
    let filter_level: LevelFilter = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();
}

/// Creates the output folder and saves the CLI options into it
fn prepare_output_folder<T: serde::Serialize>(output_folder: &Path, settings: &T) {
    info!("Creating output folder at {output_folder:?}...");
    match std::fs::create_dir_all(output_folder) {
        Ok(()) => {},
        Err(e) => {
            error!("Error while creating output folder: {e}");
            std::process::exit(exitcode::IOERR);
        }
    }

    let cli_json = output_folder.join("cli_settings.json");
    info!("Saving CLI options to {cli_json:?}...");
    if let Err(e) = save_json(settings, &cli_json) {
        error!("Error while saving CLI options: {e}");
        std::process::exit(exitcode::IOERR);
    }
}

/// Loads the catalog and makes sure the requested mixture is in it
fn load_checked_catalog(mixture_fn: &Path, annotation_fn: &Path, mixture: &str) -> ReferenceCatalog {
    info!("Loading sequin catalog...");
    let catalog = match load_catalog(mixture_fn, annotation_fn) {
        Ok(c) => c,
        Err(e) => {
            error!("Error while loading sequin catalog: {e:#}");
            std::process::exit(exitcode::DATAERR);
        }
    };
    if !catalog.has_mixture(mixture) {
        error!("Mixture {mixture:?} is not in {mixture_fn:?}, found: {:?}", catalog.mixtures());
        std::process::exit(exitcode::CONFIG);
    }
    catalog
}

/// Writes a command's outputs under temporary names, then moves them into place only if every write succeeded.
/// On failure the staged files are removed and the process exits.
fn write_outputs<F>(write: F)
where
    F: FnOnce(&mut StagedOutputs) -> anyhow::Result<()>
{
    let mut outputs = StagedOutputs::new();
    match write(&mut outputs) {
        Ok(()) => {
            if let Err(e) = outputs.commit() {
                error!("Error while moving outputs into place: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        },
        Err(e) => {
            error!("{e:#}");
            outputs.discard();
            std::process::exit(exitcode::IOERR);
        }
    }
}

/// Writes the stratified tables shared by detect and abundance
fn write_summary_tables(
    label: &str, prefix: &str, summary: &AccountingSummary, output_folder: &Path, outputs: &mut StagedOutputs
) -> anyhow::Result<()> {
    let summary_writer = SummaryWriter::new(label.to_string(), summary);

    let confusion_fn = output_folder.join(format!("{prefix}_confusion.tsv"));
    info!("Saving confusion table to {confusion_fn:?}...");
    summary_writer.write_confusion(&outputs.stage(&confusion_fn))
        .context("Error while saving confusion table:")?;

    let regression_fn = output_folder.join(format!("{prefix}_regression.tsv"));
    info!("Saving regression table to {regression_fn:?}...");
    summary_writer.write_regression(&outputs.stage(&regression_fn))
        .context("Error while saving regression table:")?;

    let sequins_fn = output_folder.join(format!("{prefix}_sequins.tsv"));
    info!("Saving per-sequin table to {sequins_fn:?}...");
    summary_writer.write_sequins(&outputs.stage(&sequins_fn))
        .context("Error while saving per-sequin table:")?;
    Ok(())
}

fn run_detect(settings: DetectSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    init_logging(settings.verbosity);
    let settings = match check_detect_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };
    prepare_output_folder(&settings.output_folder, &settings);

    let catalog = load_checked_catalog(&settings.mixture_fn, &settings.annotation_fn, &settings.mixture);
    let missing_variants = catalog.filter(|e| e.variant().is_none()).count();
    if missing_variants > 0 {
        warn!("{missing_variants} sequins have no variant annotation and can only be detected by position");
    }

    info!("Loading variant calls...");
    let calls = match load_variant_records(&settings.vcf_filename, settings.vcf_sample_index) {
        Ok(c) => c,
        Err(e) => {
            error!("Error while loading variant calls: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    info!("Labelling variant calls...");
    let report = match detect_variants(&catalog, &settings.mixture, calls.into_iter().map(Ok), settings.passed_only) {
        Ok(r) => r,
        Err(e) => {
            error!("Error while labelling variant calls: {e:#}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    write_outputs(|outputs| {
        write_summary_tables(&settings.label, "detect", &report.summary, &settings.output_folder, outputs)?;

        let calls_fn = settings.output_folder.join("detect_calls.tsv");
        info!("Saving labelled calls to {calls_fn:?}...");
        write_calls(&outputs.stage(&calls_fn), &report.calls)
            .context("Error while saving labelled calls:")?;

        let report_fn = settings.output_folder.join("detect_report.json.gz");
        info!("Saving full report to {report_fn:?}...");
        save_json(&report, &outputs.stage(&report_fn))
            .context("Error while saving full report:")
    });

    info!("Detection completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn run_abundance(settings: AbundanceSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    init_logging(settings.verbosity);
    let settings = match check_abundance_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };
    prepare_output_folder(&settings.output_folder, &settings);

    let catalog = load_checked_catalog(&settings.mixture_fn, &settings.annotation_fn, &settings.mixture);
    let matcher_config = match MatcherConfigBuilder::default()
        .fallback_rule(settings.fallback_rule.match_rule())
        .build() {
        Ok(mc) => mc,
        Err(e) => {
            error!("Error while building matcher config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    let result: anyhow::Result<AbundanceReport> = if let Some(bam_fn) = settings.bam_fn.as_deref() {
        info!("Measuring abundance from alignments...");
        AlignmentFile::open(bam_fn)
            .and_then(|mut alignment_file| {
                measure_abundance(&catalog, &settings.mixture, alignment_file.alignments(), matcher_config)
            })
    } else if let Some(contigs_fn) = settings.contigs_fn.as_deref() {
        info!("Measuring abundance from contigs...");
        load_contigs(contigs_fn)
            .and_then(|contigs| {
                measure_abundance(&catalog, &settings.mixture, contigs.into_iter().map(Ok), matcher_config)
            })
    } else {
        // guaranteed by the settings check
        error!("No abundance input was provided");
        std::process::exit(exitcode::SOFTWARE);
    };
    let report = match result {
        Ok(r) => r,
        Err(e) => {
            error!("Error while measuring abundance: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    write_outputs(|outputs| {
        write_summary_tables(&settings.label, "abundance", &report.summary, &settings.output_folder, outputs)?;

        let report_fn = settings.output_folder.join("abundance_report.json.gz");
        info!("Saving full report to {report_fn:?}...");
        save_json(&report, &outputs.stage(&report_fn))
            .context("Error while saving full report:")
    });

    info!("Abundance completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn run_accuracy(settings: AccuracySettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    init_logging(settings.verbosity);
    let settings = match check_accuracy_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };
    prepare_output_folder(&settings.output_folder, &settings);

    info!("Loading sequin annotation...");
    let catalog = match load_annotation_catalog(&settings.annotation_fn) {
        Ok(c) => c,
        Err(e) => {
            error!("Error while loading sequin annotation: {e:#}");
            std::process::exit(exitcode::DATAERR);
        }
    };

    info!("Measuring alignment accuracy...");
    let report = match AlignmentFile::open(&settings.bam_fn)
        .and_then(|mut alignment_file| measure_accuracy(&catalog, alignment_file.alignments())) {
        Ok(r) => r,
        Err(e) => {
            error!("Error while measuring alignment accuracy: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    write_outputs(|outputs| {
        let summary_fn = settings.output_folder.join("accuracy_summary.tsv");
        info!("Saving accuracy summary to {summary_fn:?}...");
        write_accuracy(&outputs.stage(&summary_fn), &settings.label, &report)
            .context("Error while saving accuracy summary:")?;

        let regions_fn = settings.output_folder.join("accuracy_regions.tsv");
        info!("Saving per-region accuracy to {regions_fn:?}...");
        write_region_accuracy(&outputs.stage(&regions_fn), &report.regions)
            .context("Error while saving per-region accuracy:")?;

        let report_fn = settings.output_folder.join("accuracy_report.json.gz");
        info!("Saving full report to {report_fn:?}...");
        save_json(&report, &outputs.stage(&report_fn))
            .context("Error while saving full report:")
    });

    info!("Accuracy completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn run_subsample(settings: SubsampleSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    init_logging(settings.verbosity);
    let settings = match check_subsample_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    // set up the number of threads for rayon
    match rayon::ThreadPoolBuilder::new().num_threads(settings.threads).build_global() {
        Ok(()) => {},
        Err(e) => {
            error!("Error while building thread pool: {e}");
            std::process::exit(exitcode::OSERR);
        }
    };
    prepare_output_folder(&settings.output_folder, &settings);

    let subsample_config = match settings.sampling_policy()
        .and_then(|policy| {
            SubsampleConfigBuilder::default()
                .policy(policy)
                .seed(settings.seed)
                .require_control_excess(!settings.allow_low_control)
                .build()
                .map_err(anyhow::Error::from)
        }) {
        Ok(sc) => sc,
        Err(e) => {
            error!("Error while building subsample config: {e:#}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    info!("Loading sampling regions...");
    let regions = load_region_engine(&settings.control_fn, false)
        .and_then(|control| Ok((control, load_region_engine(&settings.endogenous_fn, false)?)));
    let mut measure = match regions.map(|(control, endogenous)| CoverageMeasure::new(control, endogenous)) {
        Ok(Ok(m)) => m,
        Ok(Err(e)) => {
            error!("Error while preparing sampling regions: {e}");
            std::process::exit(exitcode::DATAERR);
        },
        Err(e) => {
            error!("Error while loading sampling regions: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    // first pass, coverage only
    info!("Measuring coverage...");
    let measured = AlignmentFile::open(&settings.bam_fn)
        .and_then(|mut alignment_file| {
            let mut progress = RecordProgress::new("alignments");
            let mut skipped = 0;
            for result in alignment_file.alignments() {
                progress.tick();
                if let Some(alignment) = recover_record(result, &mut skipped)? {
                    measure.measure(&alignment);
                }
            }
            progress.finish();
            Ok(skipped)
        });
    match measured {
        Ok(0) => {},
        Ok(skipped) => info!("Skipped {skipped} malformed alignments while measuring"),
        Err(e) => {
            error!("Error while measuring coverage: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    info!("Computing retention probabilities...");
    let mut plan = match measure.compute(&subsample_config) {
        Ok(p) => p,
        Err(e) => {
            error!("Error while computing retention probabilities: {e}");
            std::process::exit(exitcode::DATAERR);
        }
    };

    // second pass, nothing lands under its final name until the tables are written too
    write_outputs(|outputs| {
        let out_bam_fn = settings.output_folder.join("subsampled.bam");
        info!("Sampling alignments into {out_bam_fn:?}...");
        let mut alignment_file = AlignmentFile::open(&settings.bam_fn)?;
        let mut writer = AlignmentWriter::new(&outputs.stage(&out_bam_fn), alignment_file.header().clone(), settings.threads)?;
        let mut progress = RecordProgress::new("alignments");
        let mut skipped = 0;
        for result in alignment_file.records() {
            progress.tick();
            let Some((raw, alignment)) = recover_record(result, &mut skipped)? else {
                continue;
            };
            if plan.should_retain(&alignment) {
                writer.write_record(&raw)?;
            }
        }
        progress.finish();
        let written = writer.finish()?;
        let (seen, retained) = plan.counts();
        info!("Retained {retained} of {seen} alignments, wrote {written}.");
        if skipped > 0 {
            info!("Skipped {skipped} malformed alignments while sampling");
        }

        let normalization = plan.finish();
        let norm_fn = settings.output_folder.join("normalization.tsv");
        info!("Saving normalization table to {norm_fn:?}...");
        write_normalization(&outputs.stage(&norm_fn), &normalization)
            .context("Error while saving normalization table:")?;

        let report_fn = settings.output_folder.join("normalization.json");
        info!("Saving normalization report to {report_fn:?}...");
        save_json(&normalization, &outputs.stage(&report_fn))
            .context("Error while saving normalization report:")
    });

    info!("Subsampling completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn main() {
    let cli = get_cli();
    match cli.command {
        Commands::Detect(settings) => {
            run_detect(*settings);
        },
        Commands::Abundance(settings) => {
            run_abundance(*settings);
        },
        Commands::Accuracy(settings) => {
            run_accuracy(*settings);
        },
        Commands::Subsample(settings) => {
            run_subsample(*settings);
        }
    }

    info!("Process finished successfully.");
}
