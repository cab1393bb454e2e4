
use anyhow::{Context, anyhow, bail};
use log::{debug, info, warn};
use noodles::bam;
use noodles::sam;
use noodles::sam::alignment::Record as _;
use noodles::vcf;
use noodles::vcf::variant::Record as _;
use noodles::vcf::variant::record_buf::info::field::{Value as InfoValue, value::Array as InfoArray};
use noodles::vcf::variant::record_buf::samples::sample::{Value as SampleValue, value::Array as SampleArray};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::data_types::locus::Locus;
use crate::data_types::records::{AlignmentRecord, MalformedRecord, VariantRecord, recover_record};

/// FORMAT key for allelic depths
const ALLELE_DEPTH_KEY: &str = "AD";
/// INFO key for the caller-reported allele frequency
const ALLELE_FREQUENCY_KEY: &str = "AF";

/// Wrapper function that handles both gzip compressed and uncompressed text files (BED, CSV, TSV)
/// # Arguments
/// * `filename` - path to the file to open, compressed if it ends in ".gz"
pub fn open_text_file(filename: &Path) -> anyhow::Result<Box<dyn BufRead>> {
    let is_compressed = match filename.extension() {
        Some(extension) => {
            extension == "gz"
        },
        None => false
    };

    let file = File::open(filename)
        .with_context(|| format!("Error while opening {filename:?}:"))?;
    let reader: Box<dyn BufRead> = if is_compressed {
        // multi-member decoding also covers bgzip output
        Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// This will open a VCF file and find the index of a sample by name.
/// An empty name selects the first sample; a file without samples resolves to index 0 with an empty name.
/// # Arguments
/// * `vcf_fn` - the VCF filename to open
/// * `sample_name` - the sample to look up
pub fn resolve_vcf_sample(vcf_fn: &Path, sample_name: &str) -> anyhow::Result<(usize, String)> {
    use noodles_util::variant::io::reader::Builder as VcfBuilder;

    #[allow(clippy::default_constructed_unit_structs)]
    let mut vcf_reader = VcfBuilder::default()
        .build_from_path(vcf_fn)
        .with_context(|| format!("Error while opening {vcf_fn:?}:"))?;
    let vcf_header = vcf_reader.read_header()
        .with_context(|| format!("Error while reading header of {vcf_fn:?}:"))?;

    let sample_names = vcf_header.sample_names();
    if sample_name.is_empty() {
        let first = sample_names.get_index(0).cloned().unwrap_or_default();
        return Ok((0, first));
    }
    let index = sample_names.get_index_of(sample_name)
        .ok_or(anyhow!("Sample {sample_name:?} does not exist in {vcf_fn:?}."))?;
    Ok((index, sample_name.to_string()))
}

/// This will load every call from a VCF/BCF file, splitting multi-allelic records into one call per ALT.
/// Records that fail to parse are skipped with a warning.
/// # Arguments
/// * `vcf_fn` - the VCF filename to open; compression and format are detected
/// * `sample_index` - the sample to pull depths from; 0 = first sample
/// # Errors
/// * if the file cannot be opened or read
/// * if the sample index does not exist and the file has samples
pub fn load_variant_records(vcf_fn: &Path, sample_index: usize) -> anyhow::Result<Vec<VariantRecord>> {
    use noodles_util::variant::io::reader::Builder as VcfBuilder;

    #[allow(clippy::default_constructed_unit_structs)]
    let mut vcf_reader = VcfBuilder::default()
        .build_from_path(vcf_fn)
        .with_context(|| format!("Error while opening {vcf_fn:?}:"))?;
    let vcf_header = vcf_reader.read_header()
        .with_context(|| format!("Error while reading header of {vcf_fn:?}:"))?;

    let num_samples = vcf_header.sample_names().len();
    if num_samples > 0 && sample_index >= num_samples {
        bail!("Sample index {sample_index} does not exist, {vcf_fn:?} has {num_samples} sample(s).");
    }

    let mut calls = vec![];
    let mut skipped = 0;
    for result in vcf_reader.records(&vcf_header) {
        let parsed = match result {
            Ok(record) => parse_variant_record(&vcf_header, record.as_ref(), sample_index),
            // a line that does not parse is a bad record, anything else is a broken stream
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(MalformedRecord::new(format!("in {vcf_fn:?}"), e).into()),
            Err(e) => Err(anyhow::Error::from(e).context(format!("Error while reading record from {vcf_fn:?}:")))
        };
        if let Some(record_calls) = recover_record(parsed, &mut skipped)? {
            calls.extend(record_calls);
        }
    }
    if skipped > 0 {
        info!("Skipped {skipped} malformed records in {vcf_fn:?}");
    }
    debug!("Loaded {} calls from {vcf_fn:?}", calls.len());
    Ok(calls)
}

/// Fully parses one lazily read VCF record and converts it
fn parse_variant_record(header: &vcf::Header, record: &dyn vcf::variant::Record, sample_index: usize) -> anyhow::Result<Vec<VariantRecord>> {
    let record_buf = vcf::variant::RecordBuf::try_from_variant_record(header, record)
        .map_err(|e| {
            let chrom = record.reference_sequence_name(header).unwrap_or(".");
            let position = match record.variant_start() {
                Some(Ok(p)) => p.get().to_string(),
                _ => ".".to_string()
            };
            MalformedRecord::new(format!("{chrom}:{position}"), e)
        })?;
    convert_variant_record(&record_buf, sample_index)
}

/// Converts one parsed VCF record into a call per ALT allele.
/// Symbolic and missing ALT alleles are skipped.
fn convert_variant_record(record: &vcf::variant::RecordBuf, sample_index: usize) -> anyhow::Result<Vec<VariantRecord>> {
    let chrom = record.reference_sequence_name().to_string();
    let position = record.variant_start()
        .ok_or_else(|| MalformedRecord::new(chrom.as_str(), "missing position"))?
        .get() as u64;
    let ref_allele = record.reference_bases().to_string();
    let quality = record.quality_score().map(f64::from);
    let filters = record.filters().as_ref();
    let passed = filters.is_empty() || (filters.len() == 1 && filters.contains("PASS"));

    let allele_depths = record.samples().get_index(sample_index)
        .and_then(|sample| match sample.get(ALLELE_DEPTH_KEY) {
            Some(Some(SampleValue::Array(SampleArray::Integer(depths)))) => Some(depths.clone()),
            _ => None
        });
    let reported_frequencies: Option<Vec<Option<f32>>> = match record.info().get(ALLELE_FREQUENCY_KEY) {
        Some(Some(InfoValue::Array(InfoArray::Float(values)))) => Some(values.clone()),
        Some(Some(InfoValue::Float(value))) => Some(vec![Some(*value)]),
        _ => None
    };

    let depth_at = |index: usize| -> Option<u64> {
        allele_depths.as_ref()
            .and_then(|d| d.get(index).copied().flatten())
            .and_then(|v| u64::try_from(v).ok())
    };
    let depth_ref = depth_at(0);

    let mut calls = vec![];
    for (alt_index, alt_allele) in record.alternate_bases().as_ref().iter().enumerate() {
        if alt_allele.is_empty() || alt_allele == "." || alt_allele.starts_with('<') || alt_allele == "*" {
            debug!("Skipping non-sequence ALT {alt_allele} at {chrom}:{position}");
            continue;
        }
        let reported = reported_frequencies.as_ref()
            .and_then(|f| f.get(alt_index).copied().flatten())
            .map(f64::from);
        let call = VariantRecord::new(chrom.clone(), position, ref_allele.clone(), alt_allele.clone())
            .map_err(|e| MalformedRecord::new(format!("{chrom}:{position}"), format!("{e:#}")))?
            .with_depths(depth_ref, depth_at(alt_index + 1))
            .with_quality(quality)
            .with_reported_frequency(reported)
            .with_passed(passed);
        calls.push(call);
    }
    Ok(calls)
}

/// An open BAM file with its header, streaming records in file order
pub struct AlignmentFile {
    reader: bam::io::Reader<noodles::bgzf::Reader<File>>,
    header: sam::Header
}

impl AlignmentFile {
    /// Opens the BAM and reads its header
    /// # Arguments
    /// * `bam_fn` - the BAM file to open
    pub fn open(bam_fn: &Path) -> anyhow::Result<Self> {
        #[allow(clippy::default_constructed_unit_structs)]
        let mut reader = bam::io::reader::Builder::default()
            .build_from_path(bam_fn)
            .with_context(|| format!("Error while opening {bam_fn:?}:"))?;
        let header = reader.read_header()
            .with_context(|| format!("Error while reading header of {bam_fn:?}:"))?;
        Ok(Self {
            reader, header
        })
    }

    /// Iterates over the raw records, each paired with the view the analyses consume
    pub fn records(&mut self) -> impl Iterator<Item = anyhow::Result<(bam::Record, AlignmentRecord)>> + '_ {
        let header = &self.header;
        self.reader.records()
            .map(move |result| {
                let record = result.context("Error while reading BAM record:")?;
                let alignment = convert_alignment_record(header, &record)?;
                Ok((record, alignment))
            })
    }

    /// Iterates over the analysis view only
    pub fn alignments(&mut self) -> impl Iterator<Item = anyhow::Result<AlignmentRecord>> + '_ {
        self.records().map(|r| r.map(|(_raw, alignment)| alignment))
    }

    pub fn header(&self) -> &sam::Header {
        &self.header
    }
}

/// Builds the matching view of a BAM record.
/// Secondary and supplementary alignments are placed like primaries; the caller decides whether to skip them.
/// A record whose placement cannot be decoded is reported as a `MalformedRecord`.
fn convert_alignment_record(header: &sam::Header, record: &bam::Record) -> anyhow::Result<AlignmentRecord> {
    let name = record.name().map(|n| n.to_string());
    let describe = || name.clone().unwrap_or_else(|| "<unnamed>".to_string());
    if record.flags().is_unmapped() {
        return Ok(AlignmentRecord::unmapped(name));
    }

    let (Some(ref_id), Some(start), Some(end)) = (record.reference_sequence_id(), record.alignment_start(), record.alignment_end()) else {
        // flagged as mapped but without a placement, treat as unmapped
        warn!("Alignment {name:?} is missing a placement, treating it as unmapped");
        return Ok(AlignmentRecord::unmapped(name));
    };
    let ref_id = ref_id.map_err(|e| MalformedRecord::new(describe(), e))?;
    let chrom = header.reference_sequences().get_index(ref_id)
        .map(|(chrom, _)| chrom.to_string())
        .ok_or_else(|| MalformedRecord::new(describe(), format!("reference sequence index {ref_id} is not in the header")))?;
    let (start, end) = match (start, end) {
        (Ok(start), Ok(end)) => (start.get() as u64, end.get() as u64),
        (Err(e), _) | (_, Err(e)) => return Err(MalformedRecord::new(describe(), e).into())
    };
    let locus = Locus::new(start, end)
        .map_err(|e| MalformedRecord::new(describe(), e))?;
    Ok(AlignmentRecord::mapped(name, chrom, locus))
}
