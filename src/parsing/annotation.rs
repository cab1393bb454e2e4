
/*!
Readers for BED-style inputs: the sequin annotation, plain named regions for subsampling, and placed contigs.
All of them are 0-based half-open on disk and 1-based closed once loaded.
*/

use anyhow::{Context, anyhow, bail, ensure};
use log::{debug, info};
use std::path::Path;
use std::str::FromStr;

use crate::data_types::locus::Locus;
use crate::data_types::records::ContigRecord;
use crate::data_types::sequins::{ContextClass, Genotype, VariantDescriptor};
use crate::interval_engine::IntervalEngine;
use crate::parsing::noodles_helper::open_text_file;
use crate::reference_catalog::CatalogBuilder;

/// One parsed annotation line
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationRow {
    pub chrom: String,
    /// 1-based closed span; for variant rows this is derived from the reference allele
    pub locus: Locus,
    /// Column 4, `None` for unnamed rows
    pub name: Option<String>,
    pub variant: Option<VariantDescriptor>,
    pub copy_number: Option<u32>
}

impl AnnotationRow {
    /// The name, or a positional label for unnamed rows
    pub fn label(&self) -> String {
        match self.name.as_ref() {
            Some(name) => name.clone(),
            None => format!("{}:{}", self.chrom, self.locus)
        }
    }
}

/// Treats "." and empty columns as absent
fn optional_column<'a>(record: &'a csv::StringRecord, index: usize) -> Option<&'a str> {
    record.get(index)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && *v != ".")
}

/// Parses one BED line with the optional variant columns `ref alt genotype context copy_number`.
/// # Arguments
/// * `record` - the tab-split line
/// # Errors
/// * if the coordinates are missing or not integers
/// * if only some of the variant columns are present, or they do not parse
pub fn parse_annotation_row(record: &csv::StringRecord) -> anyhow::Result<AnnotationRow> {
    ensure!(record.len() >= 3, "Expected at least 3 columns, found {}", record.len());
    let chrom = record[0].trim().to_string();
    let start: u64 = record[1].trim().parse()
        .with_context(|| format!("Error while parsing start {:?}", &record[1]))?;
    let end: u64 = record[2].trim().parse()
        .with_context(|| format!("Error while parsing end {:?}", &record[2]))?;
    let name = optional_column(record, 3).map(|s| s.to_string());

    let variant_columns: Vec<Option<&str>> = (4..8).map(|i| optional_column(record, i)).collect();
    let variant = match variant_columns.as_slice() {
        [None, None, None, None] => None,
        [Some(ref_allele), Some(alt_allele), Some(genotype), Some(context)] => {
            let genotype = Genotype::from_str(genotype)
                .map_err(|_| anyhow!("Unknown genotype {genotype:?}"))?;
            let context = ContextClass::from_str(context)
                .map_err(|_| anyhow!("Unknown context class {context:?}"))?;
            Some(VariantDescriptor::new(ref_allele.to_string(), alt_allele.to_string(), genotype, context))
        },
        _ => bail!("Variant rows need all of ref, alt, genotype, and context; found {variant_columns:?}")
    };
    let copy_number = optional_column(record, 8)
        .map(|v| v.parse::<u32>().with_context(|| format!("Error while parsing copy number {v:?}")))
        .transpose()?;

    // the variant locus must line up with how calls are placed: POS through POS + len(REF) - 1
    let locus = match variant.as_ref() {
        Some(v) => Locus::new(start + 1, start + v.ref_allele().len() as u64),
        None => Locus::from_half_open(start, end)
    }.with_context(|| format!("Region {chrom}:{start}-{end} has no bases"))?;

    Ok(AnnotationRow {
        chrom, locus, name, variant, copy_number
    })
}

/// Loads every row of a BED(.gz) file; comment, track, and browser lines are skipped.
/// # Arguments
/// * `filename` - the BED file to load
pub fn load_annotation_rows(filename: &Path) -> anyhow::Result<Vec<AnnotationRow>> {
    debug!("Loading {filename:?}...");
    let reader = open_text_file(filename)?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(reader);

    let mut rows = vec![];
    for (line_index, result) in csv_reader.records().enumerate() {
        let record = result
            .with_context(|| format!("Error while reading {filename:?}:"))?;
        let first = record.get(0).unwrap_or_default();
        if first.is_empty() || first.starts_with("track") || first.starts_with("browser") {
            continue;
        }
        let row = parse_annotation_row(&record)
            .with_context(|| format!("Error while parsing record {} of {filename:?}", line_index + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Loads the sequin annotation into a catalog builder, returns the number of rows added.
/// # Arguments
/// * `filename` - the annotation BED file
/// * `builder` - receives one annotation per row
/// # Errors
/// * if a row is unnamed, malformed, or a duplicate
pub fn load_annotation(filename: &Path, builder: &mut CatalogBuilder) -> anyhow::Result<usize> {
    let rows = load_annotation_rows(filename)?;
    let num_rows = rows.len();
    for row in rows.into_iter() {
        let name = row.name
            .ok_or(anyhow!("Annotation row at {}:{} has no name", row.chrom, row.locus))?;
        builder.add_annotation(&name, &row.chrom, row.locus.start(), row.locus.end(), row.variant, row.copy_number)
            .with_context(|| format!("Error while adding annotation from {filename:?}:"))?;
    }
    info!("Loaded {num_rows} annotation rows from {filename:?}");
    Ok(num_rows)
}

/// Loads named regions into an interval engine; unnamed regions are labelled by position.
/// # Arguments
/// * `filename` - the BED file of regions
/// * `merge` - if true, overlapping regions are merged
pub fn load_region_engine(filename: &Path, merge: bool) -> anyhow::Result<IntervalEngine> {
    let rows = load_annotation_rows(filename)?;
    let regions: Vec<(String, String, Locus)> = rows.into_iter()
        .map(|row| (row.chrom.clone(), row.label(), row.locus))
        .collect();
    let engine = if merge {
        IntervalEngine::new_merged(regions)
    } else {
        IntervalEngine::new(regions)
    };
    info!("Loaded {} regions from {filename:?}", engine.len());
    Ok(engine)
}

/// Loads placed contigs from a BED5 file where the score column carries the contig coverage.
/// # Arguments
/// * `filename` - the contig BED file
pub fn load_contigs(filename: &Path) -> anyhow::Result<Vec<ContigRecord>> {
    let reader = open_text_file(filename)?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(reader);

    let mut contigs = vec![];
    for result in csv_reader.records() {
        let record = result
            .with_context(|| format!("Error while reading {filename:?}:"))?;
        ensure!(record.len() >= 5, "Contig rows need 5 columns, found {} in {filename:?}", record.len());
        let start: u64 = record[1].trim().parse()
            .with_context(|| format!("Error while parsing start {:?}", &record[1]))?;
        let end: u64 = record[2].trim().parse()
            .with_context(|| format!("Error while parsing end {:?}", &record[2]))?;
        let coverage: f64 = record[4].trim().parse()
            .with_context(|| format!("Error while parsing coverage {:?}", &record[4]))?;
        let locus = Locus::from_half_open(start, end)
            .with_context(|| format!("Contig {} has no bases", &record[3]))?;
        contigs.push(ContigRecord::new(record[3].to_string(), record[0].to_string(), locus, coverage));
    }
    info!("Loaded {} contigs from {filename:?}", contigs.len());
    Ok(contigs)
}
