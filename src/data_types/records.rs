
use log::warn;
use serde::Serialize;

use crate::data_types::locus::Locus;
use crate::data_types::sequins::MutationKind;

/// A single input record that could not be converted.
/// Analyses skip these with a warning instead of stopping the stream.
#[derive(thiserror::Error, Debug)]
#[error("malformed record {record}: {reason}")]
pub struct MalformedRecord {
    /// Where the record sits, e.g. "chrQ:1001" or a read name
    record: String,
    reason: String
}

impl MalformedRecord {
    /// Constructor
    pub fn new(record: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            record: record.into(),
            reason: reason.to_string()
        }
    }
}

/// Separates a record that should be skipped from a failure of the stream itself.
/// A malformed record is logged, counted in `skipped`, and returned as `Ok(None)`; any other error is passed back.
/// # Arguments
/// * `result` - one item from a record stream
/// * `skipped` - running count of skipped records
pub fn recover_record<R, E>(result: Result<R, E>, skipped: &mut u64) -> anyhow::Result<Option<R>>
where
    E: Into<anyhow::Error>
{
    let error: anyhow::Error = match result {
        Ok(record) => return Ok(Some(record)),
        Err(e) => e.into()
    };
    if error.downcast_ref::<MalformedRecord>().is_some() {
        warn!("Skipping {error:#}");
        *skipped += 1;
        Ok(None)
    } else {
        Err(error)
    }
}

/// Common view of anything observed in sequencing output that can be matched against the catalog
pub trait ObservedRecord {
    /// Chromosome or contig the record is placed on
    fn chrom(&self) -> &str;

    /// Placement of the record, `None` if the record is not placed (e.g. unmapped)
    fn locus(&self) -> Option<Locus>;

    /// Reference and alternate alleles, if this record carries any.
    /// Records without alleles are compared on position only.
    fn alleles(&self) -> Option<(&str, &str)> {
        None
    }

    /// The mutation kind implied by the record itself, independent of any match
    fn intrinsic_kind(&self) -> Option<MutationKind> {
        self.alleles()
            .map(|(r, a)| MutationKind::from_lengths(r.len(), a.len()))
    }

    /// Observed abundance this record contributes to its matched entry
    fn observed_abundance(&self) -> f64 {
        1.0
    }
}

/// A single alignment, only the fields matching and subsampling look at
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlignmentRecord {
    /// Read name; records without one share the empty name for sampling purposes
    name: Option<String>,
    /// Reference sequence name, empty when unmapped
    chrom: String,
    /// Whether the aligner placed this read
    mapped: bool,
    /// Aligned span; always `None` when unmapped
    locus: Option<Locus>
}

impl AlignmentRecord {
    /// A placed alignment
    pub fn mapped(name: Option<String>, chrom: String, locus: Locus) -> Self {
        Self {
            name, chrom, mapped: true, locus: Some(locus)
        }
    }

    /// An alignment the aligner could not place
    pub fn unmapped(name: Option<String>) -> Self {
        Self {
            name, chrom: String::new(), mapped: false, locus: None
        }
    }

    // getters
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

impl ObservedRecord for AlignmentRecord {
    fn chrom(&self) -> &str {
        &self.chrom
    }

    fn locus(&self) -> Option<Locus> {
        if self.mapped { self.locus } else { None }
    }
}

/// A variant call, with a single alternate allele
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariantRecord {
    chrom: String,
    /// Position through the end of the reference allele
    locus: Locus,
    ref_allele: String,
    alt_allele: String,
    /// Reads supporting the reference allele
    depth_ref: Option<u64>,
    /// Reads supporting the alternate allele
    depth_alt: Option<u64>,
    /// QUAL column
    quality: Option<f64>,
    /// Allele frequency reported by the caller, used when read depths are absent
    reported_frequency: Option<f64>,
    /// True when FILTER is PASS or missing
    passed: bool
}

impl VariantRecord {
    /// Constructor, the locus spans the reference allele starting at `position`
    /// # Arguments
    /// * `chrom` - the chromosome of the call
    /// * `position` - 1-based position of the first reference base
    /// * `ref_allele` - the reference allele, must be non-empty
    /// * `alt_allele` - the single alternate allele
    /// # Errors
    /// * if `position` is 0 or `ref_allele` is empty
    pub fn new(chrom: String, position: u64, ref_allele: String, alt_allele: String) -> anyhow::Result<Self> {
        anyhow::ensure!(!ref_allele.is_empty(), "Empty reference allele at {chrom}:{position}");
        let locus = Locus::new(position, position + ref_allele.len() as u64 - 1)?;
        Ok(Self {
            chrom, locus, ref_allele, alt_allele,
            depth_ref: None,
            depth_alt: None,
            quality: None,
            reported_frequency: None,
            passed: true
        })
    }

    /// Attaches per-allele read depths
    pub fn with_depths(mut self, depth_ref: Option<u64>, depth_alt: Option<u64>) -> Self {
        self.depth_ref = depth_ref;
        self.depth_alt = depth_alt;
        self
    }

    /// Attaches the QUAL value
    pub fn with_quality(mut self, quality: Option<f64>) -> Self {
        self.quality = quality;
        self
    }

    /// Attaches a caller-reported allele frequency
    pub fn with_reported_frequency(mut self, frequency: Option<f64>) -> Self {
        self.reported_frequency = frequency;
        self
    }

    /// Sets the FILTER status
    pub fn with_passed(mut self, passed: bool) -> Self {
        self.passed = passed;
        self
    }

    /// Allele frequency computed from read depths, falling back to the reported value.
    /// Returns `None` if neither is usable.
    pub fn allele_frequency(&self) -> Option<f64> {
        match (self.depth_ref, self.depth_alt) {
            (Some(r), Some(a)) if r + a > 0 => Some(a as f64 / (r + a) as f64),
            _ => self.reported_frequency.filter(|f| f.is_finite())
        }
    }

    // getters
    pub fn position(&self) -> u64 {
        self.locus.start()
    }

    pub fn ref_allele(&self) -> &str {
        &self.ref_allele
    }

    pub fn alt_allele(&self) -> &str {
        &self.alt_allele
    }

    pub fn depth_ref(&self) -> Option<u64> {
        self.depth_ref
    }

    pub fn depth_alt(&self) -> Option<u64> {
        self.depth_alt
    }

    pub fn quality(&self) -> Option<f64> {
        self.quality
    }

    pub fn passed(&self) -> bool {
        self.passed
    }
}

impl ObservedRecord for VariantRecord {
    fn chrom(&self) -> &str {
        &self.chrom
    }

    fn locus(&self) -> Option<Locus> {
        Some(self.locus)
    }

    fn alleles(&self) -> Option<(&str, &str)> {
        Some((&self.ref_allele, &self.alt_allele))
    }

    fn observed_abundance(&self) -> f64 {
        self.allele_frequency().unwrap_or(0.0)
    }
}

/// An assembled contig placed on the reference
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContigRecord {
    id: String,
    chrom: String,
    locus: Locus,
    /// Mean k-mer or read coverage reported by the assembler
    coverage: f64
}

impl ContigRecord {
    /// Constructor
    pub fn new(id: String, chrom: String, locus: Locus, coverage: f64) -> Self {
        Self {
            id, chrom, locus, coverage
        }
    }

    // getters
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coverage(&self) -> f64 {
        self.coverage
    }
}

impl ObservedRecord for ContigRecord {
    fn chrom(&self) -> &str {
        &self.chrom
    }

    fn locus(&self) -> Option<Locus> {
        Some(self.locus)
    }

    fn observed_abundance(&self) -> f64 {
        self.coverage
    }
}
