
use serde::Serialize;
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::data_types::locus::Locus;

/// Mutation kinds we classify calls and sequins into
#[derive(Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize)]
#[strum(ascii_case_insensitive)]
pub enum MutationKind {
    /// REF and ALT have the same length
    #[strum(to_string = "SNP", serialize = "SNV")]
    Snp,
    /// REF shorter than ALT
    #[strum(to_string = "Insertion", serialize = "INS")]
    Insertion,
    /// REF longer than ALT
    #[strum(to_string = "Deletion", serialize = "DEL")]
    Deletion
}

impl MutationKind {
    /// Classifies by allele lengths: equal is a SNP, longer reference is a deletion, shorter is an insertion.
    /// # Arguments
    /// * `ref_len` - length of the reference allele
    /// * `alt_len` - length of the alternate allele
    pub fn from_lengths(ref_len: usize, alt_len: usize) -> Self {
        match ref_len.cmp(&alt_len) {
            std::cmp::Ordering::Equal => MutationKind::Snp,
            std::cmp::Ordering::Greater => MutationKind::Deletion,
            std::cmp::Ordering::Less => MutationKind::Insertion
        }
    }
}

/// Expected genotype of a variant sequin
#[derive(Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize)]
#[strum(ascii_case_insensitive)]
pub enum Genotype {
    #[strum(to_string = "Homozygous", serialize = "HOM", serialize = "1/1")]
    Homozygous,
    #[strum(to_string = "Heterozygous", serialize = "HET", serialize = "0/1")]
    Heterozygous,
    #[strum(to_string = "Somatic", serialize = "SOM")]
    Somatic
}

/// Classification of the sequence surrounding a variant sequin
#[derive(Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize)]
#[strum(ascii_case_insensitive)]
pub enum ContextClass {
    #[strum(to_string = "Common")]
    Common,
    #[strum(to_string = "Cancer")]
    Cancer,
    #[strum(to_string = "VeryLowGC")]
    VeryLowGc,
    #[strum(to_string = "LowGC")]
    LowGc,
    #[strum(to_string = "HighGC")]
    HighGc,
    #[strum(to_string = "VeryHighGC")]
    VeryHighGc,
    #[strum(to_string = "ShortHomopolymer")]
    ShortHomopolymer,
    #[strum(to_string = "LongHomopolymer")]
    LongHomopolymer,
    #[strum(to_string = "ShortDinucleotideRepeat")]
    ShortDinucleotideRepeat,
    #[strum(to_string = "LongDinucleotideRepeat")]
    LongDinucleotideRepeat,
    #[strum(to_string = "ShortTrinucleotideRepeat")]
    ShortTrinucleotideRepeat,
    #[strum(to_string = "LongTrinucleotideRepeat")]
    LongTrinucleotideRepeat,
    #[strum(to_string = "ShortQuadNucleotideRepeat")]
    ShortQuadNucleotideRepeat,
    #[strum(to_string = "LongQuadNucleotideRepeat")]
    LongQuadNucleotideRepeat
}

/// A stratification key that confusion counters and regression sets are grouped by
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize)]
pub enum Stratum {
    /// Every record, always present
    Overall,
    Mutation(MutationKind),
    Context(ContextClass),
    Genotype(Genotype)
}

impl Stratum {
    /// Every stratum a variant analysis reports on, overall first
    pub fn variant_strata() -> Vec<Stratum> {
        std::iter::once(Stratum::Overall)
            .chain(MutationKind::iter().map(Stratum::Mutation))
            .chain(ContextClass::iter().map(Stratum::Context))
            .chain(Genotype::iter().map(Stratum::Genotype))
            .collect()
    }

    /// The grouping this stratum belongs to, used as a report column
    pub fn category(&self) -> &'static str {
        match self {
            Stratum::Overall => "ALL",
            Stratum::Mutation(_) => "Mutation",
            Stratum::Context(_) => "Context",
            Stratum::Genotype(_) => "Genotype"
        }
    }

    /// The label inside the category
    pub fn label(&self) -> String {
        match self {
            Stratum::Overall => "ALL".to_string(),
            Stratum::Mutation(m) => m.to_string(),
            Stratum::Context(c) => c.to_string(),
            Stratum::Genotype(g) => g.to_string()
        }
    }
}

impl std::fmt::Display for Stratum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stratum::Overall => write!(f, "ALL"),
            _ => write!(f, "{}:{}", self.category(), self.label())
        }
    }
}

/// Known variant carried by a sequin
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VariantDescriptor {
    /// Reference allele, compared case-sensitively
    ref_allele: String,
    /// Alternate allele, compared case-sensitively
    alt_allele: String,
    genotype: Genotype,
    context: ContextClass
}

impl VariantDescriptor {
    /// Constructor
    pub fn new(ref_allele: String, alt_allele: String, genotype: Genotype, context: ContextClass) -> Self {
        Self {
            ref_allele, alt_allele, genotype, context
        }
    }

    /// Mutation kind derived from the allele lengths
    pub fn kind(&self) -> MutationKind {
        MutationKind::from_lengths(self.ref_allele.len(), self.alt_allele.len())
    }

    // getters
    pub fn ref_allele(&self) -> &str {
        &self.ref_allele
    }

    pub fn alt_allele(&self) -> &str {
        &self.alt_allele
    }

    pub fn genotype(&self) -> Genotype {
        self.genotype
    }

    pub fn context(&self) -> ContextClass {
        self.context
    }
}

/// A validated sequin, only created by the reference catalog.
/// It is immutable after catalog finalization.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SequinEntry {
    /// Sequin identifier, e.g. "D_1_12_R"
    id: String,
    /// Chromosome (or sequin decoy contig) the sequin is annotated on
    chrom: String,
    /// Annotated locus
    locus: Locus,
    /// Mixture label to expected concentration
    concentrations: BTreeMap<String, f64>,
    /// Variant metadata when the annotation carries one
    variant: Option<VariantDescriptor>,
    /// Copy number when the annotation carries one
    copy_number: Option<u32>
}

impl SequinEntry {
    /// Constructor, only the catalog builds these
    pub(crate) fn new(
        id: String, chrom: String, locus: Locus,
        concentrations: BTreeMap<String, f64>,
        variant: Option<VariantDescriptor>, copy_number: Option<u32>
    ) -> Self {
        Self {
            id, chrom, locus, concentrations, variant, copy_number
        }
    }

    /// Expected concentration in a mixture
    pub fn concentration(&self, mixture: &str) -> Option<f64> {
        self.concentrations.get(mixture).copied()
    }

    /// All strata this sequin contributes to; always includes `Stratum::Overall`
    pub fn strata(&self) -> Vec<Stratum> {
        let mut ret = vec![Stratum::Overall];
        if let Some(variant) = self.variant.as_ref() {
            ret.push(Stratum::Mutation(variant.kind()));
            ret.push(Stratum::Context(variant.context()));
            ret.push(Stratum::Genotype(variant.genotype()));
        }
        ret
    }

    /// Returns true if this sequin is counted in the given stratum
    pub fn in_stratum(&self, stratum: &Stratum) -> bool {
        match (stratum, self.variant.as_ref()) {
            (Stratum::Overall, _) => true,
            (Stratum::Mutation(m), Some(v)) => v.kind() == *m,
            (Stratum::Context(c), Some(v)) => v.context() == *c,
            (Stratum::Genotype(g), Some(v)) => v.genotype() == *g,
            (_, None) => false
        }
    }

    // getters
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn locus(&self) -> &Locus {
        &self.locus
    }

    pub fn concentrations(&self) -> &BTreeMap<String, f64> {
        &self.concentrations
    }

    pub fn variant(&self) -> Option<&VariantDescriptor> {
        self.variant.as_ref()
    }

    pub fn copy_number(&self) -> Option<u32> {
        self.copy_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_mutation_kind_from_lengths() {
        assert_eq!(MutationKind::from_lengths(1, 1), MutationKind::Snp);
        assert_eq!(MutationKind::from_lengths(3, 3), MutationKind::Snp);
        assert_eq!(MutationKind::from_lengths(3, 1), MutationKind::Deletion);
        assert_eq!(MutationKind::from_lengths(1, 4), MutationKind::Insertion);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(MutationKind::from_str("snp").unwrap(), MutationKind::Snp);
        assert_eq!(Genotype::from_str("het").unwrap(), Genotype::Heterozygous);
        assert_eq!(Genotype::from_str("Homozygous").unwrap(), Genotype::Homozygous);
        assert_eq!(ContextClass::from_str("highgc").unwrap(), ContextClass::HighGc);
        assert!(ContextClass::from_str("not_a_context").is_err());
        assert_eq!(ContextClass::LongHomopolymer.to_string(), "LongHomopolymer");
    }

    #[test]
    fn test_entry_strata() {
        let variant = VariantDescriptor::new("A".to_string(), "AGT".to_string(), Genotype::Heterozygous, ContextClass::Common);
        let entry = SequinEntry::new(
            "S1".to_string(), "chrQ".to_string(), Locus::new(100, 100).unwrap(),
            [("A".to_string(), 10.0)].into_iter().collect(), Some(variant), None
        );
        assert_eq!(entry.strata(), vec![
            Stratum::Overall,
            Stratum::Mutation(MutationKind::Insertion),
            Stratum::Context(ContextClass::Common),
            Stratum::Genotype(Genotype::Heterozygous)
        ]);
        assert!(entry.in_stratum(&Stratum::Mutation(MutationKind::Insertion)));
        assert!(!entry.in_stratum(&Stratum::Mutation(MutationKind::Snp)));
        assert_eq!(entry.concentration("A"), Some(10.0));
        assert_eq!(entry.concentration("B"), None);

        // no variant means only the overall stratum
        let plain = SequinEntry::new(
            "S2".to_string(), "chrQ".to_string(), Locus::new(1, 500).unwrap(),
            Default::default(), None, Some(2)
        );
        assert_eq!(plain.strata(), vec![Stratum::Overall]);
        assert!(!plain.in_stratum(&Stratum::Genotype(Genotype::Somatic)));
    }

    #[test]
    fn test_variant_strata_enumeration() {
        let strata = Stratum::variant_strata();
        assert_eq!(strata[0], Stratum::Overall);
        assert_eq!(strata.len(), 1 + 3 + 14 + 3);
        assert_eq!(Stratum::Mutation(MutationKind::Snp).to_string(), "Mutation:SNP");
    }
}
