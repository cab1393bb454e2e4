/*!
# Parsing module
Contains the logic for parsing input files into meaningful structs / data.
*/
/// BED-style readers for the annotation, plain regions, and contigs
pub mod annotation;
/// Mixture table reader
pub mod mixture;
/// Helper functions for noodles, covering VCF and BAM input
pub mod noodles_helper;

use anyhow::Context;
use std::path::Path;

use crate::reference_catalog::{CatalogBuilder, ReferenceCatalog};

/// Loads the mixture and annotation and keeps the sequins present in both
/// # Arguments
/// * `mixture_fn` - the mixture CSV
/// * `annotation_fn` - the annotation BED
/// # Errors
/// * if either file fails to parse
/// * if no sequin is shared between the two
pub fn load_catalog(mixture_fn: &Path, annotation_fn: &Path) -> anyhow::Result<ReferenceCatalog> {
    let mut builder = CatalogBuilder::new();
    mixture::load_mixture(mixture_fn, &mut builder)?;
    annotation::load_annotation(annotation_fn, &mut builder)?;
    let catalog = builder.finalize()
        .with_context(|| format!("Error while combining {mixture_fn:?} and {annotation_fn:?}:"))?;
    Ok(catalog)
}

/// Loads the annotation alone, for analyses that only need sequin positions
/// # Arguments
/// * `annotation_fn` - the annotation BED
/// # Errors
/// * if the file fails to parse or holds no sequins
pub fn load_annotation_catalog(annotation_fn: &Path) -> anyhow::Result<ReferenceCatalog> {
    let mut builder = CatalogBuilder::new();
    annotation::load_annotation(annotation_fn, &mut builder)?;
    let catalog = builder.finalize_annotation_only()
        .with_context(|| format!("Error while indexing {annotation_fn:?}:"))?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_catalog() {
        let catalog = load_catalog(
            &PathBuf::from("./test_data/mixture.csv"),
            &PathBuf::from("./test_data/annotation.bed")
        ).unwrap();
        // G1 and G2 are in both files
        assert_eq!(catalog.len(), 2);
        assert!(catalog.has_mixture("A"));
        assert!(catalog.has_mixture("B"));
        assert!(catalog.has_chrom("chrIS"));
        assert!(!catalog.has_chrom("chrQ"));
    }

    #[test]
    fn test_load_annotation_catalog() {
        let catalog = load_annotation_catalog(&PathBuf::from("./test_data/annotation.bed")).unwrap();
        assert_eq!(catalog.len(), 4);
        assert!(catalog.has_chrom("chrQ"));
        assert!(catalog.mixtures().is_empty());
        assert!(load_annotation_catalog(&PathBuf::from("./test_data/missing.bed")).is_err());
    }
}
