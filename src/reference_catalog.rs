
/*!
The validated sequin catalog.
A catalog is built from two independent sources: the mixture table (expected concentrations) and the annotation (placement and variant metadata).
Only identifiers present in both survive finalization.
*/

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::data_types::locus::Locus;
use crate::data_types::match_result::MatchRule;
use crate::data_types::sequins::{SequinEntry, Stratum, VariantDescriptor};
use crate::interval_engine::IntervalEngine;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("no sequin identifiers are shared between the mixture ({mixture_count} ids) and the annotation ({annotation_count} ids)")]
    EmptyIntersection { mixture_count: usize, annotation_count: usize },
    #[error("the annotation does not contain any regions")]
    EmptyAnnotation,
    #[error("sequin {id} has a zero-length region")]
    ZeroLengthRegion { id: String },
    #[error("sequin {id} is annotated more than once")]
    DuplicateAnnotation { id: String }
}

/// Per-identifier mixture information before finalization
#[derive(Clone, Debug, Default)]
struct MixtureEntry {
    /// Sequin length from the mixture table, if provided
    length: Option<u64>,
    /// Mixture label to concentration
    concentrations: BTreeMap<String, f64>
}

/// Per-identifier annotation information before finalization
#[derive(Clone, Debug)]
struct AnnotationEntry {
    chrom: String,
    locus: Locus,
    variant: Option<VariantDescriptor>,
    copy_number: Option<u32>
}

/// Result of intersecting two identifier sets
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdIntersection {
    /// Identifiers in both sets
    pub shared: BTreeSet<String>,
    /// Identifiers only in the first set
    pub only_first: BTreeSet<String>,
    /// Identifiers only in the second set
    pub only_second: BTreeSet<String>
}

/// Splits two identifier sets into shared and one-sided identifiers
pub fn intersect_ids(first: &BTreeSet<String>, second: &BTreeSet<String>) -> IdIntersection {
    IdIntersection {
        shared: first.intersection(second).cloned().collect(),
        only_first: first.difference(second).cloned().collect(),
        only_second: second.difference(first).cloned().collect()
    }
}

/// Accumulates mixture and annotation rows until `finalize` is called
#[derive(Clone, Debug, Default)]
pub struct CatalogBuilder {
    mixture: BTreeMap<String, MixtureEntry>,
    annotation: BTreeMap<String, AnnotationEntry>,
    /// Mixture labels in the order they were first seen
    mixture_labels: Vec<String>
}

impl CatalogBuilder {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one concentration for one identifier in one mixture.
    /// Non-finite concentrations are skipped with a warning; returns true if the value was stored.
    /// # Arguments
    /// * `id` - sequin identifier
    /// * `length` - sequin length from the mixture table, if known
    /// * `concentration` - expected concentration
    /// * `mixture` - mixture label, e.g. "A"
    /// # Errors
    /// * if `length` is provided and is 0
    pub fn add_mixture(&mut self, id: &str, length: Option<u64>, concentration: f64, mixture: &str) -> Result<bool, CatalogError> {
        if length == Some(0) {
            return Err(CatalogError::ZeroLengthRegion { id: id.to_string() });
        }
        if !self.mixture_labels.iter().any(|m| m == mixture) {
            self.mixture_labels.push(mixture.to_string());
        }

        let entry = self.mixture.entry(id.to_string()).or_default();
        if length.is_some() {
            entry.length = length;
        }
        if !concentration.is_finite() {
            warn!("Skipping non-finite concentration for {id} in mixture {mixture}");
            return Ok(false);
        }
        if entry.concentrations.insert(mixture.to_string(), concentration).is_some() {
            warn!("Concentration for {id} in mixture {mixture} was provided more than once, keeping the last");
        }
        Ok(true)
    }

    /// Adds the placement of one identifier
    /// # Arguments
    /// * `id` - sequin identifier
    /// * `chrom` - chromosome of the region
    /// * `start` - first included base, 1-based
    /// * `end` - last included base, 1-based; must be >= `start`
    /// * `variant` - optional variant carried by the sequin
    /// * `copy_number` - optional copy number
    /// # Errors
    /// * if the region has no bases
    /// * if the identifier was already annotated
    pub fn add_annotation(
        &mut self, id: &str, chrom: &str, start: u64, end: u64,
        variant: Option<VariantDescriptor>, copy_number: Option<u32>
    ) -> Result<(), CatalogError> {
        let locus = Locus::new(start, end)
            .map_err(|_| CatalogError::ZeroLengthRegion { id: id.to_string() })?;
        if self.annotation.contains_key(id) {
            return Err(CatalogError::DuplicateAnnotation { id: id.to_string() });
        }
        self.annotation.insert(id.to_string(), AnnotationEntry {
            chrom: chrom.to_string(),
            locus,
            variant,
            copy_number
        });
        Ok(())
    }

    /// Keeps exactly the identifiers present in both the mixture and the annotation.
    /// One-sided identifiers are dropped with a warning.
    /// # Errors
    /// * if no identifier is shared
    pub fn finalize(self) -> Result<ReferenceCatalog, CatalogError> {
        let mixture_ids: BTreeSet<String> = self.mixture.keys().cloned().collect();
        let annotation_ids: BTreeSet<String> = self.annotation.keys().cloned().collect();
        let split = intersect_ids(&mixture_ids, &annotation_ids);

        for id in split.only_first.iter() {
            warn!("Sequin {id} is in the mixture but not the annotation, ignoring it");
        }
        for id in split.only_second.iter() {
            warn!("Sequin {id} is in the annotation but not the mixture, ignoring it");
        }
        if split.shared.is_empty() {
            return Err(CatalogError::EmptyIntersection {
                mixture_count: mixture_ids.len(),
                annotation_count: annotation_ids.len()
            });
        }

        let mut mixture = self.mixture;
        let mut annotation = self.annotation;
        let mut entries: BTreeMap<String, SequinEntry> = Default::default();
        for id in split.shared.into_iter() {
            // both are guaranteed by the intersection
            let (Some(mix), Some(annot)) = (mixture.remove(&id), annotation.remove(&id)) else {
                continue;
            };
            if let Some(length) = mix.length {
                if length != annot.locus.length() {
                    debug!("Sequin {id} mixture length {length} differs from annotated length {}", annot.locus.length());
                }
            }
            let entry = SequinEntry::new(
                id.clone(), annot.chrom, annot.locus,
                mix.concentrations, annot.variant, annot.copy_number
            );
            entries.insert(id, entry);
        }

        info!("Finalized catalog with {} sequins", entries.len());
        Ok(ReferenceCatalog::new(entries, self.mixture_labels))
    }

    /// Builds a catalog from the annotation alone, for analyses that never look at concentrations.
    /// # Errors
    /// * if the annotation is empty
    pub fn finalize_annotation_only(self) -> Result<ReferenceCatalog, CatalogError> {
        if self.annotation.is_empty() {
            return Err(CatalogError::EmptyAnnotation);
        }
        let entries: BTreeMap<String, SequinEntry> = self.annotation.into_iter()
            .map(|(id, annot)| {
                let entry = SequinEntry::new(
                    id.clone(), annot.chrom, annot.locus,
                    Default::default(), annot.variant, annot.copy_number
                );
                (id, entry)
            })
            .collect();
        info!("Finalized annotation-only catalog with {} regions", entries.len());
        Ok(ReferenceCatalog::new(entries, vec![]))
    }
}

/// Immutable, validated set of sequins with positional indices
#[derive(Clone, Debug)]
pub struct ReferenceCatalog {
    /// Identifier to entry
    entries: BTreeMap<String, SequinEntry>,
    /// Mixture labels in first-seen order
    mixtures: Vec<String>,
    /// Index over every entry region, used for matching
    index: IntervalEngine,
    /// Index over merged entry regions, used to label records that do not match
    attribution: IntervalEngine
}

impl ReferenceCatalog {
    fn new(entries: BTreeMap<String, SequinEntry>, mixtures: Vec<String>) -> Self {
        let regions = || entries.values()
            .map(|e| (e.chrom().to_string(), e.id().to_string(), *e.locus()));
        let index = IntervalEngine::new(regions());
        let attribution = IntervalEngine::new_merged(regions());
        Self {
            entries, mixtures, index, attribution
        }
    }

    /// Entry lookup by identifier
    pub fn get(&self, id: &str) -> Option<&SequinEntry> {
        self.entries.get(id)
    }

    /// Entry lookup by position
    /// # Arguments
    /// * `chrom` - the query chromosome
    /// * `locus` - the query span
    /// * `rule` - how the entry region must relate to the query
    pub fn find_by_locus(&self, chrom: &str, locus: &Locus, rule: MatchRule) -> Option<&SequinEntry> {
        self.index.find(chrom, locus, rule)
            .and_then(|region| self.entries.get(region.id()))
    }

    /// Labels a position with the merged reference region it overlaps, if any.
    /// Overlap is used rather than containment: variant entries span only their reference allele, so a nearby
    /// call running across one would never be contained by it. The label is informational and never counted.
    pub fn attribute(&self, chrom: &str, locus: &Locus) -> Option<&str> {
        self.attribution.find(chrom, locus, MatchRule::Overlap)
            .map(|region| region.id())
    }

    /// Entries matching a predicate, in identifier order
    pub fn filter<'a, F>(&'a self, predicate: F) -> impl Iterator<Item = &'a SequinEntry> + 'a
    where
        F: Fn(&SequinEntry) -> bool + 'a
    {
        self.entries.values().filter(move |e| predicate(*e))
    }

    /// Number of entries counted in a stratum
    pub fn count_stratum(&self, stratum: &Stratum) -> u64 {
        self.filter(|e| e.in_stratum(stratum)).count() as u64
    }

    /// Zero-initialized detection counts for every entry
    pub fn histogram(&self) -> BTreeMap<String, u64> {
        self.entries.keys()
            .map(|id| (id.clone(), 0))
            .collect()
    }

    /// A fresh interval engine over the merged entry regions, with zeroed depth counters.
    /// Merged regions never overlap, so per-base coverage is counted once per base.
    pub fn region_engine(&self) -> IntervalEngine {
        let mut engine = self.attribution.clone();
        engine.reset_depth();
        engine
    }

    /// Returns true if any entry is placed on `chrom`
    pub fn has_chrom(&self, chrom: &str) -> bool {
        self.index.has_chrom(chrom)
    }

    /// Returns true if `mixture` was seen while building
    pub fn has_mixture(&self, mixture: &str) -> bool {
        self.mixtures.iter().any(|m| m == mixture)
    }

    // getters
    pub fn entries(&self) -> &BTreeMap<String, SequinEntry> {
        &self.entries
    }

    pub fn mixtures(&self) -> &[String] {
        &self.mixtures
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
