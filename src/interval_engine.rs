
/*!
Per-chromosome interval sets used for every positional lookup.
Regions are kept sorted by (start, end) with ties in insertion order, and a COITree over the same regions answers
overlap queries. When several regions qualify for a query, the first one in that stored order wins.
*/

use coitrees::{COITree, Interval, IntervalTree};
use indexmap::IndexMap;
use itertools::Itertools;
use log::trace;

use crate::data_types::locus::Locus;
use crate::data_types::match_result::MatchRule;
use crate::data_types::normalization::CoverageStats;
use crate::util::stats::{mean, median};

/// A single indexed region with its depth counters
#[derive(Clone, Debug)]
pub struct Region {
    /// Owning identifier; for merged regions this is the first member
    id: String,
    /// Region span
    locus: Locus,
    /// All identifiers coalesced into this region, in position order
    members: Vec<String>,
    /// Per-base depth, allocated on first use
    depth: Vec<u32>,
    /// Number of alignments counted against this region
    reads: u64
}

impl Region {
    fn new(id: String, locus: Locus, members: Vec<String>) -> Self {
        Self {
            id, locus, members,
            depth: vec![],
            reads: 0
        }
    }

    /// Adds one alignment covering `locus`, clipped to this region
    fn add_depth(&mut self, locus: &Locus) {
        if let Some(clipped) = self.locus.intersection(locus) {
            if self.depth.is_empty() {
                self.depth = vec![0; self.locus.length() as usize];
            }
            let offset = (clipped.start() - self.locus.start()) as usize;
            for d in self.depth[offset..offset + clipped.length() as usize].iter_mut() {
                *d += 1;
            }
            self.reads += 1;
        }
    }

    /// Clears depth and read counts
    fn reset(&mut self) {
        self.depth.clear();
        self.reads = 0;
    }

    /// Summarizes the depth counters
    pub fn stats(&self) -> CoverageStats {
        if self.depth.is_empty() {
            // nothing was ever added, every base is at zero
            return CoverageStats::default();
        }
        let values: Vec<f64> = self.depth.iter().map(|&d| d as f64).collect();
        CoverageStats {
            mean: mean(&values).unwrap_or_default(),
            median: median(&values).unwrap_or_default(),
            total: self.depth.iter().map(|&d| d as u64).sum(),
            reads: self.reads
        }
    }

    // getters
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn locus(&self) -> &Locus {
        &self.locus
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Number of bases with a depth of at least one
    pub fn covered_bases(&self) -> u64 {
        self.depth.iter().filter(|&&d| d > 0).count() as u64
    }
}

/// All regions on one chromosome
struct IntervalSet {
    /// Regions sorted by (start, end), stable with respect to insertion
    regions: Vec<Region>,
    /// Search tree with the index into `regions` as metadata
    tree: COITree<usize, usize>
}

impl IntervalSet {
    fn new(mut regions: Vec<Region>) -> Self {
        // stable sort keeps insertion order for identical spans
        regions.sort_by_key(|r| (r.locus.start(), r.locus.end()));
        let intervals: Vec<Interval<usize>> = regions.iter().enumerate()
            .map(|(index, r)| Interval::new(to_coord(r.locus.start()), to_coord(r.locus.end()), index))
            .collect();
        let tree = COITree::new(&intervals);
        Self {
            regions, tree
        }
    }

    /// Finds the index of the first region in store order satisfying `rule` for `locus`
    fn find(&self, locus: &Locus, rule: MatchRule) -> Option<usize> {
        match rule {
            MatchRule::Exact => {
                // regions are sorted by start, so jump to the first candidate and walk forward
                let first = self.regions.partition_point(|r| r.locus.start() < locus.start());
                self.regions[first..].iter()
                    .take_while(|r| r.locus.start() == locus.start())
                    .position(|r| r.locus.end() == locus.end())
                    .map(|offset| first + offset)
            },
            MatchRule::Contains | MatchRule::Overlap => {
                let mut best: Option<usize> = None;
                self.tree.query(to_coord(locus.start()), to_coord(locus.end()), |node| {
                    let index: usize = node.metadata.to_owned();
                    let region = &self.regions[index];
                    let qualifies = rule == MatchRule::Overlap || region.locus.contains(locus);
                    if qualifies && best.map_or(true, |b| index < b) {
                        best = Some(index);
                    }
                });
                best
            }
        }
    }
}

impl IntervalSet {
    /// Indices of every region sharing a base with `locus`, in store order
    fn overlapping(&self, locus: &Locus) -> Vec<usize> {
        let mut indices = vec![];
        self.tree.query(to_coord(locus.start()), to_coord(locus.end()), |node| {
            indices.push(node.metadata.to_owned());
        });
        indices.sort_unstable();
        indices
    }
}

impl Clone for IntervalSet {
    fn clone(&self) -> Self {
        // regions are already in store order, so the rebuilt tree keeps the same indices
        Self::new(self.regions.clone())
    }
}

/// Converts a 1-based position into the tree coordinate space
fn to_coord(position: u64) -> i32 {
    i32::try_from(position).unwrap_or(i32::MAX)
}

/// Interval sets for every chromosome, keyed in first-seen order
#[derive(Clone, Default)]
pub struct IntervalEngine {
    sets: IndexMap<String, IntervalSet>
}

impl std::fmt::Debug for IntervalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // COITree does not have Debug, so lets just report region counts per chromosome
        let counts: IndexMap<&str, usize> = self.sets.iter()
            .map(|(chrom, set)| (chrom.as_str(), set.regions.len()))
            .collect();
        f.debug_struct("IntervalEngine").field("region_counts", &counts).finish()
    }
}

impl IntervalEngine {
    /// Indexes regions as given; overlapping regions are allowed and resolved by store order at query time.
    /// # Arguments
    /// * `regions` - (chromosome, identifier, locus) triples
    pub fn new<I>(regions: I) -> Self
    where
        I: IntoIterator<Item = (String, String, Locus)>
    {
        let mut grouped: IndexMap<String, Vec<Region>> = Default::default();
        for (chrom, id, locus) in regions {
            grouped.entry(chrom).or_default()
                .push(Region::new(id.clone(), locus, vec![id]));
        }
        let sets = grouped.into_iter()
            .map(|(chrom, regions)| (chrom, IntervalSet::new(regions)))
            .collect();
        Self {
            sets
        }
    }

    /// Indexes regions after coalescing overlapping inputs on each chromosome, see `merge`.
    /// # Arguments
    /// * `regions` - (chromosome, identifier, locus) triples
    pub fn new_merged<I>(regions: I) -> Self
    where
        I: IntoIterator<Item = (String, String, Locus)>
    {
        let mut grouped: IndexMap<String, Vec<(String, Locus)>> = Default::default();
        for (chrom, id, locus) in regions {
            grouped.entry(chrom).or_default().push((id, locus));
        }
        let sets = grouped.into_iter()
            .map(|(chrom, intervals)| {
                let merged = merge(intervals);
                trace!("Merged {chrom} into {} regions", merged.len());
                (chrom, IntervalSet::new(merged))
            })
            .collect();
        Self {
            sets
        }
    }

    /// Finds the first region in store order that satisfies `rule`.
    /// Returns `None` for an unknown chromosome.
    /// # Arguments
    /// * `chrom` - the chromosome to search
    /// * `locus` - the query span
    /// * `rule` - the positional rule a region must satisfy
    pub fn find(&self, chrom: &str, locus: &Locus, rule: MatchRule) -> Option<&Region> {
        let set = self.sets.get(chrom)?;
        set.find(locus, rule).map(|index| &set.regions[index])
    }

    /// Counts an alignment against the first region it overlaps, returning that region.
    /// Per-base depth is incremented only across the bases shared with the region.
    /// # Arguments
    /// * `chrom` - the alignment chromosome
    /// * `locus` - the aligned span
    pub fn depth(&mut self, chrom: &str, locus: &Locus) -> Option<&Region> {
        let set = self.sets.get_mut(chrom)?;
        let index = set.find(locus, MatchRule::Overlap)?;
        let region = &mut set.regions[index];
        region.add_depth(locus);
        Some(&*region)
    }

    /// Counts an alignment against every region it overlaps, returning how many regions it touched.
    /// Use this instead of `depth` when a span may cross several regions and each should see its bases.
    /// # Arguments
    /// * `chrom` - the alignment chromosome
    /// * `locus` - the aligned span
    pub fn cover(&mut self, chrom: &str, locus: &Locus) -> usize {
        let Some(set) = self.sets.get_mut(chrom) else {
            return 0;
        };
        let indices = set.overlapping(locus);
        for &index in indices.iter() {
            set.regions[index].add_depth(locus);
        }
        indices.len()
    }

    /// Depth summary for the region with exactly this span
    pub fn stats(&self, chrom: &str, locus: &Locus) -> Option<CoverageStats> {
        self.find(chrom, locus, MatchRule::Exact)
            .map(|r| r.stats())
    }

    /// Clears every depth counter so the engine can be reused
    pub fn reset_depth(&mut self) {
        for set in self.sets.values_mut() {
            for region in set.regions.iter_mut() {
                region.reset();
            }
        }
    }

    /// Iterates (chromosome, region) in chromosome first-seen order then store order
    pub fn regions(&self) -> impl Iterator<Item = (&str, &Region)> {
        self.sets.iter()
            .flat_map(|(chrom, set)| set.regions.iter().map(move |r| (chrom.as_str(), r)))
    }

    /// Total number of regions
    pub fn len(&self) -> usize {
        self.sets.values().map(|s| s.regions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if any region exists on `chrom`
    pub fn has_chrom(&self, chrom: &str) -> bool {
        self.sets.contains_key(chrom)
    }
}

/// Coalesces overlapping intervals into the minimal non-overlapping cover.
/// Adjacent but non-overlapping intervals stay separate. Each output keeps all member identifiers.
/// # Arguments
/// * `intervals` - (identifier, locus) pairs on a single chromosome, any order
pub fn merge(intervals: Vec<(String, Locus)>) -> Vec<Region> {
    let mut ret: Vec<Region> = vec![];
    for (id, locus) in intervals.into_iter().sorted_by_key(|(_, l)| (l.start(), l.end())) {
        match ret.last_mut() {
            Some(last) if last.locus.overlaps(&locus) => {
                last.locus = last.locus.union(&locus);
                last.members.push(id);
            },
            _ => ret.push(Region::new(id.clone(), locus, vec![id]))
        }
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    fn locus(start: u64, end: u64) -> Locus {
        Locus::new(start, end).unwrap()
    }

    fn example_engine() -> IntervalEngine {
        IntervalEngine::new([
            ("chr1".to_string(), "B".to_string(), locus(50, 80)),
            ("chr1".to_string(), "A".to_string(), locus(10, 100)),
            ("chr1".to_string(), "C".to_string(), locus(10, 100)),
            ("chr2".to_string(), "D".to_string(), locus(1, 5))
        ])
    }

    #[test]
    fn test_find_rules() {
        let engine = example_engine();
        assert_eq!(engine.len(), 4);

        // exact, first inserted wins between identical spans
        assert_eq!(engine.find("chr1", &locus(10, 100), MatchRule::Exact).unwrap().id(), "A");
        assert_eq!(engine.find("chr1", &locus(50, 80), MatchRule::Exact).unwrap().id(), "B");
        assert!(engine.find("chr1", &locus(50, 81), MatchRule::Exact).is_none());

        // contains, lowest start wins over the smaller region
        assert_eq!(engine.find("chr1", &locus(60, 70), MatchRule::Contains).unwrap().id(), "A");
        assert!(engine.find("chr1", &locus(90, 120), MatchRule::Contains).is_none());

        // overlap
        assert_eq!(engine.find("chr1", &locus(90, 120), MatchRule::Overlap).unwrap().id(), "A");
        assert_eq!(engine.find("chr2", &locus(5, 9), MatchRule::Overlap).unwrap().id(), "D");
        assert!(engine.find("chr2", &locus(6, 9), MatchRule::Overlap).is_none());

        // unknown chromosome is just not found
        assert!(engine.find("chrUn", &locus(1, 10), MatchRule::Overlap).is_none());
        assert!(!engine.has_chrom("chrUn"));
    }

    #[test]
    fn test_merge() {
        let merged = merge(vec![
            ("c".to_string(), locus(30, 40)),
            ("a".to_string(), locus(1, 10)),
            ("b".to_string(), locus(5, 20)),
            ("d".to_string(), locus(41, 50)),
            ("e".to_string(), locus(45, 46))
        ]);
        let spans: Vec<(u64, u64)> = merged.iter().map(|r| (r.locus().start(), r.locus().end())).collect();
        assert_eq!(spans, vec![(1, 20), (30, 40), (41, 50)]);
        assert_eq!(merged[0].members(), &["a".to_string(), "b".to_string()]);
        assert_eq!(merged[0].id(), "a");
        assert_eq!(merged[2].members(), &["d".to_string(), "e".to_string()]);

        // the merged engine never returns overlapping regions
        let engine = IntervalEngine::new_merged([
            ("chr1".to_string(), "x".to_string(), locus(1, 10)),
            ("chr1".to_string(), "y".to_string(), locus(8, 12))
        ]);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.find("chr1", &locus(11, 11), MatchRule::Contains).unwrap().id(), "x");
    }

    #[test]
    fn test_depth_and_stats() {
        let mut engine = IntervalEngine::new([
            ("chrQ".to_string(), "R1".to_string(), locus(101, 110))
        ]);

        // clipped on the left, covers 101..=105
        assert_eq!(engine.depth("chrQ", &locus(90, 105)).unwrap().id(), "R1");
        // fully inside, covers 104..=107
        engine.depth("chrQ", &locus(104, 107));
        // misses entirely
        assert!(engine.depth("chrQ", &locus(200, 250)).is_none());
        assert!(engine.depth("chrUn", &locus(101, 110)).is_none());

        let stats = engine.stats("chrQ", &locus(101, 110)).unwrap();
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.total, 9);
        assert_approx_eq!(stats.mean, 0.9);
        // depths are 1,1,1,2,2,1,1,0,0,0
        assert_approx_eq!(stats.median, 1.0);

        engine.reset_depth();
        let stats = engine.stats("chrQ", &locus(101, 110)).unwrap();
        assert_eq!(stats, CoverageStats::default());
    }

    #[test]
    fn test_cover_crosses_regions() {
        let mut engine = IntervalEngine::new([
            ("chrQ".to_string(), "R1".to_string(), locus(101, 110)),
            ("chrQ".to_string(), "R2".to_string(), locus(121, 130))
        ]);

        // spans the gap and reaches into both regions
        assert_eq!(engine.cover("chrQ", &locus(106, 125)), 2);
        assert_eq!(engine.cover("chrQ", &locus(111, 120)), 0);
        assert_eq!(engine.cover("chrUn", &locus(101, 110)), 0);

        let covered: Vec<(String, u64, u64)> = engine.regions()
            .map(|(_, r)| (r.id().to_string(), r.covered_bases(), r.reads()))
            .collect();
        assert_eq!(covered, vec![("R1".to_string(), 5, 1), ("R2".to_string(), 5, 1)]);

        // depth only ever feeds the first overlapping region
        engine.reset_depth();
        engine.depth("chrQ", &locus(106, 125));
        let r2 = engine.find("chrQ", &locus(121, 130), MatchRule::Exact).unwrap();
        assert_eq!(r2.covered_bases(), 0);
    }
}
