
use serde::Serialize;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LocusError {
    #[error("locus end ({end}) must be >= start ({start})")]
    EndBeforeStart { start: u64, end: u64 },
    #[error("locus start must be >= 1, coordinates are 1-based")]
    ZeroStart
}

/// A closed interval on a contig, 1-based and inclusive on both ends.
/// The owning chromosome is tracked by whoever holds the locus.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize)]
pub struct Locus {
    /// First included base, 1-based
    start: u64,
    /// Last included base, 1-based
    end: u64
}

impl Locus {
    /// Constructor with checks
    /// # Arguments
    /// * `start` - first included base, 1-based
    /// * `end` - last included base, 1-based
    /// # Errors
    /// * if `start` is 0
    /// * if `end` < `start`
    pub fn new(start: u64, end: u64) -> Result<Self, LocusError> {
        if start == 0 {
            return Err(LocusError::ZeroStart);
        }
        if end < start {
            return Err(LocusError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// Converts a 0-based half-open interval (BED style) into a locus.
    /// Empty BED intervals (start == end) are rejected since they cover no bases.
    pub fn from_half_open(start: u64, end: u64) -> Result<Self, LocusError> {
        if end <= start {
            return Err(LocusError::EndBeforeStart { start: start + 1, end });
        }
        Self::new(start + 1, end)
    }

    /// Single base locus
    pub fn point(position: u64) -> Result<Self, LocusError> {
        Self::new(position, position)
    }

    /// Number of bases covered
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Returns true if `other` is fully inside this locus
    pub fn contains(&self, other: &Locus) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Returns true if at least one base is shared
    pub fn overlaps(&self, other: &Locus) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// The smallest locus covering both inputs
    pub fn union(&self, other: &Locus) -> Locus {
        Locus {
            start: self.start.min(other.start),
            end: self.end.max(other.end)
        }
    }

    /// The shared bases, if any
    pub fn intersection(&self, other: &Locus) -> Option<Locus> {
        if self.overlaps(other) {
            Some(Locus {
                start: self.start.max(other.start),
                end: self.end.min(other.end)
            })
        } else {
            None
        }
    }

    // getters
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }
}

impl std::fmt::Display for Locus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locus_construction() {
        let locus = Locus::new(10, 20).unwrap();
        assert_eq!(locus.length(), 11);
        assert_eq!(Locus::point(5).unwrap().length(), 1);
        assert_eq!(Locus::new(20, 10), Err(LocusError::EndBeforeStart { start: 20, end: 10 }));
        assert_eq!(Locus::new(0, 10), Err(LocusError::ZeroStart));

        // BED [9, 20) is bases 10..=20
        assert_eq!(Locus::from_half_open(9, 20).unwrap(), locus);
        assert!(Locus::from_half_open(9, 9).is_err());
    }

    #[test]
    fn test_locus_relations() {
        let outer = Locus::new(10, 20).unwrap();
        let inner = Locus::new(12, 15).unwrap();
        let edge = Locus::new(20, 25).unwrap();
        let apart = Locus::new(21, 25).unwrap();

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));

        assert!(outer.overlaps(&edge));
        assert!(!outer.overlaps(&apart));
        assert_eq!(outer.intersection(&edge), Some(Locus::new(20, 20).unwrap()));
        assert_eq!(outer.intersection(&apart), None);

        assert_eq!(outer.union(&apart), Locus::new(10, 25).unwrap());
        assert_eq!(format!("{outer}"), "10-20");
    }
}
