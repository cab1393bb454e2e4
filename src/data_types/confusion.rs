
use serde::Serialize;
use std::ops::AddAssign;

/// Confusion counts for a single stratum.
/// `reference_total` is the number of catalog entries in the stratum and must stay >= `tp` + `fn`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounter {
    /// Number of reference entries detected with matching alleles
    pub tp: u64,
    /// Number of observed records that do not support a reference entry
    pub fp: u64,
    /// Number of reference entries not detected, only set at finalization
    #[serde(rename = "fn")]
    pub fn_: u64,
    /// Number of reference entries in this stratum
    pub reference_total: u64
}

impl AddAssign for ConfusionCounter {
    // Enables += with counters
    fn add_assign(&mut self, rhs: Self) {
        self.tp += rhs.tp;
        self.fp += rhs.fp;
        self.fn_ += rhs.fn_;
        self.reference_total += rhs.reference_total;
    }
}

impl ConfusionCounter {
    /// Constructor
    pub fn new(tp: u64, fp: u64, fn_: u64, reference_total: u64) -> Self {
        Self {
            tp, fp, fn_, reference_total
        }
    }

    /// A counter for a stratum with `reference_total` expected entries and nothing observed yet
    pub fn with_reference_total(reference_total: u64) -> Self {
        Self {
            reference_total,
            ..Default::default()
        }
    }

    /// Calculates sensitivity (TP / (TP + FN)) if it can
    pub fn sensitivity(&self) -> Option<f64> {
        let denom = self.tp + self.fn_;
        if denom > 0 {
            Some(self.tp as f64 / denom as f64)
        } else {
            None
        }
    }

    /// Calculates precision (TP / (TP + FP)) if it can
    pub fn precision(&self) -> Option<f64> {
        let denom = self.tp + self.fp;
        if denom > 0 {
            Some(self.tp as f64 / denom as f64)
        } else {
            None
        }
    }

    /// Calculates F1 score if possible
    pub fn f1(&self) -> Option<f64> {
        match (self.sensitivity(), self.precision()) {
            (Some(sn), Some(pc)) if sn + pc > 0.0 => Some(2.0 * sn * pc / (sn + pc)),
            (Some(_), Some(_)) => Some(0.0),
            _ => None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn test_scores() {
        let counter = ConfusionCounter::new(8, 2, 4, 12);
        assert_approx_eq!(counter.sensitivity().unwrap(), 8.0 / 12.0);
        assert_approx_eq!(counter.precision().unwrap(), 8.0 / 10.0);
        let (sn, pc) = (8.0 / 12.0, 8.0 / 10.0);
        assert_approx_eq!(counter.f1().unwrap(), 2.0 * sn * pc / (sn + pc));
    }

    #[test]
    fn test_undefined_scores() {
        let empty = ConfusionCounter::with_reference_total(0);
        assert_eq!(empty.sensitivity(), None);
        assert_eq!(empty.precision(), None);
        assert_eq!(empty.f1(), None);

        // nothing right, but something was attempted
        let all_wrong = ConfusionCounter::new(0, 3, 2, 2);
        assert_eq!(all_wrong.sensitivity(), Some(0.0));
        assert_eq!(all_wrong.precision(), Some(0.0));
        assert_eq!(all_wrong.f1(), Some(0.0));
    }

    #[test]
    fn test_add_assign() {
        let mut counter = ConfusionCounter::new(1, 2, 3, 4);
        counter += ConfusionCounter::new(10, 20, 30, 40);
        assert_eq!(counter, ConfusionCounter::new(11, 22, 33, 44));
    }
}
