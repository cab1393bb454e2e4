/*!
Thin wrappers over statrs for the summary statistics and the F-test used by the regression reports.
*/

use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use statrs::statistics::{Data, Median, Statistics};

/// Mean of a slice, `None` if empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.mean())
    }
}

/// Median of a slice, `None` if empty; even-length slices average the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(Data::new(values.to_vec()).median())
    }
}

/// Upper tail probability of an F distribution, P(F > f)
/// # Arguments
/// * `f` - the observed statistic
/// * `df1` - numerator degrees of freedom
/// * `df2` - denominator degrees of freedom
pub fn f_test_p_value(f: f64, df1: f64, df2: f64) -> Option<f64> {
    if !f.is_finite() || f < 0.0 {
        return None;
    }
    // the constructor rejects non-positive or NaN degrees of freedom
    let distribution = FisherSnedecor::new(df1, df2).ok()?;
    Some(distribution.sf(f).clamp(0.0, 1.0))
}
