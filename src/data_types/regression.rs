
use serde::Serialize;
use std::collections::BTreeMap;

use crate::util::stats::f_test_p_value;

/// Minimum number of usable points before a fit is reported
pub const MIN_REGRESSION_POINTS: usize = 3;

/// Single-predictor linear model on log2(expected) vs log2(observed).
/// Every statistic is `None` when the fit is undefined.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LinearModel {
    /// Number of points used in the fit
    pub n: usize,
    pub intercept: Option<f64>,
    pub slope: Option<f64>,
    /// Pearson correlation
    pub r: Option<f64>,
    pub r2: Option<f64>,
    pub adjusted_r2: Option<f64>,
    pub f_statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub ss_model: Option<f64>,
    pub ss_error: Option<f64>,
    pub ss_total: Option<f64>,
    pub df_model: Option<usize>,
    pub df_error: Option<usize>,
    pub df_total: Option<usize>
}

impl LinearModel {
    /// Returns true if the model has a slope, i.e. the fit was possible
    pub fn is_defined(&self) -> bool {
        self.slope.is_some()
    }

    /// Fits y = intercept + slope * x with ordinary least squares
    /// # Arguments
    /// * `points` - the (x, y) pairs, already transformed
    pub fn fit(points: &[(f64, f64)]) -> Self {
        let n = points.len();
        let undefined = Self { n, ..Default::default() };
        if n < MIN_REGRESSION_POINTS {
            return undefined;
        }

        let nf = n as f64;
        let x_mean = points.iter().map(|(x, _)| x).sum::<f64>() / nf;
        let y_mean = points.iter().map(|(_, y)| y).sum::<f64>() / nf;
        let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
        for (x, y) in points.iter() {
            let dx = x - x_mean;
            let dy = y - y_mean;
            sxx += dx * dx;
            syy += dy * dy;
            sxy += dx * dy;
        }

        // all x identical, there is no slope to speak of
        if sxx <= f64::EPSILON * nf {
            return undefined;
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;
        let ss_total = syy;
        let ss_model = (slope * sxy).min(ss_total);
        let ss_error = (ss_total - ss_model).max(0.0);
        let df_model = 1;
        let df_error = n - 2;
        let df_total = n - 1;

        let (r, r2, adjusted_r2) = if ss_total > 0.0 {
            let r = sxy / (sxx * syy).sqrt();
            let r2 = ss_model / ss_total;
            let adjusted = 1.0 - (1.0 - r2) * (df_total as f64) / (df_error as f64);
            (Some(r), Some(r2), Some(adjusted))
        } else {
            (None, None, None)
        };

        // a perfect fit has no error term, report it as certain
        let (f_statistic, p_value) = if ss_error > 0.0 {
            let f = (ss_model / df_model as f64) / (ss_error / df_error as f64);
            (Some(f), f_test_p_value(f, df_model as f64, df_error as f64))
        } else if ss_model > 0.0 {
            (None, Some(0.0))
        } else {
            (None, None)
        };

        Self {
            n,
            intercept: Some(intercept),
            slope: Some(slope),
            r, r2, adjusted_r2,
            f_statistic, p_value,
            ss_model: Some(ss_model),
            ss_error: Some(ss_error),
            ss_total: Some(ss_total),
            df_model: Some(df_model),
            df_error: Some(df_error),
            df_total: Some(df_total)
        }
    }
}

/// The lowest expected concentration that was still observed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionLimit {
    pub sequin_id: String,
    pub expected: f64,
    pub observed: f64
}

/// Identifier keyed (expected, observed) pairs; later writes for an identifier replace earlier ones
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RegressionPointSet {
    points: BTreeMap<String, (f64, f64)>
}

impl RegressionPointSet {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the point for `id`
    pub fn add(&mut self, id: &str, expected: f64, observed: f64) {
        self.points.insert(id.to_string(), (expected, observed));
    }

    /// Adds `observed` onto the current observation of `id`, creating it if needed
    pub fn accumulate(&mut self, id: &str, expected: f64, observed: f64) {
        let entry = self.points.entry(id.to_string()).or_insert((expected, 0.0));
        entry.0 = expected;
        entry.1 += observed;
    }

    /// Points transformed to log2, dropping any pair with a non-positive or non-finite coordinate
    pub fn log2_points(&self) -> Vec<(f64, f64)> {
        self.points.values()
            .filter(|(x, y)| x.is_finite() && y.is_finite() && *x > 0.0 && *y > 0.0)
            .map(|(x, y)| (x.log2(), y.log2()))
            .collect()
    }

    /// Fits the log2 linear model
    pub fn fit(&self) -> LinearModel {
        LinearModel::fit(&self.log2_points())
    }

    /// Finds the point with the lowest expected value whose observed value is nonzero.
    /// Ties go to the smallest identifier.
    pub fn detection_limit(&self) -> Option<DetectionLimit> {
        self.points.iter()
            .filter(|(_, (x, y))| x.is_finite() && *y != 0.0 && y.is_finite())
            .min_by(|(_, (xa, _)), (_, (xb, _))| xa.total_cmp(xb))
            .map(|(id, (x, y))| DetectionLimit {
                sequin_id: id.clone(),
                expected: *x,
                observed: *y
            })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &BTreeMap<String, (f64, f64)> {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn test_perfect_fit() {
        let mut points = RegressionPointSet::new();
        // observed is exactly half of expected
        for (i, x) in [2.0, 4.0, 8.0, 16.0].iter().enumerate() {
            points.add(&format!("S{i}"), *x, x / 2.0);
        }
        let model = points.fit();
        assert!(model.is_defined());
        assert_eq!(model.n, 4);
        assert_approx_eq!(model.slope.unwrap(), 1.0);
        assert_approx_eq!(model.intercept.unwrap(), -1.0);
        assert_approx_eq!(model.r.unwrap(), 1.0);
        assert_approx_eq!(model.r2.unwrap(), 1.0);
        assert_eq!(model.p_value, Some(0.0));
        assert_eq!(model.df_error, Some(2));
        assert_eq!(model.df_total, Some(3));
    }

    #[test]
    fn test_noisy_fit() {
        let mut points = RegressionPointSet::new();
        // log2 coordinates (1,1), (2,3), (3,2), (4,4)
        points.add("A", 2.0, 2.0);
        points.add("B", 4.0, 8.0);
        points.add("C", 8.0, 4.0);
        points.add("D", 16.0, 16.0);
        let model = points.fit();
        // sxx = 5, sxy = 4, syy = 5
        assert_approx_eq!(model.slope.unwrap(), 0.8);
        assert_approx_eq!(model.intercept.unwrap(), 0.5);
        assert_approx_eq!(model.r.unwrap(), 0.8);
        assert_approx_eq!(model.r2.unwrap(), 0.64);
        assert_approx_eq!(model.ss_model.unwrap(), 3.2);
        assert_approx_eq!(model.ss_error.unwrap(), 1.8);
        assert_approx_eq!(model.ss_total.unwrap(), 5.0);
        assert_approx_eq!(model.adjusted_r2.unwrap(), 1.0 - 0.36 * 3.0 / 2.0);
        let f = 3.2 / (1.8 / 2.0);
        assert_approx_eq!(model.f_statistic.unwrap(), f);
        // F(1, 2) survival is 1 - sqrt(f / (f + 2))
        assert_approx_eq!(model.p_value.unwrap(), 1.0 - (f / (f + 2.0)).sqrt());
    }

    #[test]
    fn test_flat_regression_undefined() {
        let mut points = RegressionPointSet::new();
        points.add("A", 10.0, 1.0);
        points.add("B", 10.0, 2.0);
        points.add("C", 10.0, 3.0);
        let model = points.fit();
        assert!(!model.is_defined());
        assert_eq!(model.n, 3);
        assert_eq!(model, LinearModel { n: 3, ..Default::default() });
    }

    #[test]
    fn test_skips_zero_points() {
        let mut points = RegressionPointSet::new();
        points.add("A", 2.0, 0.0);
        points.add("B", 0.0, 2.0);
        points.add("C", 4.0, 4.0);
        points.add("D", f64::NAN, 4.0);
        assert_eq!(points.log2_points(), vec![(2.0, 2.0)]);
        // too few points
        assert!(!points.fit().is_defined());
    }

    #[test]
    fn test_overwrite_and_accumulate() {
        let mut points = RegressionPointSet::new();
        points.add("A", 2.0, 1.0);
        points.add("A", 2.0, 5.0);
        assert_eq!(points.points()["A"], (2.0, 5.0));

        points.accumulate("B", 3.0, 1.0);
        points.accumulate("B", 3.0, 1.0);
        assert_eq!(points.points()["B"], (3.0, 2.0));
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_detection_limit() {
        let mut points = RegressionPointSet::new();
        points.add("high", 100.0, 40.0);
        points.add("low_missing", 1.0, 0.0);
        points.add("low_found", 5.0, 2.0);
        let limit = points.detection_limit().unwrap();
        assert_eq!(limit.sequin_id, "low_found");
        assert_approx_eq!(limit.expected, 5.0);

        assert_eq!(RegressionPointSet::new().detection_limit(), None);
    }
}
