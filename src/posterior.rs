//! Summaries of retained posterior draws.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{ChoiceError, Result};

/// Lower and upper credible-interval probabilities.
pub const CREDIBLE_BOUNDS: (f64, f64) = (0.025, 0.975);

/// One row of the posterior table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoefficientPosterior {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Per-coefficient posterior summaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    pub coefficients: Vec<CoefficientPosterior>,
    pub draws: usize,
}

impl PosteriorSummary {
    /// Posterior means as a coefficient vector.
    pub fn means(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.coefficients.len(),
            self.coefficients.iter().map(|c| c.mean),
        )
    }
}

/// Mean, standard deviation, and 2.5%/97.5% empirical quantiles of each coefficient.
///
/// The standard deviation divides by the number of draws.
pub fn summarize(names: &[String], draws: &[DVector<f64>]) -> Result<PosteriorSummary> {
    if draws.is_empty() {
        return Err(ChoiceError::EmptyDataset);
    }
    let k = names.len();
    let matrix = stack(draws, k)?;
    let n = draws.len() as f64;

    let coefficients = names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let column = matrix.column(index);
            let mean = column.mean();
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let mut sorted: Vec<f64> = column.iter().copied().collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            CoefficientPosterior {
                name: name.clone(),
                mean,
                sd: variance.sqrt(),
                ci_lower: percentile(&sorted, CREDIBLE_BOUNDS.0),
                ci_upper: percentile(&sorted, CREDIBLE_BOUNDS.1),
            }
        })
        .collect();

    Ok(PosteriorSummary {
        coefficients,
        draws: draws.len(),
    })
}

/// Draws as rows of a `draws x k` matrix.
pub fn stack(draws: &[DVector<f64>], k: usize) -> Result<DMatrix<f64>> {
    if let Some(bad) = draws.iter().find(|d| d.len() != k) {
        return Err(ChoiceError::dimension_mismatch("posterior draw", k, bad.len()));
    }
    Ok(DMatrix::from_fn(draws.len(), k, |r, c| draws[r][c]))
}

/// Linear-interpolation quantile of already sorted values.
pub fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = quantile.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = position - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

impl fmt::Display for PosteriorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16} {:>12} {:>12} {:>12} {:>12}",
            "coefficient", "mean", "sd", "2.5%", "97.5%"
        )?;
        for row in &self.coefficients {
            writeln!(
                f,
                "{:<16} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
                row.name, row.mean, row.sd, row.ci_lower, row.ci_upper
            )?;
        }
        write!(f, "draws = {}", self.draws)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&values, 0.5), 3.0);
        assert_relative_eq!(percentile(&values, 0.25), 2.0);
        assert_relative_eq!(percentile(&values, 0.1), 1.4, epsilon = 1e-12);
        assert_relative_eq!(percentile(&values, 1.0), 5.0);
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn summarize_matches_hand_computation() {
        let names = vec!["a".to_string(), "b".to_string()];
        let draws: Vec<DVector<f64>> = (0..101)
            .map(|i| DVector::from_vec(vec![i as f64, -2.0]))
            .collect();
        let summary = summarize(&names, &draws).unwrap();

        let a = &summary.coefficients[0];
        assert_relative_eq!(a.mean, 50.0);
        assert_relative_eq!(a.ci_lower, 2.5, epsilon = 1e-9);
        assert_relative_eq!(a.ci_upper, 97.5, epsilon = 1e-9);
        let expected_var = (0..101).map(|i| (i as f64 - 50.0).powi(2)).sum::<f64>() / 101.0;
        assert_relative_eq!(a.sd, expected_var.sqrt(), epsilon = 1e-12);

        let b = &summary.coefficients[1];
        assert_relative_eq!(b.mean, -2.0);
        assert_relative_eq!(b.sd, 0.0);
        assert_relative_eq!(b.ci_lower, -2.0);
        assert_eq!(summary.draws, 101);
        assert_eq!(summary.means(), DVector::from_vec(vec![50.0, -2.0]));
    }

    #[test]
    fn summary_ignores_draw_order() {
        let names = vec!["a".to_string()];
        let forward: Vec<DVector<f64>> =
            [0.3, -1.2, 0.8, 2.2, 0.0].iter().map(|v| DVector::from_element(1, *v)).collect();
        let mut backward = forward.clone();
        backward.reverse();
        let a = summarize(&names, &forward).unwrap();
        let b = summarize(&names, &backward).unwrap();
        assert_relative_eq!(a.coefficients[0].mean, b.coefficients[0].mean, epsilon = 1e-12);
        assert_eq!(a.coefficients[0].ci_lower, b.coefficients[0].ci_lower);
        assert_eq!(a.coefficients[0].ci_upper, b.coefficients[0].ci_upper);
    }

    #[test]
    fn rejects_empty_and_ragged_draws() {
        let names = vec!["a".to_string()];
        assert!(summarize(&names, &[]).is_err());
        let ragged = vec![DVector::zeros(1), DVector::zeros(2)];
        assert!(matches!(
            summarize(&names, &ragged),
            Err(ChoiceError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn table_serializes() {
        let names = vec!["price".to_string()];
        let draws = vec![DVector::from_element(1, -0.1), DVector::from_element(1, -0.2)];
        let summary = summarize(&names, &draws).unwrap();
        assert!(summary.to_string().contains("price"));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["draws"], 2);
    }
}
