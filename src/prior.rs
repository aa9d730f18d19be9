//! Independent zero-mean Gaussian prior over the coefficients.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{ChoiceError, Result};

/// Product of independent `N(0, sd_k^2)` densities, one width per coefficient.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaussianPrior {
    sd: DVector<f64>,
}

impl GaussianPrior {
    /// Builds the prior; every standard deviation must be finite and positive.
    pub fn new(sd: DVector<f64>) -> Result<Self> {
        if let Some(bad) = sd.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(ChoiceError::invalid_configuration(
                "prior sd",
                format!("scales must be positive and finite, found {bad}"),
            ));
        }
        Ok(Self { sd })
    }

    /// Number of coefficients covered.
    pub fn dimension(&self) -> usize {
        self.sd.len()
    }

    /// Per-coefficient standard deviations.
    pub fn sd(&self) -> &DVector<f64> {
        &self.sd
    }

    /// Log density at `beta`, including normalizing constants.
    pub fn log_density(&self, beta: &DVector<f64>) -> Result<f64> {
        if beta.len() != self.sd.len() {
            return Err(ChoiceError::dimension_mismatch(
                "prior dimension",
                self.sd.len(),
                beta.len(),
            ));
        }
        let half_ln_2pi = 0.5 * (2.0 * std::f64::consts::PI).ln();
        Ok(beta
            .iter()
            .zip(self.sd.iter())
            .map(|(b, s)| -0.5 * (b / s).powi(2) - s.ln() - half_ln_2pi)
            .sum())
    }
}
