//! Maximum-likelihood estimation of the multinomial logit.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::data::ChoiceData;
use crate::error::{ChoiceError, Result};
use crate::likelihood::MultinomialLogit;
use crate::optimizer::{run_bfgs, NegativeLogLikelihood};
use crate::options::{CovarianceSource, MleOptions};

/// Normal quantile used for the 95% confidence bounds.
pub const Z_95: f64 = 1.96;

/// High-level wrapper that owns the choice data for repeated estimation runs.
#[derive(Clone, Debug)]
pub struct MaximumLikelihood<'a> {
    data: &'a ChoiceData,
}

impl<'a> MaximumLikelihood<'a> {
    /// Binds the estimator to a validated dataset.
    pub fn new(data: &'a ChoiceData) -> Self {
        Self { data }
    }

    /// Fits from all-zero starting coefficients.
    pub fn fit(&self, options: &MleOptions) -> Result<MleEstimate> {
        self.fit_from(&DVector::zeros(self.data.feature_dim()), options)
    }

    /// Fits from `beta0`.
    ///
    /// Returns [`ChoiceError::ConvergenceFailure`] carrying the best coefficients when the
    /// search stops on its iteration cap or fails part way.
    pub fn fit_from(&self, beta0: &DVector<f64>, options: &MleOptions) -> Result<MleEstimate> {
        let data = self.data;
        let k = data.feature_dim();
        if beta0.len() != k {
            return Err(ChoiceError::dimension_mismatch(
                "initial coefficients",
                k,
                beta0.len(),
            ));
        }

        let model = MultinomialLogit::new(options.likelihood);

        // Start BFGS from the Newton curvature so the first step is on the right scale.
        let start_curvature = model
            .information(beta0, data)?
            .cholesky()
            .map(|c| c.inverse())
            .unwrap_or_else(|| DMatrix::identity(k, k) / data.decision_count() as f64);

        let outcome = run_bfgs(
            NegativeLogLikelihood::new(&model, data),
            beta0,
            Some(&start_curvature),
            options,
        )?;

        if !outcome.converged {
            log::warn!(
                "BFGS stopped without converging after {} iterations ({})",
                outcome.iterations,
                outcome.termination
            );
            return Err(ChoiceError::ConvergenceFailure {
                iterations: outcome.iterations,
                log_likelihood: outcome.log_likelihood,
                beta: outcome.beta,
            });
        }

        let covariance = match (options.covariance, outcome.inverse_hessian) {
            (CovarianceSource::InverseHessian, Some(inverse)) => inverse,
            (source, _) => {
                if source == CovarianceSource::InverseHessian {
                    log::debug!("optimizer kept no inverse Hessian; using observed information");
                }
                model
                    .information(&outcome.beta, data)?
                    .cholesky()
                    .ok_or_else(|| ChoiceError::singular("observed information"))?
                    .inverse()
            }
        };

        let null_log_likelihood = model
            .evaluate(&DVector::zeros(k), data)?
            .log_likelihood;

        let estimate = MleEstimate::new(
            data.coefficient_names(),
            outcome.beta,
            covariance,
            outcome.log_likelihood,
            null_log_likelihood,
            data.decision_count(),
            outcome.iterations,
        )?;

        log::debug!(
            "MLE converged in {} iterations: ln L = {:.6}",
            estimate.iterations,
            estimate.log_likelihood
        );
        Ok(estimate)
    }
}

/// One row of the maximum-likelihood coefficient table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoefficientEstimate {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

impl CoefficientEstimate {
    /// Wald statistic `estimate / std_error`.
    pub fn z_value(&self) -> f64 {
        self.estimate / self.std_error
    }
}

/// Point estimates, curvature-based uncertainty, and fit statistics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MleEstimate {
    pub beta: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub coefficients: Vec<CoefficientEstimate>,
    pub log_likelihood: f64,
    /// Log-likelihood at `beta = 0`, where every alternative is equally likely.
    pub null_log_likelihood: f64,
    pub decisions: usize,
    pub iterations: u64,
}

impl MleEstimate {
    fn new(
        names: &[String],
        beta: DVector<f64>,
        covariance: DMatrix<f64>,
        log_likelihood: f64,
        null_log_likelihood: f64,
        decisions: usize,
        iterations: u64,
    ) -> Result<Self> {
        let mut coefficients = Vec::with_capacity(beta.len());
        for (index, name) in names.iter().enumerate() {
            let variance = covariance[(index, index)];
            if !(variance.is_finite() && variance >= 0.0) {
                return Err(ChoiceError::NumericalError {
                    context: "covariance diagonal",
                });
            }
            let std_error = variance.sqrt();
            let estimate = beta[index];
            coefficients.push(CoefficientEstimate {
                name: name.clone(),
                estimate,
                std_error,
                ci_lower: estimate - Z_95 * std_error,
                ci_upper: estimate + Z_95 * std_error,
            });
        }

        Ok(Self {
            beta,
            covariance,
            coefficients,
            log_likelihood,
            null_log_likelihood,
            decisions,
            iterations,
        })
    }

    /// Standard errors, the square roots of the covariance diagonal.
    pub fn std_errors(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.coefficients.len(),
            self.coefficients.iter().map(|c| c.std_error),
        )
    }

    /// McFadden's pseudo R-squared, `1 - ln L / ln L0`.
    pub fn pseudo_r2(&self) -> f64 {
        1.0 - self.log_likelihood / self.null_log_likelihood
    }

    /// Akaike information criterion, `2K - 2 ln L`.
    pub fn aic(&self) -> f64 {
        2.0 * self.beta.len() as f64 - 2.0 * self.log_likelihood
    }

    /// Bayesian information criterion, `K ln N - 2 ln L`.
    pub fn bic(&self) -> f64 {
        (self.decisions as f64).ln() * self.beta.len() as f64 - 2.0 * self.log_likelihood
    }
}

impl fmt::Display for MleEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16} {:>12} {:>12} {:>12} {:>12}",
            "coefficient", "estimate", "std. error", "ci lower", "ci upper"
        )?;
        for row in &self.coefficients {
            writeln!(
                f,
                "{:<16} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
                row.name, row.estimate, row.std_error, row.ci_lower, row.ci_upper
            )?;
        }
        write!(
            f,
            "ln L = {:.4}, ln L0 = {:.4}, pseudo R2 = {:.4}, decisions = {}",
            self.log_likelihood,
            self.null_log_likelihood,
            self.pseudo_r2(),
            self.decisions
        )
    }
}
