//! Configuration for the likelihood, the maximum-likelihood driver, and the sampler.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{ChoiceError, Result};

/// Numeric policy of the likelihood evaluator.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LikelihoodOptions {
    /// Added to the chosen probability before taking `ln` to avoid `ln(0)`.
    pub epsilon: f64,
}

impl Default for LikelihoodOptions {
    fn default() -> Self {
        Self { epsilon: 1e-10 }
    }
}

impl LikelihoodOptions {
    /// Overrides the probability floor added before logarithms.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Where the covariance matrix of the maximum-likelihood estimate comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovarianceSource {
    /// The inverse-Hessian approximation carried by BFGS at termination.
    InverseHessian,
    /// Inverse of the closed-form observed information at the estimate.
    AnalyticHessian,
}

/// Controls the quasi-Newton search for the maximum-likelihood estimate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MleOptions {
    /// Gradient-norm tolerance for convergence.
    pub tolerance_grad: f64,
    /// Tolerance on the change in the objective between iterations.
    pub tolerance_cost: f64,
    /// Maximum number of BFGS iterations before reporting non-convergence.
    pub max_iterations: u64,
    /// Source of the reported covariance matrix.
    pub covariance: CovarianceSource,
    /// Likelihood evaluator settings.
    pub likelihood: LikelihoodOptions,
}

impl Default for MleOptions {
    fn default() -> Self {
        Self {
            tolerance_grad: 1e-6,
            tolerance_cost: 1e-12,
            max_iterations: 500,
            covariance: CovarianceSource::InverseHessian,
            likelihood: LikelihoodOptions::default(),
        }
    }
}

impl MleOptions {
    /// Overrides the gradient-norm stopping tolerance.
    pub fn with_tolerance_grad(mut self, tolerance: f64) -> Self {
        self.tolerance_grad = tolerance;
        self
    }

    /// Overrides the cost-change stopping tolerance.
    pub fn with_tolerance_cost(mut self, tolerance: f64) -> Self {
        self.tolerance_cost = tolerance;
        self
    }

    /// Set the iteration cap; at least one iteration is always allowed.
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Selects where the coefficient covariance comes from.
    pub fn with_covariance(mut self, covariance: CovarianceSource) -> Self {
        self.covariance = covariance;
        self
    }

    /// Overrides the likelihood settings.
    pub fn with_likelihood(mut self, likelihood: LikelihoodOptions) -> Self {
        self.likelihood = likelihood;
        self
    }
}

/// Configuration of a single Metropolis–Hastings chain.
///
/// Proposal and prior scales are per coefficient, so covariates on different natural scales
/// (a price against 0/1 indicators) get their own widths.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamplerOptions {
    /// Total iterations including burn-in.
    pub iterations: usize,
    /// Leading iterations discarded before the posterior sample starts.
    pub burn_in: usize,
    /// Standard deviation of the Gaussian random-walk step, per coefficient.
    pub proposal_sd: DVector<f64>,
    /// Standard deviation of the zero-mean Gaussian prior, per coefficient.
    pub prior_sd: DVector<f64>,
    /// Seed used by
    /// [`MetropolisHastings::run_seeded`](crate::sampler::MetropolisHastings::run_seeded).
    pub seed: u64,
    /// Starting coefficients; zeros when absent.
    pub initial: Option<DVector<f64>>,
    /// Likelihood evaluator settings.
    pub likelihood: LikelihoodOptions,
}

impl SamplerOptions {
    /// Options with explicit per-coefficient proposal and prior scales.
    pub fn new(proposal_sd: DVector<f64>, prior_sd: DVector<f64>) -> Self {
        Self {
            iterations: 11_000,
            burn_in: 1_000,
            proposal_sd,
            prior_sd,
            seed: 42,
            initial: None,
            likelihood: LikelihoodOptions::default(),
        }
    }

    /// Options with the same proposal and prior scale for all `k` coefficients.
    pub fn uniform(k: usize, proposal_sd: f64, prior_sd: f64) -> Self {
        Self::new(
            DVector::from_element(k, proposal_sd),
            DVector::from_element(k, prior_sd),
        )
    }

    /// Overrides the total number of iterations, burn-in included.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Overrides the number of leading iterations discarded.
    pub fn with_burn_in(mut self, burn_in: usize) -> Self {
        self.burn_in = burn_in;
        self
    }

    /// Overrides the generator seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Starts the chain at `initial` instead of zeros.
    pub fn with_initial(mut self, initial: DVector<f64>) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Overrides the likelihood settings.
    pub fn with_likelihood(mut self, likelihood: LikelihoodOptions) -> Self {
        self.likelihood = likelihood;
        self
    }

    /// Number of draws retained after burn-in.
    pub fn retained(&self) -> usize {
        self.iterations.saturating_sub(self.burn_in)
    }

    /// Checks the options against a model with `k` coefficients.
    pub fn validate(&self, k: usize) -> Result<()> {
        if self.burn_in >= self.iterations {
            return Err(ChoiceError::invalid_configuration(
                "burn-in",
                format!(
                    "burn-in {} leaves no draws out of {} iterations",
                    self.burn_in, self.iterations
                ),
            ));
        }
        check_scales("proposal sd", &self.proposal_sd, k)?;
        check_scales("prior sd", &self.prior_sd, k)?;
        if let Some(initial) = &self.initial {
            if initial.len() != k {
                return Err(ChoiceError::dimension_mismatch(
                    "initial coefficients",
                    k,
                    initial.len(),
                ));
            }
        }
        Ok(())
    }
}

fn check_scales(option: &'static str, scales: &DVector<f64>, k: usize) -> Result<()> {
    if scales.len() != k {
        return Err(ChoiceError::dimension_mismatch(option, k, scales.len()));
    }
    if let Some(bad) = scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        return Err(ChoiceError::invalid_configuration(
            option,
            format!("scales must be positive and finite, found {bad}"),
        ));
    }
    Ok(())
}
