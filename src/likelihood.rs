//! Multinomial logit choice probabilities and the grouped log-likelihood.
//!
//! Every decision contributes `ln(p_c + epsilon)`, where `p_c` is the softmax probability of
//! the chosen alternative. Utilities are linear in the coefficients and are exponentiated
//! directly: there is no log-sum-exp shift and no clamping, so coefficients that make a
//! utility overflow, or every utility of a decision underflow to zero, surface as
//! [`ChoiceError::NumericalError`].

use nalgebra::{DMatrix, DMatrixView, DVector};

use crate::data::ChoiceData;
use crate::error::{ChoiceError, Result};
use crate::options::LikelihoodOptions;

/// Objective shared by the optimizer and the sampler: `(beta, data) -> ln L`.
pub trait LogLikelihood {
    /// Total log-likelihood of `data` at `beta`.
    fn log_likelihood(&self, beta: &DVector<f64>, data: &ChoiceData) -> Result<f64>;

    /// Gradient of [`log_likelihood`](LogLikelihood::log_likelihood) with respect to `beta`.
    fn gradient(&self, beta: &DVector<f64>, data: &ChoiceData) -> Result<DVector<f64>>;
}

/// Result of one likelihood evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LikelihoodEvaluation {
    pub log_likelihood: f64,
    /// Decisions whose chosen-alternative probability was at or below the epsilon floor.
    pub floored: usize,
}

/// The multinomial logit evaluator. Stateless apart from its epsilon guard.
#[derive(Clone, Copy, Debug, Default)]
pub struct MultinomialLogit {
    options: LikelihoodOptions,
}

impl MultinomialLogit {
    /// Creates an evaluator with the given epsilon guard.
    pub fn new(options: LikelihoodOptions) -> Self {
        Self { options }
    }

    /// Epsilon added to chosen probabilities before taking logarithms.
    pub fn epsilon(&self) -> f64 {
        self.options.epsilon
    }

    /// Evaluates the log-likelihood and counts floored probabilities.
    pub fn evaluate(
        &self,
        beta: &DVector<f64>,
        data: &ChoiceData,
    ) -> Result<LikelihoodEvaluation> {
        check_dimension(beta, data)?;
        let epsilon = self.options.epsilon;
        let mut log_likelihood = 0.0_f64;
        let mut floored = 0usize;

        for decision in data.decisions() {
            let probabilities = softmax(data.decision_features(decision), beta)?;
            let chosen = probabilities[decision.chosen()];
            if chosen <= epsilon {
                floored += 1;
            }
            log_likelihood += (chosen + epsilon).ln();
        }

        if floored > 0 {
            log::warn!(
                "{floored} chosen probabilities underflowed to the epsilon floor ({epsilon:e})"
            );
        }

        Ok(LikelihoodEvaluation {
            log_likelihood,
            floored,
        })
    }

    /// Per-decision choice probabilities, `N x J`.
    pub fn choice_probabilities(
        &self,
        beta: &DVector<f64>,
        data: &ChoiceData,
    ) -> Result<DMatrix<f64>> {
        check_dimension(beta, data)?;
        let j = data.alternatives_per_decision();
        let mut out = DMatrix::zeros(data.decision_count(), j);
        for (row, decision) in data.decisions().enumerate() {
            let probabilities = softmax(data.decision_features(decision), beta)?;
            out.row_mut(row).copy_from(&probabilities.transpose());
        }
        Ok(out)
    }

    /// Offset of the most probable alternative in each decision.
    pub fn predict_choices(&self, beta: &DVector<f64>, data: &ChoiceData) -> Result<Vec<usize>> {
        let probabilities = self.choice_probabilities(beta, data)?;
        Ok(probabilities
            .row_iter()
            .map(|row| row.transpose().imax())
            .collect())
    }

    /// Share of decisions whose most probable alternative is the chosen one.
    pub fn hit_rate(&self, beta: &DVector<f64>, data: &ChoiceData) -> Result<f64> {
        let predicted = self.predict_choices(beta, data)?;
        let hits = predicted
            .iter()
            .zip(data.decisions())
            .filter(|(p, d)| **p == d.chosen())
            .count();
        Ok(hits as f64 / data.decision_count() as f64)
    }

    /// Observed information `-H(beta)` of the unguarded log-likelihood.
    ///
    /// For the logit this is `sum_d sum_j p_j (x_j - xbar)(x_j - xbar)'` with
    /// `xbar = sum_j p_j x_j`, independent of which alternative was chosen.
    pub fn information(&self, beta: &DVector<f64>, data: &ChoiceData) -> Result<DMatrix<f64>> {
        check_dimension(beta, data)?;
        let k = data.feature_dim();
        let mut information = DMatrix::zeros(k, k);
        for decision in data.decisions() {
            let x = data.decision_features(decision);
            let probabilities = softmax(x, beta)?;
            let mean = x.tr_mul(&probabilities);
            for (offset, p) in probabilities.iter().enumerate() {
                let deviation = x.row(offset).transpose() - &mean;
                information.ger(*p, &deviation, &deviation, 1.0);
            }
        }
        Ok(information)
    }
}

impl LogLikelihood for MultinomialLogit {
    fn log_likelihood(&self, beta: &DVector<f64>, data: &ChoiceData) -> Result<f64> {
        self.evaluate(beta, data).map(|e| e.log_likelihood)
    }

    /// Exact gradient of `sum_d ln(p_c + epsilon)`:
    /// `sum_d p_c / (p_c + epsilon) * (x_c - sum_j p_j x_j)`.
    fn gradient(&self, beta: &DVector<f64>, data: &ChoiceData) -> Result<DVector<f64>> {
        check_dimension(beta, data)?;
        let epsilon = self.options.epsilon;
        let mut gradient = DVector::zeros(data.feature_dim());
        for decision in data.decisions() {
            let x = data.decision_features(decision);
            let probabilities = softmax(x, beta)?;
            let chosen = probabilities[decision.chosen()];
            let weight = chosen / (chosen + epsilon);
            let mean = x.tr_mul(&probabilities);
            gradient += (x.row(decision.chosen()).transpose() - mean) * weight;
        }
        Ok(gradient)
    }
}

/// Softmax of the linear utilities `x * beta` over one decision.
pub(crate) fn softmax(x: DMatrixView<'_, f64>, beta: &DVector<f64>) -> Result<DVector<f64>> {
    let mut weights = x * beta;
    weights.apply(|u| *u = u.exp());
    let total = weights.sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(ChoiceError::NumericalError {
            context: "utility exponentiation",
        });
    }
    weights /= total;
    Ok(weights)
}

fn check_dimension(beta: &DVector<f64>, data: &ChoiceData) -> Result<()> {
    if beta.len() != data.feature_dim() {
        return Err(ChoiceError::dimension_mismatch(
            "coefficient length",
            data.feature_dim(),
            beta.len(),
        ));
    }
    Ok(())
}
