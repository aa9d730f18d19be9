//! Random-walk Metropolis–Hastings over the logit coefficients.
//!
//! One chain, a Gaussian random-walk proposal with fixed per-coefficient step sizes, and an
//! independent Gaussian prior. The proposal is symmetric, so a move from `beta` to `beta'` is
//! accepted with probability `min(1, exp(lp(beta') - lp(beta)))` where `lp` is the log
//! posterior. Every iteration, accepted or not, appends the current state to the trace; the
//! first `burn_in` entries are excluded from the posterior sample.

use nalgebra::DVector;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::data::ChoiceData;
use crate::error::{ChoiceError, Result};
use crate::likelihood::MultinomialLogit;
use crate::options::SamplerOptions;
use crate::posterior::{summarize, PosteriorSummary};
use crate::prior::GaussianPrior;

/// Current position of the chain and its cached log posterior.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainState {
    pub beta: DVector<f64>,
    pub log_posterior: f64,
}

/// What happened during one transition.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub proposal_log_posterior: f64,
    /// `lp(proposal) - lp(current)` before the move.
    pub log_ratio: f64,
    pub accepted: bool,
}

/// Metropolis acceptance for a symmetric proposal.
///
/// Uphill and level moves are always accepted; a downhill move is accepted when a uniform
/// draw falls strictly below `exp(log_ratio)`.
pub fn metropolis_accept<R: Rng + ?Sized>(log_ratio: f64, rng: &mut R) -> bool {
    if log_ratio.is_nan() {
        return false;
    }
    if log_ratio >= 0.0 {
        return true;
    }
    let u: f64 = rng.gen();
    u < log_ratio.exp()
}

/// A single-chain sampler bound to one dataset.
#[derive(Clone, Debug)]
pub struct MetropolisHastings<'a> {
    data: &'a ChoiceData,
    model: MultinomialLogit,
    prior: GaussianPrior,
    options: SamplerOptions,
}

impl<'a> MetropolisHastings<'a> {
    /// Validates `options` against the dataset and builds the prior.
    pub fn new(data: &'a ChoiceData, options: SamplerOptions) -> Result<Self> {
        options.validate(data.feature_dim())?;
        let prior = GaussianPrior::new(options.prior_sd.clone())?;
        Ok(Self {
            data,
            model: MultinomialLogit::new(options.likelihood),
            prior,
            options,
        })
    }

    /// Options the sampler was built with.
    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    /// `ln L(beta) + ln p(beta)`.
    pub fn log_posterior(&self, beta: &DVector<f64>) -> Result<f64> {
        let log_likelihood = self.model.evaluate(beta, self.data)?.log_likelihood;
        Ok(log_likelihood + self.prior.log_density(beta)?)
    }

    /// Chain state at the configured starting point (zeros by default).
    pub fn initial_state(&self) -> Result<ChainState> {
        let beta = self
            .options
            .initial
            .clone()
            .unwrap_or_else(|| DVector::zeros(self.data.feature_dim()));
        let log_posterior = self.log_posterior(&beta)?;
        if !log_posterior.is_finite() {
            return Err(ChoiceError::NumericalError {
                context: "initial log posterior",
            });
        }
        Ok(ChainState {
            beta,
            log_posterior,
        })
    }

    /// Proposes a random-walk move and applies the accept/reject rule to `state` in place.
    ///
    /// A proposal whose utilities overflow has zero posterior density and is rejected.
    pub fn step<R: Rng + ?Sized>(
        &self,
        state: &mut ChainState,
        rng: &mut R,
    ) -> Result<StepOutcome> {
        let mut proposal = state.beta.clone();
        for (value, sd) in proposal.iter_mut().zip(self.options.proposal_sd.iter()) {
            let z: f64 = rng.sample(StandardNormal);
            *value += sd * z;
        }

        let proposal_log_posterior = match self.log_posterior(&proposal) {
            Ok(value) => value,
            Err(ChoiceError::NumericalError { context }) => {
                log::trace!("proposal rejected: non-finite {context}");
                f64::NEG_INFINITY
            }
            Err(other) => return Err(other),
        };

        let log_ratio = proposal_log_posterior - state.log_posterior;
        let accepted = metropolis_accept(log_ratio, rng);
        if accepted {
            state.beta = proposal;
            state.log_posterior = proposal_log_posterior;
        }

        Ok(StepOutcome {
            proposal_log_posterior,
            log_ratio,
            accepted,
        })
    }

    /// Runs the full iteration budget with a generator seeded from `options.seed`.
    pub fn run_seeded(&self) -> Result<PosteriorSample> {
        let mut rng = SmallRng::seed_from_u64(self.options.seed);
        self.run(&mut rng)
    }

    /// Runs the full iteration budget with the caller's generator.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PosteriorSample> {
        let iterations = self.options.iterations;
        let mut state = self.initial_state()?;
        let mut trace = Vec::with_capacity(iterations);
        let mut log_posterior = Vec::with_capacity(iterations);
        let mut accepted = 0usize;
        let mut downhill = 0usize;
        let mut downhill_accepted = 0usize;

        for _ in 0..iterations {
            let outcome = self.step(&mut state, rng)?;
            if outcome.accepted {
                accepted += 1;
            }
            if outcome.log_ratio < 0.0 {
                downhill += 1;
                if outcome.accepted {
                    downhill_accepted += 1;
                }
            }
            trace.push(state.beta.clone());
            log_posterior.push(state.log_posterior);
        }

        let sample = PosteriorSample {
            names: self.data.coefficient_names().to_vec(),
            trace,
            log_posterior,
            burn_in: self.options.burn_in,
            accepted,
            downhill,
            downhill_accepted,
        };
        log::debug!(
            "Metropolis-Hastings finished {} iterations, acceptance rate {:.3}",
            iterations,
            sample.acceptance_rate()
        );
        Ok(sample)
    }
}

/// Output of a finished chain: the raw trace plus the burn-in boundary.
#[derive(Clone, Debug)]
pub struct PosteriorSample {
    names: Vec<String>,
    trace: Vec<DVector<f64>>,
    log_posterior: Vec<f64>,
    burn_in: usize,
    accepted: usize,
    downhill: usize,
    downhill_accepted: usize,
}

impl PosteriorSample {
    /// Retained draws after burn-in.
    pub fn draws(&self) -> &[DVector<f64>] {
        &self.trace[self.burn_in.min(self.trace.len())..]
    }

    /// Every state visited, burn-in included.
    pub fn trace(&self) -> &[DVector<f64>] {
        &self.trace
    }

    /// Log posterior of every visited state, aligned with [`trace`](Self::trace).
    pub fn log_posterior(&self) -> &[f64] {
        &self.log_posterior
    }

    /// Number of leading trace entries excluded from [`draws`](Self::draws).
    pub fn burn_in(&self) -> usize {
        self.burn_in
    }

    /// Names of the sampled coefficients, in trace order.
    pub fn coefficient_names(&self) -> &[String] {
        &self.names
    }

    /// Accepted proposals over all iterations.
    pub fn acceptance_rate(&self) -> f64 {
        if self.trace.is_empty() {
            return 0.0;
        }
        self.accepted as f64 / self.trace.len() as f64
    }

    /// Acceptance rate restricted to proposals with lower posterior density.
    pub fn downhill_acceptance_rate(&self) -> Option<f64> {
        (self.downhill > 0).then(|| self.downhill_accepted as f64 / self.downhill as f64)
    }

    /// Reduces the retained draws to per-coefficient summaries.
    pub fn summarize(&self) -> Result<PosteriorSummary> {
        summarize(&self.names, self.draws())
    }
}
