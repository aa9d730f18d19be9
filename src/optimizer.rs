//! Bridge between a [`LogLikelihood`] and `argmin`'s BFGS solver.
//!
//! `argmin` minimizes, so the problem exposed here is the negative log-likelihood. Parameters
//! cross the boundary as `ndarray` vectors and come back as `nalgebra` types.

use std::sync::{Arc, Mutex};

use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{
    CostFunction, Error, Executor, Gradient, State, TerminationReason, TerminationStatus, KV,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::BFGS;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::data::ChoiceData;
use crate::error::{ChoiceError, Result};
use crate::likelihood::LogLikelihood;
use crate::options::MleOptions;

/// `-ln L(beta)` over a fixed dataset, in the shape `argmin` expects.
#[derive(Debug, Clone)]
pub struct NegativeLogLikelihood<'a, L: LogLikelihood> {
    model: &'a L,
    data: &'a ChoiceData,
}

impl<'a, L: LogLikelihood> NegativeLogLikelihood<'a, L> {
    /// Wraps `model` evaluated on `data`.
    pub fn new(model: &'a L, data: &'a ChoiceData) -> Self {
        Self { model, data }
    }
}

impl<'a, L: LogLikelihood> CostFunction for NegativeLogLikelihood<'a, L> {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, Error> {
        let beta = to_dvector(param);
        let value = self.model.log_likelihood(&beta, self.data)?;
        if !value.is_finite() {
            return Err(ChoiceError::NumericalError {
                context: "log-likelihood",
            }
            .into());
        }
        Ok(-value)
    }
}

impl<'a, L: LogLikelihood> Gradient for NegativeLogLikelihood<'a, L> {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, param: &Self::Param) -> std::result::Result<Self::Gradient, Error> {
        let beta = to_dvector(param);
        let gradient = self.model.gradient(&beta, self.data)?;
        Ok(to_array(&(-gradient)))
    }
}

/// Final state of a BFGS run.
#[derive(Clone, Debug)]
pub struct BfgsOutcome {
    /// Best coefficients found.
    pub beta: DVector<f64>,
    /// Log-likelihood at `beta`.
    pub log_likelihood: f64,
    /// BFGS approximation of the inverse Hessian of `-ln L` at termination.
    pub inverse_hessian: Option<DMatrix<f64>>,
    pub iterations: u64,
    /// Whether a gradient or cost-change tolerance stopped the search.
    pub converged: bool,
    /// Termination reason as reported by `argmin`.
    pub termination: String,
}

/// Best point seen by the solver, shared with the caller so it survives a failed run.
#[derive(Clone, Debug)]
struct Progress {
    best: Array1<f64>,
    best_cost: f64,
    iterations: u64,
}

#[derive(Clone, Debug)]
struct ProgressRecorder {
    shared: Arc<Mutex<Progress>>,
}

impl<I> Observe<I> for ProgressRecorder
where
    I: State<Param = Array1<f64>, Float = f64>,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> std::result::Result<(), Error> {
        if let Ok(mut progress) = self.shared.lock() {
            progress.iterations = state.get_iter();
            let cost = state.get_best_cost();
            if cost < progress.best_cost {
                if let Some(best) = state.get_best_param() {
                    progress.best = best.clone();
                    progress.best_cost = cost;
                }
            }
        }
        Ok(())
    }
}

/// Runs BFGS with a More–Thuente line search from `beta0`.
///
/// `initial_inverse_hessian` seeds the curvature estimate; identity is used when `None`.
/// A failure inside the search (a line search that cannot make progress, a trial step whose
/// utilities overflow) is reported as [`ChoiceError::ConvergenceFailure`] carrying the best
/// coefficients evaluated before it.
pub fn run_bfgs<L: LogLikelihood>(
    problem: NegativeLogLikelihood<'_, L>,
    beta0: &DVector<f64>,
    initial_inverse_hessian: Option<&DMatrix<f64>>,
    options: &MleOptions,
) -> Result<BfgsOutcome> {
    let k = beta0.len();
    let inverse_hessian0 = match initial_inverse_hessian {
        Some(matrix) => {
            if matrix.nrows() != k || matrix.ncols() != k {
                return Err(ChoiceError::dimension_mismatch(
                    "initial inverse Hessian",
                    k,
                    matrix.nrows(),
                ));
            }
            Array2::from_shape_fn((k, k), |(r, c)| matrix[(r, c)])
        }
        None => Array2::eye(k),
    };

    let linesearch = MoreThuenteLineSearch::new();
    let solver = BFGS::new(linesearch)
        .with_tolerance_grad(options.tolerance_grad)?
        .with_tolerance_cost(options.tolerance_cost)?;

    let theta0 = to_array(beta0);
    let cost0 = problem.cost(&theta0)?;
    let shared = Arc::new(Mutex::new(Progress {
        best: theta0.clone(),
        best_cost: cost0,
        iterations: 0,
    }));
    let recorder = ProgressRecorder {
        shared: Arc::clone(&shared),
    };

    let result = Executor::new(problem, solver)
        .configure(|state| {
            state
                .param(theta0)
                .inv_hessian(inverse_hessian0)
                .max_iters(options.max_iterations)
        })
        .add_observer(recorder, ObserverMode::Always)
        .run();

    let result = match result {
        Ok(result) => result,
        Err(error) => {
            let progress = shared
                .lock()
                .map(|progress| progress.clone())
                .map_err(|_| ChoiceError::Optimizer {
                    message: "progress record poisoned".to_string(),
                })?;
            log::warn!(
                "BFGS failed after {} iterations: {error}",
                progress.iterations
            );
            return Err(ChoiceError::ConvergenceFailure {
                iterations: progress.iterations,
                log_likelihood: -progress.best_cost,
                beta: to_dvector(&progress.best),
            });
        }
    };

    let state = result.state();
    let status = state.get_termination_status();
    let converged = matches!(
        status,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    let best = state
        .get_best_param()
        .or_else(|| state.get_param())
        .ok_or(ChoiceError::NumericalError {
            context: "optimizer returned no parameters",
        })?;

    Ok(BfgsOutcome {
        beta: to_dvector(best),
        log_likelihood: -state.get_best_cost(),
        inverse_hessian: state.get_inv_hessian().map(to_dmatrix),
        iterations: state.get_iter(),
        converged,
        termination: format!("{status:?}"),
    })
}

fn to_array(vector: &DVector<f64>) -> Array1<f64> {
    vector.iter().copied().collect()
}

fn to_dvector(array: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(array.len(), array.iter().copied())
}

fn to_dmatrix(array: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = array.dim();
    DMatrix::from_fn(rows, cols, |r, c| array[[r, c]])
}
