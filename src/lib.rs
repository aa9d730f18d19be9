//! Multinomial logit estimation for grouped discrete-choice data.
//!
//! A decision offers `J` alternatives, each described by `K` covariates, and exactly one
//! alternative is chosen. Choice probabilities follow the softmax of linear utilities
//! `x'beta`. The crate estimates `beta` two ways, both driven by the same likelihood:
//!
//! - maximum likelihood via BFGS, with curvature-based standard errors (`mle` module), and
//! - Bayesian posterior sampling via random-walk Metropolis–Hastings under an independent
//!   Gaussian prior (`sampler` and `posterior` modules).
//!
//! Supporting modules validate and group the input records (`data`), expand categorical
//! covariates into indicators (`design`), and simulate data from the model itself
//! (`simulate`).
//!
//! # Quick start
//!
//! ```no_run
//! use mnlrs::data::ChoiceDataBuilder;
//! use mnlrs::{MaximumLikelihood, MetropolisHastings, MleOptions, SamplerOptions};
//! use nalgebra::{DMatrix, DVector};
//!
//! // Two decisions, two alternatives each, covariates (price, ad).
//! let respondents = vec!["r1".to_string(), "r1".to_string(), "r2".to_string(), "r2".to_string()];
//! let chosen = vec![true, false, false, true];
//! let x = DMatrix::from_row_slice(4, 2, &[8.0, 1.0, 12.0, 0.0, 16.0, 0.0, 8.0, 1.0]);
//!
//! let data = ChoiceDataBuilder::new(respondents, chosen, 2)
//!     .features(x)
//!     .names(vec!["price".to_string(), "ad".to_string()])
//!     .build()
//!     .expect("well-formed decisions");
//!
//! let mle = MaximumLikelihood::new(&data)
//!     .fit(&MleOptions::default())
//!     .expect("converged");
//! println!("{mle}");
//!
//! let options = SamplerOptions::new(
//!     DVector::from_vec(vec![0.005, 0.05]),
//!     DVector::from_vec(vec![1.0, 5.0]),
//! );
//! let sample = MetropolisHastings::new(&data, options)
//!     .and_then(|sampler| sampler.run_seeded())
//!     .expect("valid sampler options");
//! println!("{}", sample.summarize().expect("non-empty sample"));
//! ```

pub mod data;
pub mod design;
pub mod error;
pub mod likelihood;
pub mod mle;
pub mod optimizer;
pub mod options;
pub mod posterior;
pub mod prior;
pub mod sampler;
pub mod simulate;

pub use data::{ChoiceData, ChoiceDataBuilder};
pub use error::{ChoiceError, Result};
pub use likelihood::{LogLikelihood, MultinomialLogit};
pub use mle::{MaximumLikelihood, MleEstimate};
pub use options::{CovarianceSource, LikelihoodOptions, MleOptions, SamplerOptions};
pub use posterior::PosteriorSummary;
pub use sampler::{MetropolisHastings, PosteriorSample};
