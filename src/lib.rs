//! Metropolis–Hastings inference over language-of-thought hypotheses, scored
//! with an edit-distance smoothed likelihood.

pub mod config;
pub mod core;
pub mod error;
pub mod hypothesis;
pub mod io;
pub mod likelihood;
pub mod math;
pub mod metropolis_hastings;
pub mod number_game;
pub mod stats;
pub mod summary;

pub use error::{Error, EvalError, Result};
pub use likelihood::compute_likelihood;
pub use metropolis_hastings::run_sampler;
