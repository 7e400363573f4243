/*!
Capabilities a hypothesis space plugs into the sampler, and the posterior that
composes them.

A grammar supplies a [`Prior`] and a [`Proposal`]; the data model supplies a
[`Likelihood`]. [`Posterior`] combines a prior, a likelihood and a data set
into a [`Target`] that the Metropolis–Hastings chain can score against.

# Examples

```rust
use lot_mcmc::hypothesis::{Posterior, Target};
use lot_mcmc::number_game::{Concept, ConceptSpace, SizePrinciple};

let space = ConceptSpace::standard(100)?;
let target = Posterior::new(space, SizePrinciple::new(0.9, 100), vec![16, 8, 2, 64]);

let powers = target.compute_posterior(&Concept::Power(2), 1.0);
let evens = target.compute_posterior(&Concept::Even, 1.0);
assert!(powers.posterior > evens.posterior);
# Ok::<(), lot_mcmc::Error>(())
```
*/

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::EvalError;

/// Log prior probability of a hypothesis under a grammar.
pub trait Prior<H> {
    fn log_prior(&self, hypothesis: &H) -> f64;
}

/// A trait for generating proposals in Metropolis–Hastings.
///
/// Proposals should respect the grammar (e.g. regenerate a subtree). Building
/// a proposal may fail, for instance when it exceeds a size bound; the sampler
/// then rejects the step.
pub trait Proposal<H> {
    /// Samples a new hypothesis from q(h' | h).
    fn sample(&mut self, current: &H) -> Result<H, EvalError>;

    /// Evaluates log q(to | from).
    fn log_prob(&self, from: &H, to: &H) -> f64;

    /// Returns a new instance of this proposal seeded with `seed`.
    fn set_seed(self, seed: u64) -> Self;
}

/// Draws hypotheses directly from the prior.
pub trait PriorSample<H> {
    fn sample_prior(&mut self) -> H;
}

/// Log likelihood of a single datum under a hypothesis.
pub trait Likelihood<H> {
    type Datum;

    fn log_likelihood(&self, hypothesis: &H, datum: &Self::Datum) -> Result<f64, EvalError>;
}

/// A hypothesis whose semantics produce a stochastic output string.
pub trait Generative {
    type Input;

    fn generate<R: Rng + ?Sized>(&self, input: &Self::Input, rng: &mut R)
        -> Result<String, EvalError>;
}

/// Anything that can assign a posterior score to a hypothesis.
pub trait Target<H> {
    /// Scores `hypothesis`, dividing the likelihood by `temperature`.
    fn compute_posterior(&self, hypothesis: &H, temperature: f64) -> Score;
}

/// Prior, likelihood and posterior of a hypothesis, all in log space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    #[serde(with = "log_prob")]
    pub prior: f64,
    #[serde(with = "log_prob")]
    pub likelihood: f64,
    #[serde(with = "log_prob")]
    pub posterior: f64,
}

impl Score {
    /// Combines prior and likelihood. A prior of `-inf` short-circuits.
    pub fn new(prior: f64, likelihood: f64, temperature: f64) -> Self {
        if prior == f64::NEG_INFINITY {
            return Self::impossible();
        }
        Self {
            prior,
            likelihood,
            posterior: prior + likelihood / temperature,
        }
    }

    pub fn impossible() -> Self {
        Self {
            prior: f64::NEG_INFINITY,
            likelihood: f64::NEG_INFINITY,
            posterior: f64::NEG_INFINITY,
        }
    }
}

/// A hypothesis together with its most recent [`Score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored<H> {
    pub hypothesis: H,
    pub score: Score,
}

impl<H> Scored<H> {
    pub fn new(hypothesis: H, score: Score) -> Self {
        Self { hypothesis, score }
    }

    pub fn posterior(&self) -> f64 {
        self.score.posterior
    }
}

/**
A posterior over hypotheses: prior + likelihood / temperature, summed over a
fixed data set.

The data are shared behind an [`Arc`], so cloning a posterior for each chain
copies no data. Evaluation errors raised by the likelihood count as zero
probability.
*/
#[derive(Debug)]
pub struct Posterior<P, L, D> {
    pub prior: P,
    pub likelihood: L,
    pub data: Arc<[D]>,
}

impl<P, L, D> Posterior<P, L, D> {
    pub fn new(prior: P, likelihood: L, data: impl Into<Arc<[D]>>) -> Self {
        Self {
            prior,
            likelihood,
            data: data.into(),
        }
    }

    /// Same prior and likelihood, different data.
    pub fn with_data(&self, data: impl Into<Arc<[D]>>) -> Self
    where
        P: Clone,
        L: Clone,
    {
        Self::new(self.prior.clone(), self.likelihood.clone(), data)
    }
}

impl<P: Clone, L: Clone, D> Clone for Posterior<P, L, D> {
    fn clone(&self) -> Self {
        Self {
            prior: self.prior.clone(),
            likelihood: self.likelihood.clone(),
            data: Arc::clone(&self.data),
        }
    }
}

impl<H, P, L, D> Target<H> for Posterior<P, L, D>
where
    P: Prior<H>,
    L: Likelihood<H, Datum = D>,
{
    fn compute_posterior(&self, hypothesis: &H, temperature: f64) -> Score {
        let prior = self.prior.log_prior(hypothesis);
        if prior == f64::NEG_INFINITY {
            return Score::impossible();
        }

        let mut likelihood = 0.0;
        for datum in self.data.iter() {
            match self.likelihood.log_likelihood(hypothesis, datum) {
                Ok(ll) => likelihood += ll,
                Err(err) => {
                    trace!(%err, "likelihood evaluation failed; scoring as impossible");
                    likelihood = f64::NEG_INFINITY;
                    break;
                }
            }
            if likelihood == f64::NEG_INFINITY {
                break;
            }
        }
        Score::new(prior, likelihood, temperature)
    }
}

/// Serializes `-inf` as `null`, since JSON has no infinities.
mod log_prob {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
    }
}
