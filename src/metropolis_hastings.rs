/*!
# Metropolis–Hastings over hypotheses

A generic Metropolis–Hastings sampler for any hypothesis type `H`, given a
[`Target`] that scores hypotheses and a [`Proposal`] that perturbs them.
[`MHMarkovChain`] is a single chain; [`MetropolisHastings`] owns several
independent chains started from the same hypothesis and runs them in parallel
through [`ChainRunner`](crate::core::ChainRunner).

Each chain gets its own seed (`seed + i` for chain `i`), and its proposal is
reseeded from that, so no two chains share a random stream.

## Example Usage

```rust
use lot_mcmc::core::ChainRunner;
use lot_mcmc::hypothesis::Posterior;
use lot_mcmc::metropolis_hastings::MetropolisHastings;
use lot_mcmc::number_game::{Concept, ConceptSpace, SizePrinciple};

let space = ConceptSpace::standard(100)?;
let target = Posterior::new(space.clone(), SizePrinciple::new(0.9, 100), vec![16, 8, 2, 64]);

let mut mh = MetropolisHastings::new(target, space, Concept::Even, 1.0, 2)?.set_seed(7);
assert_eq!(mh.chains[1].seed, 8);

let samples = mh.run(500, 100);
assert_eq!(samples.len(), 2);
assert!(samples.iter().all(|chain| chain.len() == 400));
# Ok::<(), lot_mcmc::Error>(())
```
*/

use std::mem;

use rand::prelude::*;
use tracing::trace;

use crate::core::{HasChains, IntoSteps, MarkovChain};
use crate::error::{Error, Result};
use crate::hypothesis::{PriorSample, Proposal, Scored, Target};

/// Decorrelates a chain's proposal stream from its accept/reject stream.
const PROPOSAL_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/**
A set of independent Metropolis–Hastings chains sharing a target, a proposal
and an initial hypothesis.
*/
#[derive(Debug, Clone)]
pub struct MetropolisHastings<H, D, Q> {
    pub target: D,
    pub proposal: Q,
    pub chains: Vec<MHMarkovChain<H, D, Q>>,
    pub temperature: f64,
    /// The global random seed.
    pub seed: u64,
}

/// A single Markov chain for the Metropolis–Hastings algorithm.
///
/// Each chain stores its own copy of the target and proposal, its current
/// scored hypothesis, and a chain-specific random number generator.
#[derive(Debug, Clone)]
pub struct MHMarkovChain<H, D, Q> {
    pub target: D,
    pub proposal: Q,
    pub temperature: f64,
    pub current_state: Scored<H>,
    pub seed: u64,
    pub rng: SmallRng,
    n_steps: u64,
    n_accepted: u64,
    last_accepted: bool,
}

impl<H, D, Q> MetropolisHastings<H, D, Q>
where
    H: Clone,
    D: Target<H> + Clone,
    Q: Proposal<H> + Clone,
{
    /**
    Creates `n_chains` chains, all starting at `initial`.

    Fails with [`Error::InvalidConfiguration`] if `n_chains` is zero or the
    temperature is not a positive finite number.
    */
    pub fn new(
        target: D,
        proposal: Q,
        initial: H,
        temperature: f64,
        n_chains: usize,
    ) -> Result<Self> {
        if n_chains == 0 {
            return Err(Error::config("at least one chain is required"));
        }
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(Error::config(format!(
                "temperature must be positive and finite, got {temperature}"
            )));
        }

        let chains = (0..n_chains)
            .map(|_| {
                MHMarkovChain::new(
                    target.clone(),
                    proposal.clone(),
                    initial.clone(),
                    temperature,
                )
            })
            .collect();
        let seed = thread_rng().gen::<u64>();

        Ok(Self {
            target,
            proposal,
            chains,
            temperature,
            seed,
        }
        .set_seed(seed))
    }

    /// Sets a new global seed; chain `i` is reseeded with `seed + i`.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.chains = mem::take(&mut self.chains)
            .into_iter()
            .enumerate()
            .map(|(i, chain)| chain.set_seed(seed.wrapping_add(i as u64)))
            .collect();
        self
    }

    /// Fraction of accepted proposals over all chains so far.
    pub fn acceptance_rate(&self) -> f64 {
        let (steps, accepted) = self
            .chains
            .iter()
            .fold((0, 0), |(s, a), c| (s + c.n_steps, a + c.n_accepted));
        if steps == 0 {
            0.0
        } else {
            accepted as f64 / steps as f64
        }
    }
}

impl<H, D, Q> HasChains<H> for MetropolisHastings<H, D, Q>
where
    H: Clone + Send,
    D: Target<H> + Clone + Send,
    Q: Proposal<H> + Clone + Send,
{
    type Chain = MHMarkovChain<H, D, Q>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

impl<H, D, Q> MHMarkovChain<H, D, Q>
where
    D: Target<H>,
    Q: Proposal<H>,
{
    /// Creates a chain at `initial`, scoring it once against `target`.
    pub fn new(target: D, proposal: Q, initial: H, temperature: f64) -> Self {
        let score = target.compute_posterior(&initial, temperature);
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            proposal: proposal.set_seed(seed ^ PROPOSAL_SEED_MIX),
            temperature,
            current_state: Scored::new(initial, score),
            seed,
            rng: SmallRng::seed_from_u64(seed),
            n_steps: 0,
            n_accepted: 0,
            last_accepted: false,
        }
    }

    /// Reseeds both the accept/reject stream and the proposal.
    pub fn set_seed(self, seed: u64) -> Self {
        let Self {
            target,
            proposal,
            temperature,
            current_state,
            n_steps,
            n_accepted,
            last_accepted,
            ..
        } = self;
        Self {
            target,
            proposal: proposal.set_seed(seed ^ PROPOSAL_SEED_MIX),
            temperature,
            current_state,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            n_steps,
            n_accepted,
            last_accepted,
        }
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.n_steps == 0 {
            0.0
        } else {
            self.n_accepted as f64 / self.n_steps as f64
        }
    }

    pub fn n_steps(&self) -> u64 {
        self.n_steps
    }
}

impl<H, D, Q> MarkovChain<H> for MHMarkovChain<H, D, Q>
where
    D: Target<H>,
    Q: Proposal<H>,
{
    /**
    Performs one Metropolis–Hastings update.

    The proposal is accepted when

    ```text
    (post(h') + log q(h | h')) - (post(h) + log q(h' | h)) > ln(u),  u ~ U(0, 1)
    ```

    A proposal that fails to build counts as a rejection. A NaN or `-inf`
    ratio never accepts, except that a chain stuck on an impossible
    hypothesis moves to any possible one.
    */
    fn step(&mut self) -> &Scored<H> {
        self.n_steps += 1;
        self.last_accepted = false;

        let proposed = match self.proposal.sample(&self.current_state.hypothesis) {
            Ok(h) => h,
            Err(err) => {
                trace!(%err, "proposal failed; rejecting");
                return &self.current_state;
            }
        };
        let score = self.target.compute_posterior(&proposed, self.temperature);

        let current = &self.current_state;
        let log_accept_ratio = if current.posterior() == f64::NEG_INFINITY {
            if score.posterior > f64::NEG_INFINITY {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            }
        } else {
            let log_q_forward = self.proposal.log_prob(&current.hypothesis, &proposed);
            let log_q_backward = self.proposal.log_prob(&proposed, &current.hypothesis);
            (score.posterior + log_q_backward) - (current.posterior() + log_q_forward)
        };

        let u: f64 = self.rng.gen();
        if log_accept_ratio > u.ln() {
            self.current_state = Scored::new(proposed, score);
            self.n_accepted += 1;
            self.last_accepted = true;
        }
        &self.current_state
    }

    fn current_state(&self) -> &Scored<H> {
        &self.current_state
    }

    fn last_accepted(&self) -> bool {
        self.last_accepted
    }
}

/**
Runs a single chain from `initial` for exactly `iterations` steps.

The returned sequence is lazy: nothing is sampled until it is iterated, and
[`IntoSteps::into_chain`] hands back the chain to continue sampling later.
*/
pub fn run_sampler<H, D, Q>(
    initial: H,
    target: D,
    proposal: Q,
    temperature: f64,
    iterations: usize,
) -> IntoSteps<H, MHMarkovChain<H, D, Q>>
where
    D: Target<H>,
    Q: Proposal<H>,
{
    MHMarkovChain::new(target, proposal, initial, temperature).into_steps(iterations)
}

/// Draws `n` independent hypotheses from the prior, scoring each against `target`.
pub fn prior_sample<'a, H, G, D>(
    grammar: &'a mut G,
    target: &'a D,
    temperature: f64,
    n: usize,
) -> impl Iterator<Item = Scored<H>> + 'a
where
    H: 'a,
    G: PriorSample<H>,
    D: Target<H>,
{
    (0..n).map(move |_| {
        let h = grammar.sample_prior();
        let score = target.compute_posterior(&h, temperature);
        Scored::new(h, score)
    })
}
