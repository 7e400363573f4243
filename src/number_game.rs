/*!
# Number game

Concept learning over the integers `1..=domain`: given a few positive
examples, which rule generated them? Hypotheses are [`Concept`]s drawn from a
weighted, finite [`ConceptSpace`]; the [`SizePrinciple`] likelihood prefers the
smallest concept consistent with the data, mixed with a uniform noise term.

# Examples

```rust
use lot_mcmc::core::MarkovChain;
use lot_mcmc::hypothesis::Posterior;
use lot_mcmc::metropolis_hastings::MHMarkovChain;
use lot_mcmc::number_game::{Concept, ConceptSpace, SizePrinciple};

let space = ConceptSpace::standard(100)?;
let target = Posterior::new(space.clone(), SizePrinciple::new(0.9, 100), vec![16, 8, 2, 64]);
let mut chain = MHMarkovChain::new(target, space, Concept::Odd, 1.0).set_seed(42);

let visits = chain
    .iter(2_000)
    .filter(|s| s.hypothesis == Concept::Power(2))
    .count();
assert!(visits > 1_500);
# Ok::<(), lot_mcmc::Error>(())
```
*/

use std::collections::HashMap;
use std::fmt;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::error::{Error, EvalError, Result};
use crate::hypothesis::{Likelihood, Prior, PriorSample, Proposal};

/// A rule picking out a subset of `1..=domain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Concept {
    Even,
    Odd,
    Square,
    /// Multiples of `k`.
    Multiple(u32),
    /// `k^1, k^2, ...`
    Power(u32),
    /// Numbers whose last decimal digit is `d`.
    EndsIn(u32),
    /// The closed interval `[lo, hi]`.
    Range(u32, u32),
}

impl Concept {
    pub fn contains(&self, x: u32) -> bool {
        match *self {
            Concept::Even => x % 2 == 0,
            Concept::Odd => x % 2 == 1,
            Concept::Square => {
                let r = (x as f64).sqrt().round() as u64;
                r * r == u64::from(x)
            }
            Concept::Multiple(k) => k != 0 && x % k == 0,
            Concept::Power(k) => {
                if k < 2 || x < k {
                    return false;
                }
                let mut p = k;
                while p < x {
                    match p.checked_mul(k) {
                        Some(next) => p = next,
                        None => return false,
                    }
                }
                p == x
            }
            Concept::EndsIn(d) => x % 10 == d,
            Concept::Range(lo, hi) => lo <= x && x <= hi,
        }
    }

    /// Members of the concept within `1..=domain`.
    pub fn extension(&self, domain: u32) -> Vec<u32> {
        (1..=domain).filter(|&x| self.contains(x)).collect()
    }

    pub fn size(&self, domain: u32) -> usize {
        (1..=domain).filter(|&x| self.contains(x)).count()
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concept::Even => write!(f, "even"),
            Concept::Odd => write!(f, "odd"),
            Concept::Square => write!(f, "squares"),
            Concept::Multiple(k) => write!(f, "multiples of {k}"),
            Concept::Power(k) => write!(f, "powers of {k}"),
            Concept::EndsIn(d) => write!(f, "ends in {d}"),
            Concept::Range(lo, hi) => write!(f, "between {lo} and {hi}"),
        }
    }
}

/**
A finite, weighted space of concepts.

Acts as the grammar for the number game: it provides the prior, draws
independent proposals from that prior, and samples from it directly.
*/
#[derive(Debug, Clone)]
pub struct ConceptSpace {
    pub domain: u32,
    concepts: Vec<Concept>,
    log_prior: Vec<f64>,
    index: HashMap<Concept, usize>,
    sampler: WeightedIndex<f64>,
    rng: SmallRng,
}

impl ConceptSpace {
    /// Builds a space from `(concept, weight)` pairs. Weights are normalized.
    pub fn new(domain: u32, weighted: Vec<(Concept, f64)>) -> Result<Self> {
        if domain == 0 {
            return Err(Error::config("number game domain must be at least 1"));
        }
        let mut index = HashMap::with_capacity(weighted.len());
        for (i, (concept, _)) in weighted.iter().enumerate() {
            if index.insert(*concept, i).is_some() {
                return Err(Error::config(format!("concept {concept} listed twice")));
            }
        }
        let weights: Vec<f64> = weighted.iter().map(|(_, w)| *w).collect();
        let sampler = WeightedIndex::new(&weights)
            .map_err(|err| Error::config(format!("invalid concept weights: {err}")))?;
        let total: f64 = weights.iter().sum();
        Ok(Self {
            domain,
            concepts: weighted.into_iter().map(|(c, _)| c).collect(),
            log_prior: weights.iter().map(|w| (w / total).ln()).collect(),
            index,
            sampler,
            rng: SmallRng::from_entropy(),
        })
    }

    /**
    The usual mathematical concepts plus all decade-aligned intervals.

    Half of the prior mass goes to the mathematical rules and half to the
    intervals, each split uniformly.
    */
    pub fn standard(domain: u32) -> Result<Self> {
        let mut rules = vec![Concept::Even, Concept::Odd, Concept::Square];
        rules.extend((3..=12).map(Concept::Multiple));
        rules.extend((2..=10).map(Concept::Power));
        rules.extend((0..=9).map(Concept::EndsIn));

        let mut intervals = Vec::new();
        for lo in (1..=domain).step_by(10) {
            for hi in (lo + 9..=domain).step_by(10) {
                intervals.push(Concept::Range(lo, hi));
            }
        }

        let rule_weight = 0.5 / rules.len() as f64;
        let interval_weight = 0.5 / intervals.len().max(1) as f64;
        let weighted = rules
            .into_iter()
            .map(|c| (c, rule_weight))
            .chain(intervals.into_iter().map(|c| (c, interval_weight)))
            .collect();
        Self::new(domain, weighted)
    }

    pub fn concepts(&self) -> &[Concept] {
        &self.concepts
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

impl Prior<Concept> for ConceptSpace {
    fn log_prior(&self, concept: &Concept) -> f64 {
        self.index
            .get(concept)
            .map_or(f64::NEG_INFINITY, |&i| self.log_prior[i])
    }
}

impl PriorSample<Concept> for ConceptSpace {
    fn sample_prior(&mut self) -> Concept {
        self.concepts[self.sampler.sample(&mut self.rng)]
    }
}

impl Proposal<Concept> for ConceptSpace {
    /// Independence proposal: ignores the current concept and draws from the prior.
    fn sample(&mut self, _current: &Concept) -> std::result::Result<Concept, EvalError> {
        Ok(self.sample_prior())
    }

    fn log_prob(&self, _from: &Concept, to: &Concept) -> f64 {
        self.log_prior(to)
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }
}

/**
The size principle with outlier noise.

Each observed number `x` is generated from the concept with probability
`alpha` (uniformly among its members), or uniformly from the whole domain
otherwise:

```text
p(x | h) = alpha * [x in h] / |h| + (1 - alpha) / domain
```
*/
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizePrinciple {
    pub alpha: f64,
    pub domain: u32,
}

impl SizePrinciple {
    pub fn new(alpha: f64, domain: u32) -> Self {
        Self { alpha, domain }
    }
}

impl Likelihood<Concept> for SizePrinciple {
    type Datum = u32;

    fn log_likelihood(&self, concept: &Concept, x: &u32) -> std::result::Result<f64, EvalError> {
        let noise = (1.0 - self.alpha) / self.domain as f64;
        let size = concept.size(self.domain);
        let signal = if size > 0 && concept.contains(*x) && *x <= self.domain {
            self.alpha / size as f64
        } else {
            0.0
        };
        Ok((signal + noise).ln())
    }
}
