//! Learning `a^n b^n` from output frequencies.
//!
//! Hypotheses are small stochastic programs: literals, concatenation, a fair
//! coin choosing between two branches, and a recursive call to the whole
//! program. They are drawn from a probabilistic grammar and proposed by
//! regenerating a random subtree. Each hypothesis is scored by forward
//! sampling it and comparing its output counts to the data with the edit-noise
//! likelihood.

use std::fmt;

use rand::prelude::*;
use tracing::info;
use tracing_subscriber::prelude::*;

use lot_mcmc::config::SamplerConfig;
use lot_mcmc::core::ChainRunner;
use lot_mcmc::hypothesis::{Generative, Posterior, Prior, PriorSample, Proposal};
use lot_mcmc::likelihood::{Counts, FrequencyDatum};
use lot_mcmc::metropolis_hastings::MetropolisHastings;
use lot_mcmc::EvalError;

const MAX_NODES: usize = 24;
const MAX_DEPTH: usize = 12;
const MAX_OUTPUT: usize = 64;

/// Rule probabilities: empty, 'a', 'b', concat, flip, recurse.
const RULES: [f64; 6] = [0.2, 0.15, 0.15, 0.2, 0.15, 0.15];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Expr {
    Empty,
    Char(char),
    Concat(Box<Expr>, Box<Expr>),
    Flip(Box<Expr>, Box<Expr>),
    Recurse,
}

impl Expr {
    fn size(&self) -> usize {
        match self {
            Expr::Concat(l, r) | Expr::Flip(l, r) => 1 + l.size() + r.size(),
            _ => 1,
        }
    }

    fn paths(&self) -> Vec<Vec<u8>> {
        let mut out = vec![Vec::new()];
        if let Expr::Concat(l, r) | Expr::Flip(l, r) = self {
            for (side, child) in [(0, l), (1, r)] {
                for mut path in child.paths() {
                    path.insert(0, side);
                    out.push(path);
                }
            }
        }
        out
    }

    fn get(&self, path: &[u8]) -> Option<&Expr> {
        match (path.split_first(), self) {
            (None, _) => Some(self),
            (Some((0, rest)), Expr::Concat(l, _) | Expr::Flip(l, _)) => l.get(rest),
            (Some((1, rest)), Expr::Concat(_, r) | Expr::Flip(_, r)) => r.get(rest),
            _ => None,
        }
    }

    fn replace(&self, path: &[u8], new: &Expr) -> Expr {
        match (path.split_first(), self) {
            (None, _) => new.clone(),
            (Some((0, rest)), Expr::Concat(l, r)) => {
                Expr::Concat(Box::new(l.replace(rest, new)), r.clone())
            }
            (Some((1, rest)), Expr::Concat(l, r)) => {
                Expr::Concat(l.clone(), Box::new(r.replace(rest, new)))
            }
            (Some((0, rest)), Expr::Flip(l, r)) => {
                Expr::Flip(Box::new(l.replace(rest, new)), r.clone())
            }
            (Some((1, rest)), Expr::Flip(l, r)) => {
                Expr::Flip(l.clone(), Box::new(r.replace(rest, new)))
            }
            _ => self.clone(),
        }
    }

    fn eval<R: Rng + ?Sized>(
        &self,
        root: &Expr,
        depth: usize,
        rng: &mut R,
        out: &mut String,
    ) -> Result<(), EvalError> {
        match self {
            Expr::Empty => {}
            Expr::Char(c) => out.push(*c),
            Expr::Concat(l, r) => {
                l.eval(root, depth, rng, out)?;
                r.eval(root, depth, rng, out)?;
            }
            Expr::Flip(l, r) => {
                let branch = if rng.gen_bool(0.5) { l } else { r };
                branch.eval(root, depth, rng, out)?;
            }
            Expr::Recurse => {
                if depth >= MAX_DEPTH {
                    return Err(EvalError::RecursionDepth { bound: MAX_DEPTH });
                }
                root.eval(root, depth + 1, rng, out)?;
            }
        }
        if out.len() > MAX_OUTPUT {
            return Err(EvalError::Failed(format!("output longer than {MAX_OUTPUT}")));
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Empty => write!(f, "''"),
            Expr::Char(c) => write!(f, "{c}"),
            Expr::Concat(l, r) => write!(f, "({l} {r})"),
            Expr::Flip(l, r) => write!(f, "flip({l}, {r})"),
            Expr::Recurse => write!(f, "recurse"),
        }
    }
}

impl Generative for Expr {
    type Input = ();

    fn generate<R: Rng + ?Sized>(&self, _input: &(), rng: &mut R) -> Result<String, EvalError> {
        let mut out = String::new();
        self.eval(self, 0, rng, &mut out)?;
        Ok(out)
    }
}

/// Probabilistic grammar over [`Expr`].
#[derive(Debug, Clone)]
struct Grammar {
    rng: SmallRng,
}

impl Grammar {
    fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    fn generate(&mut self, budget: &mut usize) -> Result<Expr, EvalError> {
        if *budget == 0 {
            return Err(EvalError::TooBig {
                nodes: MAX_NODES + 1,
                max: MAX_NODES,
            });
        }
        *budget -= 1;
        let u: f64 = self.rng.gen();
        let mut acc = 0.0;
        let mut rule = RULES.len() - 1;
        for (i, p) in RULES.iter().enumerate() {
            acc += p;
            if u < acc {
                rule = i;
                break;
            }
        }
        Ok(match rule {
            0 => Expr::Empty,
            1 => Expr::Char('a'),
            2 => Expr::Char('b'),
            3 => Expr::Concat(Box::new(self.generate(budget)?), Box::new(self.generate(budget)?)),
            4 => Expr::Flip(Box::new(self.generate(budget)?), Box::new(self.generate(budget)?)),
            _ => Expr::Recurse,
        })
    }

    fn tree_log_prob(expr: &Expr) -> f64 {
        let rule = match expr {
            Expr::Empty => RULES[0],
            Expr::Char('a') => RULES[1],
            Expr::Char('b') => RULES[2],
            Expr::Char(_) => return f64::NEG_INFINITY,
            Expr::Concat(..) => RULES[3],
            Expr::Flip(..) => RULES[4],
            Expr::Recurse => RULES[5],
        };
        let children = match expr {
            Expr::Concat(l, r) | Expr::Flip(l, r) => {
                Self::tree_log_prob(l) + Self::tree_log_prob(r)
            }
            _ => 0.0,
        };
        rule.ln() + children
    }
}

impl Prior<Expr> for Grammar {
    fn log_prior(&self, expr: &Expr) -> f64 {
        if expr.size() > MAX_NODES {
            return f64::NEG_INFINITY;
        }
        Self::tree_log_prob(expr)
    }
}

impl PriorSample<Expr> for Grammar {
    fn sample_prior(&mut self) -> Expr {
        loop {
            let mut budget = MAX_NODES;
            if let Ok(expr) = self.generate(&mut budget) {
                return expr;
            }
        }
    }
}

impl Proposal<Expr> for Grammar {
    /// Regenerates a uniformly chosen subtree from the grammar.
    fn sample(&mut self, current: &Expr) -> Result<Expr, EvalError> {
        let paths = current.paths();
        let path = paths
            .choose(&mut self.rng)
            .ok_or_else(|| EvalError::Failed("tree without nodes".to_string()))?;
        let keep = current.size() - current.get(path).map_or(0, Expr::size);
        let mut budget = MAX_NODES.saturating_sub(keep);
        let subtree = self.generate(&mut budget)?;
        Ok(current.replace(path, &subtree))
    }

    fn log_prob(&self, from: &Expr, to: &Expr) -> f64 {
        let paths = from.paths();
        let pick = -(paths.len() as f64).ln();
        let terms: Vec<f64> = paths
            .iter()
            .filter_map(|path| {
                let sub = to.get(path)?;
                (from.replace(path, sub) == *to).then(|| pick + Self::tree_log_prob(sub))
            })
            .collect();
        lot_mcmc::math::logsumexp(&terms)
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }
}

fn anbn_counts() -> Counts {
    [("ab", 48), ("aabb", 26), ("aaabbb", 13), ("aaaabbbb", 6), ("aaaaabbbbb", 3)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let config = SamplerConfig::default()
        .with_n_steps(4_000)
        .with_top_n(10)
        .with_seed(2024);
    config.validate()?;

    let mut grammar = Grammar::new();
    let data = vec![FrequencyDatum::new((), anbn_counts())];
    let target = Posterior::new(grammar.clone(), config.likelihood(), data);
    let initial = grammar.sample_prior();
    info!(%initial, "starting hypothesis");

    let mut mh = MetropolisHastings::new(
        target,
        grammar,
        initial,
        config.temperature,
        config.n_chains,
    )?;
    if let Some(seed) = config.seed {
        mh = mh.set_seed(seed);
    }
    let top = mh.run_top_n(config.n_steps, config.top_n);
    info!(acceptance = mh.acceptance_rate(), kept = top.len(), "sampling finished");

    for s in top.into_sorted_vec() {
        println!(
            "{:>12.3} {:>12.3} {:>12.3}  {}",
            s.score.posterior, s.score.prior, s.score.likelihood, s.hypothesis
        );
    }
    Ok(())
}
