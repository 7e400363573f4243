//! Chain traits, lazy step sequences and the parallel multi-chain runner.

use std::hash::Hash;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::info;

use crate::hypothesis::Scored;
use crate::stats::ChainTracker;
use crate::summary::TopN;

const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

pub trait MarkovChain<H> {
    /// Does one iteration of the chain, returning the new current state.
    /// A rejected step returns the previous state again.
    fn step(&mut self) -> &Scored<H>;

    /// Get the current state without stepping.
    fn current_state(&self) -> &Scored<H>;

    /// Whether the most recent step moved the chain.
    fn last_accepted(&self) -> bool;

    /// Borrows the chain as a sequence of exactly `n_steps` states.
    ///
    /// Dropping the iterator early leaves the chain where it stopped, so the
    /// sequence can be resumed by calling `iter` again.
    fn iter(&mut self, n_steps: usize) -> Steps<'_, H, Self>
    where
        Self: Sized,
    {
        Steps {
            chain: self,
            remaining: n_steps,
            phantom: PhantomData,
        }
    }

    /// Like [`MarkovChain::iter`], but takes ownership of the chain.
    fn into_steps(self, n_steps: usize) -> IntoSteps<H, Self>
    where
        Self: Sized,
    {
        IntoSteps {
            chain: self,
            remaining: n_steps,
            phantom: PhantomData,
        }
    }
}

/// Borrowing step sequence; see [`MarkovChain::iter`].
pub struct Steps<'a, H, C> {
    chain: &'a mut C,
    remaining: usize,
    phantom: PhantomData<H>,
}

impl<H: Clone, C: MarkovChain<H>> Iterator for Steps<'_, H, C> {
    type Item = Scored<H>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.chain.step().clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<H: Clone, C: MarkovChain<H>> ExactSizeIterator for Steps<'_, H, C> {}

/// Owning step sequence; see [`MarkovChain::into_steps`].
pub struct IntoSteps<H, C> {
    chain: C,
    remaining: usize,
    phantom: PhantomData<H>,
}

impl<H, C> IntoSteps<H, C> {
    /// Number of steps still to be yielded.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Gives the chain back, positioned wherever the sequence stopped.
    pub fn into_chain(self) -> C {
        self.chain
    }
}

impl<H: Clone, C: MarkovChain<H>> Iterator for IntoSteps<H, C> {
    type Item = Scored<H>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.chain.step().clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<H: Clone, C: MarkovChain<H>> ExactSizeIterator for IntoSteps<H, C> {}

pub fn run_chain<H, M>(chain: &mut M, n_steps: usize) -> Vec<Scored<H>>
where
    M: MarkovChain<H>,
    H: Clone,
{
    chain.iter(n_steps).collect()
}

pub fn run_chain_with_progress<H, M>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> Vec<Scored<H>>
where
    M: MarkovChain<H>,
    H: Clone,
{
    let mut out = Vec::with_capacity(n_steps);
    let mut tracker = ChainTracker::new();
    let mut last_update = Instant::now();

    pb.set_length(n_steps as u64);

    for i in 0..n_steps {
        let state = chain.step().clone();
        tracker.step(chain.last_accepted(), &state.score);
        out.push(state);

        if last_update.elapsed() >= UPDATE_INTERVAL || i + 1 == n_steps {
            pb.set_position(i as u64 + 1);
            pb.set_message(format!(
                "AcceptRate={:.3} Best={:.3}",
                tracker.p_accept(),
                tracker.best_posterior()
            ));
            last_update = Instant::now();
        }
    }

    out
}

/// A trait for "anything that owns multiple MarkovChains".
pub trait HasChains<H> {
    type Chain: MarkovChain<H> + Send;

    /// Returns a mutable reference to the vector of chains.
    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

pub trait ChainRunner<H>: HasChains<H>
where
    H: Clone + Send + 'static,
{
    /// Runs the chains in parallel, discarding burn-in.
    fn run(&mut self, n_steps: usize, discard: usize) -> Vec<Vec<Scored<H>>> {
        let chains = self.chains_mut();
        info!(n_chains = chains.len(), n_steps, discard, "running chains");

        chains
            .par_iter_mut()
            .map(|chain| {
                let mut samples = run_chain(chain, n_steps);
                samples.split_off(discard.min(samples.len()))
            })
            .collect()
    }

    fn run_with_progress(&mut self, n_steps: usize, discard: usize) -> Vec<Vec<Scored<H>>> {
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        let chains = self.chains_mut();
        info!(n_chains = chains.len(), n_steps, discard, "running chains");

        chains
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new(n_steps as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let mut samples = run_chain_with_progress(chain, n_steps, &pb);
                pb.finish_with_message("Done!");

                samples.split_off(discard.min(samples.len()))
            })
            .collect()
    }

    /**
    Runs every chain for `n_steps`, each keeping only its `n` best distinct
    hypotheses, then merges the per-chain sets once all chains are done.
    */
    fn run_top_n(&mut self, n_steps: usize, n: usize) -> TopN<H>
    where
        H: Eq + Hash + Sync,
    {
        let chains = self.chains_mut();
        info!(n_chains = chains.len(), n_steps, n, "collecting top hypotheses");

        let merged = chains
            .par_iter_mut()
            .map(|chain| {
                let mut top: TopN<H> = TopN::new(n);
                for state in chain.iter(n_steps) {
                    top.add(state);
                }
                top
            })
            .reduce(|| TopN::new(n), TopN::merge);

        info!(kept = merged.len(), "merged top hypotheses");
        merged
    }
}

impl<H: Clone + Send + 'static, T: HasChains<H>> ChainRunner<H> for T {}
