//! Summaries of sampled hypotheses: best-N sets, normalization, rescoring,
//! divergence between posteriors and F-scores against a target language.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use rayon::prelude::*;
use tracing::debug;

use crate::hypothesis::{Scored, Target};
use crate::likelihood::Counts;
use crate::math::logsumexp;

/// Hypotheses below this posterior share are left out of [`f_score_breakdown`].
pub const BREAKDOWN_MIN_PROBABILITY: f64 = 1e-2;

/// The `n` best distinct hypotheses seen so far, by posterior.
#[derive(Debug, Clone)]
pub struct TopN<H> {
    capacity: usize,
    entries: Vec<Scored<H>>,
    seen: HashSet<H>,
}

impl<H: Clone + Eq + Hash> TopN<H> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Offers a sample. Duplicates of a hypothesis already kept are ignored,
    /// and a full set only takes samples that beat its current worst entry.
    pub fn add(&mut self, sample: Scored<H>) {
        if self.capacity == 0 || self.seen.contains(&sample.hypothesis) {
            return;
        }
        if self.entries.len() < self.capacity {
            self.seen.insert(sample.hypothesis.clone());
            self.entries.push(sample);
            return;
        }

        let Some((worst, worst_posterior)) = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.posterior()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
        else {
            return;
        };
        if sample.posterior() > worst_posterior {
            let evicted = self.entries.swap_remove(worst);
            self.seen.remove(&evicted.hypothesis);
            self.seen.insert(sample.hypothesis.clone());
            self.entries.push(sample);
        }
    }

    /// Combines two sets, keeping the larger capacity.
    pub fn merge(mut self, other: Self) -> Self {
        self.capacity = self.capacity.max(other.capacity);
        for sample in other.entries {
            self.add(sample);
        }
        self
    }

    pub fn best(&self) -> Option<&Scored<H>> {
        self.entries
            .iter()
            .max_by(|a, b| a.posterior().total_cmp(&b.posterior()))
    }

    pub fn contains(&self, hypothesis: &H) -> bool {
        self.seen.contains(hypothesis)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scored<H>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best first.
    pub fn into_sorted_vec(mut self) -> Vec<Scored<H>> {
        self.entries
            .sort_by(|a, b| b.posterior().total_cmp(&a.posterior()));
        self.entries
    }
}

impl<H: Clone + Eq + Hash> Extend<Scored<H>> for TopN<H> {
    fn extend<I: IntoIterator<Item = Scored<H>>>(&mut self, iter: I) {
        for sample in iter {
            self.add(sample);
        }
    }
}

/// Turns log scores into probabilities summing to one.
///
/// If every score is `-inf` there is nothing to normalize against and all
/// probabilities are zero.
pub fn normalize(log_scores: &[f64]) -> Vec<f64> {
    let z = logsumexp(log_scores);
    if z == f64::NEG_INFINITY {
        return vec![0.0; log_scores.len()];
    }
    log_scores.iter().map(|s| (s - z).exp()).collect()
}

/// Scores every hypothesis against `target` in parallel.
pub fn rescore<H, T>(hypotheses: &[H], target: &T, temperature: f64) -> Vec<Scored<H>>
where
    H: Clone + Sync + Send,
    T: Target<H> + Sync,
{
    debug!(n = hypotheses.len(), temperature, "rescoring hypotheses");
    hypotheses
        .par_iter()
        .map(|h| Scored::new(h.clone(), target.compute_posterior(h, temperature)))
        .collect()
}

/**
KL divergence `KL(current || next)` between two posteriors given as
unnormalized log scores over hypotheses.

Both maps are normalized first. Hypotheses with zero probability under
`current` contribute nothing; a hypothesis that `current` supports but `next`
lacks makes the divergence infinite.

The result does not depend on map iteration order: normalizers and terms are
summed in sorted order.
*/
pub fn kl_divergence<H: Eq + Hash>(current: &HashMap<H, f64>, next: &HashMap<H, f64>) -> f64 {
    let current_z = logsumexp(&sorted(current.values().copied()));
    let next_z = logsumexp(&sorted(next.values().copied()));
    if current_z == f64::NEG_INFINITY {
        return 0.0;
    }

    let mut terms = Vec::with_capacity(current.len());
    for (h, &v) in current {
        let p = (v - current_z).exp();
        if p == 0.0 {
            continue;
        }
        let q = match next.get(h) {
            Some(&q) if q > f64::NEG_INFINITY => q - next_z,
            _ => return f64::INFINITY,
        };
        terms.push(p * ((v - current_z) - q));
    }
    sorted(terms).iter().sum()
}

fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.into_iter().collect();
    values.sort_by(f64::total_cmp);
    values
}

/**
Precision and recall of a hypothesis' sampled outputs against a target
language.

Both are over distinct strings. Precision is the fraction of strings produced
(with a positive count) that belong to `target`, and recall is the fraction of
`target` that was produced. Either is zero when its denominator is empty.

# Examples

```rust
use std::collections::HashSet;
use lot_mcmc::likelihood::Counts;
use lot_mcmc::summary::precision_recall;

let produced = Counts::from([("ab".to_string(), 40), ("ba".to_string(), 2)]);
let target: HashSet<String> = ["ab", "aabb"].map(String::from).into();
assert_eq!(precision_recall(&produced, &target), (0.5, 0.5));
```
*/
pub fn precision_recall(counts: &Counts, target: &HashSet<String>) -> (f64, f64) {
    let produced: Vec<&String> = counts
        .iter()
        .filter(|&(_, &c)| c > 0)
        .map(|(k, _)| k)
        .collect();
    let hits = produced.iter().filter(|&&k| target.contains(k)).count() as f64;
    let precision = if produced.is_empty() {
        0.0
    } else {
        hits / produced.len() as f64
    };
    let recall = if target.is_empty() {
        0.0
    } else {
        hits / target.len() as f64
    };
    (precision, recall)
}

/// One hypothesis' share of the posterior and its F1 score.
#[derive(Debug, Clone, PartialEq)]
pub struct FScoreEntry<H> {
    pub hypothesis: H,
    pub probability: f64,
    pub f_score: f64,
}

/// Posterior share and F1 of every scored hypothesis with `P + R > 0`.
///
/// Shares are normalized over all of `scored`, including hypotheses missing
/// from `pr` or scoring zero on both.
fn f_score_terms<'a, H: Eq + Hash>(
    scored: &'a [Scored<H>],
    pr: &HashMap<H, (f64, f64)>,
) -> Vec<(&'a H, f64, f64)> {
    let z = logsumexp(&scored.iter().map(Scored::posterior).collect::<Vec<_>>());
    if z == f64::NEG_INFINITY {
        return Vec::new();
    }
    scored
        .iter()
        .filter_map(|s| {
            let &(precision, recall) = pr.get(&s.hypothesis)?;
            let base = precision + recall;
            (base > 0.0).then(|| {
                let p = (s.posterior() - z).exp();
                (&s.hypothesis, p, 2.0 * precision * recall / base)
            })
        })
        .collect()
}

/**
Posterior-weighted F-score `2 * sum_h p(h) * P_h * R_h / (P_h + R_h)`.

`pr` maps each hypothesis to its `(precision, recall)`, typically from
[`precision_recall`]. Posteriors are normalized with log-sum-exp over all of
`scored`. Hypotheses with `P + R = 0`, or absent from `pr`, add nothing.
*/
pub fn weighted_f_score<H: Eq + Hash>(scored: &[Scored<H>], pr: &HashMap<H, (f64, f64)>) -> f64 {
    f_score_terms(scored, pr)
        .into_iter()
        .map(|(_, p, f)| p * f)
        .sum()
}

/// The hypotheses behind [`weighted_f_score`] holding more than
/// [`BREAKDOWN_MIN_PROBABILITY`] of the posterior, most probable first.
pub fn f_score_breakdown<H: Clone + Eq + Hash>(
    scored: &[Scored<H>],
    pr: &HashMap<H, (f64, f64)>,
) -> Vec<FScoreEntry<H>> {
    let mut entries: Vec<FScoreEntry<H>> = f_score_terms(scored, pr)
        .into_iter()
        .filter(|&(_, p, _)| p > BREAKDOWN_MIN_PROBABILITY)
        .map(|(h, probability, f_score)| FScoreEntry {
            hypothesis: h.clone(),
            probability,
            f_score,
        })
        .collect();
    entries.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    entries
}
