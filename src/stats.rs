//! Running chain statistics and convergence diagnostics over score traces.

use std::collections::VecDeque;

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;

use crate::error::{Error, Result};
use crate::hypothesis::Score;

/// Number of recent steps the acceptance rate is computed over.
const ACCEPT_WINDOW: usize = 100;

/// Number of tracked score components: prior, likelihood, posterior.
pub const N_COMPONENTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainTracker {
    n: u64,
    n_finite: u64,
    p_accept: f64,
    mean: Array1<f64>,    // N_COMPONENTS
    mean_sq: Array1<f64>, // N_COMPONENTS
    best: f64,
    accept_queue: VecDeque<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub n: u64,
    pub n_finite: u64,
    pub p_accept: f64,
    pub best_posterior: f64,
    pub mean: Array1<f64>, // N_COMPONENTS
    pub sm2: Array1<f64>,  // N_COMPONENTS
}

impl Default for ChainTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainTracker {
    pub fn new() -> Self {
        Self {
            n: 0,
            n_finite: 0,
            p_accept: 0.0,
            mean: Array1::<f64>::zeros(N_COMPONENTS),
            mean_sq: Array1::<f64>::zeros(N_COMPONENTS),
            best: f64::NEG_INFINITY,
            accept_queue: VecDeque::with_capacity(ACCEPT_WINDOW + 1),
        }
    }

    /// Records one step. Scores with a non-finite component count towards the
    /// acceptance rate but not the running moments.
    pub fn step(&mut self, accepted: bool, score: &Score) {
        self.n += 1;

        self.accept_queue.push_back(accepted);
        if self.accept_queue.len() > ACCEPT_WINDOW {
            self.accept_queue.pop_front();
        }
        let n_accepted = self.accept_queue.iter().filter(|&&a| a).count();
        self.p_accept = n_accepted as f64 / self.accept_queue.len() as f64;

        if score.posterior > self.best {
            self.best = score.posterior;
        }

        let x = arr1(&[score.prior, score.likelihood, score.posterior]);
        if !x.iter().all(|v| v.is_finite()) {
            return;
        }
        self.n_finite += 1;
        let n = self.n_finite as f64;
        self.mean = (&self.mean * (n - 1.0) + &x) / n;
        self.mean_sq = (&self.mean_sq * (n - 1.0) + x.mapv(|v| v * v)) / n;
    }

    pub fn p_accept(&self) -> f64 {
        self.p_accept
    }

    pub fn best_posterior(&self) -> f64 {
        self.best
    }

    /// Unbiased sample variance of each score component.
    pub fn sm2(&self) -> Array1<f64> {
        let n = self.n_finite as f64;
        if self.n_finite < 2 {
            return Array1::<f64>::zeros(N_COMPONENTS);
        }
        (&self.mean_sq - &self.mean.mapv(|v| v * v)) * n / (n - 1.0)
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            n: self.n,
            n_finite: self.n_finite,
            p_accept: self.p_accept,
            best_posterior: self.best,
            mean: self.mean.clone(),
            sm2: self.sm2(),
        }
    }
}

/**
Gelman–Rubin potential scale reduction for each score component.

Values close to 1 suggest the chains are sampling the same distribution.
Needs at least two chains, each with at least two finite scores.
*/
pub fn collect_rhat(all_chain_stats: &[&ChainStats]) -> Result<Array1<f64>> {
    if all_chain_stats.len() < 2 {
        return Err(Error::config("R-hat needs at least two chains"));
    }
    if all_chain_stats.iter().any(|s| s.n_finite < 2) {
        return Err(Error::config(
            "R-hat needs at least two finite scores per chain",
        ));
    }

    let means: Vec<ArrayView1<f64>> = all_chain_stats.iter().map(|x| x.mean.view()).collect();
    let means = ndarray::stack(Axis(0), &means)
        .map_err(|err| Error::config(format!("mismatched chain statistics: {err}")))?;
    let sm2s: Vec<ArrayView1<f64>> = all_chain_stats.iter().map(|x| x.sm2.view()).collect();
    let sm2s = ndarray::stack(Axis(0), &sm2s)
        .map_err(|err| Error::config(format!("mismatched chain statistics: {err}")))?;

    let n_chains = all_chain_stats.len() as f64;
    let n: f64 = all_chain_stats.iter().map(|x| x.n_finite as f64).sum::<f64>() / n_chains;

    let w = sm2s.sum_axis(Axis(0)) / n_chains;
    let global_means = means.sum_axis(Axis(0)) / n_chains;
    let diffs = &means - &global_means.insert_axis(Axis(0));
    let b = diffs.mapv(|v| v * v).sum_axis(Axis(0)) * n / (n_chains - 1.0);

    let var = &w * ((n - 1.0) / n) + &b / n;
    Ok((var / w).mapv(f64::sqrt))
}

/// Largest R-hat over all score components, ignoring NaN (e.g. constant traces).
pub fn max_rhat(all_chain_stats: &[&ChainStats]) -> Result<f64> {
    let rhat = collect_rhat(all_chain_stats)?;
    let finite = rhat.mapv(|v| if v.is_nan() { f64::NEG_INFINITY } else { v });
    finite
        .max()
        .copied()
        .map_err(|err| Error::config(format!("no R-hat values: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn score(posterior: f64) -> Score {
        Score {
            prior: posterior / 2.0,
            likelihood: posterior / 2.0,
            posterior,
        }
    }

    fn tracked(values: &[f64]) -> ChainTracker {
        let mut tracker = ChainTracker::new();
        for &v in values {
            tracker.step(true, &score(v));
        }
        tracker
    }

    #[test]
    fn running_moments() {
        let tracker = tracked(&[-1.0, -2.0, -3.0, -4.0]);
        let stats = tracker.stats();
        assert_eq!(stats.n, 4);
        assert_abs_diff_eq!(stats.mean[2], -2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.sm2[2], 5.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.best_posterior, -1.0);
    }

    #[test]
    fn non_finite_scores_skip_moments() {
        let mut tracker = tracked(&[-1.0, -3.0]);
        tracker.step(false, &Score::impossible());
        let stats = tracker.stats();
        assert_eq!(stats.n, 3);
        assert_eq!(stats.n_finite, 2);
        assert_abs_diff_eq!(stats.mean[2], -2.0, epsilon = 1e-12);
        assert!(stats.mean.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn acceptance_window_slides() {
        let mut tracker = ChainTracker::new();
        for _ in 0..ACCEPT_WINDOW {
            tracker.step(true, &score(-1.0));
        }
        assert_abs_diff_eq!(tracker.p_accept(), 1.0);
        for _ in 0..ACCEPT_WINDOW / 2 {
            tracker.step(false, &score(-1.0));
        }
        assert_abs_diff_eq!(tracker.p_accept(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn rhat_near_one_for_matching_chains() {
        let a = tracked(&[-1.0, -2.0, -1.0, -2.0, -1.0, -2.0]).stats();
        let b = tracked(&[-2.0, -1.0, -2.0, -1.0, -2.0, -1.0]).stats();
        let rhat = collect_rhat(&[&a, &b]).unwrap();
        for v in rhat.iter() {
            assert!(*v < 1.0 + 1e-9, "rhat = {v}");
        }
    }

    #[test]
    fn rhat_flags_disagreeing_chains() {
        let a = tracked(&[-1.0, -1.1, -0.9, -1.0]).stats();
        let b = tracked(&[-50.0, -50.1, -49.9, -50.0]).stats();
        assert!(max_rhat(&[&a, &b]).unwrap() > 10.0);
    }

    #[test]
    fn rhat_needs_two_chains() {
        let a = tracked(&[-1.0, -2.0]).stats();
        assert!(collect_rhat(&[&a]).is_err());
        let short = tracked(&[-1.0]).stats();
        assert!(collect_rhat(&[&a, &short]).is_err());
    }
}
