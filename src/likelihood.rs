/*!
# Edit-distance smoothed likelihood

Scores a hypothesis whose output distribution is only known through Monte
Carlo samples. Observed strings that the hypothesis never produced still get
probability mass from nearby strings it did produce, decaying exponentially
with Levenshtein distance:

```text
lp(k) = logsumexp_r [ ln(counts[r]) - ln(total) - decay * lev(r, k) ]
ll    = sum_k  c_k * lp(k)
```

# Examples

```rust
use lot_mcmc::likelihood::{compute_likelihood, Counts};

let counts = Counts::from([("ab".to_string(), 100), ("aab".to_string(), 10)]);
let observed = Counts::from([("ab".to_string(), 5)]);
let ll = compute_likelihood(&counts, &observed);
assert!((ll - 5.0 * (100.0_f64 / 110.0).ln()).abs() < 1e-9);

// A hypothesis that produced nothing gets the -inf sentinel.
assert_eq!(compute_likelihood(&Counts::new(), &observed), f64::NEG_INFINITY);
```
*/

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use strsim::levenshtein;

use crate::error::{Error, EvalError, Result};
use crate::hypothesis::{Generative, Likelihood};
use crate::math::logsumexp;

/// Output strings mapped to how often they occurred.
pub type Counts = BTreeMap<String, u64>;

/// Default number of forward samples used to estimate a hypothesis' outputs.
pub const DEFAULT_LL_SAMPLES: usize = 512;

/// Default log-probability penalty per unit of edit distance.
pub const DEFAULT_DECAY: f64 = 100.0;

/// The observed output of a datum as supplied by a caller.
///
/// Anything that does not parse as a count mapping is kept as raw JSON so it
/// can be reported as malformed rather than failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Observation {
    Counts(Counts),
    Value(serde_json::Value),
}

impl Observation {
    fn malformed(value: &serde_json::Value) -> Error {
        Error::MalformedDatum {
            context: format!("output was {value}"),
        }
    }
}

/// A raw `(input, output)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum<I> {
    pub input: I,
    pub output: Observation,
}

/// A datum whose output is known to be a count mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDatum<I> {
    pub input: I,
    pub counts: Counts,
}

impl<I> FrequencyDatum<I> {
    pub fn new(input: I, counts: Counts) -> Self {
        Self { input, counts }
    }
}

impl<I> TryFrom<Datum<I>> for FrequencyDatum<I> {
    type Error = Error;

    fn try_from(datum: Datum<I>) -> Result<Self> {
        match datum.output {
            Observation::Counts(counts) => Ok(Self::new(datum.input, counts)),
            Observation::Value(value) => Err(Observation::malformed(&value)),
        }
    }
}

/// Converts raw data, failing on the first datum that is not a count mapping.
pub fn frequency_data<I>(data: Vec<Datum<I>>) -> Result<Vec<FrequencyDatum<I>>> {
    data.into_iter().map(FrequencyDatum::try_from).collect()
}

/// How each observed string's log-probability is weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationWeight {
    /// Weight by the observation count, as if each occurrence were i.i.d.
    #[default]
    Count,
    /// Each distinct observed string counts once.
    Unit,
}

/// Levenshtein noise model over strings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditNoise {
    pub decay: f64,
    pub weighting: ObservationWeight,
}

impl Default for EditNoise {
    fn default() -> Self {
        Self {
            decay: DEFAULT_DECAY,
            weighting: ObservationWeight::Count,
        }
    }
}

impl EditNoise {
    pub fn new(decay: f64) -> Self {
        Self {
            decay,
            ..Self::default()
        }
    }

    pub fn with_weighting(mut self, weighting: ObservationWeight) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.decay.is_finite() && self.decay >= 0.0) {
            return Err(Error::config(format!(
                "decay must be finite and non-negative, got {}",
                self.decay
            )));
        }
        Ok(())
    }

    /// Smoothed log-probability of one observed string under `counts`.
    ///
    /// Returns `-inf` when `counts` holds no mass. An exact match carries no
    /// edit penalty, so an infinite decay keeps exact matches finite.
    pub fn string_log_prob(&self, counts: &Counts, observed: &str) -> f64 {
        // Summed as f64: tallies near u64::MAX would overflow an integer sum.
        let total: f64 = counts.values().map(|&c| c as f64).sum();
        if total == 0.0 {
            return f64::NEG_INFINITY;
        }
        let log_total = total.ln();
        let terms: Vec<f64> = counts
            .iter()
            .filter(|&(_, &c)| c > 0)
            .map(|(r, &c)| (c as f64).ln() - log_total - self.edit_penalty(r, observed))
            .collect();
        logsumexp(&terms)
    }

    fn edit_penalty(&self, produced: &str, observed: &str) -> f64 {
        match levenshtein(produced, observed) {
            0 => 0.0,
            d => self.decay * d as f64,
        }
    }

    /// Total log-likelihood of `observed` given the sampled `counts`.
    pub fn score(&self, counts: &Counts, observed: &Counts) -> f64 {
        if counts.values().all(|&c| c == 0) {
            return f64::NEG_INFINITY;
        }
        observed
            .iter()
            .filter(|&(_, &c)| c > 0)
            .map(|(k, &c)| {
                let weight = match self.weighting {
                    ObservationWeight::Count => c as f64,
                    ObservationWeight::Unit => 1.0,
                };
                weight * self.string_log_prob(counts, k)
            })
            .sum()
    }

    /// Like [`EditNoise::score`], but takes the raw observation and rejects
    /// anything that is not a count mapping.
    pub fn score_observation(&self, counts: &Counts, observed: &Observation) -> Result<f64> {
        match observed {
            Observation::Counts(observed) => Ok(self.score(counts, observed)),
            Observation::Value(value) => Err(Observation::malformed(value)),
        }
    }
}

/// Scores `observed` against `counts` with the default noise model
/// (decay 100, count weighting).
pub fn compute_likelihood(counts: &Counts, observed: &Counts) -> f64 {
    EditNoise::default().score(counts, observed)
}

/// Runs `hypothesis` forward `n_samples` times and tallies its outputs.
///
/// Runs that fail to evaluate are dropped from the table.
pub fn make_ll_counts<H, R>(
    hypothesis: &H,
    input: &H::Input,
    n_samples: usize,
    rng: &mut R,
) -> Counts
where
    H: Generative,
    R: Rng + ?Sized,
{
    let mut counts = Counts::new();
    for _ in 0..n_samples {
        if let Ok(output) = hypothesis.generate(input, rng) {
            *counts.entry(output).or_insert(0) += 1;
        }
    }
    counts
}

/**
Likelihood for [`Generative`] hypotheses: estimate the output distribution by
forward sampling, then score the observed counts with an [`EditNoise`] model.

Every call seeds a fresh RNG from `seed`, so scoring the same hypothesis on the
same datum always gives the same value.
*/
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StochasticLikelihood {
    pub n_samples: usize,
    pub noise: EditNoise,
    pub seed: u64,
}

impl Default for StochasticLikelihood {
    fn default() -> Self {
        Self {
            n_samples: DEFAULT_LL_SAMPLES,
            noise: EditNoise::default(),
            seed: 0,
        }
    }
}

impl StochasticLikelihood {
    pub fn new(n_samples: usize, noise: EditNoise) -> Self {
        Self {
            n_samples,
            noise,
            ..Self::default()
        }
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl<H: Generative> Likelihood<H> for StochasticLikelihood {
    type Datum = FrequencyDatum<H::Input>;

    fn log_likelihood(
        &self,
        hypothesis: &H,
        datum: &Self::Datum,
    ) -> std::result::Result<f64, EvalError> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let counts = make_ll_counts(hypothesis, &datum.input, self.n_samples, &mut rng);
        Ok(self.noise.score(&counts, &datum.counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn counts(entries: &[(&str, u64)]) -> Counts {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn dominant_exact_match() {
        let ll = compute_likelihood(&counts(&[("ab", 100), ("aab", 10)]), &counts(&[("ab", 5)]));
        let expected = 5.0 * (100.0_f64 / 110.0).ln();
        assert!(ll >= expected);
        assert_abs_diff_eq!(ll, expected, epsilon = 1e-9);
    }

    #[test]
    fn near_miss_is_penalized_not_impossible() {
        let ll = compute_likelihood(&counts(&[("ab", 10)]), &counts(&[("abb", 2)]));
        assert!(ll.is_finite());
        assert_abs_diff_eq!(ll, 2.0 * -100.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_counts_give_sentinel() {
        assert_eq!(
            compute_likelihood(&Counts::new(), &counts(&[("ab", 1)])),
            f64::NEG_INFINITY
        );
        assert_eq!(
            compute_likelihood(&counts(&[("ab", 0)]), &counts(&[("ab", 1)])),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn deterministic() {
        let c = counts(&[("N V", 30), ("D N V", 12), ("D N V N", 3)]);
        let o = counts(&[("N V", 4), ("D N V D N", 1)]);
        let first = compute_likelihood(&c, &o);
        assert!(first.is_finite());
        for _ in 0..5 {
            assert_eq!(compute_likelihood(&c, &o), first);
        }
    }

    #[test]
    fn more_mass_on_matched_string_never_hurts_it() {
        let noise = EditNoise::default();
        let mut previous = f64::NEG_INFINITY;
        for n in 1..50 {
            let c = counts(&[("ab", n), ("aab", 7), ("b", 3)]);
            let lp = noise.string_log_prob(&c, "ab");
            assert!(lp >= previous, "lp decreased at n={n}: {lp} < {previous}");
            previous = lp;
        }
    }

    #[test]
    fn edit_distance_counts_characters_not_bytes() {
        let noise = EditNoise::default();
        assert_abs_diff_eq!(noise.string_log_prob(&counts(&[("é", 1)]), "e"), -100.0);
        assert_abs_diff_eq!(
            noise.string_log_prob(&counts(&[("kitten", 1)]), "sitting"),
            -300.0
        );
    }

    #[test]
    fn zero_count_observations_are_ignored() {
        let c = counts(&[("ab", 10)]);
        let with_zero = compute_likelihood(&c, &counts(&[("ab", 1), ("zzz", 0)]));
        let without = compute_likelihood(&c, &counts(&[("ab", 1)]));
        assert_eq!(with_zero, without);
    }

    #[test]
    fn unit_weighting_ignores_multiplicity() {
        let c = counts(&[("ab", 9), ("abab", 1)]);
        let noise = EditNoise::default().with_weighting(ObservationWeight::Unit);
        let once = noise.score(&c, &counts(&[("abab", 1)]));
        let many = noise.score(&c, &counts(&[("abab", 40)]));
        assert_eq!(once, many);
    }

    #[test]
    fn smaller_decay_smooths_more() {
        let c = counts(&[("ab", 10)]);
        let o = counts(&[("abc", 1)]);
        assert!(EditNoise::new(1.0).score(&c, &o) > EditNoise::new(100.0).score(&c, &o));
        assert!(EditNoise::new(-1.0).validate().is_err());
        assert!(EditNoise::new(f64::NAN).validate().is_err());
    }

    #[test]
    fn malformed_observation_fails_fast() {
        let c = counts(&[("ab", 1)]);
        let err = EditNoise::default()
            .score_observation(&c, &Observation::Value("ab".into()))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedDatum { .. }));

        let data = vec![
            Datum {
                input: (),
                output: Observation::Counts(counts(&[("a", 1)])),
            },
            Datum {
                input: (),
                output: Observation::Value("a".into()),
            },
        ];
        assert!(matches!(frequency_data(data), Err(Error::MalformedDatum { .. })));
    }

    #[test]
    fn observations_parse_from_json() {
        let datum: Datum<Vec<u32>> =
            serde_json::from_str(r#"{"input": [], "output": {"ab": 3, "aabb": 1}}"#).unwrap();
        let datum = FrequencyDatum::try_from(datum).unwrap();
        assert_eq!(datum.counts, counts(&[("ab", 3), ("aabb", 1)]));

        for output in [r#""ab""#, "[1, 2]", "7", r#"{"ab": -1}"#, "null"] {
            let text = format!(r#"{{"input": [], "output": {output}}}"#);
            let bad: Datum<Vec<u32>> = serde_json::from_str(&text).unwrap();
            assert!(
                matches!(FrequencyDatum::try_from(bad), Err(Error::MalformedDatum { .. })),
                "{output} was accepted"
            );
        }
    }

    #[test]
    fn huge_tallies_do_not_overflow() {
        let c = counts(&[("a", u64::MAX), ("b", 1)]);
        let lp = EditNoise::default().string_log_prob(&c, "a");
        assert!(lp.is_finite());
        assert_abs_diff_eq!(lp, 0.0, epsilon = 1e-9);
        assert!(compute_likelihood(&c, &counts(&[("b", 1)])).is_finite());
    }

    #[test]
    fn infinite_decay_keeps_exact_matches() {
        let noise = EditNoise::new(f64::INFINITY);
        let c = counts(&[("ab", 10)]);
        assert_eq!(noise.score(&c, &counts(&[("ab", 1)])), 0.0);
        assert_eq!(noise.score(&c, &counts(&[("abb", 1)])), f64::NEG_INFINITY);

        let mixed = counts(&[("ab", 3), ("b", 1)]);
        assert_abs_diff_eq!(noise.string_log_prob(&mixed, "ab"), 0.75_f64.ln(), epsilon = 1e-12);
    }

    /// Emits "a" or "b" with equal probability; refuses empty input.
    struct Coin;

    impl Generative for Coin {
        type Input = bool;

        fn generate<R: Rng + ?Sized>(
            &self,
            input: &bool,
            rng: &mut R,
        ) -> std::result::Result<String, EvalError> {
            if !*input {
                return Err(EvalError::Failed("no coin".to_string()));
            }
            Ok(if rng.gen_bool(0.5) { "a" } else { "b" }.to_string())
        }
    }

    #[test]
    fn ll_counts_tally_outputs_and_drop_failures() {
        let mut rng = SmallRng::seed_from_u64(7);
        let tallied = make_ll_counts(&Coin, &true, 1000, &mut rng);
        assert_eq!(tallied.values().sum::<u64>(), 1000);
        assert!(tallied["a"] > 400 && tallied["b"] > 400);

        let failed = make_ll_counts(&Coin, &false, 100, &mut rng);
        assert!(failed.is_empty());
    }

    #[test]
    fn stochastic_likelihood_is_reproducible() {
        let model = StochasticLikelihood::default().set_seed(3);
        let datum = FrequencyDatum::new(true, counts(&[("a", 5), ("b", 5)]));
        let first = model.log_likelihood(&Coin, &datum).unwrap();
        assert_eq!(model.log_likelihood(&Coin, &datum).unwrap(), first);
        assert_abs_diff_eq!(first, 10.0 * 0.5_f64.ln(), epsilon = 0.5);

        let never = FrequencyDatum::new(false, counts(&[("a", 1)]));
        assert_eq!(model.log_likelihood(&Coin, &never).unwrap(), f64::NEG_INFINITY);
    }
}
