//! End-to-end checks of multi-chain sampling on the number game.
//!
//! The data `16, 8, 2, 64` single out "powers of 2"; every test below relies
//! on that concept dominating the posterior.

use std::collections::HashMap;

use lot_mcmc::core::ChainRunner;
use lot_mcmc::hypothesis::{Posterior, Scored, Target};
use lot_mcmc::io::{load_json, save_json};
use lot_mcmc::metropolis_hastings::MetropolisHastings;
use lot_mcmc::number_game::{Concept, ConceptSpace, SizePrinciple};
use lot_mcmc::summary::{kl_divergence, normalize, rescore};

type Game = Posterior<ConceptSpace, SizePrinciple, u32>;

fn setup(data: Vec<u32>) -> (Game, ConceptSpace) {
    let space = ConceptSpace::standard(100).unwrap();
    let target = Posterior::new(space.clone(), SizePrinciple::new(0.9, 100), data);
    (target, space)
}

fn log_posteriors(target: &Game, space: &ConceptSpace) -> HashMap<Concept, f64> {
    rescore(space.concepts(), target, 1.0)
        .into_iter()
        .map(|s| (s.hypothesis, s.posterior()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_agree_on_powers_of_two() {
        const SEED: u64 = 42;
        let (target, space) = setup(vec![16, 8, 2, 64]);
        let mut mh = MetropolisHastings::new(target, space, Concept::Range(1, 100), 1.0, 4)
            .unwrap()
            .set_seed(SEED);

        let samples = mh.run(3_000, 1_000);
        assert_eq!(samples.len(), 4);
        for chain in &samples {
            assert_eq!(chain.len(), 2_000);
            let hits = chain
                .iter()
                .filter(|s| s.hypothesis == Concept::Power(2))
                .count();
            assert!(hits as f64 / chain.len() as f64 > 0.95, "hits = {hits}");
        }
    }

    #[test]
    fn progress_run_has_the_same_shape() {
        let (target, space) = setup(vec![16, 8, 2, 64]);
        let mut mh = MetropolisHastings::new(target, space, Concept::Even, 1.0, 2)
            .unwrap()
            .set_seed(3);
        let samples = mh.run_with_progress(600, 100);
        assert!(samples.iter().all(|chain| chain.len() == 500));
    }

    #[test]
    fn top_hypotheses_survive_a_json_round_trip() {
        let (target, space) = setup(vec![16, 8, 2, 64]);
        let mut mh = MetropolisHastings::new(target, space, Concept::Odd, 1.0, 3)
            .unwrap()
            .set_seed(9);
        let top = mh.run_top_n(2_000, 10).into_sorted_vec();
        assert_eq!(top[0].hypothesis, Concept::Power(2));
        assert!(top.windows(2).all(|w| w[0].posterior() >= w[1].posterior()));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top.json");
        save_json(&top, &path).unwrap();
        let back: Vec<Scored<Concept>> = load_json(&path).unwrap();
        assert_eq!(back, top);
    }

    #[test]
    fn more_data_sharpens_the_posterior() {
        let (one, space) = setup(vec![16]);
        let (four, _) = setup(vec![16, 8, 2, 64]);

        let before = log_posteriors(&one, &space);
        let after = log_posteriors(&four, &space);
        assert!(kl_divergence(&after, &before) > 0.0);
        assert!(kl_divergence(&after, &after).abs() < 1e-12);

        let scores: Vec<f64> = space
            .concepts()
            .iter()
            .map(|c| four.compute_posterior(c, 1.0).posterior)
            .collect();
        let probs = normalize(&scores);
        let best = space
            .concepts()
            .iter()
            .position(|&c| c == Concept::Power(2))
            .unwrap();
        assert!(probs[best] > 0.9);
    }

    #[test]
    fn higher_temperature_flattens_the_posterior() {
        let (target, space) = setup(vec![16, 8, 2, 64]);
        let probs_at = |temperature: f64| {
            let scores: Vec<f64> = rescore(space.concepts(), &target, temperature)
                .iter()
                .map(|s| s.posterior())
                .collect();
            normalize(&scores).into_iter().fold(0.0, f64::max)
        };
        assert!(probs_at(10.0) < probs_at(1.0));
    }
}
