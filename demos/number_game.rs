//! Which rule generated `16, 8, 2, 64`?
//!
//! Runs several chains with progress bars, then prints the best concepts and
//! the posterior probability of each. Pass a JSON config path as the first
//! argument to override the defaults, e.g. `{"n_chains": 8, "seed": 1}`.

use std::env;

use lot_mcmc::config::SamplerConfig;
use lot_mcmc::core::ChainRunner;
use lot_mcmc::hypothesis::Posterior;
use lot_mcmc::metropolis_hastings::MetropolisHastings;
use lot_mcmc::number_game::{Concept, ConceptSpace, SizePrinciple};
use lot_mcmc::stats::{max_rhat, ChainTracker};
use lot_mcmc::summary::{normalize, TopN};
use tracing::info;
use tracing_subscriber::prelude::*;

const DOMAIN: u32 = 100;
const ALPHA: f64 = 0.9;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let config = match env::args().nth(1) {
        Some(path) => SamplerConfig::from_json_file(path)?,
        None => SamplerConfig::default().with_n_steps(5_000).with_top_n(10),
    };
    config.validate()?;

    let data = vec![16, 8, 2, 64];
    let space = ConceptSpace::standard(DOMAIN)?;
    let target = Posterior::new(space.clone(), SizePrinciple::new(ALPHA, DOMAIN), data);

    let mut mh = MetropolisHastings::new(
        target,
        space,
        Concept::Even,
        config.temperature,
        config.n_chains,
    )?;
    if let Some(seed) = config.seed {
        mh = mh.set_seed(seed);
    }

    let samples = mh.run_with_progress(config.n_steps, config.discard);
    info!(acceptance = mh.acceptance_rate(), "sampling finished");

    let stats: Vec<_> = samples
        .iter()
        .map(|chain| {
            let mut tracker = ChainTracker::new();
            for s in chain {
                tracker.step(true, &s.score);
            }
            tracker.stats()
        })
        .collect();
    match max_rhat(&stats.iter().collect::<Vec<_>>()) {
        Ok(rhat) => info!(rhat, "max R-hat over score components"),
        Err(err) => info!(%err, "R-hat unavailable"),
    }

    let mut top = TopN::new(config.top_n);
    top.extend(samples.into_iter().flatten());
    let top = top.into_sorted_vec();
    let probs = normalize(&top.iter().map(|s| s.posterior()).collect::<Vec<_>>());

    println!("{:>24} {:>10} {:>10}", "concept", "posterior", "p");
    for (s, p) in top.iter().zip(probs) {
        println!("{:>24} {:>10.3} {:>10.4}", s.hypothesis.to_string(), s.posterior(), p);
    }
    Ok(())
}
